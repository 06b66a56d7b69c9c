//! Domain-specific configuration modules

pub mod logging;
pub mod mcp;
pub mod security;
pub mod server;
pub mod utils;
pub mod worker;

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::Validatable;

/// Root configuration aggregating every domain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    pub server: server::ServerConfig,
    pub mcp: mcp::McpConfig,
    pub worker: worker::WorkerDefaults,
    pub security: security::SecurityConfig,
    pub logging: logging::LoggingConfig,
}

impl SwitchboardConfig {
    /// Validate every domain
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.server.validate()?;
        self.mcp.validate()?;
        self.worker.validate()?;
        self.security.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
