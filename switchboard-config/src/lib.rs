//! Domain-driven configuration management for Switchboard
//!
//! Configuration is split by functional domain, each with serde defaults,
//! validation, and environment variable overrides under the `SWITCHBOARD_`
//! prefix.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

// Re-export domain configurations
pub use domains::{
    logging::LoggingConfig, mcp::McpConfig, security::SecurityConfig, server::ServerConfig,
    worker::WorkerDefaults, SwitchboardConfig,
};
