//! Server-row to child-spec resolution
//!
//! The only place plaintext args/env exist outside the child process
//! itself; nothing here stores or logs them.

use std::sync::Arc;
use std::time::Duration;

use switchboard_interfaces::{McpServer, SecretsProvider};
use switchboard_mcp::transport::stdio::{ChildSpec, ChildSpecFactory};
use switchboard_mcp::{McpError, McpResult};
use switchboard_security::{open_args, open_env};

/// [`ChildSpecFactory`] backed by the secrets provider
pub struct SecretChildSpecFactory {
    secrets: Arc<dyn SecretsProvider>,
    default_timeout: Duration,
}

impl SecretChildSpecFactory {
    pub fn new(secrets: Arc<dyn SecretsProvider>, default_timeout: Duration) -> Self {
        Self {
            secrets,
            default_timeout,
        }
    }
}

impl ChildSpecFactory for SecretChildSpecFactory {
    fn resolve(&self, server: &McpServer) -> McpResult<ChildSpec> {
        let args = open_args(self.secrets.as_ref(), server).map_err(|e| McpError::Configuration {
            message: format!("args decryption failed for '{}': {}", server.name, e),
        })?;
        let env = open_env(self.secrets.as_ref(), server).map_err(|e| McpError::Configuration {
            message: format!("env decryption failed for '{}': {}", server.name, e),
        })?;

        let timeout = if server.timeout_s > 0 {
            Duration::from_secs(server.timeout_s)
        } else {
            self.default_timeout
        };

        Ok(ChildSpec {
            project_id: server.project_id,
            server_id: server.id,
            name: server.name.clone(),
            command: server.command.clone(),
            args,
            env,
            cwd: server.cwd.clone(),
            timeout,
        })
    }
}
