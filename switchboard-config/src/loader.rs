//! Configuration loading and environment variable handling

use crate::domains::SwitchboardConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with the default prefix
    pub fn new() -> Self {
        Self {
            prefix: "SWITCHBOARD".to_string(),
        }
    }

    /// Create a new config loader with a custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<SwitchboardConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: SwitchboardConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<SwitchboardConfig> {
        let mut config = SwitchboardConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<SwitchboardConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut SwitchboardConfig) -> ConfigResult<()> {
        if let Ok(bind) = self.get_env_var("BIND_ADDRESS") {
            config.server.bind_address = bind;
        }
        if let Ok(port) = self.get_env_var("PORT") {
            config.server.port = port
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid PORT: {}", e)))?;
        }
        if let Ok(origins) = self.get_env_var("CORS_ORIGINS") {
            config.server.cors_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
        }

        if let Ok(timeout) = self.get_env_var("MCP_DEFAULT_TIMEOUT") {
            config.mcp.default_timeout_s = timeout
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid MCP_DEFAULT_TIMEOUT: {}", e)))?;
        }
        if let Ok(sep) = self.get_env_var("MCP_NAMESPACE_SEPARATOR") {
            config.mcp.namespace_separator = sep;
        }

        if let Ok(interval) = self.get_env_var("SERVER_CHECK_INTERVAL") {
            config.worker.server_check_interval_s = interval
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid SERVER_CHECK_INTERVAL: {}", e)))?;
        }
        if let Ok(workers) = self.get_env_var("MAX_WORKERS") {
            config.worker.max_workers = workers
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid MAX_WORKERS: {}", e)))?;
        }
        if let Ok(coalesce) = self.get_env_var("COALESCE") {
            config.worker.coalesce = coalesce
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid COALESCE: {}", e)))?;
        }

        if let Ok(key) = self.get_env_var("ENCRYPTION_KEY") {
            config.security.encryption_key = key;
        }
        if let Ok(secret) = self.get_env_var("JWT_SECRET") {
            config.security.jwt_secret = secret;
        }

        if let Ok(level) = self.get_env_var("LOG_LEVEL") {
            use std::str::FromStr;
            config.logging.level = crate::domains::logging::LogLevel::from_str(&level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", level)))?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
