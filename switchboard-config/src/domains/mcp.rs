//! MCP (Model Context Protocol) defaults

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::{validate_range, validate_required_string, Validatable};

/// Defaults applied to MCP sessions and child clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    /// Default per-call timeout when a server row does not set one
    #[serde(default = "default_timeout_s")]
    pub default_timeout_s: u64,

    /// Separator between a server namespace and a tool name in unified
    /// sessions (commonly `.` or `__`)
    #[serde(default = "default_namespace_separator")]
    pub namespace_separator: String,

    /// Bound of each session's message queue; a full queue blocks the POST
    /// handler
    #[serde(default = "default_queue_capacity")]
    pub session_queue_capacity: usize,

    /// Seconds of queue silence before an SSE keep-alive comment is sent
    #[serde(default = "default_keepalive_s")]
    pub keepalive_interval_s: u64,

    /// Timeout for one-shot scheduler probes
    #[serde(default = "default_probe_timeout_s")]
    pub probe_timeout_s: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            default_timeout_s: default_timeout_s(),
            namespace_separator: default_namespace_separator(),
            session_queue_capacity: default_queue_capacity(),
            keepalive_interval_s: default_keepalive_s(),
            probe_timeout_s: default_probe_timeout_s(),
        }
    }
}

impl Validatable for McpConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(
            &self.namespace_separator,
            "namespace_separator",
            self.domain_name(),
        )?;
        validate_range(self.default_timeout_s, 1, 3600, "default_timeout_s", self.domain_name())?;
        validate_range(
            self.session_queue_capacity,
            1,
            10_000,
            "session_queue_capacity",
            self.domain_name(),
        )?;
        validate_range(
            self.keepalive_interval_s,
            1,
            600,
            "keepalive_interval_s",
            self.domain_name(),
        )?;
        validate_range(self.probe_timeout_s, 1, 300, "probe_timeout_s", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "mcp"
    }
}

fn default_timeout_s() -> u64 {
    60
}

fn default_namespace_separator() -> String {
    ".".to_string()
}

fn default_queue_capacity() -> usize {
    64
}

fn default_keepalive_s() -> u64 {
    30
}

fn default_probe_timeout_s() -> u64 {
    10
}
