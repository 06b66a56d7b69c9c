//! Per-session server health tracking
//!
//! Unified sessions keep an in-memory health record per server so one
//! misbehaving child cannot poison the whole session. Three consecutive
//! failures degrade a server, five fail it; a failed server is skipped for
//! a cool-down and then retried as recovering.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::error::ErrorKind;

/// Consecutive failures before a server is degraded
const DEGRADED_THRESHOLD: u32 = 3;

/// Consecutive failures before a server is failed
const FAILED_THRESHOLD: u32 = 5;

/// How long a failed server is skipped before retry is allowed
const RETRY_COOLDOWN_MINUTES: i64 = 5;

/// Availability state of one server within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerHealthStatus {
    Healthy,
    Degraded,
    Failed,
    Recovering,
}

impl ServerHealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerHealthStatus::Healthy => "healthy",
            ServerHealthStatus::Degraded => "degraded",
            ServerHealthStatus::Failed => "failed",
            ServerHealthStatus::Recovering => "recovering",
        }
    }
}

/// Health record for one server in one session
#[derive(Debug, Clone)]
pub struct ServerHealth {
    pub server_name: String,
    pub status: ServerHealthStatus,
    pub consecutive_failures: u32,
    pub recovery_attempts: u32,
    pub last_error_kind: Option<ErrorKind>,
    pub last_error_message: Option<String>,
    pub last_success_time: DateTime<Utc>,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub tools_available: usize,
}

impl ServerHealth {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            status: ServerHealthStatus::Healthy,
            consecutive_failures: 0,
            recovery_attempts: 0,
            last_error_kind: None,
            last_error_message: None,
            last_success_time: Utc::now(),
            last_failure_time: None,
            tools_available: 0,
        }
    }

    /// Record a successful operation; resets the failure streak
    pub fn record_success(&mut self, tools_available: usize) {
        self.status = ServerHealthStatus::Healthy;
        self.consecutive_failures = 0;
        self.recovery_attempts = 0;
        self.last_error_kind = None;
        self.last_error_message = None;
        self.last_success_time = Utc::now();
        self.tools_available = tools_available;
    }

    /// Record a failure and advance the status thresholds
    pub fn record_failure(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.consecutive_failures += 1;
        self.last_error_kind = Some(kind);
        self.last_error_message = Some(message.into());
        self.last_failure_time = Some(Utc::now());

        if self.consecutive_failures >= FAILED_THRESHOLD {
            self.status = ServerHealthStatus::Failed;
        } else if self.consecutive_failures >= DEGRADED_THRESHOLD {
            self.status = ServerHealthStatus::Degraded;
        }
    }

    /// Mark the start of a post-cool-down retry
    pub fn start_recovery(&mut self) {
        self.status = ServerHealthStatus::Recovering;
        self.recovery_attempts += 1;
    }

    pub fn is_failed(&self) -> bool {
        self.status == ServerHealthStatus::Failed
    }

    /// Whether operations may be attempted against this server
    ///
    /// Anything short of `Failed` is eligible; a failed server becomes
    /// eligible again once the cool-down has elapsed.
    pub fn should_attempt(&self) -> bool {
        if self.status != ServerHealthStatus::Failed {
            return true;
        }
        match self.last_failure_time {
            Some(failed_at) => {
                Utc::now() - failed_at > ChronoDuration::minutes(RETRY_COOLDOWN_MINUTES)
            }
            None => true,
        }
    }

    /// Summary for logs and the detailed health endpoint
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "server_name": self.server_name,
            "status": self.status.as_str(),
            "consecutive_failures": self.consecutive_failures,
            "recovery_attempts": self.recovery_attempts,
            "last_error_type": self.last_error_kind.map(|k| k.as_str()),
            "last_error_message": self.last_error_message,
            "last_success_time": self.last_success_time.to_rfc3339(),
            "last_failure_time": self.last_failure_time.map(|t| t.to_rfc3339()),
            "tools_available": self.tools_available,
        })
    }
}
