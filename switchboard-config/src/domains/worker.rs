//! Background worker configuration defaults
//!
//! These are the boot-time defaults; the persisted `WorkerConfig` row, when
//! present, wins over this domain at runtime.

use serde::{Deserialize, Serialize};

use crate::domains::utils::default_true;
use crate::error::ConfigResult;
use crate::validation::{validate_range, Validatable};

/// Defaults for the status & tool-discovery worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerDefaults {
    /// Seconds between check_all_servers runs
    #[serde(default = "default_check_interval")]
    pub server_check_interval_s: u64,

    /// How many servers may be probed in parallel
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Collapse missed runs into one catch-up run
    #[serde(default = "default_true")]
    pub coalesce: bool,

    /// Maximum overlapping instances of the job
    #[serde(default = "default_max_instances")]
    pub max_instances: usize,
}

impl Default for WorkerDefaults {
    fn default() -> Self {
        Self {
            server_check_interval_s: default_check_interval(),
            max_workers: default_max_workers(),
            coalesce: true,
            max_instances: default_max_instances(),
        }
    }
}

impl Validatable for WorkerDefaults {
    fn validate(&self) -> ConfigResult<()> {
        validate_range(
            self.server_check_interval_s,
            60,
            3600,
            "server_check_interval_s",
            self.domain_name(),
        )?;
        validate_range(self.max_workers, 1, 10, "max_workers", self.domain_name())?;
        validate_range(self.max_instances, 1, 4, "max_instances", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "worker"
    }
}

fn default_check_interval() -> u64 {
    300
}

fn default_max_workers() -> usize {
    1
}

fn default_max_instances() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_defaults() {
        let config = WorkerDefaults::default();
        assert_eq!(config.server_check_interval_s, 300);
        assert_eq!(config.max_workers, 1);
        assert!(config.coalesce);
        assert_eq!(config.max_instances, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_worker_validation_bounds() {
        let mut config = WorkerDefaults::default();
        config.server_check_interval_s = 59;
        assert!(config.validate().is_err());

        config.server_check_interval_s = 3601;
        assert!(config.validate().is_err());

        config = WorkerDefaults::default();
        config.max_workers = 11;
        assert!(config.validate().is_err());
    }
}
