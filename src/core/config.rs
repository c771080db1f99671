/*!
 * Process Table Configuration
 *
 * Boot-time configuration for the process table
 */

use super::limits::{KERNEL_PROCESS_NAME, MAX_PID_SPACE, MAX_PROCESS_COUNT, MIN_PID_SPACE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding the pid space size
pub const ENV_MAX_PROCESSES: &str = "KERNEL_MAX_PROCESSES";

/// Environment variable overriding the kernel process name
pub const ENV_KERNEL_NAME: &str = "KERNEL_NAME";

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Pid space of {0} slots is outside [{MIN_PID_SPACE}, {MAX_PID_SPACE}]")]
    CapacityOutOfRange(usize),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Process table configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessTableConfig {
    /// Number of pid slots, kernel included
    pub max_processes: usize,
    /// Name of the kernel's own control block
    pub kernel_name: String,
}

impl Default for ProcessTableConfig {
    fn default() -> Self {
        Self {
            max_processes: MAX_PROCESS_COUNT,
            kernel_name: KERNEL_PROCESS_NAME.to_string(),
        }
    }
}

impl ProcessTableConfig {
    #[inline]
    #[must_use]
    pub fn with_max_processes(mut self, max_processes: usize) -> Self {
        self.max_processes = max_processes;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_kernel_name(mut self, name: impl Into<String>) -> Self {
        self.kernel_name = name.into();
        self
    }

    /// Defaults overridden by `KERNEL_MAX_PROCESSES` and `KERNEL_NAME`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var(ENV_MAX_PROCESSES) {
            config.max_processes =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidEnv {
                        var: ENV_MAX_PROCESSES,
                        value: value.clone(),
                    })?;
        }
        if let Ok(name) = std::env::var(ENV_KERNEL_NAME) {
            if !name.is_empty() {
                config.kernel_name = name;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_PID_SPACE..=MAX_PID_SPACE).contains(&self.max_processes) {
            return Err(ConfigError::CapacityOutOfRange(self.max_processes));
        }
        Ok(())
    }
}
