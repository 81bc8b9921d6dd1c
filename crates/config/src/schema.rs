/// Config schema types (logging, dispatch).
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Log levels accepted by `logging.level`.
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub logging: LoggingConfig,
    pub dispatch: DispatchConfig,
}

impl ParleyConfig {
    /// Reject values that parse but make no sense.
    pub fn validate(&self) -> Result<()> {
        self.logging.validate()?;
        self.dispatch.validate()
    }
}

/// Log output settings, consumed by binaries when installing a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset. Defaults to "info".
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<()> {
        let level = self.level.to_lowercase();
        if LOG_LEVELS.contains(&level.as_str()) {
            Ok(())
        } else {
            Err(Error::invalid(
                "logging.level",
                format!("expected one of {LOG_LEVELS:?}, got {:?}", self.level),
            ))
        }
    }
}

/// Message dispatch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound on a single dispatch, in seconds. Unset means no limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Emit per-step dispatch diagnostics. Defaults to true.
    pub trace: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            trace: true,
        }
    }
}

impl DispatchConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<()> {
        match self.timeout_secs {
            Some(0) => Err(Error::invalid(
                "dispatch.timeout_secs",
                "must be positive; omit it to disable the limit",
            )),
            _ => Ok(()),
        }
    }
}
