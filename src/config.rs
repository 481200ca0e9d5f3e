use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Default number of publish attempts per record.
pub const DEFAULT_PUBLISH_ATTEMPTS: u32 = 3;

/// What a rule worker does after a record fails with a hard evaluation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the worker and report the error to the supervisor.
    #[default]
    Halt,
    /// Log, drop the record and continue with the next one.
    DropRecord,
}

/// Per-rule runtime settings.
///
/// ```
/// use stagerule::{FailurePolicy, RuleConfig};
///
/// let cfg = RuleConfig::from_json(r#"{"name": "logins", "checkpoint": true}"#).unwrap();
/// assert_eq!(cfg.publish_attempts, 3);
/// assert_eq!(cfg.on_error, FailurePolicy::Halt);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    pub name: String,
    #[serde(default)]
    pub checkpoint: bool,
    #[serde(default = "default_publish_attempts")]
    pub publish_attempts: u32,
    #[serde(default)]
    pub on_error: FailurePolicy,
}

fn default_publish_attempts() -> u32 {
    DEFAULT_PUBLISH_ATTEMPTS
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid rule config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("publish_attempts must be at least 1")]
    ZeroAttempts,
}

impl RuleConfig {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            checkpoint: false,
            publish_attempts: DEFAULT_PUBLISH_ATTEMPTS,
            on_error: FailurePolicy::default(),
        }
    }

    /// Parse a JSON rule config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on malformed JSON or invalid values.
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(input)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a JSON rule config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on I/O, parse or validation failure.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path)?;
        Self::from_json(&input)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.publish_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }
}
