//! Core configuration via `transact.toml`
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration. Both the transaction set and the transact manager
//! are built from a `CoreConfig`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Config file name used by `write_default_if_missing` callers.
pub const CONFIG_FILE_NAME: &str = "transact.toml";

/// Default number of pulls a stepped handler may make before it is failed.
pub const DEFAULT_STEP_LIMIT: usize = 20;

/// Default name prefix for ad hoc `transact` calls.
pub const DEFAULT_TRANSACT_PREFIX: &str = "transact";

/// Configuration loaded from `transact.toml`.
///
/// # Example
///
/// ```toml
/// # Maximum pulls for stepped handlers before "generator long loop"
/// step_limit = 20
///
/// # Name prefix for ad hoc transactions ("transact <fn name>")
/// transact_prefix = "transact"
///
/// # Log every published live-set snapshot at TRACE level
/// trace_snapshots = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Loop guard for stepped handlers.
    #[serde(default = "default_step_limit")]
    pub step_limit: usize,
    /// Prefix used to synthesize the action name of ad hoc transactions.
    #[serde(default = "default_transact_prefix")]
    pub transact_prefix: String,
    /// Emit a trace event for every live-set snapshot.
    #[serde(default)]
    pub trace_snapshots: bool,
}

fn default_step_limit() -> usize {
    DEFAULT_STEP_LIMIT
}

fn default_transact_prefix() -> String {
    DEFAULT_TRANSACT_PREFIX.to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            step_limit: default_step_limit(),
            transact_prefix: default_transact_prefix(),
            trace_snapshots: false,
        }
    }
}

impl CoreConfig {
    /// Check that the values are usable.
    ///
    /// # Errors
    ///
    /// Returns an error if `step_limit` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.step_limit == 0 {
            warn!(target: "transact::config", "rejecting config with step_limit = 0");
            return Err(Error::InvalidConfig {
                reason: "step_limit must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# transact configuration
#
# Maximum pulls a stepped handler may make before it fails with
# "generator long loop (>N)".
step_limit = 20

# Name prefix for ad hoc transactions run through `transact`.
transact_prefix = "transact"

# Log every live-set snapshot at TRACE level (default: false).
trace_snapshots = false
"#
    }

    /// Parse and validate config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CoreConfig = toml::from_str(content).map_err(|e| {
            warn!(target: "transact::config", error = %e, "failed to parse config");
            Error::InvalidConfig {
                reason: e.to_string(),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Io {
            reason: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!(
            target: "transact::config",
            path = %path.display(),
            step_limit = config.step_limit,
            "config loaded"
        );
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| Error::Io {
                reason: format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ),
            })?;
            info!(target: "transact::config", path = %path.display(), "wrote default config");
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::InvalidConfig {
            reason: format!("Failed to serialize config: {}", e),
        })?;
        std::fs::write(path, content).map_err(|e| Error::Io {
            reason: format!("Failed to write config file '{}': {}", path.display(), e),
        })
    }
}
