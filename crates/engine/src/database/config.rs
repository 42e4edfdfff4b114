//! Engine configuration via `tempora.toml`
//!
//! A plain config file instead of a builder. `EngineConfig::default()` is what
//! an absent or empty file means; every field is optional in the file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tempora_core::{ConsistencyMode, Result, TemporaError};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "tempora.toml";

/// Engine configuration loaded from `tempora.toml`.
///
/// # Example
///
/// ```toml
/// # Read-path anomaly handling: "lenient" (default) or "strict"
/// consistency = "lenient"
///
/// # Seal the active chunk once it holds this many entries
/// # auto_rollover_threshold = 100000
///
/// case_insensitive_index_values = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How reads react to a floor entry at or after its ceiling
    #[serde(default)]
    pub consistency: ConsistencyMode,
    /// Entry count of the active chunk that triggers a rollover after a commit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_rollover_threshold: Option<u64>,
    /// Store a lowercase copy of every indexed value
    #[serde(default = "default_case_insensitive_index_values")]
    pub case_insensitive_index_values: bool,
}

fn default_case_insensitive_index_values() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            consistency: ConsistencyMode::default(),
            auto_rollover_threshold: None,
            case_insensitive_index_values: default_case_insensitive_index_values(),
        }
    }
}

impl EngineConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# TemporaDB engine configuration
#
# Read-path anomaly handling: "lenient" (default) or "strict"
#   "lenient" = log the anomaly and return a best-effort result
#   "strict"  = fail the read with a corruption error
consistency = "lenient"

# Seal the active chunk of a branch once it holds this many entries.
# Unset (default) means rollovers only happen when requested.
# auto_rollover_threshold = 100000

# Keep a lowercase copy of every indexed value for case-insensitive search
case_insensitive_index_values = true
"#
    }

    /// Check settings that serde cannot check on its own.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `auto_rollover_threshold` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.auto_rollover_threshold == Some(0) {
            return Err(TemporaError::Config(
                "auto_rollover_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TemporaError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            TemporaError::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                TemporaError::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TemporaError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            TemporaError::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
