//! Handling of consistency anomalies detected on the read path

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a read does when stored data contradicts itself
///
/// The only anomaly detected today is a floor entry whose timestamp is not
/// below the next ceiling entry of the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyMode {
    /// Log the anomaly and return a best-effort result
    #[default]
    Lenient,
    /// Fail the read with `TemporaError::Corruption`
    Strict,
}

impl ConsistencyMode {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyMode::Lenient => "lenient",
            ConsistencyMode::Strict => "strict",
        }
    }
}

impl fmt::Display for ConsistencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&ConsistencyMode::Strict).unwrap(), "\"strict\"");
        let mode: ConsistencyMode = serde_json::from_str("\"lenient\"").unwrap();
        assert_eq!(mode, ConsistencyMode::Lenient);
        assert!(serde_json::from_str::<ConsistencyMode>("\"Strict\"").is_err());
    }

    #[test]
    fn test_display_matches_serde_name() {
        for mode in [ConsistencyMode::Lenient, ConsistencyMode::Strict] {
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json.trim_matches('"'), mode.to_string());
        }
    }
}
