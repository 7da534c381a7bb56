//! Extractor configuration
//!
//! Window size and session lifecycle settings. The model location is carried
//! here only so front ends can load it; the library itself never reads it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ComputeError;

/// Default rolling window, matching the window the model was trained with
pub const DEFAULT_WINDOW_SIZE: usize = 60;

/// Smallest window that can define jerk and sample standard deviation
pub const MIN_WINDOW_SIZE: usize = 2;

/// Default idle time before a vehicle session is dropped
pub const DEFAULT_SESSION_IDLE_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Number of readings kept per stream
    pub window_size: usize,
    /// Seconds without a reading before a session expires (0 = never)
    pub session_idle_timeout_secs: u64,
    /// Path to a classifier model file
    pub model_path: Option<PathBuf>,
    /// Embed the feature row in every verdict
    pub include_features: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            session_idle_timeout_secs: DEFAULT_SESSION_IDLE_TIMEOUT_SECS,
            model_path: None,
            include_features: false,
        }
    }
}

impl ExtractorConfig {
    pub fn with_window_size(window_size: usize) -> Self {
        Self {
            window_size,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.window_size < MIN_WINDOW_SIZE {
            return Err(ComputeError::InvalidConfig(format!(
                "window_size must be at least {} (got {})",
                MIN_WINDOW_SIZE, self.window_size
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: ExtractorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ComputeError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn idle_timeout(&self) -> Option<chrono::Duration> {
        match self.session_idle_timeout_secs {
            0 => None,
            secs => Some(chrono::Duration::seconds(secs as i64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = ExtractorConfig::default();
        assert_eq!(config.window_size, 60);
        assert_eq!(config.session_idle_timeout_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ExtractorConfig::from_json(r#"{"window_size": 30}"#).unwrap();
        assert_eq!(
            config,
            ExtractorConfig {
                window_size: 30,
                ..ExtractorConfig::default()
            }
        );
    }

    #[test]
    fn test_window_too_small() {
        let result = ExtractorConfig::from_json(r#"{"window_size": 1}"#);
        assert!(matches!(result, Err(ComputeError::InvalidConfig(_))));
    }

    #[test]
    fn test_idle_timeout_disabled() {
        let config = ExtractorConfig {
            session_idle_timeout_secs: 0,
            ..ExtractorConfig::default()
        };
        assert!(config.idle_timeout().is_none());
        assert_eq!(
            ExtractorConfig::default().idle_timeout(),
            Some(chrono::Duration::seconds(300))
        );
    }

    #[test]
    fn test_json_roundtrip_keeps_model_path() {
        let config = ExtractorConfig {
            model_path: Some(PathBuf::from("models/centroids.json")),
            ..ExtractorConfig::default()
        };
        let loaded = ExtractorConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(loaded, config);
    }
}
