//! Editor configuration
//!
//! Every field has a default, so a config file only needs the keys it
//! changes:
//!
//! ```toml
//! reconnect_timeout_ms = 8000
//! storage_prefix = "my-synth:"
//!
//! [default_cc_range]
//! min = 0.0
//! max = 127.0
//! ```

use crate::error::ConfigError;
use crate::param::Range;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for the workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Give up waiting for preset modules after this long (default: 5000)
    pub reconnect_timeout_ms: u64,
    /// Re-check module readiness this often while reconnecting (default: 100)
    pub reconnect_retry_ms: u64,
    /// How long an advisory stays visible (default: 3000)
    pub advisory_ttl_ms: u64,
    /// Oldest advisories are dropped beyond this many (default: 8)
    pub max_advisories: usize,
    /// Prepended to a preset name to form its storage key
    pub storage_prefix: String,
    /// CC output range used when the armed parameter is not numeric
    pub default_cc_range: Range,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            reconnect_timeout_ms: 5000,
            reconnect_retry_ms: 100,
            advisory_ttl_ms: 3000,
            max_advisories: 8,
            storage_prefix: "patchwork.preset.".to_string(),
            default_cc_range: Range::new(0.0, 1.0),
        }
    }
}

impl EditorConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a `.toml` or `.json` file, chosen by extension (TOML otherwise)
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_toml(&text),
        }
    }

    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.reconnect_timeout_ms)
    }

    pub fn reconnect_retry(&self) -> Duration {
        Duration::from_millis(self.reconnect_retry_ms)
    }

    pub fn advisory_ttl(&self) -> Duration {
        Duration::from_millis(self.advisory_ttl_ms)
    }
}
