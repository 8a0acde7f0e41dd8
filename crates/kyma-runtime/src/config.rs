// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Runtime configuration.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Startup configuration for the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Application identity, used for thread names and save locations.
    pub app_name: String,
    /// Worker pool size.
    pub worker_threads: u32,
    /// I/O completion pool size.
    pub io_threads: u32,
    /// Target seconds per frame for the pump's pacing.
    pub target_frame_time: f64,
    /// Backing directory for the read-only `/data` root.
    pub data_dir: String,
    /// Backing directory for the writable `/save` root; empty leaves
    /// `/save` unrouted.
    pub save_dir: String,
    /// Backing directory for the writable `/temp` root.
    pub temp_dir: String,
    /// Trace event file path; `None` disables tracing.
    pub trace_file: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            app_name: "kyma".to_string(),
            worker_threads: 8,
            io_threads: 2,
            target_frame_time: 1.0 / 60.0,
            data_dir: String::new(),
            save_dir: String::new(),
            temp_dir: String::new(),
            trace_file: None,
        }
    }
}

/// Why a configuration failed to load.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io(std::io::Error),
    /// The contents were not valid configuration JSON.
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "failed to read config: {err}"),
            ConfigError::Parse(err) => write!(f, "failed to parse config: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Parse(err) => Some(err),
        }
    }
}

impl RuntimeConfig {
    /// Parses a configuration from JSON text.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(ConfigError::Parse)
    }

    /// Loads a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = RuntimeConfig::default();
        assert_eq!(config.worker_threads, 8);
        assert!((config.target_frame_time - 1.0 / 60.0).abs() < 1e-12);
        assert!(config.trace_file.is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config =
            RuntimeConfig::from_json_str(r#"{"worker_threads": 4, "app_name": "demo"}"#).unwrap();
        assert_eq!(config.worker_threads, 4);
        assert_eq!(config.app_name, "demo");
        assert_eq!(config.io_threads, 2);
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let err = RuntimeConfig::from_json_str("worker_threads = 4").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("parse"));
    }
}
