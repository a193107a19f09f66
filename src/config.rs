//! Media source configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{MediaSourceError, Result};

/// Codecs substituted when a MIME type names none the negotiator recognizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecDefaults {
    /// Default video codec
    pub video: String,

    /// Default audio codec
    pub audio: String,
}

impl Default for CodecDefaults {
    fn default() -> Self {
        Self {
            video: "avc1.4d400d".to_string(), // H.264 Main, level 1.3
            audio: "mp4a.40.2".to_string(),   // AAC-LC
        }
    }
}

/// Transmux worker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Name given to each worker thread
    pub thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: "transmux-worker".to_string(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Media source configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Default codecs
    pub codecs: CodecDefaults,

    /// Worker configuration
    pub worker: WorkerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl SourceConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content).map_err(|e| MediaSourceError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| MediaSourceError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}
