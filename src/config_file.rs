//! Configuration file support
//!
//! Loads media source configuration from TOML files where every
//! section is optional.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{CodecDefaults, LogFormat, LoggingConfig, SourceConfig, WorkerConfig};
use crate::error::{MediaSourceError, Result};

/// Configuration file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Codec settings
    pub codecs: Option<CodecSettings>,
    /// Worker settings
    pub worker: Option<WorkerSettings>,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecSettings {
    /// Default video codec
    pub default_video: Option<String>,
    /// Default audio codec
    pub default_audio: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Worker thread name
    pub thread_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

impl ConfigFile {
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

    /// Generate default configuration file
    pub fn default_config() -> Self {
        let defaults = SourceConfig::default();
        Self {
            codecs: Some(CodecSettings {
                default_video: Some(defaults.codecs.video),
                default_audio: Some(defaults.codecs.audio),
            }),
            worker: Some(WorkerSettings {
                thread_name: Some(defaults.worker.thread_name),
            }),
            logging: Some(LoggingSettings {
                level: defaults.logging.level,
                format: Some("pretty".to_string()),
            }),
        }
    }

    /// Convert to SourceConfig
    pub fn into_source_config(self) -> SourceConfig {
        let codec_defaults = CodecDefaults::default();
        let codecs = match self.codecs {
            Some(c) => CodecDefaults {
                video: c.default_video.unwrap_or(codec_defaults.video),
                audio: c.default_audio.unwrap_or(codec_defaults.audio),
            },
            None => codec_defaults,
        };

        let worker = match self.worker.and_then(|w| w.thread_name) {
            Some(thread_name) => WorkerConfig { thread_name },
            None => WorkerConfig::default(),
        };

        let logging = match self.logging {
            Some(l) => LoggingConfig {
                level: l.level,
                format: match l.format.as_deref() {
                    Some("json") => LogFormat::Json,
                    Some("pretty") | None => LogFormat::Pretty,
                    Some(other) => {
                        tracing::warn!("Unknown log format {:?}, using pretty", other);
                        LogFormat::Pretty
                    }
                },
            },
            None => LoggingConfig::default(),
        };

        SourceConfig {
            codecs,
            worker,
            logging,
        }
    }
}

/// Generate default configuration file at the specified path
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    ConfigFile::default_config().to_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[codecs]\ndefault_video = \"avc1.640028\"\n\n[logging]\nlevel = \"debug\"\nformat = \"json\"\n")
            .unwrap();

        let config = ConfigFile::from_file(temp_file.path())
            .unwrap()
            .into_source_config();
        assert_eq!(config.codecs.video, "avc1.640028");
        assert_eq!(config.codecs.audio, "mp4a.40.2");
        assert_eq!(config.worker.thread_name, "transmux-worker");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        let config = ConfigFile::from_file(temp_file.path())
            .unwrap()
            .into_source_config();
        assert_eq!(config, SourceConfig::default());
    }

    #[test]
    fn test_generate_default_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        generate_default_config(&path).unwrap();

        let loaded = ConfigFile::from_file(&path).unwrap().into_source_config();
        assert_eq!(loaded, SourceConfig::default());
    }
}
