//! Configuration management for castlane
//!
//! Provides configuration loading, saving, and management for the default
//! credentials, media defaults, the high-resolution codec policy and session
//! behaviour. Files are TOML; any value can be overridden from the environment
//! with `CASTLANE__<SECTION>__<KEY>`.

use crate::credentials::CredentialSet;
use crate::errors::SessionError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SessionConfig {
    /// Fallback credentials, served by the default credential source.
    pub credentials: CredentialSet,
    pub media: MediaConfig,
    pub codec_policy: CodecPolicy,
    pub session: SessionBehavior,
}

/// Media defaults applied before any codec has been selected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Audio codec used when the codec list is unavailable
    pub default_audio_codec: String,
    /// Video codec used when the codec list is unavailable, and restored on disconnect
    pub default_video_codec: String,
    /// Publish audio in stereo
    pub stereo: bool,
}

/// Codec override for resolutions the constrained codec cannot publish reliably
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecPolicy {
    /// Codec that is subject to the override
    pub constrained_codec: String,
    /// Resolution threshold [width, height]
    pub threshold: [u32; 2],
    /// Codec used at exactly the threshold resolution
    pub at_threshold_codec: String,
    /// Codec used above the threshold resolution
    pub above_threshold_codec: String,
}

/// Session continuation and persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionBehavior {
    /// Start publishing as soon as the publisher reports connected
    pub auto_publish_on_connect: bool,
    /// Start subscribing as soon as the subscriber reports connected
    pub auto_subscribe_on_connect: bool,
    /// Key-value file backing saved credentials and selections
    pub store_path: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            default_audio_codec: "OPUS".to_string(),
            default_video_codec: "H264".to_string(),
            stereo: true,
        }
    }
}

impl Default for CodecPolicy {
    fn default() -> Self {
        Self {
            constrained_codec: "H264".to_string(),
            threshold: [1920, 1440],
            at_threshold_codec: "VP9".to_string(),
            above_threshold_codec: "VP8".to_string(),
        }
    }
}

impl Default for SessionBehavior {
    fn default() -> Self {
        Self {
            auto_publish_on_connect: true,
            auto_subscribe_on_connect: true,
            store_path: "castlane-store.toml".to_string(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file, layered under environment overrides.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, SessionError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
        }

        let settings = config::Config::builder()
            .add_source(
                config::File::from(path.to_path_buf())
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix("CASTLANE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| SessionError::Config(format!("Failed to read config: {}", e)))?;

        let config: SessionConfig = settings
            .try_deserialize()
            .map_err(|e| SessionError::Config(format!("Failed to parse config: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SessionError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    SessionError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| SessionError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| SessionError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("castlane.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.media.default_audio_codec.trim().is_empty() {
            return Err("Default audio codec must not be empty".to_string());
        }
        if self.media.default_video_codec.trim().is_empty() {
            return Err("Default video codec must not be empty".to_string());
        }

        let policy = &self.codec_policy;
        if policy.threshold[0] == 0 || policy.threshold[1] == 0 {
            return Err("Codec policy threshold must be a non-zero resolution".to_string());
        }
        if policy.constrained_codec.is_empty()
            || policy.at_threshold_codec.is_empty()
            || policy.above_threshold_codec.is_empty()
        {
            return Err("Codec policy codec names must not be empty".to_string());
        }

        if self.session.store_path.trim().is_empty() {
            return Err("Store path must not be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.media.default_video_codec, "H264");
        assert_eq!(config.codec_policy.threshold, [1920, 1440]);
        assert!(config.session.auto_publish_on_connect);
    }

    #[test]
    fn test_config_validation() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());

        let mut bad_policy = config.clone();
        bad_policy.codec_policy.threshold = [0, 1440];
        assert!(bad_policy.validate().is_err());

        let mut bad_media = SessionConfig::default();
        bad_media.media.default_audio_codec = " ".to_string();
        assert!(bad_media.validate().is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("nested").join("castlane.toml");

        let mut config = SessionConfig::default();
        config.media.stereo = false;
        config.credentials.account_id = "acct-42".to_string();
        assert!(config.save_to_file(&config_path).is_ok());

        let loaded = SessionConfig::load_from_file(&config_path).unwrap();
        assert!(!loaded.media.stereo);
        assert_eq!(loaded.credentials.account_id, "acct-42");
        assert_eq!(loaded.codec_policy, config.codec_policy);
    }

    #[test]
    fn test_config_toml_format() {
        let config = SessionConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[credentials]"));
        assert!(toml_string.contains("[media]"));
        assert!(toml_string.contains("[codec_policy]"));
        assert!(toml_string.contains("[session]"));
        assert!(toml_string.contains("auto_publish_on_connect"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        fs::write(&path, "[media]\nstereo = false\n").unwrap();

        let loaded = SessionConfig::load_from_file(&path).unwrap();
        assert!(!loaded.media.stereo);
        assert_eq!(loaded.media.default_video_codec, "H264");
        assert_eq!(loaded.session.store_path, "castlane-store.toml");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = SessionConfig::load_from_file("nonexistent_castlane.toml");
        assert!(result.is_ok());
        assert_eq!(result.unwrap().codec_policy.at_threshold_codec, "VP9");
    }
}
