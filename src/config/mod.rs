//! Configuration management for docchat
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Optional request timeout in seconds (unset = wait for the network stack)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: Option<u64>,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Document status polling configuration
    #[serde(default)]
    pub polling: PollingConfig,

    /// Upload configuration
    #[serde(default)]
    pub upload: UploadConfig,

    /// Chat configuration
    #[serde(default)]
    pub chat: ChatConfig,

    /// Session configuration
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Document status polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Interval between silent document refetches
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum accepted file size in bytes
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Delay before refetching the session's documents after an upload
    #[serde(default = "default_refetch_delay_ms")]
    pub refetch_delay_ms: u64,

    /// Simulated progress tick
    #[serde(default = "default_progress_tick_ms")]
    pub progress_tick_ms: u64,

    /// Delay before progress returns to zero after a successful upload
    #[serde(default = "default_progress_reset_ms")]
    pub progress_reset_ms: u64,
}

/// Chat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Maximum characters per message
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum characters in a session name
    #[serde(default = "default_session_name_max_chars")]
    pub name_max_chars: usize,

    /// Name used when the first session is created automatically
    #[serde(default = "default_session_name")]
    pub default_name: String,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for docchat data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to the persisted access token
    pub token_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
            polling: PollingConfig::default(),
            upload: UploadConfig::default(),
            chat: ChatConfig::default(),
            sessions: SessionConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            refetch_delay_ms: default_refetch_delay_ms(),
            progress_tick_ms: default_progress_tick_ms(),
            progress_reset_ms: default_progress_reset_ms(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_chars: default_max_message_chars(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name_max_chars: default_session_name_max_chars(),
            default_name: default_session_name(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl UploadConfig {
    pub fn refetch_delay(&self) -> Duration {
        Duration::from_millis(self.refetch_delay_ms)
    }

    pub fn progress_tick(&self) -> Duration {
        Duration::from_millis(self.progress_tick_ms)
    }

    pub fn progress_reset(&self) -> Duration {
        Duration::from_millis(self.progress_reset_ms)
    }
}

impl Config {
    /// Get the default base directory for docchat (~/.docchat)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".docchat")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            token_file: base.join("credentials.json"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            token_file: base.join("credentials.json"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Parsed backend base URL
    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.api_base_url)
            .map_err(|e| Error::Config(format!("Invalid api_base_url '{}': {}", self.api_base_url, e)))?;
        if url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "api_base_url '{}' cannot be used as a base URL",
                self.api_base_url
            )));
        }
        Ok(url)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.base_url()?;

        if self.polling.interval_ms == 0 {
            return Err(Error::Config(
                "polling.interval_ms must be positive".to_string(),
            ));
        }

        if self.upload.progress_tick_ms == 0 {
            return Err(Error::Config(
                "upload.progress_tick_ms must be positive".to_string(),
            ));
        }

        if self.upload.max_file_bytes == 0 {
            return Err(Error::Config(
                "upload.max_file_bytes must be positive".to_string(),
            ));
        }

        if self.chat.max_message_chars == 0 {
            return Err(Error::Config(
                "chat.max_message_chars must be positive".to_string(),
            ));
        }

        if self.sessions.name_max_chars == 0 {
            return Err(Error::Config(
                "sessions.name_max_chars must be positive".to_string(),
            ));
        }

        if self.sessions.default_name.trim().is_empty()
            || self.sessions.default_name.chars().count() > self.sessions.name_max_chars
        {
            return Err(Error::Config(format!(
                "sessions.default_name must be 1-{} characters",
                self.sessions.name_max_chars
            )));
        }

        if self.request_timeout_secs == Some(0) {
            return Err(Error::Config(
                "request_timeout_secs must be positive when set".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.polling.interval_ms, 3000);
        assert_eq!(config.upload.max_file_bytes, 10 * 1024 * 1024);
        assert_eq!(config.chat.max_message_chars, 2000);
        assert_eq!(config.sessions.default_name, "Mi primera sesión");
        assert!(config.request_timeout_secs.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.api_base_url = "http://127.0.0.1:8000".to_string();
        config.polling.interval_ms = 500;

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(loaded.api_base_url, "http://127.0.0.1:8000");
        assert_eq!(loaded.polling.interval_ms, 500);
        assert_eq!(loaded.paths.token_file, tmp.path().join("credentials.json"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "api_base_url = \"http://localhost:9000\"\n[chat]\nmax_message_chars = 50\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.chat.max_message_chars, 50);
        assert_eq!(config.upload.refetch_delay_ms, 1000);
        assert_eq!(config.paths.base_dir, tmp.path());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.polling.interval_ms = 0;
        assert!(config.validate().is_err());

        config.polling.interval_ms = 1000;
        assert!(config.validate().is_ok());

        config.api_base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.api_base_url = "http://localhost:8000".to_string();
        config.sessions.default_name = "   ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let tmp = TempDir::new().unwrap();
        let result = Config::load(&tmp.path().join("missing.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
