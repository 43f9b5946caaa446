use proto::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Channel adapter configuration.
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Voice/audio transcription configuration.
    #[serde(default)]
    pub transcription: TranscriptionConfig,

    /// Conversation history storage configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Downloaded media storage configuration.
    #[serde(default)]
    pub media: MediaConfig,

    /// In-process bus configuration.
    #[serde(default)]
    pub bus: BusConfig,
}

/// Container for all channel adapter configs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    /// Telegram adapter config.
    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// Telegram adapter config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Whether the Telegram adapter is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Telegram bot token.
    #[serde(default)]
    pub token: String,
    /// Optional HTTP(S) proxy url for Telegram API traffic.
    #[serde(default)]
    pub proxy: Option<String>,
    /// Long-poll timeout in seconds.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u32,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: String::new(),
            proxy: None,
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

fn default_poll_timeout_secs() -> u32 {
    30
}

/// Transcription service config (OpenAI-compatible Whisper endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// API key. Empty disables transcription.
    #[serde(default)]
    pub api_key: String,
    /// Service base URL.
    #[serde(default = "default_transcription_base_url")]
    pub base_url: String,
    /// Model name.
    #[serde(default = "default_transcription_model")]
    pub model: String,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_transcription_base_url(),
            model: default_transcription_model(),
        }
    }
}

fn default_transcription_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_transcription_model() -> String {
    "whisper-large-v3".to_string()
}

/// Session storage config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory holding one JSONL file per conversation.
    #[serde(default = "default_session_dir")]
    pub dir: String,
    /// How many sessions stay cached in memory.
    #[serde(default = "default_session_cache")]
    pub cache_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dir: default_session_dir(),
            cache_size: default_session_cache(),
        }
    }
}

fn default_session_dir() -> String {
    format!("{}/.chatbridge/sessions", home_dir())
}

fn default_session_cache() -> usize {
    100
}

/// Media storage config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Directory where inbound attachments are downloaded.
    #[serde(default = "default_media_dir")]
    pub dir: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            dir: default_media_dir(),
        }
    }
}

fn default_media_dir() -> String {
    format!("{}/.chatbridge/media", home_dir())
}

/// Bus config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Bounded queue capacity for inbound and outbound events.
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
    /// Echo inbound messages back as replies. Useful for end-to-end
    /// testing a deployment without an upstream consumer attached.
    #[serde(default)]
    pub echo: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: default_bus_capacity(),
            echo: false,
        }
    }
}

fn default_bus_capacity() -> usize {
    128
}

fn home_dir() -> String {
    std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
}

impl Config {
    /// Loads configuration from explicit path, fallback locations, and env
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path.map(|p| p.to_path_buf()).or_else(|| {
            // Look in current dir, then home dir
            let cwd = std::env::current_dir().ok()?.join("config.toml");
            if cwd.exists() {
                return Some(cwd);
            }
            let home_config = PathBuf::from(home_dir())
                .join(".chatbridge")
                .join("config.toml");
            if home_config.exists() {
                return Some(home_config);
            }
            None
        });
        debug!(path = ?config_path, "Config file resolved");

        let mut config = if let Some(path) = config_path {
            let content = std::fs::read_to_string(&path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(|e| ConfigError::Toml(e.to_string()))?
        } else {
            Config::default()
        };

        // Environment variable overrides
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            config.channels.telegram.token = token;
            config.channels.telegram.enabled = true;
        }
        if let Ok(key) = std::env::var("CHATBRIDGE_GROQ_API_KEY") {
            config.transcription.api_key = key;
        }

        Ok(config)
    }

    /// Validates invariants that cannot be expressed in the schema.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.telegram.enabled && self.channels.telegram.token.is_empty() {
            return Err(ConfigError::MissingField(
                "channels.telegram.token".to_string(),
            ));
        }
        if self.bus.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "bus.capacity".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Persists the full config to the default config path.
    ///
    /// Prefers `./config.toml` when present, otherwise
    /// `~/.chatbridge/config.toml`.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = {
            let cwd = std::env::current_dir().ok().map(|d| d.join("config.toml"));
            if cwd.as_ref().is_some_and(|p| p.exists()) {
                cwd.expect("checked above")
            } else {
                PathBuf::from(home_dir())
                    .join(".chatbridge")
                    .join("config.toml")
            }
        };

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, content)
    }
}
