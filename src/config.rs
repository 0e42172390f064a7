use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use teloxide::types::ChatId;

use crate::storage::Credentials;
use crate::transfer::TransferSettings;

/// Why the bot refused to start.
#[derive(Debug)]
pub enum ConfigError {
    ReadFile { path: PathBuf, source: std::io::Error },
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// The file parsed but a value is unusable.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => write!(f, "cannot read {}: {source}", path.display()),
            Self::ParseJson { path, source } => write!(f, "{} is not a valid config: {source}", path.display()),
            Self::Validation(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    /// Base URL of the storage backend (e.g., "http://alist.example.com")
    #[serde(default = "default_storage_url")]
    storage_url: String,
    /// Account with upload permission on the backend
    storage_user: String,
    storage_password: String,
    /// One-time 2FA code, required when the backend account has 2FA on
    #[serde(default)]
    storage_otp_code: String,
    /// Mounted path on the backend that accepts uploads (e.g., "/mnt/img")
    base_path: String,
    /// Send "upload starting..." before each image
    #[serde(default)]
    send_notice: bool,
    /// Public address where uploaded images can be browsed. Empty = not shared.
    #[serde(default = "default_share_url")]
    share_url: String,
    /// How long to wait for an image after prompting (ms)
    #[serde(default = "default_send_wait_ms")]
    send_wait_ms: u64,
    /// Max images accepted in continuous mode
    #[serde(default = "default_coiled_count")]
    coiled_count: u32,
    /// Chats the bot answers in. Empty = everywhere.
    #[serde(default)]
    allowed_chats: Vec<i64>,
    log_chat_id: Option<i64>,
    /// Directory for state files (logs). Defaults to current directory.
    data_dir: Option<String>,
}

fn default_storage_url() -> String {
    "http://localhost:5244".to_string()
}

fn default_share_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_send_wait_ms() -> u64 {
    30_000
}

fn default_coiled_count() -> u32 {
    10
}

impl ConfigFile {
    fn validate(&self) -> Result<(), String> {
        if !is_bot_token(&self.telegram_bot_token) {
            return Err("telegram_bot_token must look like 123456789:secret".into());
        }
        if self.storage_user.trim().is_empty() {
            return Err("storage_user must not be empty".into());
        }
        if self.base_path.trim().is_empty() {
            return Err("base_path must not be empty".into());
        }
        if self.coiled_count == 0 {
            return Err("coiled_count must be at least 1".into());
        }
        Ok(())
    }
}

/// `{numeric bot id}:{secret}`
fn is_bot_token(token: &str) -> bool {
    token
        .split_once(':')
        .is_some_and(|(id, secret)| {
            !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) && !secret.is_empty() && !secret.contains(':')
        })
}

pub struct Config {
    /// Path to the config file
    pub config_path: PathBuf,
    pub telegram_bot_token: String,
    pub storage_url: String,
    pub storage_user: String,
    pub storage_password: String,
    pub storage_otp_code: Option<String>,
    pub base_path: String,
    pub send_notice: bool,
    pub share_url: Option<String>,
    pub send_wait: Duration,
    pub coiled_count: u32,
    pub allowed_chats: HashSet<ChatId>,
    pub log_chat_id: Option<ChatId>,
    /// Directory for state files (logs).
    pub data_dir: PathBuf,
}

impl Config {
    /// Read, parse and validate the JSON config at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let raw = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::ReadFile {
            path: config_path.clone(),
            source,
        })?;
        let file: ConfigFile = serde_json::from_str(&raw).map_err(|source| ConfigError::ParseJson {
            path: config_path.clone(),
            source,
        })?;
        file.validate().map_err(ConfigError::Validation)?;

        let data_dir = file.data_dir.as_deref().map_or_else(|| PathBuf::from("."), PathBuf::from);

        Ok(Self {
            config_path,
            telegram_bot_token: file.telegram_bot_token,
            storage_url: file.storage_url,
            storage_user: file.storage_user,
            storage_password: file.storage_password,
            storage_otp_code: Some(file.storage_otp_code).filter(|c| !c.is_empty()),
            base_path: file.base_path,
            send_notice: file.send_notice,
            share_url: Some(file.share_url).filter(|u| !u.is_empty()),
            send_wait: Duration::from_millis(file.send_wait_ms),
            coiled_count: file.coiled_count,
            allowed_chats: file.allowed_chats.into_iter().map(ChatId).collect(),
            log_chat_id: file.log_chat_id.map(ChatId),
            data_dir,
        })
    }

    pub fn is_allowed_chat(&self, chat_id: ChatId) -> bool {
        self.allowed_chats.is_empty() || self.allowed_chats.contains(&chat_id)
    }

    /// Fresh credentials for one invocation's client.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            self.storage_user.clone(),
            self.storage_password.clone(),
            self.storage_otp_code.clone(),
        )
    }

    pub fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            storage_url: self.storage_url.clone(),
            base_path: self.base_path.clone(),
            share_url: self.share_url.clone(),
            send_notice: self.send_notice,
            send_wait: self.send_wait,
            coiled_count: self.coiled_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn minimal() -> Value {
        json!({
            "telegram_bot_token": "123456789:ABCdefGHIjklMNOpqrsTUVwxyz",
            "storage_user": "admin",
            "storage_password": "secret",
            "base_path": "/mnt/img"
        })
    }

    fn with(key: &str, value: Value) -> Value {
        let mut config = minimal();
        config[key] = value;
        config
    }

    fn load(content: &str) -> Result<Config, ConfigError> {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        Config::load(file.path())
    }

    fn load_value(config: Value) -> Result<Config, ConfigError> {
        load(&config.to_string())
    }

    fn validation_message(config: Value) -> String {
        match load_value(config) {
            Err(ConfigError::Validation(msg)) => msg,
            Err(other) => panic!("expected validation error, got {other}"),
            Ok(_) => panic!("expected validation error, got a config"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = load_value(minimal()).unwrap();
        assert_eq!(config.storage_url, "http://localhost:5244");
        assert_eq!(config.share_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.send_wait, Duration::from_millis(30_000));
        assert_eq!(config.coiled_count, 10);
        assert_eq!(config.data_dir, PathBuf::from("."));
        assert!(config.storage_otp_code.is_none());
        assert!(config.log_chat_id.is_none());
        assert!(!config.send_notice);
        assert!(config.is_allowed_chat(ChatId(-100)));
    }

    #[test]
    fn test_explicit_values() {
        let config = load_value(json!({
            "telegram_bot_token": "123456789:ABCdef",
            "storage_url": "https://files.example.com",
            "storage_user": "uploader",
            "storage_password": "pw",
            "storage_otp_code": "654321",
            "base_path": "/mnt/pics",
            "send_notice": true,
            "share_url": "",
            "send_wait_ms": 5000,
            "coiled_count": 3,
            "allowed_chats": [-100123],
            "log_chat_id": -100999,
            "data_dir": "/tmp/imgupload"
        }))
        .unwrap();
        assert_eq!(config.storage_otp_code.as_deref(), Some("654321"));
        assert!(config.share_url.is_none());
        assert!(config.is_allowed_chat(ChatId(-100123)));
        assert!(!config.is_allowed_chat(ChatId(-1)));
        assert_eq!(config.log_chat_id, Some(ChatId(-100999)));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/imgupload"));

        let settings = config.transfer_settings();
        assert_eq!(settings.storage_url, "https://files.example.com");
        assert_eq!(settings.base_path, "/mnt/pics");
        assert_eq!(settings.coiled_count, 3);
        assert_eq!(settings.send_wait, Duration::from_millis(5000));
        assert!(settings.send_notice);

        let creds = config.credentials();
        assert_eq!(creds.username, "uploader");
        assert_eq!(creds.password, "pw");
        assert_eq!(creds.otp_code.as_deref(), Some("654321"));
    }

    #[test]
    fn test_blank_required_values() {
        assert!(validation_message(with("storage_user", json!("  "))).contains("storage_user"));
        assert!(validation_message(with("base_path", json!(""))).contains("base_path"));
        assert!(validation_message(with("coiled_count", json!(0))).contains("coiled_count"));
    }

    #[test]
    fn test_bot_token_shape() {
        for bad in ["", "no_colon", "123456789:", ":secret", "12ab:secret", "1:2:3"] {
            let msg = validation_message(with("telegram_bot_token", json!(bad)));
            assert!(msg.contains("telegram_bot_token"), "{bad} accepted");
        }
        assert!(is_bot_token("42:x"));
    }

    #[test]
    fn test_missing_required_field_is_parse_error() {
        let err = load(r#"{ "telegram_bot_token": "123456789:ABCdef" }"#).err().unwrap();
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }

    #[test]
    fn test_malformed_json() {
        let err = load("{ not json").err().unwrap();
        assert!(matches!(err, ConfigError::ParseJson { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load("/nonexistent/imgupload.json").err().unwrap();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
        assert!(err.to_string().contains("/nonexistent/imgupload.json"));
    }
}
