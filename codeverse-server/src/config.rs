//! Layered configuration.
//!
//! Sources, highest priority first:
//! 1. Environment variables (`CODEVERSE_*` prefix, `__` between section and key)
//! 2. `codeverse.toml` in the working directory, or the file named by `CODEVERSE_CONFIG`
//! 3. Built-in defaults
//!
//! `CODEVERSE_AI__API_KEY` maps to `ai.api_key`, `CODEVERSE_MAIL__PASSWORD`
//! to `mail.password`, and so on.

use codeverse_ai::AiConfig;
use codeverse_auth::{AuthConfig, SmtpSettings};
use codeverse_collab::ServerConfig;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "codeverse.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Figment(#[from] figment::Error),

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub collab: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub editor: EditorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_addr: String,
    /// Entries returned by the activity endpoint when no limit is given.
    pub activity_page_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            activity_page_size: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Holds `app/` (accounts, projects) and `documents/` (editor contents).
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("codeverse_data"),
        }
    }
}

impl StorageConfig {
    pub fn app_path(&self) -> PathBuf {
        self.data_dir.join("app")
    }

    pub fn documents_path(&self) -> PathBuf {
        self.data_dir.join("documents")
    }
}

/// SMTP relay. Left unconfigured, mail is logged instead of sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// `From:` mailbox; the username is used when empty.
    pub from: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 587,
            username: String::new(),
            password: String::new(),
            from: String::new(),
        }
    }
}

impl MailConfig {
    pub fn is_configured(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    pub fn smtp_settings(&self) -> SmtpSettings {
        let from = if self.from.is_empty() {
            format!("CodeVerse AI <{}>", self.username)
        } else {
            self.from.clone()
        };
        SmtpSettings {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            from,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Front-end origin serving `/editor/{room}`.
    pub url: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
        }
    }
}

impl Config {
    /// Load from the config file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load `.env` first, then [`load`](Self::load).
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        // A missing .env is normal outside development
        let _ = dotenvy::dotenv();
        Self::load()
    }

    pub fn figment() -> Figment {
        let path = std::env::var("CODEVERSE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if path.exists() {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed("CODEVERSE_").ignore(&["config"]).split("__"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.collab.max_peers_per_room == 0 {
            return Err(ConfigError::InvalidValue {
                field: "collab.max_peers_per_room".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.auth.otp_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "auth.otp_max_attempts".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.collab.storage_path.is_some() {
            return Err(ConfigError::InvalidValue {
                field: "collab.storage_path".into(),
                reason: "documents are stored under storage.data_dir; set that instead".into(),
            });
        }
        if self.auth.session_purge_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "auth.session_purge_interval_secs".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}
