//! Application configuration.
//!
//! Resolution order, lowest to highest priority:
//! 1. Built-in defaults
//! 2. TOML file (`<config dir>/leadbook/config.toml` or `--config`)
//! 3. `LEADBOOK_*` environment variables

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::db::Database;
use crate::error::{CrmError, Result};
use crate::notify::{ApiDispatcher, DisabledDispatcher, EmailDispatcher, Notifier, SmtpDispatcher, SmtpSettings};

const ENV_DATABASE: &str = "LEADBOOK_DATABASE";
const ENV_PORT: &str = "LEADBOOK_PORT";
const ENV_EMAIL_PROVIDER: &str = "LEADBOOK_EMAIL_PROVIDER";
const ENV_EMAIL_FROM: &str = "LEADBOOK_EMAIL_FROM";
const ENV_OPS_INBOX: &str = "LEADBOOK_OPS_INBOX";
const ENV_SMTP_PASSWORD: &str = "LEADBOOK_SMTP_PASSWORD";
const ENV_EMAIL_API_KEY: &str = "LEADBOOK_EMAIL_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailProvider {
    #[default]
    Disabled,
    Smtp,
    Api,
}

impl std::str::FromStr for EmailProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            "smtp" => Ok(Self::Smtp),
            "api" => Ok(Self::Api),
            _ => Err(format!("unknown email provider: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub starttls: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 587,
            username: None,
            password: None,
            starttls: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub provider: EmailProvider,
    pub from: String,
    pub operations_inbox: String,
    pub smtp: SmtpConfig,
    pub api: ApiConfig,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            provider: EmailProvider::Disabled,
            from: "noreply@localhost".to_string(),
            operations_inbox: "operations@localhost".to_string(),
            smtp: SmtpConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl EmailConfig {
    /// Build the notifier for the configured provider.
    pub fn build_notifier(&self) -> Result<Notifier> {
        let dispatcher: Box<dyn EmailDispatcher> = match self.provider {
            EmailProvider::Disabled => Box::new(DisabledDispatcher),
            EmailProvider::Smtp => {
                let settings = SmtpSettings {
                    host: self.smtp.host.clone(),
                    port: self.smtp.port,
                    username: self.smtp.username.clone(),
                    password: self.smtp.password.clone(),
                    starttls: self.smtp.starttls,
                };
                Box::new(
                    SmtpDispatcher::new(&settings)
                        .map_err(|e| CrmError::Configuration(format!("smtp: {}", e)))?,
                )
            }
            EmailProvider::Api => {
                if self.api.key.is_empty() {
                    return Err(CrmError::Configuration("email api key is not set".into()));
                }
                Box::new(
                    ApiDispatcher::new(self.api.url.clone(), self.api.key.clone())
                        .map_err(|e| CrmError::Configuration(format!("email api: {}", e)))?,
                )
            }
        };

        Ok(Notifier::new(dispatcher, self.from.clone(), self.operations_inbox.clone()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Falls back to `Database::default_path()` when unset.
    pub database_path: Option<PathBuf>,
    pub server: ServerConfig,
    pub email: EmailConfig,
}

impl AppConfig {
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CrmError::Configuration("could not find config directory".into()))?;
        Ok(config_dir.join("leadbook").join("config.toml"))
    }

    /// Load from `path` (or the default location) and apply environment overrides.
    /// A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        let mut config = Self::from_file(&path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            CrmError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| CrmError::Configuration(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply `LEADBOOK_*` overrides using `lookup` to read variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get(ENV_DATABASE) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(port) = get(ENV_PORT) {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| CrmError::Configuration(format!("{} is not a valid port: {}", ENV_PORT, port)))?;
        }
        if let Some(provider) = get(ENV_EMAIL_PROVIDER) {
            self.email.provider = provider.parse().map_err(CrmError::Configuration)?;
        }
        if let Some(from) = get(ENV_EMAIL_FROM) {
            self.email.from = from;
        }
        if let Some(inbox) = get(ENV_OPS_INBOX) {
            self.email.operations_inbox = inbox;
        }
        if let Some(password) = get(ENV_SMTP_PASSWORD) {
            self.email.smtp.password = Some(password);
        }
        if let Some(key) = get(ENV_EMAIL_API_KEY) {
            self.email.api.key = key;
        }
        Ok(())
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(p) => Ok(p.clone()),
            None => Database::default_path(),
        }
    }
}
