use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::pacer::{Pacing, RequestPacer};

const APP_NAME: &str = "itd-client";
const CONFIG_FILE: &str = "config.json";

/// Host the public API is served from
pub const DEFAULT_DOMAIN: &str = "xn--d1ah4a.com";

/// Client configuration as persisted on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Applies to file uploads instead of `timeout_secs`
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
    /// Minimum spacing between requests. `null` disables pacing.
    #[serde(default = "default_pacing_interval")]
    pub pacing_interval_ms: Option<u64>,
    #[serde(default = "default_true")]
    pub refresh_on_unauthorized: bool,
    #[serde(default = "default_true")]
    pub check_token_expiry: bool,
}

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_upload_timeout() -> u64 {
    200
}

fn default_pacing_interval() -> Option<u64> {
    Some(105)
}

fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            timeout_secs: default_timeout(),
            upload_timeout_secs: default_upload_timeout(),
            pacing_interval_ms: default_pacing_interval(),
            refresh_on_unauthorized: default_true(),
            check_token_expiry: default_true(),
        }
    }
}

/// Runtime options for one session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub base_url: String,
    pub timeout: Duration,
    pub upload_timeout: Duration,
    pub pacing: Pacing,
    pub refresh_on_unauthorized: bool,
    pub check_token_expiry: bool,
}

impl SessionOptions {
    /// Points the session at another host, e.g. a mock server
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Points the session at `https://<domain>`
    pub fn domain(self, domain: &str) -> Self {
        self.base_url(format!("https://{domain}"))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    pub fn pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Shares one pacer between this session and others
    pub fn shared_pacer(self, pacer: Arc<RequestPacer>) -> Self {
        self.pacing(Pacing::Shared(pacer))
    }

    pub fn refresh_on_unauthorized(mut self, enabled: bool) -> Self {
        self.refresh_on_unauthorized = enabled;
        self
    }

    pub fn check_token_expiry(mut self, enabled: bool) -> Self {
        self.check_token_expiry = enabled;
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for SessionOptions {
    fn from(config: &ClientConfig) -> Self {
        let pacing = match config.pacing_interval_ms {
            Some(ms) => Pacing::Interval(Duration::from_millis(ms)),
            None => Pacing::Disabled,
        };

        Self {
            base_url: format!("https://{}", config.domain),
            timeout: Duration::from_secs(config.timeout_secs),
            upload_timeout: Duration::from_secs(config.upload_timeout_secs),
            pacing,
            refresh_on_unauthorized: config.refresh_on_unauthorized,
            check_token_expiry: config.check_token_expiry,
        }
    }
}

/// Configuration manager
pub struct ConfigManager {
    config: RwLock<ClientConfig>,
    config_file: PathBuf,
}

impl ConfigManager {
    /// Loads the configuration from the user's config directory
    pub fn new() -> Result<Self> {
        Self::with_dir(Self::config_dir()?)
    }

    /// Loads the configuration from a specific directory
    pub fn with_dir(config_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        let config_file = config_dir.join(CONFIG_FILE);

        let config = if config_file.exists() {
            let data =
                std::fs::read_to_string(&config_file).context("Failed to read config file")?;
            serde_json::from_str(&data).unwrap_or_else(|err| {
                tracing::warn!("Ignoring unreadable config file: {err}");
                ClientConfig::default()
            })
        } else {
            ClientConfig::default()
        };

        Ok(Self {
            config: RwLock::new(config),
            config_file,
        })
    }

    /// Gets a copy of the current configuration
    pub fn get(&self) -> ClientConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Updates and saves the configuration
    pub fn save(&self, config: ClientConfig) -> Result<()> {
        let json = serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
        std::fs::write(&self.config_file, json).context("Failed to write config file")?;

        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;

        Ok(())
    }

    /// Returns the config directory path
    pub fn config_dir() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join(APP_NAME))
    }
}
