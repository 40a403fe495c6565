use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::{
    DETAIL_PAGE_URL, DETAIL_PARAM, FEED_URL, LOGIN_URL, PORTAL_BASE_URL, PORTAL_PAGE_URL,
    TELEGRAM_API_BASE, WEBDRIVER_URL,
};

/// Default config file path.
pub const CONFIG_PATH: &str = "config.toml";

/// Top-level application config deserialized from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub account: AccountConfig,
    pub criteria: Criteria,
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

/// Portal login credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Bounds a listing must satisfy before the bot reacts to it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    pub min_rent: f64,
    pub max_rent: f64,
    pub min_area: f64,
    pub min_rooms: u32,
    pub max_rooms: u32,
}

/// Portal endpoints and the feed request template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub base_url: String,
    pub page_url: String,
    pub feed_url: String,
    pub login_url: String,
    pub detail_url: String,
    pub detail_param: String,
    /// JSON body sent with every feed request.
    pub payload_path: PathBuf,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: PORTAL_BASE_URL.to_string(),
            page_url: PORTAL_PAGE_URL.to_string(),
            feed_url: FEED_URL.to_string(),
            login_url: LOGIN_URL.to_string(),
            detail_url: DETAIL_PAGE_URL.to_string(),
            detail_param: DETAIL_PARAM.to_string(),
            payload_path: PathBuf::from("payload.json"),
        }
    }
}

/// Telegram destination for operator notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Numeric chat id or `@channel` name.
    pub chat_id: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

impl TelegramConfig {
    /// Both the bot token and the chat id are filled in.
    pub fn is_configured(&self) -> bool {
        !self.bot_token.trim().is_empty() && !self.chat_id.trim().is_empty()
    }
}

fn default_telegram_api() -> String {
    TELEGRAM_API_BASE.to_string()
}

/// WebDriver endpoint and browser options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
    /// Where failed-reaction screenshots are written.
    pub screenshot_dir: PathBuf,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: WEBDRIVER_URL.to_string(),
            headless: true,
            screenshot_dir: PathBuf::from("screenshots"),
        }
    }
}

/// Files holding the dedup id sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub notified_path: PathBuf,
    pub responded_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            notified_path: PathBuf::from("data/notified.json"),
            responded_path: PathBuf::from("data/responded.json"),
        }
    }
}

/// Runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Pause between poll cycles in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    300
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl SettingsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl AppConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Write config to the given TOML file path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Override secrets from the process environment.
    ///
    /// Reads `MIJNDAK_USERNAME`, `MIJNDAK_PASSWORD`, `TELEGRAM_BOT_TOKEN` and
    /// `TELEGRAM_CHAT_ID`. Telegram is enabled when both of its variables are set.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(username) = lookup("MIJNDAK_USERNAME") {
            self.account.username = username;
        }
        if let Some(password) = lookup("MIJNDAK_PASSWORD") {
            self.account.password = password;
        }
        let token = lookup("TELEGRAM_BOT_TOKEN");
        let chat_id = lookup("TELEGRAM_CHAT_ID");
        if let Some(telegram) = self.telegram.as_mut() {
            if let Some(token) = token {
                telegram.bot_token = token;
            }
            if let Some(chat_id) = chat_id {
                telegram.chat_id = chat_id;
            }
        } else if let (Some(bot_token), Some(chat_id)) = (token, chat_id) {
            self.telegram = Some(TelegramConfig {
                bot_token,
                chat_id,
                api_base: default_telegram_api(),
            });
        }
    }

    /// Reject settings the bot cannot run with.
    pub fn validate(&self) -> Result<()> {
        let c = &self.criteria;
        if self.account.username.trim().is_empty() {
            bail!("account.username must be set");
        }
        if c.min_rent > c.max_rent {
            bail!(
                "criteria.min_rent ({}) exceeds criteria.max_rent ({})",
                c.min_rent,
                c.max_rent
            );
        }
        if c.min_rooms > c.max_rooms {
            bail!(
                "criteria.min_rooms ({}) exceeds criteria.max_rooms ({})",
                c.min_rooms,
                c.max_rooms
            );
        }
        if self.settings.poll_interval_secs == 0 {
            bail!("settings.poll_interval_secs must be positive");
        }
        Ok(())
    }
}
