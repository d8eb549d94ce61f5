use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::ContentKind;

/// How updates reach the bot.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Long polling through teloxide; the HTTP server still serves stats.
    #[default]
    Polling,
    /// Telegram pushes updates to `POST /webhook`.
    Webhook,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportMode::Polling => write!(f, "polling"),
            TransportMode::Webhook => write!(f, "webhook"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub prices: PricesConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    pub content: ContentConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub admin_user_id: i64,
    /// Channel users must join before receiving content.
    pub channel_id: i64,
    pub channel_link: String,
    /// Extra buttons on the delivery-error reply, before the channel link.
    #[serde(default)]
    pub contact_links: Vec<ContactLink>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Must match the `X-Telegram-Bot-Api-Secret-Token` header on webhook calls.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContactLink {
    pub label: String,
    pub url: String,
}

/// Star price per content kind.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PricesConfig {
    #[serde(default = "default_photo_price")]
    pub photo: u32,
    #[serde(default = "default_audio_price")]
    pub audio: u32,
    #[serde(default = "default_video_price")]
    pub video: u32,
}

impl PricesConfig {
    pub fn price_for(&self, kind: ContentKind) -> u32 {
        match kind {
            ContentKind::Photo => self.photo,
            ContentKind::Audio => self.audio,
            ContentKind::Video => self.video,
        }
    }
}

impl Default for PricesConfig {
    fn default() -> Self {
        Self {
            photo: default_photo_price(),
            audio: default_audio_price(),
            video: default_video_price(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    /// Without a path the registry runs unconfigured: stats are skipped and
    /// broadcasts refuse to run.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// IANA zone used to bucket daily counters.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            timezone: default_timezone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentConfig {
    pub catalog_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CleanupConfig {
    #[serde(default = "default_retraction_minutes")]
    pub retraction_minutes: u64,
}

impl CleanupConfig {
    pub fn retraction_delay(&self) -> Duration {
        Duration::from_secs(self.retraction_minutes * 60)
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            retraction_minutes: default_retraction_minutes(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default)]
    pub mode: TransportMode,
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::default(),
            bind: default_bind(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_photo_price() -> u32 {
    50
}

fn default_audio_price() -> u32 {
    50
}

fn default_video_price() -> u32 {
    100
}

fn default_timezone() -> String {
    "Europe/Madrid".to_string()
}

fn default_retraction_minutes() -> u64 {
    crate::scheduler::retraction::DEFAULT_RETRACTION_DELAY.as_secs() / 60
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse(&content)?;

        // The admin id can be rotated without touching the file.
        if let Ok(raw) = std::env::var("ADMIN_USER_ID") {
            config.telegram.admin_user_id = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid ADMIN_USER_ID: {}", raw))?;
        }

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;

        config
            .registry
            .timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid registry timezone: {}", e))?;

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.telegram.request_timeout_secs)
    }
}
