use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const ENV_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_ALLOWED_USER_IDS: &str = "TELEGRAM_ALLOWED_USER_IDS";
pub const ENV_MESSAGE_WEBHOOK: &str = "N8N_MESSAGE_WEBHOOK_URL";
pub const ENV_FILE_WEBHOOK: &str = "N8N_FILE_WEBHOOK_URL";
pub const ENV_WEBHOOK_TIMEOUT: &str = "WEBHOOK_TIMEOUT_SECS";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub webhooks: WebhookConfig,
}

#[derive(Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Empty means every user may talk to the bot.
    #[serde(default)]
    pub allowed_user_ids: Vec<u64>,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"<redacted>")
            .field("allowed_user_ids", &self.allowed_user_ids)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WebhookConfig {
    /// n8n endpoint receiving text messages as JSON
    pub message_url: Option<String>,
    /// n8n endpoint receiving uploaded documents as multipart
    pub file_url: Option<String>,
    /// Request timeout; unset keeps the HTTP client's default
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Message webhook URL, if forwarding of text messages is enabled.
    pub fn message_webhook(&self) -> Option<&str> {
        self.webhooks.message_url.as_deref()
    }

    /// File webhook URL, if forwarding of documents is enabled.
    pub fn file_webhook(&self) -> Option<&str> {
        self.webhooks.file_url.as_deref()
    }

    pub fn webhook_timeout(&self) -> Option<Duration> {
        self.webhooks.timeout_secs.map(Duration::from_secs)
    }

    pub fn is_user_allowed(&self, user_id: u64) -> bool {
        self.telegram.allowed_user_ids.is_empty()
            || self.telegram.allowed_user_ids.contains(&user_id)
    }

    /// Build the configuration from environment variables alone.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load a TOML config file; environment variables override its values.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ENV_BOT_TOKEN) {
            self.telegram.bot_token = token;
        }
        if let Some(ids) = lookup(ENV_ALLOWED_USER_IDS) {
            self.telegram.allowed_user_ids = parse_user_ids(&ids)
                .with_context(|| format!("Invalid {}", ENV_ALLOWED_USER_IDS))?;
        }
        if let Some(url) = lookup(ENV_MESSAGE_WEBHOOK) {
            self.webhooks.message_url = Some(url);
        }
        if let Some(url) = lookup(ENV_FILE_WEBHOOK) {
            self.webhooks.file_url = Some(url);
        }
        if let Some(secs) = lookup(ENV_WEBHOOK_TIMEOUT) {
            let secs = secs.trim();
            self.webhooks.timeout_secs = if secs.is_empty() {
                None
            } else {
                Some(
                    secs.parse::<u64>()
                        .with_context(|| format!("Invalid {}: {}", ENV_WEBHOOK_TIMEOUT, secs))?,
                )
            };
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.telegram.bot_token = self.telegram.bot_token.trim().to_string();
        if self.telegram.bot_token.is_empty() {
            anyhow::bail!(
                "Telegram bot token is missing (set {} or [telegram] bot_token)",
                ENV_BOT_TOKEN
            );
        }

        self.webhooks.message_url = normalize_url(self.webhooks.message_url.take())
            .context("Invalid message webhook URL")?;
        self.webhooks.file_url =
            normalize_url(self.webhooks.file_url.take()).context("Invalid file webhook URL")?;

        Ok(())
    }
}

/// Blank URLs count as unset; anything else must parse.
fn normalize_url(url: Option<String>) -> Result<Option<String>> {
    let Some(url) = url else {
        return Ok(None);
    };
    let url = url.trim();
    if url.is_empty() {
        return Ok(None);
    }
    reqwest::Url::parse(url).with_context(|| format!("Not a valid URL: {}", url))?;
    Ok(Some(url.to_string()))
}

fn parse_user_ids(raw: &str) -> Result<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .with_context(|| format!("Not a Telegram user id: {}", s))
        })
        .collect()
}
