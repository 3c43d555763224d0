mod config;
mod platform;
mod relay;
mod webhook;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::relay::Relay;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

fn enabled(url: Option<&str>) -> &'static str {
    if url.is_some() {
        "enabled"
    } else {
        "disabled"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the variables may come from the process
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,webhook_relay_bot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Explicit path, then ./config.toml, then the environment alone
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            info!("Loading configuration from: {}", DEFAULT_CONFIG_PATH);
            Config::load(Path::new(DEFAULT_CONFIG_PATH))
                .with_context(|| format!("Failed to load config from {}", DEFAULT_CONFIG_PATH))?
        }
        None => {
            info!("Loading configuration from environment");
            Config::from_env().context("Failed to load config from environment")?
        }
    };

    info!("Configuration loaded successfully");
    info!("  Message webhook: {}", enabled(config.message_webhook()));
    info!("  File webhook: {}", enabled(config.file_webhook()));
    if !config.telegram.allowed_user_ids.is_empty() {
        info!("  Allowed users: {:?}", config.telegram.allowed_user_ids);
    }

    let relay = Arc::new(Relay::new(config)?);

    info!("Bot is starting...");
    platform::telegram::run(relay).await?;

    Ok(())
}
