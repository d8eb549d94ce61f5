mod access;
mod broadcast;
mod catalog;
mod commands;
mod config;
mod delivery;
mod dispatcher;
mod error;
mod events;
mod platform;
mod registry;
mod scheduler;
mod server;
mod texts;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::catalog::Catalog;
use crate::config::{Config, TransportMode};
use crate::dispatcher::{CommandDispatcher, DispatcherSettings};
use crate::platform::bot_api::TelegramApi;
use crate::platform::ChatApi;
use crate::registry::{Registry, RegistryStore};
use crate::scheduler::{RetractionScheduler, Scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,starbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Transport: {}", config.server.mode);
    info!("  Admin user: {}", config.telegram.admin_user_id);
    info!("  Channel: {}", config.telegram.channel_id);
    info!(
        "  Prices: photo {} / audio {} / video {}",
        config.prices.photo, config.prices.audio, config.prices.video
    );

    let timezone: chrono_tz::Tz = config
        .registry
        .timezone
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid registry timezone: {}", e))?;
    let store = match &config.registry.database_path {
        Some(path) => Some(RegistryStore::open(path)?),
        None => None,
    };
    let registry = Registry::new(store, timezone);

    let catalog = Arc::new(Catalog::load(&config.content.catalog_path)?);

    let api: Arc<dyn ChatApi> = Arc::new(TelegramApi::new(
        &config.telegram,
        config.request_timeout(),
    )?);

    let retractions = RetractionScheduler::start(Arc::clone(&api));

    let mut scheduler = Scheduler::new().await?;
    scheduler::tasks::register_builtin_tasks(&scheduler, registry.clone(), retractions.clone())
        .await?;
    scheduler.start().await?;

    let dispatcher = Arc::new(CommandDispatcher::new(
        DispatcherSettings::from_config(&config),
        api,
        registry,
        catalog,
        retractions.clone(),
    ));

    info!("Bot is starting...");
    let http = server::serve(
        config.server.bind,
        Arc::clone(&dispatcher),
        server::ServerOptions::from_config(&config),
    );
    let result = match config.server.mode {
        TransportMode::Webhook => {
            tokio::select! {
                res = http => res,
                _ = tokio::signal::ctrl_c() => Ok(()),
            }
        }
        TransportMode::Polling => {
            let bot = platform::telegram::polling_bot(&config.telegram)?;
            tokio::select! {
                res = http => res,
                res = platform::telegram::run(bot, dispatcher) => res,
            }
        }
    };

    info!("Shutting down...");
    retractions.shutdown().await;
    if let Err(e) = scheduler.shutdown().await {
        error!("Failed to stop scheduler: {:#}", e);
    }

    result
}
