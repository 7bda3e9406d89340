mod config;
mod dispatch;
mod error;
mod gateway;
mod handlers;
mod registry;
mod upstream;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use serenity::prelude::GatewayIntents;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::gateway::Handler;
use crate::upstream::HttpFetcher;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relaybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    if config.image_search.is_none() {
        info!("Image search credentials not set; the image command will degrade");
    }

    // Validate the command set before anything touches the platform.
    let commands = registry::commands();
    registry::validate(&commands).context("Invalid command set")?;

    let fetcher = Arc::new(HttpFetcher::new().context("Failed to build HTTP client")?);
    let dispatcher = Arc::new(
        Dispatcher::new(&commands, fetcher, config.image_search.clone())
            .context("Failed to build dispatcher")?,
    );

    // Registration happens once the gateway reports ready; a rejection
    // there is surfaced through this channel instead of a panic.
    let (fatal_tx, mut fatal_rx) = mpsc::channel(1);
    let handler = Handler::new(dispatcher, commands, fatal_tx);

    let intents =
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;
    let mut client = serenity::Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await
        .context("Failed to create Discord client")?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, closing gateway connection");
            shard_manager.shutdown_all().await;
        }
    });

    info!("Bot is starting. Press CTRL-C to exit.");

    let shards = client.shard_manager.clone();
    tokio::select! {
        result = client.start() => {
            result.context("Gateway connection failed")?;
        }
        Some(err) = fatal_rx.recv() => {
            error!("Fatal startup error: {}", err);
            shards.shutdown_all().await;
            return Err(err.into());
        }
    }

    // A registration failure shuts its shard down and the gateway loop
    // returns cleanly; surface the recorded error instead of exiting 0.
    if let Ok(err) = fatal_rx.try_recv() {
        error!("Fatal startup error: {}", err);
        return Err(err.into());
    }

    Ok(())
}
