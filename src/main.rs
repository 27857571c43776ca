//! Fleetcord - Discord channel bridge for a fleet of game servers
//!
//! Maps game servers and logical names to Discord channels, relays
//! messages into them and keeps each server channel's name and topic in
//! step with the server's live state.

mod bridge;
mod common;
mod config;
mod discord;
mod game;
mod store;

use std::sync::Arc;

use anyhow::Result;
use serenity::model::id::GuildId;
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use bridge::{Coordinator, CoordinatorSettings};
use config::{env::get_config_path, load_and_validate};
use discord::DiscordBot;
use game::ServerRegistry;
use store::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Fleetcord v{} starting...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = load_and_validate(&config_path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!("Please ensure {} exists and is properly formatted.", config_path);
        e
    })?;

    info!("Configuration loaded successfully");
    info!("  Guild: {}", config.discord.guild_id);
    info!("  Database: {}", config.database.path);

    let store = Arc::new(SqliteStore::open(&config.database.path).await?);
    let registry = Arc::new(ServerRegistry::from_config(&config.servers));
    info!("  Servers: {}", registry.server_ids().join(", "));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let bot = DiscordBot::build(
        config.discord.token.clone(),
        GuildId::new(config.discord.guild_id),
        shutdown_rx,
    )
    .await?;

    let coordinator = Arc::new(Coordinator::new(
        CoordinatorSettings::from_config(&config),
        store,
        registry,
        bot.transport(),
    ));
    coordinator.init().await?;

    // Chat from mapped channels. Delivery into the game is handled by the
    // server-side tooling subscribed here.
    let inbound_task = {
        let mut events = coordinator.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => info!(
                        server_id = %event.server_id,
                        author_id = %event.message.author_id,
                        author = %event.message.author_name,
                        "Chat message for server: {}",
                        event.message.content
                    ),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Inbound routing lagged, skipped {} messages", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            info!("Inbound routing task ended");
        })
    };

    info!("Starting Discord bot...");
    let discord_task = tokio::spawn(bot.run(coordinator.clone()));

    let shutdown = tokio::select! {
        biased;
        _ = shutdown_signal() => {
            info!("Shutdown signal received - stopping channel workers...");
            true
        }
        _ = discord_task => false,
        _ = inbound_task => false,
    };

    coordinator.shutdown().await;

    if shutdown {
        if let Err(e) = shutdown_tx.send(true) {
            debug!("Shutdown channel closed (Discord task already exited): {}", e);
        }
        // Give the gateway a moment to close cleanly
        tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
    }

    info!("Exiting...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
