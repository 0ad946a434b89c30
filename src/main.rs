use anyhow::Result;
use log::{error, info, warn};
use tokio::time::{sleep, Duration};

use modwarden::prelude::*;

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting ModWarden v{}", env!("CARGO_PKG_VERSION"));

    let config_manager = ConfigurationManager::from_env();
    let config = match config_manager.load().await {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            return Err(e);
        }
    };
    info!("Loaded configuration from {}", config_manager.config_path().display());

    let discord_config = DiscordConfig::from_env()?.with_activity(&config.activity);
    let audit_channel = audit_channel_from_env();
    if audit_channel.is_none() {
        warn!("MOD_LOG_CHANNEL_ID not set, violations will not be audited");
    }

    let mut bot = ModerationBot::from_config(
        &config,
        audit_channel,
        Box::new(DiscordConnection::new(discord_config)),
    ).await;

    bot.start().await?;

    #[cfg(feature = "web")]
    {
        let server = KeepAliveServer::new(std::sync::Arc::clone(bot.ledger()));
        let port = modwarden::web::port_from_env();
        tokio::spawn(async move {
            if let Err(e) = server.start_server(port).await {
                error!("Keep-alive server failed: {:#}", e);
            }
        });
    }

    info!("{} is running. Press Ctrl+C to stop.", config.bot_name);

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Shutdown requested, exiting main loop");
                break;
            }
            _ = sleep(HEALTH_CHECK_INTERVAL) => {
                if !bot.health_check().await {
                    warn!("Gateway connection lost; restart the process to reconnect");
                }
            }
        }
    }

    bot.shutdown().await?;
    info!("ModWarden stopped");
    Ok(())
}
