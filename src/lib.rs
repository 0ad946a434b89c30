//! # ModWarden
//!
//! A Discord moderation bot that watches guild chat, scores rule violations
//! into persistent warning points and escalates to timeouts and bans.
//!
//! ## Features
//!
//! - **Rule Evaluation**: Keyword and regex rules, link detection and image uploads
//! - **Warning Ledger**: Per-user points persisted to a JSON file
//! - **Escalation**: Timeouts at 2, 3 and 4 points, a ban from 5
//! - **Admin Commands**: `/warnings`, `/resetwarnings`, `/announce` and `/topviolators`
//! - **Keep-alive Endpoint**: Optional HTTP server behind the `web` feature
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modwarden::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigurationManager::from_env().load().await?;
//!     let discord = DiscordConfig::from_env()?.with_activity(&config.activity);
//!
//!     let mut bot = ModerationBot::from_config(
//!         &config,
//!         audit_channel_from_env(),
//!         Box::new(DiscordConnection::new(discord)),
//!     ).await;
//!     bot.start().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     bot.shutdown().await
//! }
//! ```

pub mod types;
pub mod platforms;
pub mod bot;
pub mod config;

#[cfg(feature = "web")]
pub mod web;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::ModerationBot;
    pub use crate::bot::ledger::WarningLedger;
    pub use crate::bot::rules::{RuleDefinition, RuleStore};
    pub use crate::config::{audit_channel_from_env, BotConfiguration, ConfigurationManager};
    pub use crate::platforms::{
        PlatformConnection,
        discord::{DiscordConnection, DiscordConfig},
    };
    pub use crate::types::{
        ChatMessage, CommandInvocation, CommandReply, Embed, ModerationAction,
        OutboundAction, PlatformEvent, Violation,
    };
    #[cfg(feature = "web")]
    pub use crate::web::KeepAliveServer;
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
