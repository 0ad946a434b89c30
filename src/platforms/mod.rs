use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::types::{CommandReply, Embed, OutboundAction, PlatformEvent};

pub mod discord;

/// Trait defining the interface a chat platform connection must implement
#[async_trait]
pub trait PlatformConnection: Send + Sync {
    /// Connect to the platform and start receiving events
    async fn connect(&mut self) -> Result<()>;

    /// Send a text message to a channel, optionally as a reply to a message
    async fn send_message(&self, channel_id: &str, content: &str, reply_to: Option<&str>) -> Result<()>;

    /// Send an embed to a channel
    async fn send_embed(&self, channel_id: &str, embed: &Embed) -> Result<()>;

    /// Answer a slash command invocation
    async fn reply_to_command(&self, interaction_id: &str, interaction_token: &str, reply: &CommandReply) -> Result<()>;

    /// Prevent a guild member from talking for `duration`
    async fn timeout_member(&self, guild_id: &str, user_id: &str, duration: Duration, reason: &str) -> Result<()>;

    /// Ban a guild member with no expiry
    async fn ban_member(&self, guild_id: &str, user_id: &str, reason: &str) -> Result<()>;

    /// Get the platform identifier (e.g., "discord")
    fn platform_name(&self) -> &str;

    /// Check if the connection is healthy
    async fn is_connected(&self) -> bool;

    /// Get a receiver for incoming messages and command invocations
    fn get_event_receiver(&self) -> Option<broadcast::Receiver<PlatformEvent>>;

    /// Gracefully disconnect
    async fn disconnect(&mut self) -> Result<()>;
}

/// Perform one outbound action against a connection
pub async fn execute(connection: &dyn PlatformConnection, action: &OutboundAction) -> Result<()> {
    match action {
        OutboundAction::SendMessage { channel_id, content, reply_to } => {
            connection.send_message(channel_id, content, reply_to.as_deref()).await
        }
        OutboundAction::SendEmbed { channel_id, embed } => {
            connection.send_embed(channel_id, embed).await
        }
        OutboundAction::ReplyToCommand { interaction_id, interaction_token, reply } => {
            connection.reply_to_command(interaction_id, interaction_token, reply).await
        }
        OutboundAction::TimeoutMember { guild_id, user_id, duration, reason } => {
            connection.timeout_member(guild_id, user_id, *duration, reason).await
        }
        OutboundAction::BanMember { guild_id, user_id, reason } => {
            connection.ban_member(guild_id, user_id, reason).await
        }
    }
}
