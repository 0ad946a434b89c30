// src/types/mod.rs - Message, command and moderation types shared across the bot

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Core message type that flows from the platform into the moderation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub platform: String,
    pub message_id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub user_id: String,
    pub username: String,
    pub is_bot: bool,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ChatMessage {
    /// Attachment URLs in upload order
    pub fn attachment_urls(&self) -> Vec<&str> {
        self.attachments.iter().map(|a| a.url.as_str()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub filename: String,
    pub content_type: Option<String>,
}

/// A slash command invocation as delivered by the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandInvocation {
    pub interaction_id: String,
    pub interaction_token: String,
    pub name: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub invoker_id: String,
    pub options: Vec<CommandOption>,
}

impl CommandInvocation {
    /// Look up an option value by name
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.name == name)
            .map(|o| o.value.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOption {
    pub name: String,
    pub value: String,
}

/// Events produced by a platform connection
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    Message(ChatMessage),
    Command(CommandInvocation),
}

/// Rich message body, serialized in the shape the Discord API expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub fields: Vec<EmbedField>,
    pub color: u32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Embed {
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            description: None,
            fields: Vec::new(),
            color,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Response to a slash command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    Text { content: String, ephemeral: bool },
    Embed(Embed),
}

impl CommandReply {
    pub fn text(content: impl Into<String>) -> Self {
        CommandReply::Text { content: content.into(), ephemeral: false }
    }

    pub fn ephemeral(content: impl Into<String>) -> Self {
        CommandReply::Text { content: content.into(), ephemeral: true }
    }
}

/// Punishment chosen for a user's post-violation point total
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationAction {
    None,
    Timeout { duration: Duration, reason: String },
    Ban { reason: String },
}

/// Rule hit produced by the evaluator for a single message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub title: String,
    pub severity: u32,
}

/// A detected violation attributed to a user; consumed once by the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub matched_rule_title: String,
    pub severity: u32,
    pub user_id: String,
}

impl Violation {
    pub fn new(rule_match: RuleMatch, user_id: impl Into<String>) -> Self {
        Self {
            matched_rule_title: rule_match.title,
            severity: rule_match.severity,
            user_id: user_id.into(),
        }
    }
}

/// Fire-and-forget calls the bot asks the platform to perform
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundAction {
    SendMessage {
        channel_id: String,
        content: String,
        reply_to: Option<String>,
    },
    SendEmbed {
        channel_id: String,
        embed: Embed,
    },
    ReplyToCommand {
        interaction_id: String,
        interaction_token: String,
        reply: CommandReply,
    },
    TimeoutMember {
        guild_id: String,
        user_id: String,
        duration: Duration,
        reason: String,
    },
    BanMember {
        guild_id: String,
        user_id: String,
        reason: String,
    },
}

impl OutboundAction {
    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundAction::SendMessage { .. } => "send_message",
            OutboundAction::SendEmbed { .. } => "send_embed",
            OutboundAction::ReplyToCommand { .. } => "reply_to_command",
            OutboundAction::TimeoutMember { .. } => "timeout_member",
            OutboundAction::BanMember { .. } => "ban_member",
        }
    }
}

/// Format a user mention
pub fn mention(user_id: &str) -> String {
    format!("<@{}>", user_id)
}
