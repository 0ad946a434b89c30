use log::{debug, error, info};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::bot::ledger::WarningLedger;
use crate::types::{mention, ChatMessage, CommandInvocation, CommandReply, Embed, OutboundAction};

pub const ANNOUNCE_COLOR: u32 = 0x303030;
pub const LEADERBOARD_COLOR: u32 = 0xFFAA00;
pub const NO_VIOLATORS: &str = "No violators yet.";
pub const TEXT_WARNINGS_COMMAND: &str = "!warnings";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Missing required option `{0}`")]
    MissingOption(&'static str),
    #[error("Please specify a user")]
    MissingUser,
    #[error("This command must be used in a channel")]
    MissingChannel,
}

/// The supported slash commands with their typed options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Warnings { user_id: Option<String> },
    ResetWarnings { user_id: Option<String> },
    Announce { title: String, content: String },
    TopViolators,
}

impl AdminCommand {
    /// `Ok(None)` for command names this bot does not handle
    pub fn parse(invocation: &CommandInvocation) -> Result<Option<Self>, CommandError> {
        let user_id = invocation.option("user").map(String::from);

        let command = match invocation.name.as_str() {
            "warnings" => AdminCommand::Warnings { user_id },
            "resetwarnings" => AdminCommand::ResetWarnings { user_id },
            "announce" => {
                if invocation.channel_id.trim().is_empty() {
                    return Err(CommandError::MissingChannel);
                }
                AdminCommand::Announce {
                    title: Self::required(invocation, "title")?,
                    content: Self::required(invocation, "content")?,
                }
            }
            "topviolators" => AdminCommand::TopViolators,
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    fn required(invocation: &CommandInvocation, name: &'static str) -> Result<String, CommandError> {
        invocation
            .option(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .ok_or(CommandError::MissingOption(name))
    }
}

/// Administrative operations over the warning ledger
pub struct CommandHandlers {
    ledger: Arc<WarningLedger>,
    leaderboard_size: usize,
}

impl CommandHandlers {
    pub fn new(ledger: Arc<WarningLedger>, leaderboard_size: usize) -> Self {
        Self { ledger, leaderboard_size }
    }

    pub async fn query(&self, user_id: &str) -> u32 {
        self.ledger.get(user_id).await
    }

    pub async fn reset(&self, user_id: &str) -> u32 {
        self.ledger.reset(user_id).await
    }

    pub fn announce(&self, title: &str, body: &str) -> Embed {
        Embed::new(title, ANNOUNCE_COLOR).description(body)
    }

    pub async fn leaderboard(&self) -> Embed {
        let top = self.ledger.top(self.leaderboard_size).await;

        let description = if top.is_empty() {
            NO_VIOLATORS.to_string()
        } else {
            top.iter()
                .enumerate()
                .map(|(i, (user_id, points))| format!("{}. {}: {}", i + 1, mention(user_id), points))
                .collect::<Vec<_>>()
                .join("\n")
        };

        Embed::new("Top Violators", LEADERBOARD_COLOR).description(description)
    }

    /// Dispatch a slash command and queue its reply
    pub async fn process_command(
        &self,
        invocation: &CommandInvocation,
        outbound: &mpsc::Sender<OutboundAction>,
    ) {
        let command = match AdminCommand::parse(invocation) {
            Ok(Some(command)) => command,
            Ok(None) => {
                debug!("Ignoring unknown command: {}", invocation.name);
                return;
            }
            Err(e) => {
                info!("Rejected /{} from {}: {}", invocation.name, invocation.invoker_id, e);
                Self::reply(outbound, invocation, CommandReply::ephemeral(format!("❌ {}", e))).await;
                return;
            }
        };

        info!("Executing /{} for {}", invocation.name, invocation.invoker_id);

        let reply = match command {
            AdminCommand::Warnings { user_id } => {
                let target = user_id.unwrap_or_else(|| invocation.invoker_id.clone());
                let points = self.query(&target).await;
                CommandReply::text(format!("User has {} warning points.", points))
            }
            AdminCommand::ResetWarnings { user_id: Some(user_id) } => {
                self.reset(&user_id).await;
                CommandReply::text(format!("Reset warning points for {}", mention(&user_id)))
            }
            AdminCommand::ResetWarnings { user_id: None } => {
                CommandReply::ephemeral(format!("❌ {}", CommandError::MissingUser))
            }
            AdminCommand::Announce { title, content } => {
                let embed = self.announce(&title, &content);
                Self::send(outbound, OutboundAction::SendEmbed {
                    channel_id: invocation.channel_id.clone(),
                    embed,
                }).await;
                CommandReply::ephemeral("Announcement sent!")
            }
            AdminCommand::TopViolators => CommandReply::Embed(self.leaderboard().await),
        };

        Self::reply(outbound, invocation, reply).await;
    }

    /// Handle the `!warnings` text command. Returns true if the message was one.
    pub async fn process_text_command(
        &self,
        message: &ChatMessage,
        outbound: &mpsc::Sender<OutboundAction>,
    ) -> bool {
        if message.content.trim().to_lowercase() != TEXT_WARNINGS_COMMAND {
            return false;
        }

        let points = self.query(&message.user_id).await;
        Self::send(outbound, OutboundAction::SendMessage {
            channel_id: message.channel_id.clone(),
            content: format!("You have {} warning(s).", points),
            reply_to: Some(message.message_id.clone()),
        }).await;
        true
    }

    async fn reply(outbound: &mpsc::Sender<OutboundAction>, invocation: &CommandInvocation, reply: CommandReply) {
        Self::send(outbound, OutboundAction::ReplyToCommand {
            interaction_id: invocation.interaction_id.clone(),
            interaction_token: invocation.interaction_token.clone(),
            reply,
        }).await;
    }

    async fn send(outbound: &mpsc::Sender<OutboundAction>, action: OutboundAction) {
        if let Err(e) = outbound.send(action).await {
            error!("Failed to queue command response: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CommandOption;
    use tempfile::tempdir;

    fn invocation(name: &str, options: &[(&str, &str)]) -> CommandInvocation {
        CommandInvocation {
            interaction_id: "i1".to_string(),
            interaction_token: "t1".to_string(),
            name: name.to_string(),
            channel_id: "general".to_string(),
            guild_id: Some("guild".to_string()),
            invoker_id: "mod".to_string(),
            options: options
                .iter()
                .map(|(n, v)| CommandOption { name: n.to_string(), value: v.to_string() })
                .collect(),
        }
    }

    #[test]
    fn test_parse_known_commands() {
        assert_eq!(
            AdminCommand::parse(&invocation("warnings", &[("user", "42")])),
            Ok(Some(AdminCommand::Warnings { user_id: Some("42".to_string()) }))
        );
        assert_eq!(
            AdminCommand::parse(&invocation("topviolators", &[])),
            Ok(Some(AdminCommand::TopViolators))
        );
        assert_eq!(AdminCommand::parse(&invocation("dance", &[])), Ok(None));
    }

    #[test]
    fn test_announce_requires_title_and_content() {
        assert_eq!(
            AdminCommand::parse(&invocation("announce", &[("content", "body")])),
            Err(CommandError::MissingOption("title"))
        );
        assert_eq!(
            AdminCommand::parse(&invocation("announce", &[("title", "Hi"), ("content", "  ")])),
            Err(CommandError::MissingOption("content"))
        );
    }

    #[tokio::test]
    async fn test_warnings_defaults_to_invoker() {
        let temp_dir = tempdir().unwrap();
        let ledger = Arc::new(WarningLedger::new(temp_dir.path().join("w.json")));
        ledger.add("mod", 2).await;
        let handlers = CommandHandlers::new(ledger, 10);
        let (tx, mut rx) = mpsc::channel(8);

        handlers.process_command(&invocation("warnings", &[]), &tx).await;

        match rx.try_recv().unwrap() {
            OutboundAction::ReplyToCommand { reply, .. } => {
                assert_eq!(reply, CommandReply::text("User has 2 warning points."));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reset_without_user_replies_with_error() {
        let temp_dir = tempdir().unwrap();
        let ledger = Arc::new(WarningLedger::new(temp_dir.path().join("w.json")));
        let handlers = CommandHandlers::new(ledger, 10);
        let (tx, mut rx) = mpsc::channel(8);

        handlers.process_command(&invocation("resetwarnings", &[]), &tx).await;

        match rx.try_recv().unwrap() {
            OutboundAction::ReplyToCommand { reply: CommandReply::Text { ephemeral, content }, .. } => {
                assert!(ephemeral);
                assert!(content.contains("specify a user"));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_announce_sends_embed_then_confirms() {
        let temp_dir = tempdir().unwrap();
        let ledger = Arc::new(WarningLedger::new(temp_dir.path().join("w.json")));
        let handlers = CommandHandlers::new(ledger, 10);
        let (tx, mut rx) = mpsc::channel(8);

        handlers
            .process_command(&invocation("announce", &[("title", "Event"), ("content", "Tonight at 8")]), &tx)
            .await;

        match rx.try_recv().unwrap() {
            OutboundAction::SendEmbed { channel_id, embed } => {
                assert_eq!(channel_id, "general");
                assert_eq!(embed.title, "Event");
                assert_eq!(embed.description.as_deref(), Some("Tonight at 8"));
                assert_eq!(embed.color, ANNOUNCE_COLOR);
            }
            other => panic!("unexpected action {:?}", other),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            OutboundAction::ReplyToCommand { reply: CommandReply::Text { ephemeral: true, .. }, .. }
        ));
    }

    #[tokio::test]
    async fn test_announce_without_channel_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let ledger = Arc::new(WarningLedger::new(temp_dir.path().join("w.json")));
        let handlers = CommandHandlers::new(ledger, 10);
        let (tx, mut rx) = mpsc::channel(8);

        let mut announce = invocation("announce", &[("title", "Event"), ("content", "Tonight at 8")]);
        announce.channel_id = String::new();
        assert_eq!(AdminCommand::parse(&announce), Err(CommandError::MissingChannel));

        handlers.process_command(&announce, &tx).await;
        match rx.try_recv().unwrap() {
            OutboundAction::ReplyToCommand { reply: CommandReply::Text { ephemeral, content }, .. } => {
                assert!(ephemeral);
                assert!(content.contains("must be used in a channel"));
            }
            other => panic!("unexpected action {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_command_is_silent() {
        let temp_dir = tempdir().unwrap();
        let ledger = Arc::new(WarningLedger::new(temp_dir.path().join("w.json")));
        let handlers = CommandHandlers::new(ledger, 10);
        let (tx, mut rx) = mpsc::channel(8);

        handlers.process_command(&invocation("dance", &[]), &tx).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leaderboard_respects_size() {
        let temp_dir = tempdir().unwrap();
        let ledger = Arc::new(WarningLedger::new(temp_dir.path().join("w.json")));
        for i in 0..12u32 {
            ledger.add(&format!("user{}", i), i + 1).await;
        }
        let handlers = CommandHandlers::new(ledger, 10);

        let embed = handlers.leaderboard().await;
        let description = embed.description.unwrap();
        assert_eq!(description.lines().count(), 10);
        assert!(description.starts_with("1. <@user11>: 12"));
    }

    #[tokio::test]
    async fn test_text_warnings_command() {
        let temp_dir = tempdir().unwrap();
        let ledger = Arc::new(WarningLedger::new(temp_dir.path().join("w.json")));
        ledger.add("u", 3).await;
        let handlers = CommandHandlers::new(ledger, 10);
        let (tx, mut rx) = mpsc::channel(8);

        let message = ChatMessage {
            platform: "discord".to_string(),
            message_id: "m".to_string(),
            channel_id: "general".to_string(),
            guild_id: None,
            user_id: "u".to_string(),
            username: "u".to_string(),
            is_bot: false,
            content: "!Warnings".to_string(),
            attachments: Vec::new(),
            timestamp: chrono::Utc::now(),
        };

        assert!(handlers.process_text_command(&message, &tx).await);
        match rx.try_recv().unwrap() {
            OutboundAction::SendMessage { content, .. } => assert_eq!(content, "You have 3 warning(s)."),
            other => panic!("unexpected action {:?}", other),
        }
    }
}
