// src/bot/moderation.rs - Evaluate, record, notify and punish

use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::bot::evaluator::ViolationEvaluator;
use crate::bot::ledger::WarningLedger;
use crate::bot::punishment::PunishmentPolicy;
use crate::types::{mention, ChatMessage, Embed, ModerationAction, OutboundAction, Violation};

pub const VIOLATION_COLOR: u32 = 0xFF0000;

/// What the pipeline did with one message
#[derive(Debug, Clone, PartialEq)]
pub enum ModerationOutcome {
    /// Automated author, never evaluated
    Ignored,
    NoAction,
    Violated {
        violation: Violation,
        total_points: u32,
        action: ModerationAction,
    },
}

pub struct ModerationPipeline {
    evaluator: ViolationEvaluator,
    ledger: Arc<WarningLedger>,
    audit_channel_id: Option<String>,
}

impl ModerationPipeline {
    pub fn new(evaluator: ViolationEvaluator, ledger: Arc<WarningLedger>, audit_channel_id: Option<String>) -> Self {
        if audit_channel_id.is_none() {
            info!("No audit channel configured, violation embeds are disabled");
        }
        Self {
            evaluator,
            ledger,
            audit_channel_id,
        }
    }

    /// Run one message through the pipeline. Outbound calls are queued on
    /// `outbound` and never awaited to completion here.
    pub async fn process_message(
        &self,
        message: &ChatMessage,
        outbound: &mpsc::Sender<OutboundAction>,
    ) -> ModerationOutcome {
        if message.is_bot {
            return ModerationOutcome::Ignored;
        }

        let rule_match = match self.evaluator.evaluate(&message.content, &message.attachment_urls()) {
            Some(hit) => hit,
            None => return ModerationOutcome::NoAction,
        };
        let violation = Violation::new(rule_match, message.user_id.clone());

        let total_points = self.ledger.add(&violation.user_id, violation.severity).await;
        warn!("User {} ({}) violated '{}': +{} points, total {}",
              message.username, violation.user_id, violation.matched_rule_title,
              violation.severity, total_points);

        Self::dispatch(outbound, OutboundAction::SendMessage {
            channel_id: message.channel_id.clone(),
            content: Self::warning_reply(&violation, total_points),
            reply_to: Some(message.message_id.clone()),
        }).await;

        if let Some(ref channel_id) = self.audit_channel_id {
            Self::dispatch(outbound, OutboundAction::SendEmbed {
                channel_id: channel_id.clone(),
                embed: Self::audit_embed(&violation, total_points),
            }).await;
        }

        let action = PunishmentPolicy::decide(total_points);
        self.apply_punishment(message, &action, outbound).await;

        ModerationOutcome::Violated {
            violation,
            total_points,
            action,
        }
    }

    async fn apply_punishment(
        &self,
        message: &ChatMessage,
        action: &ModerationAction,
        outbound: &mpsc::Sender<OutboundAction>,
    ) {
        if *action == ModerationAction::None {
            return;
        }

        let guild_id = match message.guild_id {
            Some(ref id) => id.clone(),
            None => {
                debug!("Message from {} is outside a guild, skipping {:?}", message.user_id, action);
                return;
            }
        };

        let outbound_action = match action {
            ModerationAction::Timeout { duration, reason } => {
                info!("Timing out {} for {}s ({})", message.user_id, duration.as_secs(), reason);
                OutboundAction::TimeoutMember {
                    guild_id,
                    user_id: message.user_id.clone(),
                    duration: *duration,
                    reason: reason.clone(),
                }
            }
            ModerationAction::Ban { reason } => {
                info!("Banning {} ({})", message.user_id, reason);
                OutboundAction::BanMember {
                    guild_id,
                    user_id: message.user_id.clone(),
                    reason: reason.clone(),
                }
            }
            ModerationAction::None => return,
        };

        Self::dispatch(outbound, outbound_action).await;
    }

    pub fn warning_reply(violation: &Violation, total_points: u32) -> String {
        format!("⚠️ Violation detected: **{}**. Warning points: {}",
                violation.matched_rule_title, total_points)
    }

    pub fn audit_embed(violation: &Violation, total_points: u32) -> Embed {
        Embed::new("⚠️ Violation Detected", VIOLATION_COLOR)
            .field("User", mention(&violation.user_id), true)
            .field("Rule", violation.matched_rule_title.clone(), true)
            .field("Warning Points", total_points.to_string(), true)
            .field("Severity", violation.severity.to_string(), true)
    }

    async fn dispatch(outbound: &mpsc::Sender<OutboundAction>, action: OutboundAction) {
        if let Err(e) = outbound.send(action).await {
            error!("Failed to queue outbound action: {}", e);
        }
    }
}
