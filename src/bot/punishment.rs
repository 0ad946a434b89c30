// src/bot/punishment.rs - Point totals to moderation actions

use std::time::Duration;

use crate::types::ModerationAction;

const HOUR: u64 = 3600;

/// Points at or above which the user is banned
pub const BAN_THRESHOLD: u32 = 5;

/// Timeout tiers. Each total is matched exactly, so a multi-point violation
/// can skip a tier.
const TIMEOUT_TIERS: [(u32, u64, &str); 3] = [
    (2, HOUR, "2 WP Mute"),
    (3, 12 * HOUR, "3 WP Mute"),
    (4, 24 * HOUR, "4 WP Mute"),
];

pub struct PunishmentPolicy;

impl PunishmentPolicy {
    /// Action for a user's total after the violation was recorded
    pub fn decide(total_points: u32) -> ModerationAction {
        if let Some((_, seconds, reason)) = TIMEOUT_TIERS.iter().find(|(points, _, _)| *points == total_points) {
            return ModerationAction::Timeout {
                duration: Duration::from_secs(*seconds),
                reason: reason.to_string(),
            };
        }

        if total_points >= BAN_THRESHOLD {
            ModerationAction::Ban {
                reason: format!("{} WP Ban", BAN_THRESHOLD),
            }
        } else {
            ModerationAction::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeout_hours(action: &ModerationAction) -> Option<u64> {
        match action {
            ModerationAction::Timeout { duration, .. } => Some(duration.as_secs() / HOUR),
            _ => None,
        }
    }

    #[test]
    fn test_no_action_below_two() {
        assert_eq!(PunishmentPolicy::decide(0), ModerationAction::None);
        assert_eq!(PunishmentPolicy::decide(1), ModerationAction::None);
    }

    #[test]
    fn test_timeout_tiers() {
        assert_eq!(timeout_hours(&PunishmentPolicy::decide(2)), Some(1));
        assert_eq!(timeout_hours(&PunishmentPolicy::decide(3)), Some(12));
        assert_eq!(timeout_hours(&PunishmentPolicy::decide(4)), Some(24));
    }

    #[test]
    fn test_timeout_reasons() {
        match PunishmentPolicy::decide(3) {
            ModerationAction::Timeout { reason, .. } => assert_eq!(reason, "3 WP Mute"),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_ban_from_five_up() {
        for total in [5, 6, 42] {
            assert_eq!(
                PunishmentPolicy::decide(total),
                ModerationAction::Ban { reason: "5 WP Ban".to_string() }
            );
        }
    }
}
