//! Enforcement decisions derived from verification state.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::recovery::RecoveryState;
use crate::state::VerificationState;

/// A user action the protected application can block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum BlockedAction {
    FormSubmit,
    Download,
    Clipboard,
    Navigation,
    Input,
}

impl BlockedAction {
    /// Every blockable action.
    pub const ALL: [Self; 5] =
        [Self::FormSubmit, Self::Download, Self::Clipboard, Self::Navigation, Self::Input];
}

/// UI and action policy for the current state.
///
/// Derived on demand; never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct EnforcementPolicy {
    /// Actions the application must refuse.
    pub blocked_actions: BTreeSet<BlockedAction>,
    /// Gaussian blur applied to protected content, in pixels.
    pub blur_px: u8,
    /// Opacity of the warning overlay, `0.0..=1.0`.
    pub overlay_opacity: f64,
    /// Whether pointer events on protected content are disabled.
    pub pointer_events_disabled: bool,
    /// Whether risky actions must be confirmed.
    pub requires_confirmation: bool,
}

impl EnforcementPolicy {
    /// Whether `action` is blocked under this policy.
    #[must_use]
    pub fn blocks(&self, action: BlockedAction) -> bool {
        self.blocked_actions.contains(&action)
    }

    fn unrestricted() -> Self {
        Self {
            blocked_actions: BTreeSet::new(),
            blur_px: 0,
            overlay_opacity: 0.0,
            pointer_events_disabled: false,
            requires_confirmation: false,
        }
    }
}

/// Map `(state, recovery)` to the policy consumers must enforce.
///
/// During recovery, `NORMAL` and `WATCH` get a provisional policy with no
/// visual degradation but mandatory confirmation. `RESTRICT` and `REAUTH` are
/// never softened.
#[must_use]
pub fn policy(state: VerificationState, recovery: Option<&RecoveryState>) -> EnforcementPolicy {
    match state {
        VerificationState::Normal | VerificationState::Watch if recovery.is_some() => {
            EnforcementPolicy { requires_confirmation: true, ..EnforcementPolicy::unrestricted() }
        }
        VerificationState::Normal => EnforcementPolicy::unrestricted(),
        VerificationState::Watch => EnforcementPolicy {
            blur_px: 2,
            requires_confirmation: true,
            ..EnforcementPolicy::unrestricted()
        },
        VerificationState::Restrict => EnforcementPolicy {
            blocked_actions: [BlockedAction::FormSubmit, BlockedAction::Download, BlockedAction::Clipboard]
                .into_iter()
                .collect(),
            blur_px: 6,
            overlay_opacity: 0.1,
            pointer_events_disabled: false,
            requires_confirmation: false,
        },
        VerificationState::Reauth => EnforcementPolicy {
            blocked_actions: BlockedAction::ALL.into_iter().collect(),
            blur_px: 12,
            overlay_opacity: 0.3,
            pointer_events_disabled: true,
            requires_confirmation: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::TrustScore;

    fn recovery() -> RecoveryState {
        RecoveryState { entered_at_ms: 0, ends_at_ms: 15_000, stable_threshold: TrustScore::saturating(0.7) }
    }

    #[test]
    fn normal_policy_is_unrestricted() {
        let p = policy(VerificationState::Normal, None);
        assert!(p.blocked_actions.is_empty());
        assert_eq!(p.blur_px, 0);
        assert!(!p.requires_confirmation);
    }

    #[test]
    fn watch_policy_blurs_lightly_and_requires_confirmation() {
        let p = policy(VerificationState::Watch, None);
        assert!((2..=3).contains(&p.blur_px));
        assert!(p.requires_confirmation);
        assert!(p.blocked_actions.is_empty());
    }

    #[test]
    fn restrict_policy_blocks_sensitive_actions() {
        let p = policy(VerificationState::Restrict, None);
        assert!((5..=8).contains(&p.blur_px));
        assert!(p.blocks(BlockedAction::FormSubmit));
        assert!(p.blocks(BlockedAction::Download));
        assert!(p.blocks(BlockedAction::Clipboard));
        assert!(!p.blocks(BlockedAction::Navigation), "navigation stays available in RESTRICT");
        assert!((p.overlay_opacity - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn reauth_policy_blocks_everything() {
        let p = policy(VerificationState::Reauth, None);
        assert!((10..=15).contains(&p.blur_px));
        assert!(BlockedAction::ALL.iter().all(|a| p.blocks(*a)));
        assert!(p.pointer_events_disabled);
        assert!((p.overlay_opacity - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn recovery_softens_watch_but_not_restrict() {
        let r = recovery();
        let watch = policy(VerificationState::Watch, Some(&r));
        assert_eq!(watch.blur_px, 0);
        assert!(watch.requires_confirmation);

        let restrict = policy(VerificationState::Restrict, Some(&r));
        assert_eq!(restrict, policy(VerificationState::Restrict, None));
    }

    #[test]
    fn restrictiveness_is_monotone_in_state() {
        let blurs: Vec<u8> = VerificationState::ALL.iter().map(|s| policy(*s, None).blur_px).collect();
        assert!(blurs.windows(2).all(|w| w[0] < w[1]), "blur must grow with restrictiveness: {blurs:?}");
    }
}
