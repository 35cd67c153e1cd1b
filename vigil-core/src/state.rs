//! Verification states, their presentation metadata, and transition records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::trust::TrustScore;

/// Access-control state driven by the trust state machine.
///
/// Variants are ordered by restrictiveness: `Normal < Watch < Restrict < Reauth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum VerificationState {
    /// Owner confidently present; no restrictions.
    Normal,
    /// Trust degraded; risky actions need confirmation.
    Watch,
    /// Trust low; sensitive actions blocked.
    Restrict,
    /// Identity must be re-established out of band.
    Reauth,
}

impl VerificationState {
    /// All states from least to most restrictive.
    pub const ALL: [Self; 4] = [Self::Normal, Self::Watch, Self::Restrict, Self::Reauth];

    /// Upper-case name used on the wire and in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Watch => "WATCH",
            Self::Restrict => "RESTRICT",
            Self::Reauth => "REAUTH",
        }
    }

    /// Whether this state is an escalation above `Normal`.
    #[must_use]
    pub fn is_escalated(self) -> bool {
        self != Self::Normal
    }

    /// Static presentation metadata for this state.
    #[must_use]
    pub fn info(self) -> StateInfo {
        match self {
            Self::Normal => StateInfo {
                name: "Normal",
                color: "#22c55e",
                icon: "shield-check",
                description: "Identity continuously verified. Full access.",
            },
            Self::Watch => StateInfo {
                name: "Watch",
                color: "#eab308",
                icon: "eye",
                description: "Trust degraded. Risky actions require confirmation.",
            },
            Self::Restrict => StateInfo {
                name: "Restrict",
                color: "#f97316",
                icon: "shield-alert",
                description: "Low trust. Form submission, downloads and clipboard are blocked.",
            },
            Self::Reauth => StateInfo {
                name: "Re-authenticate",
                color: "#ef4444",
                icon: "lock",
                description: "Identity could not be verified. Re-authentication required.",
            },
        }
    }
}

impl fmt::Display for VerificationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::config("state", format!("unknown state '{s}'")))
    }
}

/// Static presentation metadata for `state`.
#[must_use]
pub fn state_info(state: VerificationState) -> StateInfo {
    state.info()
}

/// Presentation metadata for a [`VerificationState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct StateInfo {
    /// Human-readable name.
    pub name: &'static str,
    /// CSS colour for badges and borders.
    pub color: &'static str,
    /// Icon identifier for the UI icon set.
    pub icon: &'static str,
    /// One-line explanation shown to the user.
    pub description: &'static str,
}

/// Why a state transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TransitionReason {
    /// Smoothed trust crossed a state boundary.
    ThresholdCross,
    /// A tamper condition forced escalation.
    Tamper,
    /// `RESTRICT` was held past the escalation timeout.
    ForcedReauthTimeout,
    /// The user re-authenticated successfully.
    ManualReauth,
}

impl TransitionReason {
    /// Snake-case name used in logs and exports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ThresholdCross => "threshold_cross",
            Self::Tamper => "tamper",
            Self::ForcedReauthTimeout => "forced_reauth_timeout",
            Self::ManualReauth => "manual_reauth",
        }
    }
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable log entry for a single state change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct StateTransition {
    /// State before the transition.
    pub from: VerificationState,
    /// State after the transition.
    pub to: VerificationState,
    /// Milliseconds since session start.
    pub at_ms: u64,
    /// Smoothed trust on the tick that caused the transition.
    pub triggering_trust: TrustScore,
    /// What caused the transition.
    pub reason: TransitionReason,
}

impl StateTransition {
    /// Whether the transition moved to a more restrictive state.
    #[must_use]
    pub fn is_escalation(&self) -> bool {
        self.to > self.from
    }
}
