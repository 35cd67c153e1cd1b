//! Scenario results, trajectory digests and the security report.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use vigil_core::{StateTransition, TrustSample, VerificationState};

/// SHA-256 over a scenario's transitions.
///
/// `D = SHA-256(from,to,at_ms,reason\n …)` in transition order. Two runs of
/// the same script must produce the same digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrajectoryDigest([u8; 32]);

impl TrajectoryDigest {
    #[must_use]
    pub fn compute(transitions: &[StateTransition]) -> Self {
        let mut hasher = Sha256::new();
        for t in transitions {
            hasher.update(format!("{},{},{},{}\n", t.from, t.to, t.at_ms, t.reason).as_bytes());
        }
        Self(hasher.finalize().into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TrajectoryDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl Serialize for TrajectoryDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// How a scenario run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Ran for its full duration.
    Completed,
    /// Stopped early through [`crate::HarnessControl::stop`] or a session stop.
    Aborted,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

/// Outcome of one scenario.
///
/// Every `at_ms` in `transitions` and `trust_history` is scenario time
/// (session time minus pauses).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct ScenarioResult {
    pub scenario: String,
    pub expected_state: VerificationState,
    pub final_state: VerificationState,
    pub success: bool,
    pub status: RunStatus,
    pub duration_ms: u64,
    pub transitions: Vec<StateTransition>,
    pub trust_history: Vec<TrustSample>,
    pub trajectory_digest: TrajectoryDigest,
}

impl ScenarioResult {
    pub(crate) fn new(
        scenario: String,
        expected_state: VerificationState,
        status: RunStatus,
        duration_ms: u64,
        transitions: Vec<StateTransition>,
        trust_history: Vec<TrustSample>,
    ) -> Self {
        let final_state = transitions.last().map_or(VerificationState::Normal, |t| t.to);
        Self {
            scenario,
            expected_state,
            final_state,
            success: status == RunStatus::Completed && final_state == expected_state,
            status,
            duration_ms,
            trajectory_digest: TrajectoryDigest::compute(&transitions),
            transitions,
            trust_history,
        }
    }

    /// State in force at scenario time `at_ms`.
    #[must_use]
    pub fn state_at(&self, at_ms: u64) -> VerificationState {
        self.transitions
            .iter()
            .take_while(|t| t.at_ms <= at_ms)
            .last()
            .map_or(VerificationState::Normal, |t| t.to)
    }

    /// Lowest smoothed trust seen.
    #[must_use]
    pub fn min_trust(&self) -> Option<f64> {
        self.trust_history.iter().map(|s| s.smoothed.value()).reduce(f64::min)
    }
}

/// Counts of escalation predictions against expectations.
///
/// Positive means "escalated": any state other than `NORMAL`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub tp: u32,
    pub fp: u32,
    pub tn: u32,
    #[serde(rename = "fn")]
    pub fn_: u32,
}

impl ConfusionMatrix {
    /// Tally completed results; aborted runs are not counted.
    #[must_use]
    pub fn from_results(results: &[ScenarioResult]) -> Self {
        results.iter().filter(|r| r.status == RunStatus::Completed).fold(Self::default(), |mut m, r| {
            match (r.expected_state.is_escalated(), r.final_state.is_escalated()) {
                (true, true) => m.tp += 1,
                (false, true) => m.fp += 1,
                (false, false) => m.tn += 1,
                (true, false) => m.fn_ += 1,
            }
            m
        })
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.tp + self.fp + self.tn + self.fn_
    }

    #[must_use]
    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    #[must_use]
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    #[must_use]
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    #[must_use]
    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r <= 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        f64::from(numerator) / f64::from(denominator)
    }
}

/// Letter grade for a suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Self::A
        } else if score >= 0.8 {
            Self::B
        } else if score >= 0.7 {
            Self::C
        } else if score >= 0.6 {
            Self::D
        } else {
            Self::F
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Aggregate evaluation of a scenario suite.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct SecurityReport {
    pub generated_at: DateTime<Utc>,
    pub confusion_matrix: ConfusionMatrix,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub grade: Grade,
    /// Whether the suite was stopped before every scenario ran.
    pub aborted: bool,
    pub results: Vec<ScenarioResult>,
}

impl SecurityReport {
    /// Score a set of results.
    ///
    /// The grade uses F1 when any scenario expects escalation, accuracy
    /// otherwise.
    #[must_use]
    pub fn from_results(results: Vec<ScenarioResult>, aborted: bool) -> Self {
        let m = ConfusionMatrix::from_results(&results);
        let graded_on = if m.tp + m.fn_ > 0 { m.f1() } else { m.accuracy() };
        Self {
            generated_at: Utc::now(),
            confusion_matrix: m,
            accuracy: m.accuracy(),
            precision: m.precision(),
            recall: m.recall(),
            f1: m.f1(),
            grade: Grade::from_score(graded_on),
            aborted,
            results,
        }
    }

    #[must_use]
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }
}
