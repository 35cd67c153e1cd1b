//! Scenario scripts: timed modality sequences and expectations.

use serde::{Deserialize, Serialize};
use vigil_core::{ModalityKind, VerificationState};

use crate::HarnessError;

/// A stretch of constant modality readings.
///
/// `None` means the modality is unavailable for the whole segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScriptSegment {
    pub duration_ms: u64,
    pub face: Option<f64>,
    pub liveness: Option<f64>,
    pub behavior: Option<f64>,
}

impl ScriptSegment {
    /// All three modalities available with the given values.
    #[must_use]
    pub const fn steady(duration_ms: u64, face: f64, liveness: f64, behavior: f64) -> Self {
        Self { duration_ms, face: Some(face), liveness: Some(liveness), behavior: Some(behavior) }
    }

    #[must_use]
    pub fn value(&self, kind: ModalityKind) -> Option<f64> {
        match kind {
            ModalityKind::Face => self.face,
            ModalityKind::Liveness => self.liveness,
            ModalityKind::Behavior => self.behavior,
        }
    }
}

/// Segment active at `offset_ms`; the last segment holds past the end.
#[must_use]
pub fn segment_at(segments: &[ScriptSegment], offset_ms: u64) -> Option<&ScriptSegment> {
    let mut end = 0u64;
    for segment in segments {
        end = end.saturating_add(segment.duration_ms);
        if offset_ms < end {
            return Some(segment);
        }
    }
    segments.last()
}

/// A scripted re-authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedReauth {
    /// Scenario time of the attempt.
    pub at_ms: u64,
    /// Outcome reported by the out-of-band flow.
    pub succeeds: bool,
}

/// Where a scenario's readings come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScenarioInput {
    /// Injected synthetic sequence.
    Scripted { segments: Vec<ScriptSegment>, reauth: Option<ScriptedReauth> },
    /// Real providers supplied by the caller.
    Live,
}

/// A named scenario with the state it must end in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioScript {
    pub name: String,
    pub description: String,
    pub duration_sec: u64,
    pub expected_state: VerificationState,
    pub input: ScenarioInput,
}

impl ScenarioScript {
    /// A scripted scenario without re-authentication.
    pub fn scripted(
        name: impl Into<String>,
        description: impl Into<String>,
        duration_sec: u64,
        expected_state: VerificationState,
        segments: Vec<ScriptSegment>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            duration_sec,
            expected_state,
            input: ScenarioInput::Scripted { segments, reauth: None },
        }
    }

    /// A scenario fed by real providers.
    pub fn live(
        name: impl Into<String>,
        description: impl Into<String>,
        duration_sec: u64,
        expected_state: VerificationState,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            duration_sec,
            expected_state,
            input: ScenarioInput::Live,
        }
    }

    /// Add a scripted re-authentication; ignored for live scenarios.
    #[must_use]
    pub fn with_reauth(mut self, at_ms: u64, succeeds: bool) -> Self {
        if let ScenarioInput::Scripted { reauth, .. } = &mut self.input {
            *reauth = Some(ScriptedReauth { at_ms, succeeds });
        }
        self
    }

    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.duration_sec.saturating_mul(1_000)
    }

    #[must_use]
    pub fn scripted_reauth(&self) -> Option<ScriptedReauth> {
        match &self.input {
            ScenarioInput::Scripted { reauth, .. } => *reauth,
            ScenarioInput::Live => None,
        }
    }

    /// Check the script can be run.
    ///
    /// # Errors
    /// Returns [`HarnessError::InvalidScript`] for a zero duration, an empty
    /// or zero-length segment list, a reading outside `[0, 1]`, or a
    /// re-authentication scheduled after the end.
    pub fn validate(&self) -> Result<(), HarnessError> {
        let invalid = |reason: String| HarnessError::InvalidScript { name: self.name.clone(), reason };
        if self.duration_sec == 0 {
            return Err(invalid("duration must be positive".to_owned()));
        }
        let ScenarioInput::Scripted { segments, reauth } = &self.input else {
            return Ok(());
        };
        if segments.is_empty() {
            return Err(invalid("scripted input needs at least one segment".to_owned()));
        }
        for (i, segment) in segments.iter().enumerate() {
            if segment.duration_ms == 0 {
                return Err(invalid(format!("segment {i} has zero duration")));
            }
            for kind in ModalityKind::ALL {
                if let Some(value) = segment.value(kind) {
                    if !(0.0..=1.0).contains(&value) {
                        return Err(invalid(format!("segment {i} {kind} value {value} outside [0, 1]")));
                    }
                }
            }
        }
        if let Some(reauth) = reauth {
            if reauth.at_ms >= self.duration_ms() {
                return Err(invalid(format!("re-authentication at {}ms is after the end", reauth.at_ms)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments() -> Vec<ScriptSegment> {
        vec![
            ScriptSegment::steady(5_000, 0.9, 0.9, 0.9),
            ScriptSegment { duration_ms: 5_000, face: None, liveness: None, behavior: Some(0.9) },
        ]
    }

    #[test]
    fn segment_at_walks_cumulative_durations() {
        let segs = segments();
        assert_eq!(segment_at(&segs, 0).and_then(|s| s.face), Some(0.9));
        assert_eq!(segment_at(&segs, 4_999).and_then(|s| s.face), Some(0.9));
        assert_eq!(segment_at(&segs, 5_000).and_then(|s| s.face), None);
        assert_eq!(segment_at(&segs, 99_000).map(|s| s.behavior), Some(Some(0.9)), "last segment holds");
        assert!(segment_at(&[], 0).is_none());
    }

    #[test]
    fn validate_rejects_out_of_range_reading() {
        let script = ScenarioScript::scripted(
            "bad",
            "",
            10,
            VerificationState::Normal,
            vec![ScriptSegment::steady(1_000, 1.5, 0.9, 0.9)],
        );
        assert!(matches!(script.validate(), Err(HarnessError::InvalidScript { .. })));
    }

    #[test]
    fn validate_rejects_reauth_after_end() {
        let script = ScenarioScript::scripted("late", "", 10, VerificationState::Normal, segments())
            .with_reauth(10_000, true);
        assert!(script.validate().is_err());
    }

    #[test]
    fn live_script_needs_no_segments() {
        let script = ScenarioScript::live("camera", "", 30, VerificationState::Normal).with_reauth(1_000, true);
        assert!(script.validate().is_ok());
        assert_eq!(script.scripted_reauth(), None, "reauth only applies to scripted input");
    }

    #[test]
    fn script_round_trips_through_json() {
        let script = ScenarioScript::scripted("drift", "behaviour drift", 30, VerificationState::Watch, segments())
            .with_reauth(2_000, false);
        let json = match serde_json::to_string(&script) {
            Ok(j) => j,
            Err(e) => panic!("serialize failed: {e}"),
        };
        let back: ScenarioScript = match serde_json::from_str(&json) {
            Ok(s) => s,
            Err(e) => panic!("deserialize failed: {e}"),
        };
        assert_eq!(back, script);
    }
}
