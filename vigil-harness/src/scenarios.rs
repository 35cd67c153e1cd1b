//! The canonical scenario suite.
//!
//! Five scripted sessions covering the owner at rest, a behavioural drift, a
//! face mismatch, a covered camera and a full re-authentication recovery.

use vigil_core::VerificationState;

use crate::script::{ScenarioScript, ScriptSegment};

/// Typical owner readings: face 0.95, liveness 0.9, behaviour 0.9.
const OWNER: (f64, f64, f64) = (0.95, 0.9, 0.9);

fn owner(duration_ms: u64) -> ScriptSegment {
    ScriptSegment::steady(duration_ms, OWNER.0, OWNER.1, OWNER.2)
}

/// Returns the five canonical scenarios in run order.
#[must_use]
pub fn canonical_suite() -> Vec<ScenarioScript> {
    vec![
        ScenarioScript::scripted(
            "steady-owner",
            "Enrolled owner present and behaving normally for a minute.",
            60,
            VerificationState::Normal,
            vec![owner(60_000)],
        ),
        ScenarioScript::scripted(
            "behavior-drift",
            "Face and liveness match but typing and pointer behaviour drop to 0.2.",
            30,
            VerificationState::Watch,
            vec![ScriptSegment::steady(30_000, OWNER.0, OWNER.1, 0.2)],
        ),
        ScenarioScript::scripted(
            "face-mismatch",
            "A different person sits down: face similarity 0.0, liveness and behaviour unchanged.",
            30,
            VerificationState::Reauth,
            vec![ScriptSegment::steady(30_000, 0.0, OWNER.1, OWNER.2)],
        ),
        ScenarioScript::scripted(
            "camera-covered",
            "Five seconds of normal use, then the camera is covered for twenty.",
            25,
            VerificationState::Restrict,
            vec![
                owner(5_000),
                ScriptSegment { duration_ms: 20_000, face: None, liveness: None, behavior: Some(OWNER.2) },
            ],
        ),
        ScenarioScript::scripted(
            "reauth-recovery",
            "Trust collapses to REAUTH, the owner re-authenticates at 10s and stays stable.",
            35,
            VerificationState::Normal,
            vec![ScriptSegment::steady(10_000, 0.1, 0.1, 0.1), owner(25_000)],
        )
        .with_reauth(10_000, true),
    ]
}
