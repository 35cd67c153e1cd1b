//! JSON and CSV export of evaluation results.

use std::path::{Path, PathBuf};

use serde::Serialize;
use vigil_core::ModalityScore;

use crate::report::{ScenarioResult, SecurityReport};
use crate::HarnessError;

/// One row per scenario.
#[derive(Debug, Serialize)]
struct ResultRow<'a> {
    scenario: &'a str,
    expected_state: &'static str,
    final_state: &'static str,
    success: bool,
    status: &'static str,
    duration_ms: u64,
    transitions: usize,
    min_trust: Option<f64>,
    trajectory_digest: String,
}

/// One row per recorded sample.
#[derive(Debug, Serialize)]
struct TrajectoryRow<'a> {
    scenario: &'a str,
    at_ms: u64,
    face: Option<f64>,
    liveness: Option<f64>,
    behavior: Option<f64>,
    raw_fused: f64,
    smoothed: f64,
    confidence: f64,
    state: &'static str,
}

fn reading(score: &ModalityScore) -> Option<f64> {
    score.available.then(|| score.value.value())
}

/// Pretty-printed JSON of any report value.
///
/// # Errors
/// Returns [`HarnessError::Json`] if serialization fails.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, HarnessError> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Scenario summary table with a header row.
///
/// # Errors
/// Returns [`HarnessError::Csv`] or [`HarnessError::Io`] if writing fails.
pub fn to_csv(results: &[ScenarioResult]) -> Result<String, HarnessError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for r in results {
        writer.serialize(ResultRow {
            scenario: &r.scenario,
            expected_state: r.expected_state.as_str(),
            final_state: r.final_state.as_str(),
            success: r.success,
            status: r.status.as_str(),
            duration_ms: r.duration_ms,
            transitions: r.transitions.len(),
            min_trust: r.min_trust(),
            trajectory_digest: r.trajectory_digest.to_string(),
        })?;
    }
    finish(writer)
}

/// Every recorded sample of every scenario, with the state in force at it.
///
/// Unavailable modalities are written as empty fields.
///
/// # Errors
/// Returns [`HarnessError::Csv`] or [`HarnessError::Io`] if writing fails.
pub fn trajectory_csv(results: &[ScenarioResult]) -> Result<String, HarnessError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for r in results {
        for sample in &r.trust_history {
            writer.serialize(TrajectoryRow {
                scenario: &r.scenario,
                at_ms: sample.at_ms,
                face: reading(&sample.face),
                liveness: reading(&sample.liveness),
                behavior: reading(&sample.behavior),
                raw_fused: sample.raw_fused.value(),
                smoothed: sample.smoothed.value(),
                confidence: sample.confidence,
                state: r.state_at(sample.at_ms).as_str(),
            })?;
        }
    }
    finish(writer)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, HarnessError> {
    let bytes = writer.into_inner().map_err(|e| HarnessError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| HarnessError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

/// Write `report.json`, `results.csv` and `trajectory.csv` into `dir`.
///
/// Creates `dir` if needed and returns the written paths.
///
/// # Errors
/// Returns the first serialization or I/O failure.
pub fn export_report(report: &SecurityReport, dir: &Path) -> Result<Vec<PathBuf>, HarnessError> {
    std::fs::create_dir_all(dir)?;
    let files = [
        ("report.json", to_json(report)?),
        ("results.csv", to_csv(&report.results)?),
        ("trajectory.csv", trajectory_csv(&report.results)?),
    ];
    let mut written = Vec::with_capacity(files.len());
    for (name, contents) in files {
        let path = dir.join(name);
        std::fs::write(&path, contents)?;
        written.push(path);
    }
    tracing::info!(dir = %dir.display(), grade = %report.grade, "evaluation report exported");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use vigil_core::{EngineConfig, ModalityKind, TrustEngine, TrustScore, VerificationState};

    use super::*;
    use crate::report::RunStatus;

    fn readings(face: Option<f64>, at_ms: u64) -> [ModalityScore; 3] {
        let face = match face {
            Some(v) => ModalityScore::observed(ModalityKind::Face, TrustScore::saturating(v), at_ms),
            None => ModalityScore::unavailable(ModalityKind::Face, at_ms),
        };
        [
            face,
            ModalityScore::observed(ModalityKind::Liveness, TrustScore::saturating(0.9), at_ms),
            ModalityScore::observed(ModalityKind::Behavior, TrustScore::saturating(0.2), at_ms),
        ]
    }

    /// Two ticks of behavioural drift, the second with the camera dark.
    fn result() -> ScenarioResult {
        let mut engine = match TrustEngine::new(EngineConfig::default()) {
            Ok(e) => e,
            Err(e) => panic!("default config must be valid: {e}"),
        };
        engine.tick(readings(Some(0.95), 0), 0);
        engine.tick(readings(None, 500), 500);
        ScenarioResult::new(
            "drift".to_owned(),
            VerificationState::Watch,
            RunStatus::Completed,
            1_000,
            engine.transitions(),
            engine.history(),
        )
    }

    #[test]
    fn results_csv_has_header_and_one_row_per_scenario() {
        let csv = match to_csv(&[result()]) {
            Ok(c) => c,
            Err(e) => panic!("export failed: {e}"),
        };
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 2, "header plus one row: {csv}");
        assert!(lines[0].starts_with("scenario,expected_state,final_state,success"));
        assert!(lines[1].starts_with("drift,WATCH,WATCH,true,completed,1000,1,"), "got {}", lines[1]);
    }

    #[test]
    fn trajectory_csv_blanks_unavailable_modalities() {
        let csv = match trajectory_csv(&[result()]) {
            Ok(c) => c,
            Err(e) => panic!("export failed: {e}"),
        };
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 3, "header plus two samples: {csv}");
        assert!(lines[1].starts_with("drift,0,0.95,0.9,0.2,"), "got {}", lines[1]);
        assert!(lines[2].starts_with("drift,500,,0.9,0.2,"), "face unavailable: {}", lines[2]);
        assert!(lines[2].ends_with(",WATCH"));
    }

    #[test]
    fn export_report_writes_three_files() {
        let dir = std::env::temp_dir().join(format!("vigil-export-{}", uuid::Uuid::new_v4()));
        let report = SecurityReport::from_results(vec![result()], false);
        let written = match export_report(&report, &dir) {
            Ok(w) => w,
            Err(e) => panic!("export failed: {e}"),
        };
        assert_eq!(written.len(), 3);
        for path in &written {
            assert!(path.exists(), "{} missing", path.display());
        }
        let json = match std::fs::read_to_string(dir.join("report.json")) {
            Ok(j) => j,
            Err(e) => panic!("read failed: {e}"),
        };
        assert!(json.contains("\"grade\": \"A\""), "got {json}");
        assert!(json.contains("\"fn\": 0"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
