//! Fuzz target: fused trust stays in `[0, 1]`.
//!
//! Interprets the input as three weights and three scores.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vigil_core::{FusionEngine, FusionWeights, TrustScore};

fn unit(byte: u8) -> f64 {
    f64::from(byte) / 255.0
}

fuzz_target!(|data: [u8; 6]| {
    let [a, b, c, face, liveness, behavior] = data.map(unit);
    let total = a + b + c;
    if total == 0.0 {
        return;
    }
    let Ok(engine) = FusionEngine::new(FusionWeights::new(a / total, b / total, c / total)) else {
        return;
    };
    let fused = engine.fuse(
        TrustScore::saturating(face),
        TrustScore::saturating(liveness),
        TrustScore::saturating(behavior),
    );
    assert!((0.0..=1.0).contains(&fused.value()), "fused trust {fused} out of range");
});
