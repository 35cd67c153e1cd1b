//! Multi-modal score fusion.
//!
//! `fused = w_face·face + w_liveness·liveness + w_behavior·behavior`, clamped
//! to `[0, 1]`. Unavailable modalities are filled from a [`ModalityHold`] so a
//! momentary dropout neither spikes nor collapses trust; the dropout shows up
//! as reduced [`Fused::confidence`] instead.

use crate::config::FusionWeights;
use crate::error::CoreError;
use crate::trust::{ModalityKind, ModalityScore, TrustScore};

/// Validated fusion weights.
///
/// Construction fails if the weights are invalid; there is no normalising
/// fallback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionEngine {
    weights: FusionWeights,
}

impl FusionEngine {
    /// Create a fusion engine from validated weights.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidWeights`] if the weights do not sum to 1.0
    /// within tolerance or any weight is negative or non-finite.
    pub fn new(weights: FusionWeights) -> Result<Self, CoreError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    /// The weights in use.
    #[must_use]
    pub fn weights(&self) -> FusionWeights {
        self.weights
    }

    /// Weight assigned to a modality.
    #[must_use]
    pub fn weight(&self, kind: ModalityKind) -> f64 {
        match kind {
            ModalityKind::Face => self.weights.face,
            ModalityKind::Liveness => self.weights.liveness,
            ModalityKind::Behavior => self.weights.behavior,
        }
    }

    /// Weighted combination of three scores, clamped to `[0, 1]`.
    #[must_use]
    pub fn fuse(&self, face: TrustScore, liveness: TrustScore, behavior: TrustScore) -> TrustScore {
        let sum = self.weights.face * face.value()
            + self.weights.liveness * liveness.value()
            + self.weights.behavior * behavior.value();
        TrustScore::saturating(sum)
    }

    /// Fuse scores that have already been resolved through a [`ModalityHold`].
    ///
    /// `confidence` is the weight mass of the modalities that were fresh.
    #[must_use]
    pub fn fuse_resolved(&self, resolved: &[ModalityScore; 3]) -> Fused {
        let [face, liveness, behavior] = resolved;
        let confidence = resolved
            .iter()
            .filter(|score| score.available)
            .map(|score| self.weight(score.kind))
            .sum::<f64>()
            .clamp(0.0, 1.0);
        Fused { value: self.fuse(face.value, liveness.value, behavior.value), confidence }
    }
}

/// Output of [`FusionEngine::fuse_resolved`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fused {
    /// Fused trust for this tick.
    pub value: TrustScore,
    /// Weight mass of fresh modalities, in `[0, 1]`.
    pub confidence: f64,
}

/// Remembers the last fresh value of each modality.
///
/// Before any fresh sample the held value is `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModalityHold {
    face: Option<TrustScore>,
    liveness: Option<TrustScore>,
    behavior: Option<TrustScore>,
}

impl ModalityHold {
    /// Create an empty hold.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, kind: ModalityKind) -> &mut Option<TrustScore> {
        match kind {
            ModalityKind::Face => &mut self.face,
            ModalityKind::Liveness => &mut self.liveness,
            ModalityKind::Behavior => &mut self.behavior,
        }
    }

    /// Record fresh readings and substitute held values for missing ones.
    ///
    /// The returned scores keep their `available` flag; unavailable entries
    /// carry the held value.
    pub fn resolve(&mut self, readings: [ModalityScore; 3]) -> [ModalityScore; 3] {
        readings.map(|score| {
            let slot = self.slot(score.kind);
            if score.available {
                *slot = Some(score.value);
                score
            } else {
                ModalityScore { value: slot.unwrap_or(TrustScore::MIN), ..score }
            }
        })
    }

    /// Forget all held values.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
