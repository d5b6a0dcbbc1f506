use std::fmt;

use serde::Serialize;

use crate::shared::tensor::FaceTensor;

/// Outcome of classifying one face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum MaskLabel {
    WithMask,
    NoMask,
    /// No model, or confidence below the acceptance threshold.
    Unknown,
}

impl MaskLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaskLabel::WithMask => "With Mask",
            MaskLabel::NoMask => "No Mask",
            MaskLabel::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for MaskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A label plus the confidence in *that label*, in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Classification {
    pub label: MaskLabel,
    pub confidence: f64,
}

impl Classification {
    pub fn new(label: MaskLabel, confidence: f64) -> Self {
        Self { label, confidence }
    }

    pub fn unknown() -> Self {
        Self::new(MaskLabel::Unknown, 0.0)
    }
}

/// Maps a raw mask score to a label.
///
/// Scores strictly above `mask_threshold` are `WithMask` with confidence
/// `score`; everything else is `NoMask` with confidence `1 - score`.
pub fn decide(score: f64, mask_threshold: f64) -> Classification {
    let s = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
    if s > mask_threshold {
        Classification::new(MaskLabel::WithMask, s)
    } else {
        Classification::new(MaskLabel::NoMask, 1.0 - s)
    }
}

/// Downgrades a low-confidence label to `Unknown`.
///
/// Returns the (possibly replaced) label and whether it was accepted.
pub fn validate(label: MaskLabel, confidence: f64, threshold: f64) -> (MaskLabel, bool) {
    if confidence < threshold {
        (MaskLabel::Unknown, false)
    } else {
        (label, true)
    }
}

/// Pluggable mask classifier.
///
/// An implementation without a loaded model must answer
/// [`Classification::unknown`] for every input rather than fail.
pub trait MaskClassifier: Send {
    fn predict(&mut self, tensor: &FaceTensor) -> Result<Classification, Box<dyn std::error::Error>>;

    /// Classifies several faces at once. The result has one entry per
    /// input, in input order.
    fn predict_batch(
        &mut self,
        tensors: &[FaceTensor],
    ) -> Result<Vec<Classification>, Box<dyn std::error::Error>> {
        tensors.iter().map(|t| self.predict(t)).collect()
    }

    fn is_available(&self) -> bool;
}

/// Classifier with no model. Every face is `Unknown`.
pub struct UnavailableClassifier;

impl MaskClassifier for UnavailableClassifier {
    fn predict(&mut self, _tensor: &FaceTensor) -> Result<Classification, Box<dyn std::error::Error>> {
        Ok(Classification::unknown())
    }

    fn is_available(&self) -> bool {
        false
    }
}
