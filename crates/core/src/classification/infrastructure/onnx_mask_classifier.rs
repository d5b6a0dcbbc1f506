//! Mask classifier backed by an ONNX Runtime session via `ort`.
//!
//! The model takes a batch of RGB faces scaled to `[0, 1]` and emits one
//! sigmoid score per face (first column of the output), where high means
//! "mask worn".
use std::path::{Path, PathBuf};

use ndarray::Axis;
use thiserror::Error;

use crate::classification::domain::mask_classifier::{
    decide, Classification, MaskClassifier,
};
use crate::shared::tensor::FaceTensor;

use super::execution_provider::preferred_execution_providers;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("failed to load mask model {path}: {message}")]
    Load { path: PathBuf, message: String },
}

/// Memory layout the model expects for its input tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputLayout {
    /// `[N, H, W, C]`, as exported from Keras.
    Nhwc,
    /// `[N, C, H, W]`, as exported from PyTorch.
    Nchw,
}

pub struct OnnxMaskClassifier {
    session: Option<ort::session::Session>,
    layout: InputLayout,
    mask_threshold: f64,
}

impl OnnxMaskClassifier {
    /// A classifier with no model; call [`Self::load`] to activate it.
    pub fn new(mask_threshold: f64) -> Self {
        Self {
            session: None,
            layout: InputLayout::Nhwc,
            mask_threshold,
        }
    }

    /// Loads the model at `path`.
    ///
    /// A missing file is not an error: it is logged and `Ok(false)` is
    /// returned, leaving the classifier unavailable. A file that exists
    /// but cannot be loaded is an error.
    pub fn load(&mut self, path: &Path) -> Result<bool, ClassifierError> {
        if !path.exists() {
            log::warn!("Mask model not found: {}", path.display());
            return Ok(false);
        }

        let load_error = |e: &dyn std::fmt::Display| ClassifierError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        let session = ort::session::Session::builder()
            .map_err(|e| load_error(&e))?
            .with_execution_providers(preferred_execution_providers())
            .map_err(|e| load_error(&e))?
            .commit_from_file(path)
            .map_err(|e| load_error(&e))?;

        self.layout = detect_layout(&session);
        self.session = Some(session);
        log::info!(
            "Mask model loaded from {} ({:?} input)",
            path.display(),
            self.layout
        );
        Ok(true)
    }

    /// Convenience constructor: a classifier with the model at `path`
    /// already loaded (or unavailable if the file is missing).
    pub fn from_file(path: &Path, mask_threshold: f64) -> Result<Self, ClassifierError> {
        let mut classifier = Self::new(mask_threshold);
        classifier.load(path)?;
        Ok(classifier)
    }

    pub fn unload(&mut self) {
        self.session = None;
    }

    pub fn layout(&self) -> InputLayout {
        self.layout
    }

    fn run(
        session: &mut ort::session::Session,
        batch: FaceTensor,
        layout: InputLayout,
    ) -> Result<Vec<f64>, Box<dyn std::error::Error>> {
        let n = batch.len_of(Axis(0));
        let input = match layout {
            InputLayout::Nhwc => batch,
            InputLayout::Nchw => batch
                .permuted_axes([0, 3, 1, 2])
                .as_standard_layout()
                .into_owned(),
        };

        let input_value = ort::value::Tensor::from_array(input)?;
        let outputs = session.run(ort::inputs![input_value])?;
        let scores = outputs[0].try_extract_array::<f32>()?;
        let values: Vec<f32> = scores.iter().copied().collect();

        if n == 0 || values.len() < n {
            return Err(format!(
                "mask model returned {} values for a batch of {n}",
                values.len()
            )
            .into());
        }
        let stride = values.len() / n;
        Ok((0..n).map(|i| values[i * stride] as f64).collect())
    }
}

/// NCHW when the channel axis sits at position 1, NHWC otherwise.
fn detect_layout(session: &ort::session::Session) -> InputLayout {
    session
        .inputs()
        .first()
        .and_then(|input| {
            if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                if shape.len() == 4 && shape[1] == 3 && shape[3] != 3 {
                    Some(InputLayout::Nchw)
                } else {
                    None
                }
            } else {
                None
            }
        })
        .unwrap_or(InputLayout::Nhwc)
}

impl MaskClassifier for OnnxMaskClassifier {
    fn predict(&mut self, tensor: &FaceTensor) -> Result<Classification, Box<dyn std::error::Error>> {
        let Some(session) = self.session.as_mut() else {
            return Ok(Classification::unknown());
        };
        let scores = Self::run(session, tensor.clone(), self.layout)?;
        Ok(decide(scores[0], self.mask_threshold))
    }

    fn predict_batch(
        &mut self,
        tensors: &[FaceTensor],
    ) -> Result<Vec<Classification>, Box<dyn std::error::Error>> {
        let Some(session) = self.session.as_mut() else {
            return Ok(vec![Classification::unknown(); tensors.len()]);
        };
        if tensors.is_empty() {
            return Ok(Vec::new());
        }

        let views: Vec<_> = tensors.iter().map(|t| t.view()).collect();
        let batch = ndarray::concatenate(Axis(0), &views)?;
        let scores = Self::run(session, batch, self.layout)?;
        if scores.len() != tensors.len() {
            return Err(format!(
                "mask model returned {} scores for {} faces",
                scores.len(),
                tensors.len()
            )
            .into());
        }
        Ok(scores
            .into_iter()
            .map(|s| decide(s, self.mask_threshold))
            .collect())
    }

    fn is_available(&self) -> bool {
        self.session.is_some()
    }
}
