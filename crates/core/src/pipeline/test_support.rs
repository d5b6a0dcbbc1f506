//! Stub collaborators shared by the pipeline and session tests.
use std::sync::Arc;
use std::time::Duration;

use crate::classification::domain::mask_classifier::{Classification, MaskClassifier, MaskLabel};
use crate::detection::domain::face_locator::FaceLocator;
use crate::monitoring::domain::alert_manager::AlertManager;
use crate::monitoring::domain::violation_log::ViolationLogger;
use crate::monitoring::infrastructure::memory_violation_store::MemoryViolationStore;
use crate::pipeline::mask_pipeline::{MaskPipeline, PipelineSettings};
use crate::shared::clock::{Clock, ManualClock};
use crate::shared::frame::Frame;
use crate::shared::region::FaceRegion;
use crate::shared::tensor::FaceTensor;

/// Reports the same regions for every frame.
pub struct FixedLocator(pub Vec<FaceRegion>);

impl FaceLocator for FixedLocator {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceRegion>, Box<dyn std::error::Error>> {
        Ok(self.0.clone())
    }
}

pub struct FailingLocator;

impl FaceLocator for FailingLocator {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceRegion>, Box<dyn std::error::Error>> {
        Err("detector crashed".into())
    }
}

/// Answers a fixed sequence of results, repeating the last one.
pub struct ScriptedClassifier {
    pub answers: Vec<Result<Classification, String>>,
    pub calls: usize,
}

impl ScriptedClassifier {
    pub fn always(label: MaskLabel, confidence: f64) -> Self {
        Self {
            answers: vec![Ok(Classification::new(label, confidence))],
            calls: 0,
        }
    }
}

impl MaskClassifier for ScriptedClassifier {
    fn predict(&mut self, _tensor: &FaceTensor) -> Result<Classification, Box<dyn std::error::Error>> {
        let i = self.calls.min(self.answers.len() - 1);
        self.calls += 1;
        self.answers[i].clone().map_err(|e| e.into())
    }

    fn is_available(&self) -> bool {
        true
    }
}

pub struct Harness {
    pub pipeline: MaskPipeline,
    pub clock: Arc<ManualClock>,
    pub store: MemoryViolationStore,
}

pub fn harness(
    locator: Box<dyn FaceLocator>,
    classifier: Box<dyn MaskClassifier>,
    settings: PipelineSettings,
) -> Harness {
    let clock = Arc::new(ManualClock::default());
    let store = MemoryViolationStore::new();
    let shared_clock: Arc<dyn Clock> = clock.clone();
    let violations = ViolationLogger::new(
        Box::new(store.clone()),
        Duration::from_secs(5),
        shared_clock.clone(),
    );
    let alerts = AlertManager::new(Duration::from_secs(3), shared_clock.clone());
    let pipeline = MaskPipeline::new(locator, classifier, violations, alerts, settings, shared_clock);
    Harness {
        pipeline,
        clock,
        store,
    }
}

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        confidence_threshold: 0.5,
        input_size: (32, 32),
        min_size: (30, 30),
        alerts_enabled: true,
        logging_enabled: true,
    }
}
