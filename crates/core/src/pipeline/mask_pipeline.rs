use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::classification::domain::mask_classifier::{validate, MaskClassifier, MaskLabel};
use crate::detection::domain::face_geometry::{extract_roi, preprocess};
use crate::detection::domain::face_locator::FaceLocator;
use crate::monitoring::domain::alert_manager::AlertManager;
use crate::monitoring::domain::stats_tracker::{StatisticsSnapshot, StatsTracker};
use crate::monitoring::domain::violation_log::{LogOutcome, ViolationLogError, ViolationLogger};
use crate::overlay::annotator::{draw_alerts, draw_face, draw_info_panel, InfoPanel};
use crate::shared::clock::Clock;
use crate::shared::config::MonitorConfig;
use crate::shared::constants::ALERT_MESSAGE;
use crate::shared::frame::Frame;
use crate::shared::region::FaceRegion;

use super::pipeline_logger::{NullPipelineLogger, PipelineLogger};

/// Per-frame tunables taken from [`MonitorConfig`].
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    pub confidence_threshold: f64,
    pub input_size: (u32, u32),
    pub min_size: (u32, u32),
    pub alerts_enabled: bool,
    /// When off, violations are neither written nor counted.
    pub logging_enabled: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            confidence_threshold: config.thresholds.confidence_threshold,
            input_size: config.model.input_size,
            min_size: config.detection.min_size,
            alerts_enabled: config.alerts.alerts_enabled,
            logging_enabled: config.alerts.logging_enabled,
        }
    }
}

/// What the pipeline concluded about one classified face.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FaceObservation {
    pub region: FaceRegion,
    pub label: MaskLabel,
    pub confidence: f64,
    /// Whether the label cleared the confidence threshold.
    pub accepted: bool,
}

pub struct FrameReport {
    pub frame: Frame,
    pub stats: StatisticsSnapshot,
    pub faces: Vec<FaceObservation>,
}

/// Per-frame orchestration: locate, classify, record, annotate.
///
/// Owns every piece of cross-frame state (cooldowns, alerts, counters) for
/// one monitoring session.
pub struct MaskPipeline {
    locator: Box<dyn FaceLocator>,
    classifier: Box<dyn MaskClassifier>,
    violations: ViolationLogger,
    alerts: AlertManager,
    stats: StatsTracker,
    settings: PipelineSettings,
    clock: Arc<dyn Clock>,
    logger: Box<dyn PipelineLogger>,
}

impl MaskPipeline {
    pub fn new(
        locator: Box<dyn FaceLocator>,
        classifier: Box<dyn MaskClassifier>,
        violations: ViolationLogger,
        alerts: AlertManager,
        settings: PipelineSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let stats = StatsTracker::new(clock.now());
        Self {
            locator,
            classifier,
            violations,
            alerts,
            stats,
            settings,
            clock,
            logger: Box::new(NullPipelineLogger),
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Runs one frame through the pipeline and returns it annotated.
    ///
    /// Never fails: detection, preprocessing and classification errors are
    /// logged and the affected face (or all faces, for detection) skipped.
    pub fn process_frame(&mut self, mut frame: Frame) -> FrameReport {
        let t0 = Instant::now();
        let regions = match self.locator.detect(&frame) {
            Ok(regions) => regions,
            Err(e) => {
                log::error!("Face detection failed on frame {}: {e}", frame.index());
                Vec::new()
            }
        };
        self.logger
            .timing("detect", t0.elapsed().as_secs_f64() * 1000.0);
        self.logger.metric("faces", regions.len() as f64);

        let t1 = Instant::now();
        let (fw, fh) = frame.bounds();
        let mut faces = Vec::with_capacity(regions.len());
        for region in regions {
            if !region.is_valid(fw, fh, self.settings.min_size) {
                continue;
            }
            if let Some(observation) = self.classify_face(&frame, region) {
                draw_face(
                    &mut frame,
                    &observation.region,
                    observation.label,
                    observation.confidence,
                );
                faces.push(observation);
            }
        }
        self.logger
            .timing("classify", t1.elapsed().as_secs_f64() * 1000.0);

        let t2 = Instant::now();
        draw_alerts(&mut frame, &self.alerts.active_snapshot());
        self.alerts.cleanup_expired();

        let now = self.clock.now();
        let stats = self.stats.snapshot(now);
        self.stats.frame_processed();
        draw_info_panel(
            &mut frame,
            &InfoPanel {
                fps: stats.fps,
                violations: stats.violations,
                model_active: self.classifier.is_available(),
                time: self.clock.local_now(),
            },
        );
        self.logger
            .timing("annotate", t2.elapsed().as_secs_f64() * 1000.0);
        self.logger.frame_done();

        FrameReport {
            frame,
            stats,
            faces,
        }
    }

    fn classify_face(&mut self, frame: &Frame, region: FaceRegion) -> Option<FaceObservation> {
        let roi = extract_roi(frame, &region);
        let Some(tensor) = preprocess(&roi, self.settings.input_size) else {
            log::warn!("Skipping face at {region:?}: empty region of interest");
            return None;
        };
        let result = match self.classifier.predict(&tensor) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Classification failed for face at {region:?}: {e}");
                return None;
            }
        };

        let (label, accepted) = validate(
            result.label,
            result.confidence,
            self.settings.confidence_threshold,
        );
        if accepted {
            self.stats.record(label);
        }
        if label == MaskLabel::NoMask {
            self.report_violation(&region, result.confidence);
        }

        Some(FaceObservation {
            region,
            label,
            confidence: result.confidence,
            accepted,
        })
    }

    fn report_violation(&mut self, region: &FaceRegion, confidence: f64) {
        let center = region.center();
        if self.settings.logging_enabled {
            let outcome =
                self.violations
                    .log_violation(MaskLabel::NoMask.as_str(), confidence, center, None);
            if outcome == LogOutcome::Written {
                self.stats.record_violation();
            }
        }
        if self.settings.alerts_enabled {
            let id = format!("face_{}_{}", center.0, center.1);
            self.alerts.trigger(&id, ALERT_MESSAGE);
        }
    }

    /// Starts a fresh session: zeroed counters, FPS origin at now, no
    /// alerts or cooldowns carried over.
    pub fn reset_session(&mut self) {
        self.stats.reset(self.clock.now());
        self.alerts.reset();
        self.violations.reset_cooldowns();
    }

    pub fn install_classifier(&mut self, classifier: Box<dyn MaskClassifier>) {
        self.classifier = classifier;
        log::info!(
            "Classifier installed (model {})",
            if self.classifier.is_available() { "active" } else { "inactive" }
        );
    }

    pub fn model_available(&self) -> bool {
        self.classifier.is_available()
    }

    pub fn stats(&self) -> StatisticsSnapshot {
        self.stats.snapshot(self.clock.now())
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.alerts
    }

    pub fn violation_count_since(&self, hours: f64) -> Result<usize, ViolationLogError> {
        self.violations.count_since(hours)
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn log_summary(&self) {
        self.logger.summary();
    }
}
