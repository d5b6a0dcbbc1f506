use std::sync::{Arc, Mutex, MutexGuard};

use crate::classification::domain::mask_classifier::MaskClassifier;
use crate::monitoring::domain::stats_tracker::StatisticsSnapshot;
use crate::shared::frame::Frame;

use super::mask_pipeline::{FrameReport, MaskPipeline};

/// A [`MaskPipeline`] that many threads can feed frames to.
///
/// Each frame is processed under one lock, so the cooldown check and the
/// log append (and the alert check and trigger) are never interleaved
/// between callers.
#[derive(Clone)]
pub struct SharedPipeline {
    inner: Arc<Mutex<MaskPipeline>>,
}

impl SharedPipeline {
    pub fn new(pipeline: MaskPipeline) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pipeline)),
        }
    }

    pub fn process_frame(&self, frame: Frame) -> FrameReport {
        self.lock().process_frame(frame)
    }

    pub fn stats(&self) -> StatisticsSnapshot {
        self.lock().stats()
    }

    pub fn model_available(&self) -> bool {
        self.lock().model_available()
    }

    pub fn install_classifier(&self, classifier: Box<dyn MaskClassifier>) {
        self.lock().install_classifier(classifier);
    }

    pub fn reset_session(&self) {
        self.lock().reset_session();
    }

    fn lock(&self) -> MutexGuard<'_, MaskPipeline> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::domain::mask_classifier::MaskLabel;
    use crate::pipeline::test_support::*;
    use crate::shared::region::FaceRegion;

    #[test]
    fn test_concurrent_callers_log_one_violation() {
        let h = harness(
            Box::new(FixedLocator(vec![FaceRegion::new(100, 100, 80, 80)])),
            Box::new(ScriptedClassifier::always(MaskLabel::NoMask, 0.9)),
            settings(),
        );
        let shared = SharedPipeline::new(h.pipeline);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    shared.process_frame(Frame::filled(640, 480, [90, 90, 90], i));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = shared.stats();
        assert_eq!(stats.unmasked_faces, 8);
        assert_eq!(stats.violations, 1);
        assert_eq!(h.store.len(), 1);
    }
}
