use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use thiserror::Error;

use crate::classification::domain::mask_classifier::MaskClassifier;

use super::monitor_session::SessionEvent;

pub type LoadError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug, PartialEq)]
pub enum ModelLoadError {
    #[error("model load was cancelled")]
    Cancelled,
    #[error("model load failed: {0}")]
    Failed(String),
    #[error("model load thread panicked")]
    Panicked,
}

/// Loads a classifier on its own thread.
///
/// The loader receives the cancel flag and may poll it during long steps
/// such as downloads. Completion is announced on the session event
/// channel; the classifier itself is collected with [`Self::join`].
pub struct ModelLoadTask {
    cancelled: Arc<AtomicBool>,
    handle: JoinHandle<Result<Box<dyn MaskClassifier>, ModelLoadError>>,
}

impl ModelLoadTask {
    pub fn spawn<F>(loader: F, events: Sender<SessionEvent>) -> Self
    where
        F: FnOnce(&AtomicBool) -> Result<Box<dyn MaskClassifier>, LoadError> + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let handle = std::thread::spawn(move || {
            let result = loader(&flag);
            if flag.load(Ordering::Relaxed) {
                log::info!("Model load cancelled");
                return Err(ModelLoadError::Cancelled);
            }
            match result {
                Ok(classifier) => {
                    let _ = events.send(SessionEvent::ModelLoaded);
                    Ok(classifier)
                }
                Err(e) => {
                    log::error!("Model load failed: {e}");
                    let _ = events.send(SessionEvent::ModelLoadFailed(e.to_string()));
                    Err(ModelLoadError::Failed(e.to_string()))
                }
            }
        });
        Self { cancelled, handle }
    }

    /// Requests cancellation. The result of a cancelled load is discarded.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels the load and waits for the loader thread to exit, so no
    /// download outlives its caller.
    pub fn cancel_and_join(self) -> Result<Box<dyn MaskClassifier>, ModelLoadError> {
        self.cancel();
        self.join()
    }

    /// Blocks until the loader returns.
    pub fn join(self) -> Result<Box<dyn MaskClassifier>, ModelLoadError> {
        self.handle.join().map_err(|_| ModelLoadError::Panicked)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::classification::domain::mask_classifier::MaskLabel;
    use crate::pipeline::test_support::ScriptedClassifier;

    fn stub_classifier() -> Result<Box<dyn MaskClassifier>, LoadError> {
        Ok(Box::new(ScriptedClassifier::always(MaskLabel::WithMask, 0.8)))
    }

    #[test]
    fn test_successful_load_announces_and_returns_classifier() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let task = ModelLoadTask::spawn(|_| stub_classifier(), tx);

        let classifier = task.join().unwrap();
        assert!(classifier.is_available());
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::ModelLoaded);
    }

    #[test]
    fn test_failed_load_announces_error() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let task = ModelLoadTask::spawn(|_| Err("model file is corrupt".into()), tx);

        let err = task.join().err().unwrap();
        assert_eq!(err, ModelLoadError::Failed("model file is corrupt".into()));
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::ModelLoadFailed("model file is corrupt".into())
        );
    }

    #[test]
    fn test_cancel_discards_result() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let (go_tx, go_rx) = crossbeam_channel::bounded::<()>(0);
        let task = ModelLoadTask::spawn(
            move |_| {
                let _ = go_rx.recv();
                stub_classifier()
            },
            tx,
        );

        task.cancel();
        go_tx.send(()).unwrap();
        assert_eq!(task.join().err().unwrap(), ModelLoadError::Cancelled);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_loader_can_poll_cancel_flag() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let task = ModelLoadTask::spawn(
            |cancelled| {
                while !cancelled.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err("interrupted".into())
            },
            tx,
        );
        assert!(!task.is_finished());
        task.cancel();
        assert_eq!(task.join().err().unwrap(), ModelLoadError::Cancelled);
    }

    #[test]
    fn test_cancel_and_join_waits_for_loader_exit() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let exited = Arc::new(AtomicBool::new(false));
        let flag = exited.clone();
        let task = ModelLoadTask::spawn(
            move |cancelled| {
                while !cancelled.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(1));
                }
                std::thread::sleep(Duration::from_millis(20));
                flag.store(true, Ordering::SeqCst);
                Err("interrupted".into())
            },
            tx,
        );
        assert_eq!(task.cancel_and_join().err().unwrap(), ModelLoadError::Cancelled);
        assert!(exited.load(Ordering::SeqCst));
    }

    #[test]
    fn test_panicking_loader_is_reported() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let task = ModelLoadTask::spawn(|_| panic!("loader bug"), tx);
        assert_eq!(task.join().err().unwrap(), ModelLoadError::Panicked);
    }
}
