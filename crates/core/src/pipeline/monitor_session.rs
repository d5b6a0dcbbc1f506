use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use thiserror::Error;

use crate::classification::domain::mask_classifier::MaskClassifier;
use crate::monitoring::domain::stats_tracker::StatisticsSnapshot;
use crate::shared::frame::Frame;
use crate::video::domain::frame_source::{FrameSource, SourceInfo};

use super::mask_pipeline::{FaceObservation, MaskPipeline};

const DEFAULT_UPDATE_CAPACITY: usize = 4;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to open frame source: {0}")]
    SourceOpen(String),
    #[error("a session is already running")]
    AlreadyRunning,
    #[error("session worker panicked; pipeline state was lost")]
    WorkerPanicked,
}

/// Immutable result of one processed frame, posted by the worker.
pub struct FrameUpdate {
    pub frame: Frame,
    pub stats: StatisticsSnapshot,
    pub faces: Vec<FaceObservation>,
    pub model_available: bool,
}

/// Out-of-band notifications from the worker and background tasks.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    SourceExhausted,
    /// The worker processed its configured maximum number of frames.
    FrameLimitReached,
    SourceError(String),
    ModelLoaded,
    ModelLoadFailed(String),
    /// The worker has exited and closed its source.
    Stopped { frames: usize },
}

enum Command {
    InstallClassifier(Box<dyn MaskClassifier>),
}

struct Worker {
    handle: JoinHandle<MaskPipeline>,
    commands: Sender<Command>,
}

/// Runs a [`MaskPipeline`] over a [`FrameSource`] on a worker thread.
///
/// The worker owns the pipeline while running and posts a [`FrameUpdate`]
/// per frame on a bounded channel. Updates are offered with `try_send`, so
/// a consumer that falls behind loses frames instead of stalling capture.
/// `stop` hands the pipeline back to the session, ready for another start.
pub struct MonitorSession {
    pipeline: Option<MaskPipeline>,
    worker: Option<Worker>,
    cancelled: Arc<AtomicBool>,
    model_available: Arc<AtomicBool>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
    target_fps: u32,
    update_capacity: usize,
    max_frames: Option<usize>,
    source_info: Option<SourceInfo>,
}

impl MonitorSession {
    pub fn new(pipeline: MaskPipeline) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let model_available = Arc::new(AtomicBool::new(pipeline.model_available()));
        Self {
            pipeline: Some(pipeline),
            worker: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            model_available,
            events_tx,
            events_rx,
            target_fps: 0,
            update_capacity: DEFAULT_UPDATE_CAPACITY,
            max_frames: None,
            source_info: None,
        }
    }

    /// Caps processing at `fps` frames per second; 0 runs flat out.
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = fps;
        self
    }

    pub fn with_update_capacity(mut self, capacity: usize) -> Self {
        self.update_capacity = capacity.max(1);
        self
    }

    /// Ends each run after `max` processed frames; `None` runs until the
    /// source is exhausted or the session is stopped.
    pub fn with_max_frames(mut self, max: Option<usize>) -> Self {
        self.max_frames = max;
        self
    }

    /// Opens `source`, resets the session statistics and starts the worker.
    pub fn start(
        &mut self,
        mut source: Box<dyn FrameSource>,
    ) -> Result<Receiver<FrameUpdate>, SessionError> {
        if self.worker.is_some() {
            return Err(SessionError::AlreadyRunning);
        }
        let mut pipeline = self.pipeline.take().ok_or(SessionError::WorkerPanicked)?;

        let info = match source.open() {
            Ok(info) => info,
            Err(e) => {
                self.pipeline = Some(pipeline);
                return Err(SessionError::SourceOpen(e.to_string()));
            }
        };
        log::info!(
            "Monitoring {} ({}x{} @ {:.1} fps)",
            info.description,
            info.width,
            info.height,
            info.fps
        );
        self.source_info = Some(info);

        pipeline.reset_session();
        self.cancelled.store(false, Ordering::Relaxed);
        self.model_available
            .store(pipeline.model_available(), Ordering::Relaxed);

        let (updates_tx, updates_rx) = crossbeam_channel::bounded(self.update_capacity);
        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();
        let handle = spawn_worker(
            pipeline,
            source,
            WorkerChannels {
                updates: updates_tx,
                commands: commands_rx,
                events: self.events_tx.clone(),
            },
            self.cancelled.clone(),
            self.model_available.clone(),
            frame_period(self.target_fps),
            self.max_frames,
        );
        self.worker = Some(Worker {
            handle,
            commands: commands_tx,
        });
        Ok(updates_rx)
    }

    /// Cancels the worker, waits for it and returns the final statistics.
    ///
    /// Stopping an idle session just reports the current statistics.
    pub fn stop(&mut self) -> Result<StatisticsSnapshot, SessionError> {
        if let Some(worker) = self.worker.take() {
            self.cancelled.store(true, Ordering::Relaxed);
            drop(worker.commands);
            let pipeline = worker
                .handle
                .join()
                .map_err(|_| SessionError::WorkerPanicked)?;
            pipeline.log_summary();
            self.pipeline = Some(pipeline);
        }
        self.pipeline
            .as_ref()
            .map(|p| p.stats())
            .ok_or(SessionError::WorkerPanicked)
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map(|w| !w.handle.is_finished())
            .unwrap_or(false)
    }

    /// Swaps in a new classifier; a running worker applies it between frames.
    pub fn install_classifier(&mut self, classifier: Box<dyn MaskClassifier>) {
        if let Some(worker) = &self.worker {
            match worker.commands.send(Command::InstallClassifier(classifier)) {
                Ok(()) => return,
                Err(crossbeam_channel::SendError(Command::InstallClassifier(c))) => {
                    log::warn!("Session worker has exited; installing classifier directly");
                    self.pending_install(c);
                    return;
                }
            }
        }
        self.pending_install(classifier);
    }

    fn pending_install(&mut self, classifier: Box<dyn MaskClassifier>) {
        if self.pipeline.is_none() && self.worker.is_some() {
            // Worker finished on its own but was not joined yet.
            let _ = self.stop();
        }
        match self.pipeline.as_mut() {
            Some(pipeline) => {
                pipeline.install_classifier(classifier);
                self.model_available
                    .store(pipeline.model_available(), Ordering::Relaxed);
            }
            None => log::error!("Cannot install classifier: pipeline was lost"),
        }
    }

    pub fn model_available(&self) -> bool {
        self.model_available.load(Ordering::Relaxed)
    }

    pub fn events(&self) -> Receiver<SessionEvent> {
        self.events_rx.clone()
    }

    /// Sender for background tasks that report on the session event channel.
    pub fn event_sender(&self) -> Sender<SessionEvent> {
        self.events_tx.clone()
    }

    pub fn source_info(&self) -> Option<&SourceInfo> {
        self.source_info.as_ref()
    }

    /// Idle-only access to the pipeline, e.g. for violation queries.
    pub fn pipeline(&self) -> Option<&MaskPipeline> {
        self.pipeline.as_ref()
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.stop();
        }
    }
}

struct WorkerChannels {
    updates: Sender<FrameUpdate>,
    commands: Receiver<Command>,
    events: Sender<SessionEvent>,
}

fn frame_period(target_fps: u32) -> Option<Duration> {
    (target_fps > 0).then(|| Duration::from_secs_f64(1.0 / target_fps as f64))
}

fn spawn_worker(
    mut pipeline: MaskPipeline,
    mut source: Box<dyn FrameSource>,
    channels: WorkerChannels,
    cancelled: Arc<AtomicBool>,
    model_available: Arc<AtomicBool>,
    period: Option<Duration>,
    max_frames: Option<usize>,
) -> JoinHandle<MaskPipeline> {
    std::thread::spawn(move || {
        let mut frames = 0usize;
        let mut dropped = 0usize;
        loop {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            if max_frames.is_some_and(|max| frames >= max) {
                log::info!("Frame limit reached after {frames} frames");
                let _ = channels.events.send(SessionEvent::FrameLimitReached);
                break;
            }

            loop {
                match channels.commands.try_recv() {
                    Ok(Command::InstallClassifier(classifier)) => {
                        pipeline.install_classifier(classifier);
                        model_available.store(pipeline.model_available(), Ordering::Relaxed);
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }

            let started = Instant::now();
            let frame = match source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!("Frame source exhausted after {frames} frames");
                    let _ = channels.events.send(SessionEvent::SourceExhausted);
                    break;
                }
                Err(e) => {
                    log::error!("Failed to read frame: {e}");
                    let _ = channels.events.send(SessionEvent::SourceError(e.to_string()));
                    break;
                }
            };

            let report = pipeline.process_frame(frame);
            frames += 1;
            let update = FrameUpdate {
                frame: report.frame,
                stats: report.stats,
                faces: report.faces,
                model_available: model_available.load(Ordering::Relaxed),
            };
            match channels.updates.try_send(update) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => dropped += 1,
                Err(TrySendError::Disconnected(_)) => {
                    log::info!("Update consumer went away; stopping");
                    break;
                }
            }

            if let Some(period) = period {
                let elapsed = started.elapsed();
                if elapsed < period {
                    std::thread::sleep(period - elapsed);
                }
            }
        }

        source.close();
        log::info!("Session stopped after {frames} frames ({dropped} updates dropped)");
        let _ = channels.events.send(SessionEvent::Stopped { frames });
        pipeline
    })
}
