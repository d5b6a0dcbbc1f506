use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use crossbeam_channel::select;

use maskwatch_core::classification::domain::mask_classifier::{
    MaskClassifier, UnavailableClassifier,
};
use maskwatch_core::classification::infrastructure::onnx_mask_classifier::OnnxMaskClassifier;
use maskwatch_core::detection::infrastructure::cascade_face_locator::CascadeFaceLocator;
use maskwatch_core::monitoring::domain::alert_manager::AlertManager;
use maskwatch_core::monitoring::domain::violation_log::ViolationLogger;
use maskwatch_core::monitoring::infrastructure::csv_violation_store::CsvViolationStore;
use maskwatch_core::pipeline::mask_pipeline::{MaskPipeline, PipelineSettings};
use maskwatch_core::pipeline::model_load_task::{LoadError, ModelLoadTask};
use maskwatch_core::pipeline::monitor_session::{FrameUpdate, MonitorSession, SessionEvent};
use maskwatch_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use maskwatch_core::shared::clock::{Clock, SystemClock};
use maskwatch_core::shared::config::MonitorConfig;
use maskwatch_core::shared::constants::CASCADE_NAME;
use maskwatch_core::shared::region::FaceRegion;
use maskwatch_core::shared::resource_resolver;
use maskwatch_core::video::domain::frame_source::FrameSource;
use maskwatch_core::video::domain::frame_writer::FrameWriter;
use maskwatch_core::video::infrastructure::ffmpeg_frame_source::FfmpegFrameSource;
use maskwatch_core::video::infrastructure::image_file_writer::ImageFileWriter;
use maskwatch_core::video::infrastructure::image_sequence_source::ImageSequenceSource;
use maskwatch_core::video::infrastructure::synthetic_frame_source::SyntheticFrameSource;

const SYNTHETIC_INPUT: &str = "synthetic";
const SYNTHETIC_FRAMES: usize = 300;
const CONSUMER_TICK: Duration = Duration::from_millis(250);

/// Face mask compliance monitoring for camera feeds, videos and images.
#[derive(Parser)]
#[command(name = "maskwatch", version)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Overrides {
    /// Configuration file (JSON). Defaults to the platform config location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Mask classifier model (ONNX).
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Face detection cascade (OpenCV Haar XML).
    #[arg(long, global = true)]
    cascade: Option<PathBuf>,

    /// Violation log (CSV).
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Minimum classifier confidence to accept a label (0.0-1.0).
    #[arg(long, global = true)]
    confidence_threshold: Option<f64>,

    /// Score above which a face counts as masked (0.0-1.0).
    #[arg(long, global = true)]
    mask_threshold: Option<f64>,

    /// Seconds an alert stays on screen.
    #[arg(long, global = true)]
    alert_duration: Option<f64>,

    /// Seconds before the same position may be logged again.
    #[arg(long, global = true)]
    cooldown: Option<f64>,

    /// Do not raise on-screen alerts.
    #[arg(long, global = true)]
    no_alerts: bool,

    /// Do not write or count violations.
    #[arg(long, global = true)]
    no_logging: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Monitor a video file, capture device, image directory or `synthetic`.
    Monitor(MonitorArgs),

    /// Process a single image and write the annotated result.
    Image {
        input: PathBuf,
        output: PathBuf,
    },

    /// Count logged violations in a recent window.
    Violations {
        #[arg(long, default_value = "24")]
        hours: f64,
    },

    /// Write the default configuration to PATH.
    InitConfig { path: PathBuf },
}

#[derive(Args)]
struct MonitorArgs {
    input: String,

    /// ffmpeg input device format for capture devices (e.g. v4l2, avfoundation).
    #[arg(long)]
    device_format: Option<String>,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<usize>,

    /// Write the last annotated frame here on exit.
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Command::InitConfig { path } = &cli.command {
        MonitorConfig::default().save(path)?;
        log::info!("Default configuration written to {}", path.display());
        return Ok(());
    }

    let config = load_config(&cli.overrides)?;
    match cli.command {
        Command::Monitor(args) => run_monitor(&config, args),
        Command::Image { input, output } => run_image(&config, &input, &output),
        Command::Violations { hours } => run_violations(&config, hours),
        Command::InitConfig { .. } => Ok(()),
    }
}

fn load_config(overrides: &Overrides) -> Result<MonitorConfig, Box<dyn std::error::Error>> {
    let mut config = match &overrides.config {
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::load_or_default(),
    };

    if let Some(path) = &overrides.model {
        config.model.path = path.clone();
    }
    if let Some(path) = &overrides.cascade {
        config.detection.cascade_path = Some(path.clone());
    }
    if let Some(path) = &overrides.log_file {
        config.log_file = path.clone();
    }
    if let Some(v) = overrides.confidence_threshold {
        config.thresholds.confidence_threshold = v;
    }
    if let Some(v) = overrides.mask_threshold {
        config.thresholds.mask_threshold = v;
    }
    if let Some(v) = overrides.alert_duration {
        config.alerts.alert_duration_secs = v;
    }
    if let Some(v) = overrides.cooldown {
        config.alerts.violation_cooldown_secs = v;
    }
    if overrides.no_alerts {
        config.alerts.alerts_enabled = false;
    }
    if overrides.no_logging {
        config.alerts.logging_enabled = false;
    }

    config.validate()?;
    Ok(config)
}

fn run_monitor(config: &MonitorConfig, args: MonitorArgs) -> Result<(), Box<dyn std::error::Error>> {
    let source = open_source(config, &args)?;
    let pipeline = build_pipeline(config, Box::new(UnavailableClassifier))?
        .with_logger(Box::new(StdoutPipelineLogger::new(100)));

    let mut session = MonitorSession::new(pipeline)
        .with_target_fps(config.video.fps)
        .with_max_frames(args.max_frames);
    let events = session.events();
    let mut model_task = Some(spawn_model_load(config, session.event_sender()));

    let updates = session.start(source)?;
    let ticker = crossbeam_channel::tick(CONSUMER_TICK);
    let mut latest: Option<FrameUpdate> = None;

    loop {
        select! {
            recv(ticker) -> _ => {
                while let Ok(update) = updates.try_recv() {
                    latest = Some(update);
                }
                if let Some(update) = &latest {
                    let s = update.stats;
                    log::info!(
                        "frame {} | faces {} (masked {}, unmasked {}) | violations {} | {:.1} fps | model {}",
                        update.frame.index(),
                        s.total_faces,
                        s.masked_faces,
                        s.unmasked_faces,
                        s.violations,
                        s.fps,
                        if update.model_available { "active" } else { "inactive" }
                    );
                }
            }
            recv(events) -> event => match event {
                Ok(SessionEvent::ModelLoaded) | Ok(SessionEvent::ModelLoadFailed(_)) => {
                    if let Some(task) = model_task.take() {
                        match task.join() {
                            Ok(classifier) => session.install_classifier(classifier),
                            Err(e) => log::warn!("Continuing without mask model: {e}"),
                        }
                    }
                }
                Ok(SessionEvent::SourceExhausted) => log::info!("End of input"),
                Ok(SessionEvent::FrameLimitReached) => log::info!("Frame limit reached"),
                Ok(SessionEvent::SourceError(e)) => log::error!("Frame source failed: {e}"),
                Ok(SessionEvent::Stopped { .. }) | Err(_) => break,
            },
        }
    }

    if let Some(task) = model_task.take() {
        log::info!("Waiting for the mask model load to wind down");
        if let Err(e) = task.cancel_and_join() {
            log::debug!("Mask model load ended: {e}");
        }
    }
    let stats = session.stop()?;
    while let Ok(update) = updates.try_recv() {
        latest = Some(update);
    }

    if let (Some(path), Some(update)) = (&args.snapshot, &latest) {
        ImageFileWriter::new().write(path, &update.frame, None)?;
        log::info!("Snapshot written to {}", path.display());
    }
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn run_image(
    config: &MonitorConfig,
    input: &Path,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let classifier: Box<dyn MaskClassifier> = match load_classifier(config, None) {
        Ok(classifier) => classifier,
        Err(e) => {
            log::warn!("Continuing without mask model: {e}");
            Box::new(UnavailableClassifier)
        }
    };
    let mut pipeline = build_pipeline(config, classifier)?;

    let mut source = ImageSequenceSource::new(input);
    source.open()?;
    let frame = source.read()?.ok_or("input contains no image")?;
    source.close();

    let report = pipeline.process_frame(frame);
    ImageFileWriter::new().write(output, &report.frame, None)?;
    log::info!("Output written to {}", output.display());

    let summary = serde_json::json!({
        "faces": report.faces,
        "stats": report.stats,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_violations(config: &MonitorConfig, hours: f64) -> Result<(), Box<dyn std::error::Error>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = CsvViolationStore::open(&config.log_file)?;
    let logger = ViolationLogger::new(Box::new(store), config.alerts.violation_cooldown(), clock);
    let count = logger.count_since(hours)?;
    println!("{count} violations in the last {hours} hours");
    Ok(())
}

fn build_pipeline(
    config: &MonitorConfig,
    classifier: Box<dyn MaskClassifier>,
) -> Result<MaskPipeline, Box<dyn std::error::Error>> {
    let cascade_path = config
        .detection
        .cascade_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("models").join(CASCADE_NAME));
    log::info!("Resolving face cascade: {}", cascade_path.display());
    let cascade_path = resource_resolver::resolve(
        &cascade_path,
        config.detection.cascade_url.as_deref(),
        Some(Box::new(download_progress)),
    )?;
    let locator = CascadeFaceLocator::from_file(&cascade_path, &config.detection)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = CsvViolationStore::open(&config.log_file)?;
    let violations =
        ViolationLogger::new(Box::new(store), config.alerts.violation_cooldown(), clock.clone());
    let alerts = AlertManager::new(config.alerts.alert_duration(), clock.clone());

    Ok(MaskPipeline::new(
        Box::new(locator),
        classifier,
        violations,
        alerts,
        PipelineSettings::from_config(config),
        clock,
    ))
}

fn load_classifier(
    config: &MonitorConfig,
    cancelled: Option<&AtomicBool>,
) -> Result<Box<dyn MaskClassifier>, LoadError> {
    log::info!("Resolving mask model: {}", config.model.path.display());
    let path = resource_resolver::resolve(
        &config.model.path,
        config.model.url.as_deref(),
        Some(Box::new(download_progress)),
    )?;
    if cancelled.is_some_and(|c| c.load(Ordering::Relaxed)) {
        return Err("cancelled".into());
    }

    let classifier = OnnxMaskClassifier::from_file(&path, config.thresholds.mask_threshold)?;
    if !classifier.is_available() {
        return Err(format!("mask model not found: {}", path.display()).into());
    }
    Ok(Box::new(classifier))
}

fn spawn_model_load(
    config: &MonitorConfig,
    events: crossbeam_channel::Sender<SessionEvent>,
) -> ModelLoadTask {
    let config = config.clone();
    ModelLoadTask::spawn(move |cancelled| load_classifier(&config, Some(cancelled)), events)
}

fn open_source(
    config: &MonitorConfig,
    args: &MonitorArgs,
) -> Result<Box<dyn FrameSource>, Box<dyn std::error::Error>> {
    let video = &config.video;

    if args.input == SYNTHETIC_INPUT {
        let (w, h) = (video.width as i32, video.height as i32);
        let side = w.min(h) / 3;
        let face = FaceRegion::new((w - side) / 2, (h - side) / 2, side, side);
        let frames = args.max_frames.unwrap_or(SYNTHETIC_FRAMES);
        return Ok(Box::new(
            SyntheticFrameSource::new(video.width, video.height, frames).with_patch(face),
        ));
    }

    if let Some(format) = &args.device_format {
        return Ok(Box::new(
            FfmpegFrameSource::device(format, &args.input).with_size(video.width, video.height),
        ));
    }

    let path = Path::new(&args.input);
    if !path.exists() {
        return Err(format!("Input not found: {}", path.display()).into());
    }
    if path.is_dir() || ImageSequenceSource::is_image_path(path) {
        Ok(Box::new(ImageSequenceSource::new(path)))
    } else {
        Ok(Box::new(FfmpegFrameSource::new(&args.input)))
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading... {pct}%");
    } else {
        eprint!("\rDownloading... {downloaded} bytes");
    }
}
