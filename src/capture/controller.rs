use super::session::{CaptureSession, CaptureStatus};
use super::source::FrameSource;
use super::watermark::apply_watermark;
use crate::{
    config::LapseConfig,
    error::{CaptureError, LapseError, Result, SettingsError},
    events::{EventBus, LapseEvent},
    motion::MotionDetector,
    schedule::should_capture_be_active,
    settings::SettingsStore,
    storage::storage_usage,
    tasks::spawn_supervised,
    upload::UploadDispatcher,
};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::fs;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    #[default]
    Seconds,
    Minutes,
    Hours,
}

/// Parameters of a capture run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub interval: u64,
    pub unit: IntervalUnit,
    /// Start even when the schedule says capture should be inactive
    pub bypass_scheduling: bool,
}

impl CaptureRequest {
    /// Run with the configured default interval
    pub fn from_defaults(config: &LapseConfig) -> Self {
        Self {
            interval: config.camera.default_interval,
            unit: IntervalUnit::Seconds,
            bypass_scheduling: false,
        }
    }

    pub fn period(&self) -> Duration {
        let multiplier = match self.unit {
            IntervalUnit::Seconds => 1,
            IntervalUnit::Minutes => 60,
            IntervalUnit::Hours => 3600,
        };
        Duration::from_secs(self.interval.saturating_mul(multiplier))
    }
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Session paused or not running
    Skipped,
    /// Motion-only capture and the frame showed no motion
    NoMotion,
    Captured { count: u64, path: PathBuf },
}

/// Periodic capture loop: Idle -> Running <-> Paused -> Idle
pub struct CaptureController {
    settings: Arc<dyn SettingsStore>,
    source: Arc<dyn FrameSource>,
    detector: Arc<MotionDetector>,
    uploader: Arc<UploadDispatcher>,
    event_bus: Arc<EventBus>,
    session: Arc<Mutex<CaptureSession>>,
    timer: Arc<Mutex<Option<CancellationToken>>>,
    ever_started: Arc<AtomicBool>,
    tick_lock: Arc<tokio::sync::Mutex<()>>,
}

impl CaptureController {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        source: Arc<dyn FrameSource>,
        detector: Arc<MotionDetector>,
        uploader: Arc<UploadDispatcher>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            settings,
            source,
            detector,
            uploader,
            event_bus,
            session: Arc::new(Mutex::new(CaptureSession::default())),
            timer: Arc::new(Mutex::new(None)),
            ever_started: Arc::new(AtomicBool::new(false)),
            tick_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Start a capture run: capture once immediately, then every `request.period()`
    pub async fn start(&self, request: CaptureRequest) -> Result<()> {
        if self.session.lock().is_running {
            return Err(CaptureError::AlreadyRunning.into());
        }

        let period = request.period();
        if period.is_zero() {
            return Err(SettingsError::InvalidValue {
                key: "interval".to_string(),
                message: "capture interval must be greater than 0".to_string(),
            }
            .into());
        }

        let config = self.settings.snapshot();
        if config.scheduling.enabled
            && !request.bypass_scheduling
            && !should_capture_be_active(&config.scheduling, config.scheduling.local_now())
        {
            return Err(CaptureError::SchedulingBlocked.into());
        }

        if !config.storage.is_configured() {
            return Err(CaptureError::StorageNotConfigured.into());
        }

        for dir in [config.storage.root(), config.storage.images_dir()] {
            create_dir(&dir).await?;
        }

        let token = CancellationToken::new();
        {
            let mut session = self.session.lock();
            if session.is_running {
                return Err(CaptureError::AlreadyRunning.into());
            }
            session.begin(Utc::now());
            *self.timer.lock() = Some(token.clone());
        }
        self.detector.reset();
        self.ever_started.store(true, Ordering::SeqCst);

        info!(
            "Capture started (interval {:?}, storage {})",
            period, config.storage.location
        );

        match self.tick().await {
            Err(LapseError::Capture(e @ CaptureError::StorageLimitReached { .. })) => {
                return Err(e.into());
            }
            Err(e) => debug!("Initial capture failed: {}", e),
            Ok(_) => {}
        }

        let controller = self.clone();
        spawn_supervised("capture_loop", Arc::clone(&self.event_bus), async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match controller.tick().await {
                            Err(LapseError::Capture(CaptureError::StorageLimitReached { .. })) => break,
                            Err(e) => debug!("Capture tick failed: {}", e),
                            Ok(_) => {}
                        }
                    }
                }
            }
            debug!("Capture loop ended");
        });

        Ok(())
    }

    /// Run one capture. Failures are published as events and returned.
    pub async fn tick(&self) -> Result<TickOutcome> {
        let _serial = self.tick_lock.lock().await;

        let generation = {
            let session = self.session.lock();
            if !session.is_running || session.is_paused {
                return Ok(TickOutcome::Skipped);
            }
            session.generation
        };

        let config = self.settings.snapshot();
        match self.capture_once(&config, generation).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let quota = matches!(
                    e,
                    LapseError::Capture(CaptureError::StorageLimitReached { .. })
                );
                if !quota {
                    warn!("Capture failed: {}", e);
                    let _ = self
                        .event_bus
                        .publish(LapseEvent::CaptureError {
                            message: e.to_string(),
                        })
                        .await;
                }
                Err(e)
            }
        }
    }

    async fn capture_once(&self, config: &LapseConfig, generation: u64) -> Result<TickOutcome> {
        if !config.storage.is_configured() {
            return Err(CaptureError::StorageNotConfigured.into());
        }
        let root = config.storage.root();

        let limit = config.storage.max_storage_bytes();
        let used = storage_usage(&root).await?;
        if used >= limit {
            self.halt(generation);
            let _ = self
                .event_bus
                .publish(LapseEvent::StorageLimitReached { used, limit })
                .await;
            return Err(CaptureError::StorageLimitReached { used, limit }.into());
        }

        let frame = self.source.acquire(&config.camera).await?;
        if frame.is_empty() {
            return Err(CaptureError::NoSignal {
                details: "image buffer is empty".to_string(),
            }
            .into());
        }

        let frame = Arc::new(frame);

        if config.motion_detection.enabled {
            let detector = Arc::clone(&self.detector);
            let analysed = Arc::clone(&frame);
            let motion_config = config.motion_detection.clone();
            let detection = tokio::task::spawn_blocking(move || {
                detector.detect(&analysed, &motion_config)
            })
            .await;

            match detection {
                Ok(Ok(result)) => {
                    if result.motion {
                        let _ = self
                            .event_bus
                            .publish(LapseEvent::MotionDetected {
                                percentage: result.motion_percentage,
                                threshold: result.threshold,
                                timestamp: SystemTime::now(),
                            })
                            .await;
                    } else if config.motion_detection.only_capture {
                        debug!("No motion ({:?}), frame discarded", result.reason);
                        return Ok(TickOutcome::NoMotion);
                    }
                }
                Ok(Err(e)) => self.warn(format!("Motion analysis skipped: {}", e)).await,
                Err(e) => self.warn(format!("Motion analysis task failed: {}", e)).await,
            }
        }

        let data = if config.watermark.enabled {
            let marked = Arc::clone(&frame);
            let watermark = config.watermark.clone();
            let format = config.camera.image_format;
            let quality = config.camera.jpeg_quality;
            let result = tokio::task::spawn_blocking(move || {
                apply_watermark(&marked, &watermark, format, quality)
            })
            .await;

            match result {
                Ok(Ok(Some(marked))) => Arc::new(marked),
                Ok(Ok(None)) => frame,
                Ok(Err(e)) => {
                    self.warn(format!("Watermark not applied: {}", e)).await;
                    frame
                }
                Err(e) => {
                    self.warn(format!("Watermark task failed: {}", e)).await;
                    frame
                }
            }
        } else {
            frame
        };

        let images_dir = config.storage.images_dir();
        create_dir(&images_dir).await?;
        let path = unique_capture_path(&images_dir, config.camera.image_format.extension());
        write_image(&path, &data).await?;

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let count = self.session.lock().record_image(generation).unwrap_or(0);
        debug!("Stored {} ({} bytes)", path.display(), data.len());

        let _ = self
            .event_bus
            .publish(LapseEvent::ImageCaptured {
                count,
                filename: filename.clone(),
                path: path.clone(),
            })
            .await;

        if config.ftp.enabled && config.ftp.auto_upload_images {
            let uploader = Arc::clone(&self.uploader);
            let local = path.clone();
            spawn_supervised("image_upload", Arc::clone(&self.event_bus), async move {
                uploader.upload_and_report(&local, &filename).await;
            });
        }

        Ok(TickOutcome::Captured { count, path })
    }

    async fn warn(&self, message: String) {
        warn!("{}", message);
        let _ = self
            .event_bus
            .publish(LapseEvent::CaptureWarning { message })
            .await;
    }

    /// End run `generation` if it is still the current one
    fn halt(&self, generation: u64) -> bool {
        let mut session = self.session.lock();
        session.generation == generation && self.end_session(&mut session)
    }

    fn end_session(&self, session: &mut CaptureSession) -> bool {
        if let Some(token) = self.timer.lock().take() {
            token.cancel();
        }
        session.end()
    }

    pub fn pause(&self) -> bool {
        let changed = self.session.lock().set_paused(true);
        if changed {
            info!("Capture paused");
        }
        changed
    }

    pub fn resume(&self) -> bool {
        let changed = self.session.lock().set_paused(false);
        if changed {
            info!("Capture resumed");
        }
        changed
    }

    /// Stop the timer and reset the session. An in-flight tick is not interrupted.
    pub fn stop(&self) -> bool {
        let stopped = self.end_session(&mut self.session.lock());
        if stopped {
            info!("Capture stopped");
        }
        stopped
    }

    pub fn is_running(&self) -> bool {
        self.session.lock().is_running
    }

    /// Whether any capture run was started during this process lifetime
    pub fn has_ever_started(&self) -> bool {
        self.ever_started.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> CaptureStatus {
        let session = self.session.lock().clone();
        let now = Utc::now();
        let last_motion_at = self.detector.last_motion_at().and_then(|at| {
            chrono::Duration::from_std(Instant::now().saturating_duration_since(at))
                .ok()
                .map(|ago| now - ago)
        });

        CaptureStatus {
            is_running: session.is_running,
            is_paused: session.is_paused,
            image_count: session.image_count,
            started_at: session.started_at,
            elapsed_seconds: session
                .started_at
                .map(|started| (now - started).num_seconds().max(0))
                .unwrap_or(0),
            motion_enabled: self.settings.snapshot().motion_detection.enabled,
            last_motion_at,
        }
    }
}

impl Clone for CaptureController {
    fn clone(&self) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            source: Arc::clone(&self.source),
            detector: Arc::clone(&self.detector),
            uploader: Arc::clone(&self.uploader),
            event_bus: Arc::clone(&self.event_bus),
            session: Arc::clone(&self.session),
            timer: Arc::clone(&self.timer),
            ever_started: Arc::clone(&self.ever_started),
            tick_lock: Arc::clone(&self.tick_lock),
        }
    }
}

async fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| CaptureError::DirectoryCreation {
            path: dir.display().to_string(),
            source: e,
        })?;
    Ok(())
}

/// `capture_<UTC timestamp with ms>.<ext>`, suffixed `-N` if that name is taken
pub(crate) fn unique_capture_path(dir: &Path, extension: &str) -> PathBuf {
    let stem = format!("capture_{}", Utc::now().format("%Y-%m-%d_%H-%M-%S-%3f"));
    let mut path = dir.join(format!("{}.{}", stem, extension));
    let mut suffix = 1;
    while path.exists() {
        path = dir.join(format!("{}-{}.{}", stem, suffix, extension));
        suffix += 1;
    }
    path
}

async fn write_image(path: &Path, data: &[u8]) -> Result<()> {
    if data.is_empty() {
        return Err(CaptureError::EmptyWrite {
            path: path.to_path_buf(),
        }
        .into());
    }
    fs::write(path, data)
        .await
        .map_err(|source| CaptureError::Write {
            path: path.to_path_buf(),
            source,
        })?;

    let written = fs::metadata(path)
        .await
        .map_err(|source| CaptureError::Write {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    if written == 0 {
        return Err(CaptureError::EmptyWrite {
            path: path.to_path_buf(),
        }
        .into());
    }
    Ok(())
}
