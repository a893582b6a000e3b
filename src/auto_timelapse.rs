use crate::{
    capture::CaptureController,
    config::AutoTimelapseMode,
    encoder::{TimelapseAssembler, TimelapseInput, TimelapseOptions, TimelapseOutput},
    error::Result,
    events::{EventBus, LapseEvent},
    settings::SettingsStore,
    storage::{scan_files, IMAGE_EXTENSIONS},
    tasks::spawn_supervised,
    upload::UploadDispatcher,
};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const AUTO_TIMELAPSE_NAME: &str = "auto-timelapse";

/// What one scheduler check did
#[derive(Debug, Clone, PartialEq)]
pub enum AutoRunOutcome {
    Disabled,
    /// No capture session has run since the process started
    NeverCaptured,
    NotDue,
    /// The previous run is still encoding
    Busy,
    /// Nothing was captured inside the window
    NoImages,
    Created {
        output: TimelapseOutput,
        image_count: usize,
    },
}

/// Periodically rolls recent captures into a timelapse
pub struct AutoTimelapseScheduler {
    settings: Arc<dyn SettingsStore>,
    assembler: TimelapseAssembler,
    capture: CaptureController,
    uploader: Arc<UploadDispatcher>,
    event_bus: Arc<EventBus>,
    running: Arc<AtomicBool>,
}

impl AutoTimelapseScheduler {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        assembler: TimelapseAssembler,
        capture: CaptureController,
        uploader: Arc<UploadDispatcher>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            settings,
            assembler,
            capture,
            uploader,
            event_bus,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn check(&self) -> Result<AutoRunOutcome> {
        self.check_at(Utc::now()).await
    }

    /// Create the timelapse if one is due at `now`. Failures are also published as
    /// `AutoTimelapseError`.
    pub async fn check_at(&self, now: DateTime<Utc>) -> Result<AutoRunOutcome> {
        let config = self.settings.snapshot();
        let auto = &config.auto_timelapse;
        if !auto.enabled {
            return Ok(AutoRunOutcome::Disabled);
        }
        if !self.capture.has_ever_started() {
            return Ok(AutoRunOutcome::NeverCaptured);
        }

        let interval = chrono::Duration::hours(auto.interval_hours as i64);
        if let Some(last_run) = auto.last_run {
            if now - last_run < interval {
                return Ok(AutoRunOutcome::NotDue);
            }
        }

        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Automatic timelapse still running, skipping check");
            return Ok(AutoRunOutcome::Busy);
        }
        let outcome = self.run(now, interval).await;
        self.running.store(false, Ordering::SeqCst);

        if let Err(e) = &outcome {
            let _ = self
                .event_bus
                .publish(LapseEvent::AutoTimelapseError {
                    error: e.to_string(),
                })
                .await;
        }
        outcome
    }

    async fn run(&self, now: DateTime<Utc>, interval: chrono::Duration) -> Result<AutoRunOutcome> {
        let config = self.settings.snapshot();
        let auto = &config.auto_timelapse;

        let since = SystemTime::from(now - interval);
        let mut images = scan_files(&config.storage.images_dir(), Some(IMAGE_EXTENSIONS)).await?;
        images.retain(|image| image.modified >= since);
        if images.is_empty() {
            info!(
                "No images captured in the last {} hours, skipping automatic timelapse",
                auto.interval_hours
            );
            return Ok(AutoRunOutcome::NoImages);
        }
        images.sort_by_key(|image| image.modified);

        let videos_dir = config.storage.videos_dir();
        let name = match auto.mode {
            AutoTimelapseMode::Replace => AUTO_TIMELAPSE_NAME.to_string(),
            AutoTimelapseMode::Append => format!(
                "{}_{}",
                AUTO_TIMELAPSE_NAME,
                now.format("%Y-%m-%d_%H-%M-%S")
            ),
        };

        let mut options = TimelapseOptions::new(
            name,
            TimelapseInput::Images(images.iter().map(|image| image.path.clone()).collect()),
            &config.video,
        );
        options.fps = auto.fps;
        options.quality = auto.quality;
        options.is_auto = true;
        // Encoded to a partial file first, so a failed run keeps the previous video
        options.output = Some(videos_dir.join(options.file_name()));

        info!(
            "Creating automatic timelapse from {} images",
            images.len()
        );
        let output = self.assembler.assemble(options).await?;
        self.settings
            .set("auto_timelapse.last_run", serde_json::to_value(now)?)?;

        let filename = output
            .output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if auto.upload && config.ftp.enabled {
            let event = match self.uploader.upload(&output.output_path, &filename).await {
                Ok(_) => LapseEvent::AutoTimelapseUploaded {
                    filename: filename.clone(),
                },
                Err(e) => LapseEvent::AutoTimelapseUploadError {
                    filename: filename.clone(),
                    error: e.to_string(),
                },
            };
            let _ = self.event_bus.publish(event).await;
        }

        let image_count = output.frame_count;
        let _ = self
            .event_bus
            .publish(LapseEvent::AutoTimelapseCreated {
                filename,
                image_count,
            })
            .await;

        Ok(AutoRunOutcome::Created {
            output,
            image_count,
        })
    }

    /// Check now and then every `system.auto_timelapse_poll_seconds` until `shutdown`
    pub fn start(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let scheduler = self.clone();
        let period = Duration::from_secs(
            self.settings
                .snapshot()
                .system
                .auto_timelapse_poll_seconds,
        );
        info!("Starting automatic timelapse scheduler (every {:?})", period);

        spawn_supervised("auto_timelapse", Arc::clone(&self.event_bus), async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = scheduler.check().await {
                            warn!("Automatic timelapse failed: {}", e);
                        }
                    }
                }
            }
            debug!("Automatic timelapse scheduler stopped");
        })
    }
}

impl Clone for AutoTimelapseScheduler {
    fn clone(&self) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            assembler: self.assembler.clone(),
            capture: self.capture.clone(),
            uploader: Arc::clone(&self.uploader),
            event_bus: Arc::clone(&self.event_bus),
            running: Arc::clone(&self.running),
        }
    }
}
