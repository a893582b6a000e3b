use crate::{
    capture::{CaptureController, CaptureRequest},
    events::{EventBus, LapseEvent},
    schedule::should_capture_be_active,
    settings::SettingsStore,
    tasks::spawn_supervised,
};
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a schedule check did to the capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleAction {
    /// Scheduling disabled or no transition
    Unchanged,
    Started,
    Stopped,
}

/// Starts and stops capture when the schedule changes state.
///
/// Only transitions act, so a capture started by hand outside the window keeps running
/// until the window next closes.
pub struct ScheduleChecker {
    settings: Arc<dyn SettingsStore>,
    capture: CaptureController,
    event_bus: Arc<EventBus>,
    last_active: Arc<Mutex<Option<bool>>>,
}

impl ScheduleChecker {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        capture: CaptureController,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            settings,
            capture,
            event_bus,
            last_active: Arc::new(Mutex::new(None)),
        }
    }

    /// Check against the current time in the schedule's timezone
    pub async fn check(&self) -> ScheduleAction {
        let now = self.settings.snapshot().scheduling.local_now();
        self.check_at(now).await
    }

    pub async fn check_at(&self, now: NaiveDateTime) -> ScheduleAction {
        let config = self.settings.snapshot();
        if !config.scheduling.enabled {
            *self.last_active.lock() = None;
            return ScheduleAction::Unchanged;
        }

        let active = should_capture_be_active(&config.scheduling, now);
        let previous = self.last_active.lock().replace(active);
        if previous == Some(active) {
            return ScheduleAction::Unchanged;
        }
        debug!("Schedule is now {}", if active { "active" } else { "inactive" });

        if !active && self.capture.is_running() {
            self.capture.stop();
            let _ = self
                .event_bus
                .publish(LapseEvent::AutoStopCapture {
                    reason: "outside scheduled capture time".to_string(),
                })
                .await;
            return ScheduleAction::Stopped;
        }

        if active && !self.capture.is_running() && config.camera.auto_start {
            let request = CaptureRequest {
                // Already evaluated against `now`
                bypass_scheduling: true,
                ..CaptureRequest::from_defaults(&config)
            };
            return match self.capture.start(request).await {
                Ok(()) => {
                    let _ = self
                        .event_bus
                        .publish(LapseEvent::AutoStartCapture {
                            reason: "scheduled capture time".to_string(),
                        })
                        .await;
                    ScheduleAction::Started
                }
                Err(e) => {
                    warn!("Scheduled capture start failed: {}", e);
                    // Retry on the next check
                    *self.last_active.lock() = None;
                    ScheduleAction::Unchanged
                }
            };
        }

        ScheduleAction::Unchanged
    }

    /// Check now and then every `system.schedule_check_seconds` until `shutdown`
    pub fn start(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let checker = self.clone();
        let period = Duration::from_secs(self.settings.snapshot().system.schedule_check_seconds);
        info!("Starting schedule checker (every {:?})", period);

        spawn_supervised("schedule_checker", Arc::clone(&self.event_bus), async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        checker.check().await;
                    }
                }
            }
            debug!("Schedule checker stopped");
        })
    }
}

impl Clone for ScheduleChecker {
    fn clone(&self) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            capture: self.capture.clone(),
            event_bus: Arc::clone(&self.event_bus),
            last_active: Arc::clone(&self.last_active),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capture::{FrameSource, IntervalUnit},
        config::{CameraConfig, ImageFormat, LapseConfig},
        error::CaptureError,
        motion::MotionDetector,
        settings::TomlSettingsStore,
        upload::{CurlConnector, UploadDispatcher},
    };
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use image::{DynamicImage, ImageOutputFormat, RgbImage};
    use std::io::Cursor;

    struct GrayFrames;

    #[async_trait]
    impl FrameSource for GrayFrames {
        async fn acquire(&self, _camera: &CameraConfig) -> Result<Vec<u8>, CaptureError> {
            let mut buf = Vec::new();
            DynamicImage::ImageRgb8(RgbImage::new(8, 8))
                .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
                .unwrap();
            Ok(buf)
        }
    }

    fn setup(root: &std::path::Path, auto_start: bool) -> (ScheduleChecker, CaptureController) {
        let mut config = LapseConfig::default();
        config.storage.location = root.to_string_lossy().into_owned();
        config.camera.image_format = ImageFormat::Png;
        config.camera.default_interval = 3600;
        config.camera.auto_start = auto_start;
        config.scheduling.enabled = true;

        let settings: Arc<dyn SettingsStore> = Arc::new(TomlSettingsStore::in_memory(config));
        let event_bus = Arc::new(EventBus::new(50));
        let uploader = Arc::new(UploadDispatcher::new(
            Arc::clone(&settings),
            Arc::new(CurlConnector::default()),
            Arc::clone(&event_bus),
        ));
        let capture = CaptureController::new(
            Arc::clone(&settings),
            Arc::new(GrayFrames),
            Arc::new(MotionDetector::new()),
            uploader,
            Arc::clone(&event_bus),
        );
        (
            ScheduleChecker::new(settings, capture.clone(), event_bus),
            capture,
        )
    }

    // 2024-06-05 is a Wednesday
    fn wednesday(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 5)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_window_transitions_start_and_stop_capture() {
        let dir = tempfile::tempdir().unwrap();
        let (checker, capture) = setup(dir.path(), true);

        assert_eq!(checker.check_at(wednesday(9, 0)).await, ScheduleAction::Started);
        assert!(capture.is_running());
        assert_eq!(
            checker.check_at(wednesday(9, 1)).await,
            ScheduleAction::Unchanged
        );

        assert_eq!(checker.check_at(wednesday(19, 0)).await, ScheduleAction::Stopped);
        assert!(!capture.is_running());
    }

    #[tokio::test]
    async fn test_manual_start_outside_window_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let (checker, capture) = setup(dir.path(), true);

        assert_eq!(
            checker.check_at(wednesday(20, 0)).await,
            ScheduleAction::Unchanged
        );
        capture
            .start(CaptureRequest {
                interval: 1,
                unit: IntervalUnit::Hours,
                bypass_scheduling: true,
            })
            .await
            .unwrap();

        assert_eq!(
            checker.check_at(wednesday(20, 1)).await,
            ScheduleAction::Unchanged
        );
        assert!(capture.is_running());
        capture.stop();
    }

    #[tokio::test]
    async fn test_failed_auto_start_is_retried_on_the_next_check() {
        let dir = tempfile::tempdir().unwrap();
        let (checker, capture) = setup(dir.path(), true);
        checker
            .settings
            .set("storage.location", serde_json::json!(""))
            .unwrap();

        assert_eq!(
            checker.check_at(wednesday(9, 0)).await,
            ScheduleAction::Unchanged
        );
        assert!(!capture.is_running());

        checker
            .settings
            .set(
                "storage.location",
                serde_json::json!(dir.path().to_string_lossy()),
            )
            .unwrap();
        assert_eq!(checker.check_at(wednesday(9, 1)).await, ScheduleAction::Started);
        assert!(capture.is_running());
        capture.stop();
    }

    #[tokio::test]
    async fn test_no_auto_start_without_camera_auto_start() {
        let dir = tempfile::tempdir().unwrap();
        let (checker, capture) = setup(dir.path(), false);

        assert_eq!(
            checker.check_at(wednesday(10, 0)).await,
            ScheduleAction::Unchanged
        );
        assert!(!capture.is_running());
    }
}
