use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events published by the capture, encoding and upload components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LapseEvent {
    /// A frame was stored as part of the running session
    ImageCaptured {
        count: u64,
        filename: String,
        path: PathBuf,
    },
    /// A tick was degraded but the session continues
    CaptureWarning { message: String },
    /// A tick failed; the session continues
    CaptureError { message: String },
    /// The storage quota ended the session
    StorageLimitReached { used: u64, limit: u64 },
    MotionDetected {
        percentage: f64,
        threshold: f64,
        timestamp: SystemTime,
    },
    /// The schedule checker started a capture session
    AutoStartCapture { reason: String },
    /// The schedule checker stopped a capture session
    AutoStopCapture { reason: String },
    TimelapseProgress {
        job_id: String,
        frame: u64,
        total: u64,
        percent: u8,
    },
    TimelapseComplete {
        output_path: PathBuf,
        filename: String,
        is_auto: bool,
    },
    TimelapseError { job_id: String, error: String },
    AutoTimelapseCreated { filename: String, image_count: usize },
    AutoTimelapseUploaded { filename: String },
    AutoTimelapseUploadError { filename: String, error: String },
    AutoTimelapseError { error: String },
    FtpUploadComplete { filename: String, remote_path: String },
    FtpUploadError { filename: String, error: String },
    CleanupCompleted { deleted_count: u64, deleted_size: u64 },
    CleanupError { error: String },
    /// A background task failed unexpectedly
    InternalError { component: String, error: String },
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl LapseEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            LapseEvent::ImageCaptured {
                count, filename, ..
            } => format!("Image {} captured: {}", count, filename),
            LapseEvent::CaptureWarning { message } => format!("Capture warning: {}", message),
            LapseEvent::CaptureError { message } => format!("Capture error: {}", message),
            LapseEvent::StorageLimitReached { used, limit } => {
                format!("Storage limit reached: {} of {} bytes used", used, limit)
            }
            LapseEvent::MotionDetected {
                percentage,
                threshold,
                ..
            } => format!(
                "Motion detected: {:.2}% (threshold {:.2}%)",
                percentage, threshold
            ),
            LapseEvent::AutoStartCapture { reason } => format!("Capture auto-started: {}", reason),
            LapseEvent::AutoStopCapture { reason } => format!("Capture auto-stopped: {}", reason),
            LapseEvent::TimelapseProgress {
                job_id,
                frame,
                total,
                percent,
            } => format!(
                "Timelapse {} progress: frame {}/{} ({}%)",
                job_id, frame, total, percent
            ),
            LapseEvent::TimelapseComplete {
                filename, is_auto, ..
            } => {
                if *is_auto {
                    format!("Automatic timelapse complete: {}", filename)
                } else {
                    format!("Timelapse complete: {}", filename)
                }
            }
            LapseEvent::TimelapseError { job_id, error } => {
                format!("Timelapse {} failed: {}", job_id, error)
            }
            LapseEvent::AutoTimelapseCreated {
                filename,
                image_count,
            } => format!(
                "Automatic timelapse {} created from {} images",
                filename, image_count
            ),
            LapseEvent::AutoTimelapseUploaded { filename } => {
                format!("Automatic timelapse {} uploaded", filename)
            }
            LapseEvent::AutoTimelapseUploadError { filename, error } => {
                format!("Automatic timelapse {} upload failed: {}", filename, error)
            }
            LapseEvent::AutoTimelapseError { error } => {
                format!("Automatic timelapse failed: {}", error)
            }
            LapseEvent::FtpUploadComplete {
                filename,
                remote_path,
            } => format!("Uploaded {} to {}", filename, remote_path),
            LapseEvent::FtpUploadError { filename, error } => {
                format!("Upload of {} failed: {}", filename, error)
            }
            LapseEvent::CleanupCompleted {
                deleted_count,
                deleted_size,
            } => format!(
                "Cleanup removed {} images ({} bytes)",
                deleted_count, deleted_size
            ),
            LapseEvent::CleanupError { error } => format!("Cleanup failed: {}", error),
            LapseEvent::InternalError { component, error } => {
                format!("Internal error in {}: {}", component, error)
            }
            LapseEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            LapseEvent::ImageCaptured { .. } => "image_captured",
            LapseEvent::CaptureWarning { .. } => "capture_warning",
            LapseEvent::CaptureError { .. } => "capture_error",
            LapseEvent::StorageLimitReached { .. } => "storage_limit_reached",
            LapseEvent::MotionDetected { .. } => "motion_detected",
            LapseEvent::AutoStartCapture { .. } => "auto_start_capture",
            LapseEvent::AutoStopCapture { .. } => "auto_stop_capture",
            LapseEvent::TimelapseProgress { .. } => "timelapse_progress",
            LapseEvent::TimelapseComplete { .. } => "timelapse_complete",
            LapseEvent::TimelapseError { .. } => "timelapse_error",
            LapseEvent::AutoTimelapseCreated { .. } => "auto_timelapse_created",
            LapseEvent::AutoTimelapseUploaded { .. } => "auto_timelapse_uploaded",
            LapseEvent::AutoTimelapseUploadError { .. } => "auto_timelapse_upload_error",
            LapseEvent::AutoTimelapseError { .. } => "auto_timelapse_error",
            LapseEvent::FtpUploadComplete { .. } => "ftp_upload_complete",
            LapseEvent::FtpUploadError { .. } => "ftp_upload_error",
            LapseEvent::CleanupCompleted { .. } => "cleanup_completed",
            LapseEvent::CleanupError { .. } => "cleanup_error",
            LapseEvent::InternalError { .. } => "internal_error",
            LapseEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<LapseEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<LapseEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers. Fails only when nobody is listening.
    pub async fn publish(&self, event: LapseEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        // Log important events at appropriate levels
        match &event {
            LapseEvent::ImageCaptured { .. }
            | LapseEvent::AutoStartCapture { .. }
            | LapseEvent::AutoStopCapture { .. }
            | LapseEvent::TimelapseComplete { .. }
            | LapseEvent::AutoTimelapseCreated { .. }
            | LapseEvent::AutoTimelapseUploaded { .. }
            | LapseEvent::FtpUploadComplete { .. }
            | LapseEvent::CleanupCompleted { .. }
            | LapseEvent::MotionDetected { .. }
            | LapseEvent::ShutdownRequested { .. } => {
                info!("{}", event.description());
            }
            LapseEvent::CaptureWarning { .. }
            | LapseEvent::StorageLimitReached { .. }
            | LapseEvent::FtpUploadError { .. }
            | LapseEvent::AutoTimelapseUploadError { .. } => {
                warn!("{}", event.description());
            }
            LapseEvent::CaptureError { .. }
            | LapseEvent::TimelapseError { .. }
            | LapseEvent::AutoTimelapseError { .. }
            | LapseEvent::CleanupError { .. }
            | LapseEvent::InternalError { .. } => {
                error!("{}", event.description());
            }
            LapseEvent::TimelapseProgress { .. } => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    EventTypes(Vec<&'static str>),
}

impl EventFilter {
    pub fn matches(&self, event: &LapseEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<LapseEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<LapseEvent>, filter: EventFilter, name: &str) -> Self {
        Self {
            receiver,
            filter,
            name: name.to_string(),
        }
    }

    /// Receive the next event that passes the filter
    pub async fn recv(&mut self) -> Result<LapseEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Drain everything currently buffered that passes the filter
    pub fn drain(&mut self) -> Vec<LapseEvent> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => events.push(event),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(_) => return events,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let event = LapseEvent::ImageCaptured {
            count: 1,
            filename: "capture_1.jpg".to_string(),
            path: PathBuf::from("/tmp/capture_1.jpg"),
        };

        let count = event_bus.publish(event).await.unwrap();
        assert_eq!(count, 1);

        let received = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.event_type(), "image_captured");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_fails() {
        let event_bus = EventBus::new(10);
        let result = event_bus
            .publish(LapseEvent::CleanupError {
                error: "boom".to_string(),
            })
            .await;
        assert!(matches!(result, Err(EventBusError::PublishFailed { .. })));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let mut receiver = EventReceiver::new(
            event_bus.subscribe(),
            EventFilter::EventTypes(vec!["timelapse_complete"]),
            "test",
        );

        event_bus
            .publish(LapseEvent::TimelapseProgress {
                job_id: "job".to_string(),
                frame: 1,
                total: 10,
                percent: 10,
            })
            .await
            .unwrap();
        event_bus
            .publish(LapseEvent::TimelapseComplete {
                output_path: PathBuf::from("/tmp/out.mp4"),
                filename: "out.mp4".to_string(),
                is_auto: false,
            })
            .await
            .unwrap();

        let received = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(received, LapseEvent::TimelapseComplete { .. }));
        assert!(receiver.drain().is_empty());
    }
}
