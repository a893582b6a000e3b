use super::types::{ComponentState, ShutdownReason};
use crate::auto_timelapse::AutoTimelapseScheduler;
use crate::capture::{CaptureController, FfmpegFrameSource, FrameSource};
use crate::encoder::{EncodeQueue, EncoderCapabilities, TimelapseAssembler};
use crate::events::EventBus;
use crate::motion::MotionDetector;
use crate::schedule::ScheduleChecker;
use crate::settings::{SettingsStore, TomlSettingsStore};
use crate::storage::StorageManager;
use crate::upload::{CurlConnector, UploadConnector, UploadDispatcher};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Owns every long-lived component and wires them to one settings store and event bus
pub struct LapseService {
    pub(super) settings: Arc<TomlSettingsStore>,
    pub(super) event_bus: Arc<EventBus>,

    // Components
    pub(super) capture: CaptureController,
    pub(super) assembler: TimelapseAssembler,
    pub(super) storage: StorageManager,
    pub(super) uploader: Arc<UploadDispatcher>,
    pub(super) schedule_checker: ScheduleChecker,
    pub(super) auto_timelapse: AutoTimelapseScheduler,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) background_tasks: Vec<(&'static str, JoinHandle<()>)>,
    pub(super) shutdown_sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl LapseService {
    /// Build the service with the ffmpeg frame source and curl uploads, probing the encoder first
    pub async fn new(settings: Arc<TomlSettingsStore>) -> Self {
        let config = settings.snapshot();
        let capabilities = EncoderCapabilities::probe(&config.video.encoder_path).await;
        let source = Arc::new(FfmpegFrameSource::new(config.video.encoder_path.clone()));
        let connector = Arc::new(CurlConnector::new(config.ftp.client_path.clone()));
        Self::with_components(settings, source, connector, capabilities)
    }

    /// Build the service around the given collaborators
    pub fn with_components(
        settings: Arc<TomlSettingsStore>,
        source: Arc<dyn FrameSource>,
        connector: Arc<dyn UploadConnector>,
        capabilities: EncoderCapabilities,
    ) -> Self {
        let config = settings.snapshot();
        let store: Arc<dyn SettingsStore> = settings.clone();
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let cancellation_token = CancellationToken::new();
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        let uploader = Arc::new(UploadDispatcher::new(
            Arc::clone(&store),
            connector,
            Arc::clone(&event_bus),
        ));

        let capture = CaptureController::new(
            Arc::clone(&store),
            source,
            Arc::new(MotionDetector::new()),
            Arc::clone(&uploader),
            Arc::clone(&event_bus),
        );

        let assembler = TimelapseAssembler::new(
            Arc::clone(&store),
            Arc::new(EncodeQueue::new(cancellation_token.clone())),
            Arc::new(capabilities),
            Arc::clone(&uploader),
            Arc::clone(&event_bus),
            cancellation_token.clone(),
        );

        let storage = StorageManager::new(Arc::clone(&store), Arc::clone(&event_bus));

        let schedule_checker =
            ScheduleChecker::new(Arc::clone(&store), capture.clone(), Arc::clone(&event_bus));

        let auto_timelapse = AutoTimelapseScheduler::new(
            Arc::clone(&store),
            assembler.clone(),
            capture.clone(),
            Arc::clone(&uploader),
            Arc::clone(&event_bus),
        );

        Self {
            settings,
            event_bus,
            capture,
            assembler,
            storage,
            uploader,
            schedule_checker,
            auto_timelapse,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            background_tasks: Vec::new(),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token,
        }
    }

    pub fn settings(&self) -> &Arc<TomlSettingsStore> {
        &self.settings
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn capture(&self) -> &CaptureController {
        &self.capture
    }

    pub fn assembler(&self) -> &TimelapseAssembler {
        &self.assembler
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    pub fn uploader(&self) -> &UploadDispatcher {
        &self.uploader
    }

    /// Ask a running `run()` to shut down; only the first request counts
    pub async fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        match self.shutdown_sender.lock().await.take() {
            Some(sender) => sender.send(reason).is_ok(),
            None => false,
        }
    }
}
