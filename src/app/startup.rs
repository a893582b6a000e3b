use super::state::COMPONENTS;
use super::{ComponentState, LapseService};
use crate::capture::CaptureRequest;
use crate::error::Result;
use crate::settings::SettingsStore;
use tracing::{info, warn};

impl LapseService {
    /// Register components and prepare the storage location
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing lapsecam components");

        for component in COMPONENTS {
            self.set_component_state(component, ComponentState::Stopped)
                .await;
        }

        let config = self.settings.snapshot();
        if config.storage.is_configured() {
            for dir in [config.storage.images_dir(), config.storage.videos_dir()] {
                tokio::fs::create_dir_all(&dir).await?;
            }
        } else {
            warn!("No storage location configured; capture cannot start");
        }

        if !self.assembler.capabilities().available {
            warn!("Encoder unavailable; timelapse assembly requests will fail");
        }

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start the background schedulers, and capture as well when `start_capture` is set
    pub async fn start(&mut self, start_capture: bool) -> Result<()> {
        info!("Starting lapsecam service");
        let token = self.cancellation_token.clone();

        self.set_component_state("schedule_checker", ComponentState::Starting)
            .await;
        let handle = self.schedule_checker.start(token.clone());
        self.background_tasks.push(("schedule_checker", handle));
        self.set_component_state("schedule_checker", ComponentState::Running)
            .await;

        self.set_component_state("auto_timelapse", ComponentState::Starting)
            .await;
        let handle = self.auto_timelapse.start(token.clone());
        self.background_tasks.push(("auto_timelapse", handle));
        self.set_component_state("auto_timelapse", ComponentState::Running)
            .await;

        self.set_component_state("cleanup", ComponentState::Starting)
            .await;
        let handle = self.storage.start_cleanup_scheduler(token);
        self.background_tasks.push(("cleanup", handle));
        self.set_component_state("cleanup", ComponentState::Running)
            .await;

        if start_capture && !self.capture.is_running() {
            let request = CaptureRequest::from_defaults(&self.settings.snapshot());
            self.capture.start(request).await?;
        }

        info!("lapsecam service started");
        Ok(())
    }
}
