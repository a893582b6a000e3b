use super::{ComponentState, LapseService};
use crate::error::Result;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(5);

impl LapseService {
    /// Stop capture, cancel background work (running encodes included) and wait for tasks
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        if self.capture.stop() {
            info!("Capture session stopped");
        }
        self.cancellation_token.cancel();

        let mut exit_code = 0;
        for (component, handle) in std::mem::take(&mut self.background_tasks) {
            self.set_component_state(component, ComponentState::Stopping)
                .await;
            match timeout(TASK_STOP_TIMEOUT, handle).await {
                Ok(Ok(())) => {
                    self.set_component_state(component, ComponentState::Stopped)
                        .await;
                    info!("{} component stopped", component);
                }
                Ok(Err(e)) => {
                    self.set_component_state(component, ComponentState::Failed)
                        .await;
                    error!("Error stopping {} component: {}", component, e);
                    exit_code = 1;
                }
                Err(_) => {
                    self.set_component_state(component, ComponentState::Failed)
                        .await;
                    error!("{} component stop timeout", component);
                    exit_code = 1;
                }
            }
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }
}
