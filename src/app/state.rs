use super::{ComponentState, LapseService};
use crate::capture::CaptureStatus;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Background components tracked by the service
pub(super) const COMPONENTS: [&str; 3] = ["schedule_checker", "auto_timelapse", "cleanup"];

/// Point-in-time view of the whole service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub components: BTreeMap<String, String>,
    pub capture: CaptureStatus,
    pub encoder_available: bool,
}

impl LapseService {
    pub(super) async fn set_component_state(&self, component: &str, state: ComponentState) {
        self.component_states
            .lock()
            .await
            .insert(component.to_string(), state.clone());
        debug!("Component '{}' is now {:?}", component, state);
    }

    pub async fn component_state(&self, component: &str) -> Option<ComponentState> {
        self.component_states.lock().await.get(component).cloned()
    }

    pub async fn status(&self) -> ServiceStatus {
        let components = self
            .component_states
            .lock()
            .await
            .iter()
            .map(|(name, state)| (name.clone(), format!("{:?}", state)))
            .collect();

        ServiceStatus {
            components,
            capture: self.capture.status(),
            encoder_available: self.assembler.capabilities().available,
        }
    }
}
