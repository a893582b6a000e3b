mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;


pub use orchestrator::LapseService;
pub use state::ServiceStatus;
pub use types::{ComponentState, ShutdownReason};
