pub mod app;
pub mod auto_timelapse;
pub mod capture;
pub mod config;
pub mod encoder;
pub mod error;
pub mod events;
pub mod motion;
pub mod schedule;
pub mod settings;
pub mod storage;
pub mod tasks;
pub mod upload;

pub use app::{ComponentState, LapseService, ServiceStatus, ShutdownReason};
pub use config::LapseConfig;
pub use error::{LapseError, Result};
pub use events::{EventBus, EventFilter, EventReceiver, LapseEvent};
