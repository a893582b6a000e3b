pub mod checker;
pub mod cron;
pub mod policy;

pub use checker::{ScheduleAction, ScheduleChecker};
pub use policy::{should_capture_be_active, window_contains};
