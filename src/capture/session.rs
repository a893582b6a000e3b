use chrono::{DateTime, Utc};
use serde::Serialize;

/// State of the current capture run. Paused implies running.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureSession {
    pub is_running: bool,
    pub is_paused: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub image_count: u64,
    /// Bumped by every `begin`, so work started in one run can't count toward the next
    pub generation: u64,
}

impl CaptureSession {
    pub fn begin(&mut self, now: DateTime<Utc>) {
        *self = Self {
            is_running: true,
            is_paused: false,
            started_at: Some(now),
            image_count: 0,
            generation: self.generation.wrapping_add(1),
        };
    }

    /// Returns whether a running session was ended
    pub fn end(&mut self) -> bool {
        let was_running = self.is_running;
        *self = Self {
            generation: self.generation,
            ..Self::default()
        };
        was_running
    }

    pub fn set_paused(&mut self, paused: bool) -> bool {
        if !self.is_running || self.is_paused == paused {
            return false;
        }
        self.is_paused = paused;
        true
    }

    /// Count a stored image for run `generation`; ignored once that run has ended
    pub fn record_image(&mut self, generation: u64) -> Option<u64> {
        if !self.is_running || self.generation != generation {
            return None;
        }
        self.image_count += 1;
        Some(self.image_count)
    }
}

/// Read-only snapshot of the capture state
#[derive(Debug, Clone, Serialize)]
pub struct CaptureStatus {
    pub is_running: bool,
    pub is_paused: bool,
    pub image_count: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: i64,
    pub motion_enabled: bool,
    pub last_motion_at: Option<DateTime<Utc>>,
}
