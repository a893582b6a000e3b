use crate::config::{MotionConfig, MotionZone};
use crate::error::MotionError;
use image::imageops::{self, FilterType};
use image::GrayImage;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Largest analysis frame; captures are downsampled to at most this size
pub const ANALYSIS_WIDTH: u32 = 160;
pub const ANALYSIS_HEIGHT: u32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MotionSkip {
    Disabled,
    FirstFrame,
    Cooldown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotionResult {
    pub motion: bool,
    pub motion_percentage: f64,
    pub threshold: f64,
    /// Why no comparison took place
    pub reason: Option<MotionSkip>,
}

impl MotionResult {
    fn skipped(reason: MotionSkip, threshold: f64) -> Self {
        Self {
            motion: false,
            motion_percentage: 0.0,
            threshold,
            reason: Some(reason),
        }
    }
}

#[derive(Default)]
struct MotionState {
    previous_frame: Option<Vec<u8>>,
    last_motion_at: Option<Instant>,
}

/// Frame-difference motion detector shared by every capture session of the process
#[derive(Default)]
pub struct MotionDetector {
    state: Mutex<MotionState>,
}

impl MotionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous frame and the last detection
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.previous_frame = None;
        state.last_motion_at = None;
    }

    pub fn last_motion_at(&self) -> Option<Instant> {
        self.state.lock().last_motion_at
    }

    pub fn detect(&self, frame: &[u8], config: &MotionConfig) -> Result<MotionResult, MotionError> {
        self.detect_at(frame, config, Instant::now())
    }

    /// Compare `frame` with the previously seen frame as of `now`.
    ///
    /// `frame` always replaces the stored previous frame unless detection is disabled.
    pub fn detect_at(
        &self,
        frame: &[u8],
        config: &MotionConfig,
        now: Instant,
    ) -> Result<MotionResult, MotionError> {
        let threshold = (100.0 - config.sensitivity.min(100) as f64) / 2.0;

        if !config.enabled {
            return Ok(MotionResult::skipped(MotionSkip::Disabled, threshold));
        }

        let mut state = self.state.lock();
        let previous = state.previous_frame.replace(frame.to_vec());

        let Some(previous) = previous else {
            return Ok(MotionResult::skipped(MotionSkip::FirstFrame, threshold));
        };

        if let Some(last) = state.last_motion_at {
            if now.saturating_duration_since(last) < Duration::from_millis(config.cooldown_ms) {
                return Ok(MotionResult::skipped(MotionSkip::Cooldown, threshold));
            }
        }

        let current = decode_grayscale(frame)?;
        let (width, height) = current.dimensions();
        let previous = match decode_grayscale(&previous) {
            Ok(img) if img.dimensions() == (width, height) => img,
            Ok(img) => imageops::resize(&img, width, height, FilterType::Triangle),
            Err(e) => {
                debug!("Previous frame unusable for comparison: {}", e);
                return Ok(MotionResult::skipped(MotionSkip::FirstFrame, threshold));
            }
        };

        let motion_percentage = difference_percentage(
            &previous,
            &current,
            &config.zones,
            config.noise_filter,
        );
        let motion = motion_percentage > threshold;
        if motion {
            state.last_motion_at = Some(now);
        }

        debug!(
            "Motion analysis: {:.2}% changed (threshold {:.2}%)",
            motion_percentage, threshold
        );

        Ok(MotionResult {
            motion,
            motion_percentage,
            threshold,
            reason: None,
        })
    }
}

/// Decode and downsample to the analysis resolution
fn decode_grayscale(bytes: &[u8]) -> Result<GrayImage, MotionError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| MotionError::Decode {
        details: e.to_string(),
    })?;
    let gray = decoded.to_luma8();
    let (w, h) = gray.dimensions();
    let target = (w.min(ANALYSIS_WIDTH), h.min(ANALYSIS_HEIGHT));
    if target == (w, h) {
        return Ok(gray);
    }
    Ok(imageops::resize(&gray, target.0, target.1, FilterType::Triangle))
}

/// Mean absolute difference over the analysis region in percent of full scale
fn difference_percentage(
    previous: &GrayImage,
    current: &GrayImage,
    zones: &[MotionZone],
    noise_filter: u8,
) -> f64 {
    let mut total: u64 = 0;
    let mut region_pixels: u64 = 0;

    for (x, y, pixel) in current.enumerate_pixels() {
        if !zones.is_empty() && !zones.iter().any(|zone| zone.contains(x, y)) {
            continue;
        }
        region_pixels += 1;

        let d = pixel.0[0].abs_diff(previous.get_pixel(x, y).0[0]);
        if d >= noise_filter {
            total += d as u64;
        }
    }

    if region_pixels == 0 {
        return 0.0;
    }
    total as f64 / (region_pixels as f64 * 255.0) * 100.0
}
