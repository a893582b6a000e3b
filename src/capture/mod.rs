mod controller;
mod session;
mod source;
mod watermark;

pub use controller::{CaptureController, CaptureRequest, IntervalUnit, TickOutcome};
pub use session::{CaptureSession, CaptureStatus};
pub use source::{FfmpegFrameSource, FrameSource};
pub use watermark::{apply_watermark, sanitize_watermark_text};
