mod assembler;
pub mod command;
mod options;
mod presets;
mod probe;
pub mod process;
mod queue;
#[cfg(test)]
mod tests;

pub use assembler::TimelapseAssembler;
pub use options::{
    MusicTrack, OverlayImage, TimelapseInput, TimelapseOptions, TimelapseOutput, VideoEffect,
    VideoFormat,
};
pub use presets::{find_preset, ExportPreset, EXPORT_PRESETS};
pub use probe::EncoderCapabilities;
pub use queue::EncodeQueue;
