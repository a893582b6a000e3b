use super::presets::ExportPreset;
use crate::config::{Quality, VideoConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoFormat {
    #[default]
    Mp4,
    Mp4H265,
    Webm,
}

impl VideoFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 | VideoFormat::Mp4H265 => "mp4",
            VideoFormat::Webm => "webm",
        }
    }
}

impl FromStr for VideoFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp4" => Ok(VideoFormat::Mp4),
            "mp4_h265" | "h265" => Ok(VideoFormat::Mp4H265),
            "webm" => Ok(VideoFormat::Webm),
            other => Err(format!("unknown video format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoEffect {
    #[default]
    None,
    Fade,
    Zoom,
    Pan,
}

impl FromStr for VideoEffect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(VideoEffect::None),
            "fade" => Ok(VideoEffect::Fade),
            "zoom" => Ok(VideoEffect::Zoom),
            "pan" => Ok(VideoEffect::Pan),
            other => Err(format!("unknown effect '{}'", other)),
        }
    }
}

impl fmt::Display for VideoEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VideoEffect::None => "none",
            VideoEffect::Fade => "fade",
            VideoEffect::Zoom => "zoom",
            VideoEffect::Pan => "pan",
        };
        f.write_str(name)
    }
}

/// Where the frames come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TimelapseInput {
    /// Every JPEG in the directory, in file name order
    Directory(PathBuf),
    /// These images, in this order
    Images(Vec<PathBuf>),
}

/// Image composited over the whole video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayImage {
    pub path: PathBuf,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicTrack {
    pub path: PathBuf,
    /// 0..=100, mapped to a linear gain
    pub volume: u8,
}

/// One timelapse assembly request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelapseOptions {
    pub name: String,
    pub input: TimelapseInput,
    /// Defaults to `<storage>/videos/<name>.<ext>`
    pub output: Option<PathBuf>,
    pub fps: u32,
    pub quality: Quality,
    pub resolution: (u32, u32),
    pub format: VideoFormat,
    pub effect: VideoEffect,
    pub preserve_aspect_ratio: bool,
    pub deflicker: bool,
    pub overlay: Option<OverlayImage>,
    pub music: Option<MusicTrack>,
    /// Overrides the quality tier when set
    pub bitrate_kbps: Option<u32>,
    pub is_auto: bool,
}

impl TimelapseOptions {
    /// Request using the configured video defaults
    pub fn new<S: Into<String>>(name: S, input: TimelapseInput, video: &VideoConfig) -> Self {
        Self {
            name: name.into(),
            input,
            output: None,
            fps: video.default_fps,
            quality: video.default_quality,
            resolution: video.default_resolution,
            format: VideoFormat::Mp4,
            effect: VideoEffect::None,
            preserve_aspect_ratio: video.preserve_aspect_ratio,
            deflicker: video.deflicker,
            overlay: None,
            music: None,
            bitrate_kbps: None,
            is_auto: false,
        }
    }

    /// Request shaped by an export preset
    pub fn from_preset<S: Into<String>>(
        name: S,
        input: TimelapseInput,
        preset: &ExportPreset,
        video: &VideoConfig,
    ) -> Self {
        Self {
            fps: preset.fps,
            quality: preset.quality,
            resolution: preset.resolution,
            format: preset.format,
            bitrate_kbps: Some(preset.bitrate_kbps),
            ..Self::new(name, input, video)
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, self.format.extension())
    }
}

/// Result of a successful assembly
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelapseOutput {
    pub output_path: PathBuf,
    pub frame_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::presets::find_preset;

    #[test]
    fn test_options_follow_video_defaults() {
        let video = VideoConfig {
            default_fps: 24,
            preserve_aspect_ratio: false,
            ..VideoConfig::default()
        };
        let options = TimelapseOptions::new(
            "garden",
            TimelapseInput::Directory(PathBuf::from("/tmp/images")),
            &video,
        );
        assert_eq!(options.fps, 24);
        assert!(!options.preserve_aspect_ratio);
        assert_eq!(options.file_name(), "garden.mp4");
        assert!(options.bitrate_kbps.is_none());
    }

    #[test]
    fn test_preset_overrides_defaults() {
        let preset = find_preset("archive_quality").unwrap();
        let options = TimelapseOptions::from_preset(
            "archive",
            TimelapseInput::Images(Vec::new()),
            preset,
            &VideoConfig::default(),
        );
        assert_eq!(options.fps, 60);
        assert_eq!(options.resolution, (3840, 2160));
        assert_eq!(options.format, VideoFormat::Mp4H265);
        assert_eq!(options.bitrate_kbps, Some(60000));
    }

    #[test]
    fn test_parse_format_and_effect() {
        assert_eq!("webm".parse::<VideoFormat>().unwrap(), VideoFormat::Webm);
        assert_eq!("MP4_H265".parse::<VideoFormat>().unwrap(), VideoFormat::Mp4H265);
        assert!("avi".parse::<VideoFormat>().is_err());
        assert_eq!("zoom".parse::<VideoEffect>().unwrap(), VideoEffect::Zoom);
        assert_eq!(VideoFormat::Webm.extension(), "webm");
    }
}
