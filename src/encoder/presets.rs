use super::options::VideoFormat;
use crate::config::Quality;
use serde::Serialize;

/// Target-platform export settings
#[derive(Debug, Clone, Serialize)]
pub struct ExportPreset {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub fps: u32,
    pub quality: Quality,
    pub resolution: (u32, u32),
    pub format: VideoFormat,
    pub bitrate_kbps: u32,
    pub aspect_ratio: &'static str,
}

pub const EXPORT_PRESETS: &[ExportPreset] = &[
    ExportPreset {
        key: "youtube",
        name: "YouTube",
        description: "1080p HD optimized for YouTube",
        fps: 30,
        quality: Quality::High,
        resolution: (1920, 1080),
        format: VideoFormat::Mp4,
        bitrate_kbps: 8000,
        aspect_ratio: "16:9",
    },
    ExportPreset {
        key: "youtube_4k",
        name: "YouTube 4K",
        description: "4K Ultra HD for premium YouTube content",
        fps: 30,
        quality: Quality::Ultra,
        resolution: (3840, 2160),
        format: VideoFormat::Mp4,
        bitrate_kbps: 40000,
        aspect_ratio: "16:9",
    },
    ExportPreset {
        key: "instagram_reels",
        name: "Instagram Reels",
        description: "Vertical format for Instagram Reels and Stories",
        fps: 30,
        quality: Quality::High,
        resolution: (1080, 1920),
        format: VideoFormat::Mp4,
        bitrate_kbps: 5000,
        aspect_ratio: "9:16",
    },
    ExportPreset {
        key: "instagram_feed",
        name: "Instagram Feed",
        description: "Square format for Instagram feed posts",
        fps: 30,
        quality: Quality::High,
        resolution: (1080, 1080),
        format: VideoFormat::Mp4,
        bitrate_kbps: 5000,
        aspect_ratio: "1:1",
    },
    ExportPreset {
        key: "tiktok",
        name: "TikTok",
        description: "Vertical format optimized for TikTok",
        fps: 30,
        quality: Quality::High,
        resolution: (1080, 1920),
        format: VideoFormat::Mp4,
        bitrate_kbps: 5000,
        aspect_ratio: "9:16",
    },
    ExportPreset {
        key: "web_optimized",
        name: "Web Optimized",
        description: "Lightweight 720p for web streaming",
        fps: 24,
        quality: Quality::Medium,
        resolution: (1280, 720),
        format: VideoFormat::Mp4,
        bitrate_kbps: 3500,
        aspect_ratio: "16:9",
    },
    ExportPreset {
        key: "archive_quality",
        name: "Archive Quality",
        description: "4K 60fps maximum quality preservation",
        fps: 60,
        quality: Quality::Ultra,
        resolution: (3840, 2160),
        format: VideoFormat::Mp4H265,
        bitrate_kbps: 60000,
        aspect_ratio: "16:9",
    },
];

pub fn find_preset(key: &str) -> Option<&'static ExportPreset> {
    EXPORT_PRESETS.iter().find(|preset| preset.key == key)
}
