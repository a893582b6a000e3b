use super::options::{TimelapseOptions, VideoEffect, VideoFormat};
use super::probe::EncoderCapabilities;
use crate::config::Quality;
use std::path::Path;

/// How the codec is told what quality to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateControl {
    Crf,
    Bitrate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoCodec {
    pub name: &'static str,
    pub rate_control: RateControl,
}

pub fn select_codec(format: VideoFormat, capabilities: &EncoderCapabilities) -> VideoCodec {
    match format {
        VideoFormat::Webm => VideoCodec {
            name: "libvpx-vp9",
            rate_control: RateControl::Bitrate,
        },
        VideoFormat::Mp4H265 => VideoCodec {
            name: "libx265",
            rate_control: RateControl::Crf,
        },
        VideoFormat::Mp4 if capabilities.has_libx264 => VideoCodec {
            name: "libx264",
            rate_control: RateControl::Crf,
        },
        VideoFormat::Mp4 => VideoCodec {
            name: "mpeg4",
            rate_control: RateControl::Bitrate,
        },
    }
}

pub fn crf_for(quality: Quality) -> u8 {
    match quality {
        Quality::Low => 28,
        Quality::Medium => 23,
        Quality::High => 18,
        Quality::Ultra => 15,
    }
}

pub fn bitrate_for(quality: Quality) -> &'static str {
    match quality {
        Quality::Low => "2M",
        Quality::Medium => "5M",
        Quality::High => "8M",
        Quality::Ultra => "12M",
    }
}

/// Quality arguments; an explicit bitrate wins over the tier
pub fn quality_args(codec: VideoCodec, quality: Quality, bitrate_kbps: Option<u32>) -> Vec<String> {
    match (bitrate_kbps, codec.rate_control) {
        (Some(kbps), _) => vec!["-b:v".into(), format!("{}k", kbps)],
        (None, RateControl::Bitrate) => vec!["-b:v".into(), bitrate_for(quality).into()],
        (None, RateControl::Crf) => vec!["-crf".into(), crf_for(quality).to_string()],
    }
}

/// Effect, deflicker and scale stages, in application order
pub fn base_filters(options: &TimelapseOptions, frame_count: usize) -> Vec<String> {
    let fps = options.fps.max(1);
    let mut filters = Vec::new();

    match options.effect {
        VideoEffect::None => {}
        VideoEffect::Fade => {
            let fade_out_start = (frame_count as f64 / fps as f64 - 1.0).max(0.0);
            filters.push("fade=in:0:25".to_string());
            filters.push(format!("fade=out:st={}:d=1", fade_out_start));
        }
        VideoEffect::Zoom => filters.push(format!(
            "zoompan=z='min(zoom+0.0015,1.5)':x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':d={}",
            fps * 10
        )),
        VideoEffect::Pan => filters.push(format!(
            "zoompan=z=1:x='if(lte(on,1),(iw-ow)/2,x-1)':y='ih/2-(ih/zoom/2)':d={}",
            fps * 10
        )),
    }

    if options.deflicker {
        filters.push("deflicker=s=7:m=am".to_string());
    }

    let (width, height) = options.resolution;
    if options.preserve_aspect_ratio {
        filters.push(format!(
            "scale='if(gt(a,{w}/{h}),{w},-2)':'if(gt(a,{w}/{h}),-2,{h})'",
            w = width,
            h = height
        ));
        filters.push(format!("pad={}:{}:(ow-iw)/2:(oh-ih)/2", width, height));
    } else {
        filters.push(format!("scale={}:{}", width, height));
    }

    filters
}

/// Everything needed to build one encoder invocation
pub struct EncodeInvocation<'a> {
    pub options: &'a TimelapseOptions,
    pub manifest: &'a Path,
    pub output: &'a Path,
    pub frame_count: usize,
    pub hardware_acceleration: bool,
    pub codec: VideoCodec,
}

pub fn build_args(invocation: &EncodeInvocation<'_>) -> Vec<String> {
    let options = invocation.options;
    let mut args: Vec<String> = Vec::new();

    if invocation.hardware_acceleration {
        args.extend(["-hwaccel".into(), "auto".into()]);
    }
    args.extend([
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-r".into(),
        options.fps.to_string(),
        "-i".into(),
        invocation.manifest.display().to_string(),
    ]);

    let mut next_input = 1;
    let overlay_input = options.overlay.as_ref().map(|overlay| {
        args.extend(["-i".into(), overlay.path.display().to_string()]);
        next_input += 1;
        next_input - 1
    });
    let music_input = options.music.as_ref().map(|music| {
        args.extend(["-i".into(), music.path.display().to_string()]);
        next_input
    });

    args.extend(["-c:v".into(), invocation.codec.name.into()]);
    args.extend(quality_args(
        invocation.codec,
        options.quality,
        options.bitrate_kbps,
    ));

    if let (Some(music), Some(index)) = (&options.music, music_input) {
        args.extend([
            "-map".into(),
            format!("{}:a", index),
            "-c:a".into(),
            "aac".into(),
            "-filter:a".into(),
            format!("volume={}", music.volume.min(100) as f64 / 100.0),
            "-shortest".into(),
        ]);
    }

    let filters = base_filters(options, invocation.frame_count);
    match (&options.overlay, overlay_input) {
        (Some(overlay), Some(index)) => {
            let graph = format!(
                "[0:v]{}[base];[base][{}:v]overlay={}:{},format=yuv420p[vout]",
                filters.join(","),
                index,
                overlay.x,
                overlay.y
            );
            args.extend([
                "-filter_complex".into(),
                graph,
                "-map".into(),
                "[vout]".into(),
            ]);
        }
        _ => {
            let mut chain = filters;
            chain.push("format=yuv420p".to_string());
            args.extend(["-vf".into(), chain.join(",")]);
            if music_input.is_some() {
                args.extend(["-map".into(), "0:v".into()]);
            }
        }
    }

    args.extend([
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-progress".into(),
        "pipe:1".into(),
        "-nostats".into(),
        "-y".into(),
        invocation.output.display().to_string(),
    ]);
    args
}

/// Concat demuxer manifest listing `frames` in order
pub fn concat_manifest(frames: &[impl AsRef<Path>]) -> String {
    frames
        .iter()
        .map(|frame| {
            let path = frame.as_ref().to_string_lossy().replace('\'', "'\\''");
            format!("file '{}'\n", path)
        })
        .collect()
}
