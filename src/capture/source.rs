use crate::config::{CameraConfig, ImageFormat};
use crate::error::CaptureError;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const GRAB_TIMEOUT: Duration = Duration::from_secs(15);

/// Produces one encoded still image per call
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Grab a frame; any failure is reported as `NoSignal`
    async fn acquire(&self, camera: &CameraConfig) -> Result<Vec<u8>, CaptureError>;
}

/// Grabs single frames from a capture device or display through the ffmpeg CLI
pub struct FfmpegFrameSource {
    program: String,
}

impl FfmpegFrameSource {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub(crate) fn grab_args(camera: &CameraConfig) -> Vec<String> {
        let codec = match camera.image_format {
            ImageFormat::Jpeg => "mjpeg",
            ImageFormat::Png => "png",
        };
        // ffmpeg's mjpeg qscale runs 2 (best) to 31 (worst)
        let qscale = 2 + (100 - camera.jpeg_quality.clamp(1, 100) as u32) * 29 / 99;

        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            camera.input_format.clone(),
            "-video_size".into(),
            format!("{}x{}", camera.resolution.0, camera.resolution.1),
            "-i".into(),
            camera.device.clone(),
            "-frames:v".into(),
            "1".into(),
            "-c:v".into(),
            codec.into(),
        ];
        if camera.image_format == ImageFormat::Jpeg {
            args.push("-q:v".into());
            args.push(qscale.to_string());
        }
        args.extend(["-f".into(), "image2pipe".into(), "-".into()]);
        args
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn acquire(&self, camera: &CameraConfig) -> Result<Vec<u8>, CaptureError> {
        let args = Self::grab_args(camera);
        debug!("Grabbing frame: {} {}", self.program, args.join(" "));

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::NoSignal {
                details: format!("failed to start {}: {}", self.program, e),
            })?;

        let output = tokio::time::timeout(GRAB_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| CaptureError::NoSignal {
                details: format!("no frame from {} within {:?}", camera.device, GRAB_TIMEOUT),
            })?
            .map_err(|e| CaptureError::NoSignal {
                details: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(CaptureError::NoSignal {
                details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if output.stdout.is_empty() {
            return Err(CaptureError::NoSignal {
                details: "image buffer is empty".to_string(),
            });
        }
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grab_args_follow_camera_settings() {
        let camera = CameraConfig {
            input_format: "x11grab".to_string(),
            device: ":0.0".to_string(),
            resolution: (1280, 720),
            jpeg_quality: 100,
            ..CameraConfig::default()
        };
        let args = FfmpegFrameSource::grab_args(&camera).join(" ");
        assert!(args.contains("-f x11grab -video_size 1280x720 -i :0.0"));
        assert!(args.contains("-c:v mjpeg -q:v 2"));
        assert!(args.ends_with("-f image2pipe -"));

        let png = CameraConfig {
            image_format: ImageFormat::Png,
            ..CameraConfig::default()
        };
        let args = FfmpegFrameSource::grab_args(&png).join(" ");
        assert!(args.contains("-c:v png"));
        assert!(!args.contains("-q:v"));
    }

    #[tokio::test]
    async fn test_missing_grabber_is_no_signal() {
        let source = FfmpegFrameSource::new("/nonexistent/ffmpeg");
        let result = source.acquire(&CameraConfig::default()).await;
        assert!(matches!(result, Err(CaptureError::NoSignal { .. })));
    }
}
