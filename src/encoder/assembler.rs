use super::command::{build_args, concat_manifest, select_codec, EncodeInvocation};
use super::options::{TimelapseInput, TimelapseOptions, TimelapseOutput};
use super::probe::EncoderCapabilities;
use super::process::{run_encoder, ProgressSink};
use super::queue::EncodeQueue;
use crate::{
    error::EncodeError,
    events::{EventBus, LapseEvent},
    settings::SettingsStore,
    storage::{has_extension, IMAGE_EXTENSIONS},
    tasks::spawn_supervised,
    upload::UploadDispatcher,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Frames picked up from an input directory
const DIRECTORY_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// Turns a set of stills into a video through the encoder queue
pub struct TimelapseAssembler {
    settings: Arc<dyn SettingsStore>,
    queue: Arc<EncodeQueue>,
    capabilities: Arc<EncoderCapabilities>,
    uploader: Arc<UploadDispatcher>,
    event_bus: Arc<EventBus>,
    shutdown: CancellationToken,
}

impl TimelapseAssembler {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        queue: Arc<EncodeQueue>,
        capabilities: Arc<EncoderCapabilities>,
        uploader: Arc<UploadDispatcher>,
        event_bus: Arc<EventBus>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            settings,
            queue,
            capabilities,
            uploader,
            event_bus,
            shutdown,
        }
    }

    pub fn capabilities(&self) -> &EncoderCapabilities {
        &self.capabilities
    }

    /// Queue an assembly and wait for its result
    pub async fn assemble(&self, options: TimelapseOptions) -> Result<TimelapseOutput, EncodeError> {
        let assembler = self.clone();
        self.queue
            .enqueue(move || async move { assembler.run(options).await })
            .await
    }

    async fn run(&self, options: TimelapseOptions) -> Result<TimelapseOutput, EncodeError> {
        let job_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        info!("Timelapse job {} started: {}", job_id, options.name);

        match self.encode(&job_id, &options).await {
            Ok(output) => {
                self.finish(&options, &output).await;
                Ok(output)
            }
            Err(e) => {
                let _ = self
                    .event_bus
                    .publish(LapseEvent::TimelapseError {
                        job_id,
                        error: e.to_string(),
                    })
                    .await;
                Err(e)
            }
        }
    }

    async fn encode(
        &self,
        job_id: &str,
        options: &TimelapseOptions,
    ) -> Result<TimelapseOutput, EncodeError> {
        if !self.capabilities.available {
            return Err(EncodeError::EncoderUnavailable);
        }

        let frames = collect_frames(&options.input).await?;
        let required = options.fps.max(1) as usize;
        if frames.len() < required {
            return Err(EncodeError::InsufficientFrames {
                found: frames.len(),
                required,
            });
        }

        if let Some(music) = &options.music {
            if !music.path.is_file() {
                return Err(EncodeError::MusicNotFound {
                    path: music.path.clone(),
                });
            }
        }

        let config = self.settings.snapshot();
        let output = match &options.output {
            Some(path) => path.clone(),
            None if config.storage.is_configured() => {
                config.storage.videos_dir().join(options.file_name())
            }
            None => return Err(EncodeError::NoOutputLocation),
        };
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| EncodeError::Staging { source })?;
        }

        let staging = tempfile::Builder::new()
            .prefix("lapsecam-encode-")
            .tempdir()
            .map_err(|source| EncodeError::Staging { source })?;
        let manifest = staging.path().join("frames.txt");
        fs::write(&manifest, concat_manifest(&frames))
            .await
            .map_err(|source| EncodeError::Staging { source })?;

        let staged_output = partial_path(&output);
        let args = build_args(&EncodeInvocation {
            options,
            manifest: &manifest,
            output: &staged_output,
            frame_count: frames.len(),
            hardware_acceleration: config.video.hardware_acceleration,
            codec: select_codec(options.format, &self.capabilities),
        });
        let progress = ProgressSink {
            event_bus: Arc::clone(&self.event_bus),
            job_id: job_id.to_string(),
            total: frames.len() as u64,
        };

        info!(
            "Encoding {} frames at {} fps into {}",
            frames.len(),
            options.fps,
            output.display()
        );
        let result = run_encoder(&self.capabilities.program, &args, &progress, &self.shutdown).await;

        if let Err(e) = staging.close() {
            debug!("Failed to remove encoder staging directory: {}", e);
        }

        if let Err(e) = result {
            if fs::remove_file(&staged_output).await.is_ok() {
                debug!("Removed partial output {}", staged_output.display());
            }
            return Err(e);
        }
        fs::rename(&staged_output, &output)
            .await
            .map_err(|source| EncodeError::Staging { source })?;

        Ok(TimelapseOutput {
            output_path: output,
            frame_count: frames.len(),
        })
    }

    async fn finish(&self, options: &TimelapseOptions, output: &TimelapseOutput) {
        let filename = output
            .output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| options.file_name());

        let ftp = self.settings.snapshot().ftp;
        if !options.is_auto && ftp.enabled && ftp.auto_upload_videos {
            let uploader = Arc::clone(&self.uploader);
            let local = output.output_path.clone();
            let remote_name = filename.clone();
            spawn_supervised("video_upload", Arc::clone(&self.event_bus), async move {
                uploader.upload_and_report(&local, &remote_name).await;
            });
        }

        let _ = self
            .event_bus
            .publish(LapseEvent::TimelapseComplete {
                output_path: output.output_path.clone(),
                filename,
                is_auto: options.is_auto,
            })
            .await;
    }
}

impl Clone for TimelapseAssembler {
    fn clone(&self) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            queue: Arc::clone(&self.queue),
            capabilities: Arc::clone(&self.capabilities),
            uploader: Arc::clone(&self.uploader),
            event_bus: Arc::clone(&self.event_bus),
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Hidden sibling of `output` the encoder writes to; renamed over `output` on success
pub(crate) fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match output.extension() {
        Some(ext) => format!(".{}.partial.{}", stem, ext.to_string_lossy()),
        None => format!(".{}.partial", stem),
    };
    output.with_file_name(name)
}

/// Resolve the input to an ordered frame list
pub(crate) async fn collect_frames(input: &TimelapseInput) -> Result<Vec<PathBuf>, EncodeError> {
    match input {
        TimelapseInput::Directory(dir) => frames_in_directory(dir).await,
        TimelapseInput::Images(images) => {
            let frames: Vec<PathBuf> = images
                .iter()
                .filter(|path| has_extension(path, IMAGE_EXTENSIONS) && path.is_file())
                .cloned()
                .collect();
            if frames.len() < images.len() {
                warn!(
                    "Ignoring {} unusable images from the input list",
                    images.len() - frames.len()
                );
            }
            Ok(frames)
        }
    }
}

async fn frames_in_directory(dir: &Path) -> Result<Vec<PathBuf>, EncodeError> {
    let metadata = match fs::metadata(dir).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(EncodeError::InputNotFound {
                path: dir.to_path_buf(),
            })
        }
        Err(source) => return Err(EncodeError::Staging { source }),
    };
    if !metadata.is_dir() {
        return Err(EncodeError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|source| EncodeError::Staging { source })?;
    let mut frames = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| EncodeError::Staging { source })?
    {
        let path = entry.path();
        if has_extension(&path, DIRECTORY_EXTENSIONS) && path.is_file() {
            frames.push(path);
        }
    }
    frames.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(frames)
}
