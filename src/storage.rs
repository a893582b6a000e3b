use crate::{
    error::{LapseError, Result},
    events::{EventBus, LapseEvent},
    settings::SettingsStore,
    tasks::spawn_supervised,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm"];

/// A regular file found under the storage location
#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    pub path: PathBuf,
    pub filename: String,
    pub size: u64,
    pub modified: SystemTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageInfo {
    pub location: PathBuf,
    pub total_size: u64,
    pub image_count: usize,
    pub video_count: usize,
    pub limit: u64,
}

/// Cleanup operation result
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupResult {
    pub deleted_count: u64,
    pub deleted_size: u64,
    pub errors: Vec<String>,
}

/// Sum of regular file sizes in `images/` and `videos/` below `root`
pub async fn storage_usage(root: &Path) -> Result<u64> {
    let mut total = 0;
    for dir in [root.join("images"), root.join("videos")] {
        total += scan_files(&dir, None)
            .await?
            .iter()
            .map(|f| f.size)
            .sum::<u64>();
    }
    Ok(total)
}

/// Regular files directly inside `dir`, optionally filtered by lowercase extension.
/// A missing directory is treated as empty.
pub async fn scan_files(dir: &Path, extensions: Option<&[&str]>) -> Result<Vec<StoredFile>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if let Some(allowed) = extensions {
            if !has_extension(&path, allowed) {
                continue;
            }
        }

        // Files can vanish between listing and stat
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        files.push(StoredFile {
            filename: entry.file_name().to_string_lossy().into_owned(),
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            path,
        });
    }
    Ok(files)
}

pub fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| allowed.iter().any(|a| e.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}

/// Storage accounting, video management and old-image cleanup for the configured location
pub struct StorageManager {
    settings: Arc<dyn SettingsStore>,
    event_bus: Arc<EventBus>,
    cleanup_running: Arc<AtomicBool>,
}

impl StorageManager {
    pub fn new(settings: Arc<dyn SettingsStore>, event_bus: Arc<EventBus>) -> Self {
        Self {
            settings,
            event_bus,
            cleanup_running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn location(&self) -> Result<PathBuf> {
        let config = self.settings.snapshot();
        if !config.storage.is_configured() {
            return Err(crate::error::CaptureError::StorageNotConfigured.into());
        }
        Ok(config.storage.root())
    }

    pub async fn storage_info(&self) -> Result<StorageInfo> {
        let config = self.settings.snapshot();
        let location = self.location()?;

        let images = scan_files(&location.join("images"), None).await?;
        let videos = scan_files(&location.join("videos"), Some(VIDEO_EXTENSIONS)).await?;
        let total_size = images.iter().chain(videos.iter()).map(|f| f.size).sum();

        Ok(StorageInfo {
            location,
            total_size,
            image_count: images.len(),
            video_count: videos.len(),
            limit: config.storage.max_storage_bytes(),
        })
    }

    /// Videos in the videos directory, newest first
    pub async fn list_videos(&self) -> Result<Vec<StoredFile>> {
        let location = self.location()?;
        let mut videos = scan_files(&location.join("videos"), Some(VIDEO_EXTENSIONS)).await?;
        videos.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(videos)
    }

    /// Delete a video; the path must resolve to a file inside the videos directory
    pub async fn delete_video(&self, path: &Path) -> Result<u64> {
        let videos_dir = fs::canonicalize(self.location()?.join("videos")).await?;
        let target = fs::canonicalize(path).await?;

        if target.parent() != Some(videos_dir.as_path()) {
            return Err(LapseError::component(
                "storage",
                format!("{} is not inside the videos directory", path.display()),
            ));
        }

        let size = fs::metadata(&target).await?.len();
        fs::remove_file(&target).await?;
        info!("Deleted video {}", target.display());
        Ok(size)
    }

    /// Delete images whose modification time is older than `days` days
    pub async fn cleanup_old_images(&self, days: u32) -> Result<CleanupResult> {
        let images_dir = self.location()?.join("images");
        let cutoff = SystemTime::now() - Duration::from_secs(days as u64 * 24 * 3600);
        debug!("Cleanup cutoff time: {:?}", cutoff);

        let mut result = CleanupResult::default();
        for file in scan_files(&images_dir, None).await? {
            if file.modified >= cutoff {
                continue;
            }
            match fs::remove_file(&file.path).await {
                Ok(()) => {
                    result.deleted_count += 1;
                    result.deleted_size += file.size;
                }
                Err(e) => {
                    warn!("Failed to delete {}: {}", file.path.display(), e);
                    result.errors.push(format!("{}: {}", file.filename, e));
                }
            }
        }

        info!(
            "Cleanup completed: {} images deleted, {} bytes freed, {} errors",
            result.deleted_count,
            result.deleted_size,
            result.errors.len()
        );
        Ok(result)
    }

    /// One scheduled cleanup pass using the configured retention; no-op unless auto cleanup is on
    pub async fn run_cleanup(&self) -> Option<CleanupResult> {
        let config = self.settings.snapshot();
        if !config.storage.auto_cleanup {
            return None;
        }

        if self.cleanup_running.swap(true, Ordering::SeqCst) {
            debug!("Cleanup already running, skipping");
            return None;
        }

        let outcome = self.cleanup_old_images(config.storage.cleanup_days).await;
        self.cleanup_running.store(false, Ordering::SeqCst);

        match outcome {
            Ok(result) => {
                let _ = self
                    .event_bus
                    .publish(LapseEvent::CleanupCompleted {
                        deleted_count: result.deleted_count,
                        deleted_size: result.deleted_size,
                    })
                    .await;
                Some(result)
            }
            Err(e) => {
                let _ = self
                    .event_bus
                    .publish(LapseEvent::CleanupError {
                        error: e.to_string(),
                    })
                    .await;
                None
            }
        }
    }

    /// Run cleanup now and then every `system.cleanup_period_seconds` until `shutdown`
    pub fn start_cleanup_scheduler(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let storage = self.clone();
        let period = Duration::from_secs(self.settings.snapshot().system.cleanup_period_seconds);
        info!("Starting cleanup scheduler (every {:?})", period);

        spawn_supervised("cleanup_scheduler", Arc::clone(&self.event_bus), async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        storage.run_cleanup().await;
                    }
                }
            }
            debug!("Cleanup scheduler stopped");
        })
    }
}

impl Clone for StorageManager {
    fn clone(&self) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            event_bus: Arc::clone(&self.event_bus),
            cleanup_running: Arc::clone(&self.cleanup_running),
        }
    }
}
