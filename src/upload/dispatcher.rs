use super::client::{normalize_remote_dir, ConnectParams, UploadConnector};
use crate::config::FtpConfig;
use crate::error::UploadError;
use crate::events::{EventBus, LapseEvent};
use crate::settings::SettingsStore;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Sends finished files to the configured FTP/SFTP server
pub struct UploadDispatcher {
    settings: Arc<dyn SettingsStore>,
    connector: Arc<dyn UploadConnector>,
    event_bus: Arc<EventBus>,
}

impl UploadDispatcher {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        connector: Arc<dyn UploadConnector>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            settings,
            connector,
            event_bus,
        }
    }

    fn params(ftp: &FtpConfig) -> Result<ConnectParams, UploadError> {
        if ftp.server.trim().is_empty() {
            return Err(UploadError::NotConfigured);
        }
        Ok(ConnectParams {
            host: ftp.server.trim().to_string(),
            port: ftp.effective_port(),
            username: ftp.username.clone(),
            password: ftp.password.clone(),
        })
    }

    /// Upload `local` as `filename` into the configured remote directory and return the remote path
    pub async fn upload(&self, local: &Path, filename: &str) -> Result<String, UploadError> {
        let ftp = self.settings.snapshot().ftp;
        if !ftp.enabled {
            return Err(UploadError::Disabled);
        }
        let params = Self::params(&ftp)?;
        if !local.is_file() {
            return Err(UploadError::FileNotFound {
                path: local.to_path_buf(),
            });
        }

        let remote_dir = normalize_remote_dir(&ftp.directory);
        let remote_path = format!("{}{}", remote_dir, filename);

        let mut client = self.connector.connect(ftp.protocol, &params).await?;
        if let Err(e) = client.ensure_dir(&remote_dir).await {
            // Usually the directory exists already
            debug!("Could not create remote directory {}: {}", remote_dir, e);
        }
        let result = client.put(local, &remote_path).await;
        client.close().await;

        result?;
        info!("Uploaded {} to {}", local.display(), remote_path);
        Ok(remote_path)
    }

    /// Upload and report the outcome as `FtpUploadComplete` / `FtpUploadError`
    pub async fn upload_and_report(&self, local: &Path, filename: &str) {
        let event = match self.upload(local, filename).await {
            Ok(remote_path) => LapseEvent::FtpUploadComplete {
                filename: filename.to_string(),
                remote_path,
            },
            Err(e) => LapseEvent::FtpUploadError {
                filename: filename.to_string(),
                error: e.to_string(),
            },
        };
        let _ = self.event_bus.publish(event).await;
    }

    /// Connect with the current settings and close again; `enabled` is not required
    pub async fn test_connection(&self) -> Result<(), UploadError> {
        let ftp = self.settings.snapshot().ftp;
        let params = Self::params(&ftp)?;
        let mut client = self.connector.connect(ftp.protocol, &params).await?;
        client.close().await;
        info!("Connection test to {}:{} succeeded", params.host, params.port);
        Ok(())
    }
}
