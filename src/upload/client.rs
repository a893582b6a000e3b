use crate::config::UploadProtocol;
use crate::error::UploadError;
use async_trait::async_trait;
use std::path::Path;

/// Where and as whom to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// Opens sessions against a remote file server
#[async_trait]
pub trait UploadConnector: Send + Sync {
    /// Connect and authenticate; failures map to `UploadError::UploadFailed`
    async fn connect(
        &self,
        protocol: UploadProtocol,
        params: &ConnectParams,
    ) -> Result<Box<dyn UploadClient>, UploadError>;
}

/// An authenticated session
#[async_trait]
pub trait UploadClient: Send {
    /// Create `remote_dir` and its parents if needed
    async fn ensure_dir(&mut self, remote_dir: &str) -> Result<(), UploadError>;

    async fn put(&mut self, local: &Path, remote_path: &str) -> Result<(), UploadError>;

    async fn close(&mut self);
}

/// Backslashes become slashes; the result always starts and ends with `/`
pub fn normalize_remote_dir(dir: &str) -> String {
    let cleaned = dir.trim().replace('\\', "/");
    let inner = cleaned
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    if inner.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", inner)
    }
}
