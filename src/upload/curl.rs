use super::client::{ConnectParams, UploadClient, UploadConnector};
use crate::config::UploadProtocol;
use crate::error::UploadError;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

const CONNECT_TIMEOUT_SECS: u64 = 30;
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(600);

/// Connector backed by the `curl` command-line client.
///
/// Credentials are written to curl's stdin as a config file (`-K -`) so they never appear
/// in the process list.
pub struct CurlConnector {
    program: String,
}

impl CurlConnector {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for CurlConnector {
    fn default() -> Self {
        Self::new("curl")
    }
}

#[async_trait]
impl UploadConnector for CurlConnector {
    async fn connect(
        &self,
        protocol: UploadProtocol,
        params: &ConnectParams,
    ) -> Result<Box<dyn UploadClient>, UploadError> {
        let client = CurlClient {
            program: self.program.clone(),
            protocol,
            params: params.clone(),
        };

        // Listing the login directory verifies reachability and credentials
        let home = match protocol {
            UploadProtocol::Ftp => "/".to_string(),
            UploadProtocol::Sftp => "/~/".to_string(),
        };
        client.run(&["--list-only".to_string(), client.url(&home)]).await?;
        debug!(
            "Connected to {}://{}:{}",
            protocol.scheme(),
            params.host,
            params.port
        );

        Ok(Box::new(client))
    }
}

struct CurlClient {
    program: String,
    protocol: UploadProtocol,
    params: ConnectParams,
}

impl CurlClient {
    fn url(&self, path: &str) -> String {
        format!(
            "{}://{}:{}{}",
            self.protocol.scheme(),
            self.params.host,
            self.params.port,
            encode_path(path)
        )
    }

    fn config_text(&self) -> String {
        format!(
            "user = \"{}:{}\"\n",
            escape_config_value(&self.params.username),
            escape_config_value(&self.params.password)
        )
    }

    async fn run(&self, args: &[String]) -> Result<(), UploadError> {
        let mut child = Command::new(&self.program)
            .args(["-K", "-", "--silent", "--show-error"])
            .args(["--connect-timeout", &CONNECT_TIMEOUT_SECS.to_string()])
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| UploadError::UploadFailed {
                message: format!("failed to start {}: {}", self.program, e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(self.config_text().as_bytes())
                .await
                .map_err(|e| UploadError::UploadFailed {
                    message: format!("failed to pass credentials: {}", e),
                })?;
        }

        let output = tokio::time::timeout(TRANSFER_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| UploadError::UploadFailed {
                message: "transfer timed out".to_string(),
            })?
            .map_err(|e| UploadError::UploadFailed {
                message: e.to_string(),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(UploadError::UploadFailed {
                message: if stderr.is_empty() {
                    format!("{} exited with {}", self.program, output.status)
                } else {
                    stderr
                },
            })
        }
    }
}

#[async_trait]
impl UploadClient for CurlClient {
    async fn ensure_dir(&mut self, remote_dir: &str) -> Result<(), UploadError> {
        let trimmed = remote_dir.trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok(());
        }
        let quote = match self.protocol {
            UploadProtocol::Ftp => format!("MKD {}", trimmed),
            UploadProtocol::Sftp => format!("mkdir {}", trimmed),
        };
        self.run(&["-Q".to_string(), quote, self.url("/")]).await
    }

    async fn put(&mut self, local: &Path, remote_path: &str) -> Result<(), UploadError> {
        self.run(&[
            "--ftp-create-dirs".to_string(),
            "-T".to_string(),
            local.to_string_lossy().into_owned(),
            self.url(remote_path),
        ])
        .await
    }

    async fn close(&mut self) {
        // Every curl invocation is its own connection
    }
}

fn escape_config_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn encode_path(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}
