use serde::Serialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// What the encoder binary can do, probed once at startup
#[derive(Debug, Clone, Serialize)]
pub struct EncoderCapabilities {
    pub program: String,
    pub available: bool,
    pub version: Option<String>,
    pub has_libx264: bool,
}

impl EncoderCapabilities {
    pub async fn probe(program: &str) -> Self {
        let version = match run_probe(program, &["-hide_banner", "-version"]).await {
            Some(stdout) => stdout.lines().next().map(|line| line.trim().to_string()),
            None => {
                warn!("Encoder '{}' is not available; timelapse assembly is disabled", program);
                return Self::unavailable(program);
            }
        };

        let has_libx264 = run_probe(
            program,
            &[
                "-hide_banner",
                "-loglevel",
                "error",
                "-f",
                "lavfi",
                "-i",
                "testsrc=duration=0.1:size=320x240:rate=1",
                "-c:v",
                "libx264",
                "-f",
                "null",
                "-",
            ],
        )
        .await
        .is_some();

        info!(
            "Encoder: {} (libx264: {})",
            version.as_deref().unwrap_or(program),
            if has_libx264 { "yes" } else { "no, using mpeg4" }
        );

        Self {
            program: program.to_string(),
            available: true,
            version,
            has_libx264,
        }
    }

    pub fn unavailable(program: &str) -> Self {
        Self {
            program: program.to_string(),
            available: false,
            version: None,
            has_libx264: false,
        }
    }

    /// Capabilities taken on trust, without running the binary
    pub fn assume(program: &str, has_libx264: bool) -> Self {
        Self {
            program: program.to_string(),
            available: true,
            version: None,
            has_libx264,
        }
    }
}

/// Stdout of a successful run finishing within the probe timeout
async fn run_probe(program: &str, args: &[&str]) -> Option<String> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .ok()?;

    let output = tokio::time::timeout(PROBE_TIMEOUT, child.wait_with_output())
        .await
        .ok()?
        .ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
}
