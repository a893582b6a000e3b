use crate::error::EncodeError;
use crate::events::{EventBus, LapseEvent};
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Stderr lines kept for failure diagnostics
const STDERR_TAIL_LINES: usize = 50;

/// Niceness the encoder runs at
#[cfg(unix)]
const ENCODER_NICENESS: libc::c_int = 10;

/// Publishes `TimelapseProgress` for one job
pub struct ProgressSink {
    pub event_bus: Arc<EventBus>,
    pub job_id: String,
    pub total: u64,
}

impl ProgressSink {
    async fn report(&self, frame: u64) {
        let _ = self
            .event_bus
            .publish(LapseEvent::TimelapseProgress {
                job_id: self.job_id.clone(),
                frame,
                total: self.total,
                percent: progress_percent(frame, self.total),
            })
            .await;
    }
}

/// Frame counter from a `-progress` line such as `frame=42`
pub fn parse_progress_line(line: &str) -> Option<u64> {
    line.trim()
        .strip_prefix("frame=")
        .and_then(|value| value.trim().parse().ok())
}

pub fn progress_percent(frame: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    ((frame as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

/// Error-looking lines if there are any, otherwise the whole tail
pub fn diagnostics(tail: &[String]) -> String {
    let errors: Vec<&str> = tail
        .iter()
        .map(String::as_str)
        .filter(|line| {
            let lower = line.to_ascii_lowercase();
            lower.contains("error")
                || lower.contains("invalid")
                || lower.contains("no such file")
                || lower.contains("unknown")
        })
        .collect();

    if errors.is_empty() {
        tail.join("\n")
    } else {
        errors.join("\n")
    }
}

async fn collect_tail<R: AsyncRead + Unpin>(reader: R) -> Vec<String> {
    let mut lines = BufReader::new(reader).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into()
}

/// Run the encoder to completion, reporting progress from its stdout.
///
/// The child is killed if `cancel` fires or the returned future is dropped.
pub async fn run_encoder(
    program: &str,
    args: &[String],
    progress: &ProgressSink,
    cancel: &CancellationToken,
) -> Result<(), EncodeError> {
    debug!("Running encoder: {} {}", program, args.join(" "));

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    unsafe {
        // Only async-signal-safe calls here; a failure leaves the default priority
        command.pre_exec(|| {
            libc::setpriority(libc::PRIO_PROCESS as _, 0, ENCODER_NICENESS);
            Ok(())
        });
    }

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            EncodeError::EncoderMissing {
                program: program.to_string(),
            }
        } else {
            EncodeError::EncodingFailed {
                code: None,
                diagnostics: format!("failed to start {}: {}", program, e),
            }
        }
    })?;

    let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(collect_tail(stderr)));

    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Cancelling encoder for job {}", progress.job_id);
                    let _ = child.kill().await;
                    return Err(EncodeError::Cancelled);
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some(frame) = parse_progress_line(&line) {
                            progress.report(frame).await;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to read encoder progress: {}", e);
                        break;
                    }
                }
            }
        }
    }

    let status = tokio::select! {
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            return Err(EncodeError::Cancelled);
        }
        status = child.wait() => status.map_err(|e| EncodeError::EncodingFailed {
            code: None,
            diagnostics: e.to_string(),
        })?,
    };

    let tail = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    };

    if status.success() {
        Ok(())
    } else {
        Err(EncodeError::EncodingFailed {
            code: status.code(),
            diagnostics: diagnostics(&tail),
        })
    }
}
