use super::{LapseService, ShutdownReason};
use crate::error::{LapseError, Result};
use crate::events::LapseEvent;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::signal;
use tracing::{error, info};

impl LapseService {
    /// Run until a signal or `request_shutdown`, then shut down gracefully
    pub async fn run(&mut self) -> Result<i32> {
        info!("lapsecam is running");

        let shutdown_receiver =
            self.shutdown_receiver
                .take()
                .ok_or_else(|| LapseError::System {
                    message: "Shutdown receiver already taken".to_string(),
                })?;

        self.setup_signal_handlers();

        let shutdown_reason = shutdown_receiver.await.map_err(|_| LapseError::System {
            message: "Shutdown channel closed unexpectedly".to_string(),
        })?;

        info!("Shutdown initiated: {}", shutdown_reason);
        let _ = self
            .event_bus
            .publish(LapseEvent::ShutdownRequested {
                timestamp: SystemTime::now(),
                reason: shutdown_reason.to_string(),
            })
            .await;

        let exit_code = self.shutdown().await?;

        info!("lapsecam shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&self) {
        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let shutdown_sender = Arc::clone(&self.shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate())
                {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    if let Some(sender) = shutdown_sender.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                    }
                }
            });
        }

        let shutdown_sender = Arc::clone(&self.shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = shutdown_sender.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }
}
