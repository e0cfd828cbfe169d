use super::{CrowdwatchApp, ShutdownReason};
use crate::error::{CrowdwatchError, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

impl CrowdwatchApp {
    /// Run until a signal or a shutdown request, then shut down
    pub async fn run(&mut self) -> Result<i32> {
        info!("Crowd monitor is running");

        let shutdown_receiver =
            self.shutdown_receiver
                .take()
                .ok_or_else(|| CrowdwatchError::System {
                    message: "Shutdown receiver already taken".to_string(),
                })?;

        self.setup_signal_handlers();

        let shutdown_reason = shutdown_receiver.await.map_err(|_| CrowdwatchError::System {
            message: "Shutdown channel closed unexpectedly".to_string(),
        })?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("Crowd monitor shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&self) {
        // SIGTERM from systemd, Unix only
        #[cfg(unix)]
        {
            let shutdown_sender = Arc::clone(&self.shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        warn!("Failed to register SIGTERM handler: {}", e);
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
