use super::{ComponentState, CrowdwatchApp, MODELS, MONITOR, STREAMING};
use crate::error::Result;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

impl CrowdwatchApp {
    /// Perform graceful shutdown of all components
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");
        let mut exit_code = 0;

        // Monitor first so the loop releases the camera before the server goes away
        self.components.set(MONITOR, ComponentState::Stopping).await;
        if self.monitor.stop().await {
            info!("Monitoring stopped for shutdown");
        }
        self.components.set(MONITOR, ComponentState::Stopped).await;

        self.cancellation_token.cancel();

        if let Some(mut handle) = self.server_handle.take() {
            self.components.set(STREAMING, ComponentState::Stopping).await;

            match timeout(SERVER_STOP_TIMEOUT, &mut handle).await {
                Ok(Ok(Ok(()))) => {
                    self.components.set(STREAMING, ComponentState::Stopped).await;
                    info!("streaming component stopped");
                }
                Ok(Ok(Err(e))) => {
                    self.components.set(STREAMING, ComponentState::Failed).await;
                    error!("Error stopping streaming component: {}", e);
                    exit_code = 1;
                }
                Ok(Err(e)) => {
                    self.components.set(STREAMING, ComponentState::Failed).await;
                    error!("Streaming task panicked: {}", e);
                    exit_code = 1;
                }
                Err(_) => {
                    warn!("streaming component stop timeout, aborting");
                    handle.abort();
                    self.components.set(STREAMING, ComponentState::Failed).await;
                    exit_code = 1;
                }
            }
        }

        self.components.update(MODELS, ComponentState::Stopped).await;

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }
}
