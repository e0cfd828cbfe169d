use super::{ComponentState, CrowdwatchApp, ShutdownReason, MODELS, MONITOR, STREAMING};
use crate::error::Result;
use std::sync::Arc;
use tracing::{error, info};

impl CrowdwatchApp {
    /// Register components before they start
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing crowd monitor components");

        self.components.set(MODELS, ComponentState::Stopped).await;
        self.components.set(MONITOR, ComponentState::Stopped).await;
        if self.stream_server.is_some() {
            self.components.set(STREAMING, ComponentState::Stopped).await;
        }

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start the server and, when configured, the model preload
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting crowd monitor");

        if self.config.system.preload_models {
            self.components.set(MODELS, ComponentState::Starting).await;
            let preload = self.loader.preload();
            let loader = Arc::clone(&self.loader);
            let components = self.components.clone();
            tokio::spawn(async move {
                let _ = preload.await;
                let state = if loader.is_loaded() {
                    ComponentState::Running
                } else {
                    ComponentState::Failed
                };
                components.set(MODELS, state).await;
            });
            info!("Model preload started in the background");
        }

        if let Some(server) = self.stream_server.take() {
            let address = server.address();
            let shutdown = self.cancellation_token.clone().cancelled_owned();
            let components = self.components.clone();
            let shutdown_sender = Arc::clone(&self.shutdown_sender);

            // Flipped to Failed by the task if binding or serving fails
            self.components.set(STREAMING, ComponentState::Running).await;

            self.server_handle = Some(tokio::spawn(async move {
                let result = server.start_with_shutdown(shutdown).await;
                if let Err(e) = &result {
                    error!("Stream server error: {}", e);
                    components.set(STREAMING, ComponentState::Failed).await;
                    if let Some(sender) = shutdown_sender.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Error(e.to_string()));
                    }
                }
                result
            }));

            info!("Streaming server starting on {}", address);
        }

        // Monitoring itself starts on client request
        self.components.set(MONITOR, ComponentState::Running).await;

        info!("Crowd monitor started successfully");
        Ok(())
    }
}
