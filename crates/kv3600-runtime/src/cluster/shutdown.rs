use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use kv3600_core::cluster::NodeAddress;

use super::registration::RegistrationClient;

/// Graceful shutdown configuration.
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Timeout for background tasks to finish after cancellation.
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// Graceful shutdown coordinator.
///
/// Owns the token every background task selects on. Followers also leave the
/// leader's registry on the way out.
pub struct GracefulShutdown {
    token: CancellationToken,
    config: ShutdownConfig,
    deregistration: Option<(Arc<RegistrationClient>, NodeAddress)>,
}

impl GracefulShutdown {
    /// Create a new graceful shutdown coordinator.
    pub fn new(config: ShutdownConfig) -> Self {
        Self {
            token: CancellationToken::new(),
            config,
            deregistration: None,
        }
    }

    /// Deregister `own` through `client` during shutdown.
    pub fn with_deregistration(mut self, client: Arc<RegistrationClient>, own: NodeAddress) -> Self {
        self.deregistration = Some((client, own));
        self
    }

    /// Token cancelled when shutdown starts.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request shutdown without waiting for it.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Perform graceful shutdown.
    ///
    /// Cancels the token, deregisters (best-effort), then waits up to the
    /// drain timeout for `handles` and aborts whatever is left.
    pub async fn shutdown(&self, handles: Vec<JoinHandle<()>>) {
        tracing::info!("Starting graceful shutdown");
        self.trigger();

        if let Some((client, own)) = &self.deregistration {
            if let Err(e) = client.deregister(own).await {
                tracing::warn!(error = %e, "Failed to deregister from leader");
            }
        }

        let deadline = tokio::time::Instant::now() + self.config.drain_timeout;
        let mut remaining = 0;
        for mut handle in handles {
            tokio::select! {
                joined = &mut handle => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(error = %e, "Background task panicked");
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    handle.abort();
                    remaining += 1;
                }
            }
        }

        if remaining > 0 {
            tracing::warn!(remaining, "Drain timeout reached, aborted background tasks");
        }

        tracing::info!("Graceful shutdown complete");
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new(ShutdownConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::registration::tests::{fast_config, Reply, ScriptedTransport};

    #[test]
    fn test_shutdown_config_default() {
        let config = ShutdownConfig::default();
        assert_eq!(config.drain_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_drains() {
        let shutdown = GracefulShutdown::default();
        let token = shutdown.token();
        assert!(!token.is_cancelled());

        let handle = tokio::spawn(async move { token.cancelled().await });

        shutdown.shutdown(vec![handle]).await;
        assert!(shutdown.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_stuck_task_is_aborted() {
        let shutdown = GracefulShutdown::new(ShutdownConfig {
            drain_timeout: Duration::from_millis(50),
        });
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        tokio::time::timeout(Duration::from_secs(2), shutdown.shutdown(vec![handle]))
            .await
            .expect("shutdown should not wait for a stuck task");
    }

    #[tokio::test]
    async fn test_follower_deregisters_once() {
        let transport = Arc::new(ScriptedTransport::new(vec![], || Reply::Accept));
        let client = Arc::new(RegistrationClient::new(transport.clone(), fast_config(3)));
        let own = NodeAddress::new("127.0.0.1", "41000");
        let shutdown = GracefulShutdown::default().with_deregistration(client, own.clone());

        shutdown.shutdown(Vec::new()).await;
        assert_eq!(*transport.deregistrations.lock().unwrap(), vec![own]);
    }

    #[tokio::test]
    async fn test_deregistration_failure_does_not_block_shutdown() {
        let transport = Arc::new(ScriptedTransport::new(vec![], || Reply::Hang));
        let client = Arc::new(RegistrationClient::new(transport, fast_config(3)));
        let shutdown = GracefulShutdown::default()
            .with_deregistration(client, NodeAddress::new("127.0.0.1", "41000"));

        tokio::time::timeout(Duration::from_secs(2), shutdown.shutdown(Vec::new()))
            .await
            .expect("deregistration is bounded by the registration timeout");
    }
}
