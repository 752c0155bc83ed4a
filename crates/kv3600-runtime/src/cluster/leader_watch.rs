use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use kv3600_core::cluster::NodeAddress;

use super::registration::{RegistrationClient, RegistrationError};

/// Follower-side loop that re-registers when the leader goes quiet.
///
/// A leader restart loses its registry, and an evicted follower is never
/// probed again. Either way heartbeats stop arriving, so silence longer than
/// `timeout` triggers a fresh registration.
pub struct LeaderWatch {
    client: Arc<RegistrationClient>,
    own: NodeAddress,
    last_contact: watch::Receiver<Instant>,
    timeout: Duration,
}

impl LeaderWatch {
    /// Create a new leader watch.
    pub fn new(
        client: Arc<RegistrationClient>,
        own: NodeAddress,
        last_contact: watch::Receiver<Instant>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            own,
            last_contact,
            timeout,
        }
    }

    /// Run until `shutdown` is cancelled or re-registration fails.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), RegistrationError> {
        // Silence is measured from whichever is later: the last heartbeat or
        // the last successful registration.
        let mut baseline = Instant::now();

        tracing::info!(timeout = ?self.timeout, "Leader watch started");

        loop {
            let last = *self.last_contact.borrow_and_update();
            let deadline = last.max(baseline) + self.timeout;

            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("Leader watch shutting down");
                    return Ok(());
                }
                changed = self.last_contact.changed() => {
                    if changed.is_err() {
                        // Responder dropped; nothing left to watch.
                        return Ok(());
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(
                        silence = ?self.timeout,
                        "No heartbeat from leader, re-registering"
                    );
                    match self.client.register(&self.own, &shutdown).await {
                        Ok(_) => baseline = Instant::now(),
                        Err(RegistrationError::Cancelled) => return Ok(()),
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }
}
