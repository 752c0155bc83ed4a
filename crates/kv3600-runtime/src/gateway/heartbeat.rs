use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use tokio::sync::watch;
use tokio::time::Instant;

use kv3600_core::rpc::{Heartbeat, HeartbeatAck};

/// Follower-side heartbeat endpoint.
///
/// Answers every heartbeat and stamps the time it arrived so the follower can
/// notice when the leader stops probing it.
pub struct HeartbeatResponder {
    source_id: i64,
    received: AtomicU64,
    last_contact: watch::Sender<Instant>,
}

impl HeartbeatResponder {
    /// Create a responder identifying itself as `source_id`.
    pub fn new(source_id: i64) -> Self {
        let (last_contact, _) = watch::channel(Instant::now());
        Self {
            source_id,
            received: AtomicU64::new(0),
            last_contact,
        }
    }

    /// Id returned in every ack.
    pub fn source_id(&self) -> i64 {
        self.source_id
    }

    /// Heartbeats answered so far.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Watch the time of the last heartbeat.
    pub fn last_contact(&self) -> watch::Receiver<Instant> {
        self.last_contact.subscribe()
    }

    /// `HeartbeatService.SendHeartbeat`.
    pub fn send_heartbeat(&self, heartbeat: Heartbeat) -> HeartbeatAck {
        tracing::debug!(source_id = heartbeat.source_id, "Received heartbeat");
        self.received.fetch_add(1, Ordering::Relaxed);
        self.last_contact.send_replace(Instant::now());
        HeartbeatAck {
            source_id: self.source_id,
        }
    }
}

/// Axum handler for `HeartbeatService.SendHeartbeat`.
pub async fn send_heartbeat_handler(
    State(responder): State<Arc<HeartbeatResponder>>,
    Json(heartbeat): Json<Heartbeat>,
) -> Json<HeartbeatAck> {
    Json(responder.send_heartbeat(heartbeat))
}
