use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use kv3600_core::cluster::{HeartbeatProbe, NodeAddress};
use kv3600_core::config::ClusterConfig;
use kv3600_core::rpc::{process_source_id, Heartbeat};

use super::registry::{FailureOutcome, MembershipRegistry};

/// Heartbeat scheduler configuration.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between probe rounds.
    pub interval: Duration,
    /// Deadline for a single follower's heartbeat.
    pub probe_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            probe_timeout: Duration::from_secs(1),
        }
    }
}

impl From<&ClusterConfig> for HeartbeatConfig {
    fn from(config: &ClusterConfig) -> Self {
        Self {
            interval: config.heartbeat_interval(),
            probe_timeout: config.probe_timeout(),
        }
    }
}

/// Result of probing one follower.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ProbeResult {
    Acknowledged,
    Missed,
    Evicted(NodeAddress),
    /// Follower left the registry while the probe was in flight.
    Stale,
    Cancelled,
}

/// Summary of one probe round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    /// Followers probed.
    pub probed: usize,
    /// Probes acknowledged.
    pub acknowledged: usize,
    /// Probes that failed or timed out.
    pub missed: usize,
    /// Followers evicted in this round.
    pub evicted: Vec<NodeAddress>,
    /// Probes abandoned because of shutdown.
    pub cancelled: usize,
}

/// Leader-side loop probing every registered follower.
///
/// Each round fans out one task per follower. A slow or dead follower only
/// delays its own task; outcomes are written back through the registry.
pub struct HeartbeatScheduler {
    registry: Arc<MembershipRegistry>,
    probe: Arc<dyn HeartbeatProbe>,
    config: HeartbeatConfig,
    source_id: i64,
    running: Arc<AtomicBool>,
}

impl HeartbeatScheduler {
    /// Create a new scheduler.
    pub fn new(
        registry: Arc<MembershipRegistry>,
        probe: Arc<dyn HeartbeatProbe>,
        config: HeartbeatConfig,
    ) -> Self {
        Self {
            registry,
            probe,
            config,
            source_id: process_source_id(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Override the id sent in heartbeats.
    pub fn with_source_id(mut self, source_id: i64) -> Self {
        self.source_id = source_id;
        self
    }

    /// Check if the loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run probe rounds until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        self.running.store(true, Ordering::SeqCst);
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval = ?self.config.interval,
            probe_timeout = ?self.config.probe_timeout,
            missed_threshold = self.registry.missed_threshold(),
            "Heartbeat scheduler started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.probe_round(&shutdown).await;
                    if report.probed > 0 {
                        tracing::debug!(
                            probed = report.probed,
                            acknowledged = report.acknowledged,
                            missed = report.missed,
                            evicted = report.evicted.len(),
                            "Heartbeat round complete"
                        );
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Heartbeat scheduler shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
    }

    /// Probe every follower in the current snapshot once.
    pub async fn probe_round(&self, shutdown: &CancellationToken) -> RoundReport {
        let snapshot = self.registry.snapshot().await;
        let mut report = RoundReport {
            probed: snapshot.len(),
            ..Default::default()
        };

        let mut probes = JoinSet::new();
        for record in snapshot {
            probes.spawn(probe_follower(
                self.registry.clone(),
                self.probe.clone(),
                record.address,
                Heartbeat::new(self.source_id),
                self.config.probe_timeout,
                shutdown.clone(),
            ));
        }

        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(ProbeResult::Acknowledged) => report.acknowledged += 1,
                Ok(ProbeResult::Missed) | Ok(ProbeResult::Stale) => report.missed += 1,
                Ok(ProbeResult::Evicted(address)) => {
                    report.missed += 1;
                    report.evicted.push(address);
                }
                Ok(ProbeResult::Cancelled) => report.cancelled += 1,
                Err(e) => tracing::error!(error = %e, "Heartbeat probe task failed"),
            }
        }

        report
    }
}

async fn probe_follower(
    registry: Arc<MembershipRegistry>,
    probe: Arc<dyn HeartbeatProbe>,
    address: NodeAddress,
    heartbeat: Heartbeat,
    timeout: Duration,
    shutdown: CancellationToken,
) -> ProbeResult {
    let outcome = tokio::select! {
        _ = shutdown.cancelled() => return ProbeResult::Cancelled,
        outcome = tokio::time::timeout(timeout, probe.send_heartbeat(&address, heartbeat)) => outcome,
    };

    let error = match outcome {
        Ok(Ok(ack)) => {
            tracing::debug!(follower = %address, ack_source_id = ack.source_id, "Heartbeat acknowledged");
            return if registry.record_probe_success(&address).await {
                ProbeResult::Acknowledged
            } else {
                ProbeResult::Stale
            };
        }
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("no ack within {:?}", timeout),
    };

    match registry.record_probe_failure(&address).await {
        FailureOutcome::Missed(missed) => {
            tracing::debug!(follower = %address, missed, error = %error, "Heartbeat missed");
            ProbeResult::Missed
        }
        FailureOutcome::Evicted(record) => {
            tracing::warn!(
                follower = %address,
                missed = record.missed_count,
                error = %error,
                "Evicted unreachable follower"
            );
            ProbeResult::Evicted(address)
        }
        FailureOutcome::Unknown => ProbeResult::Stale,
    }
}
