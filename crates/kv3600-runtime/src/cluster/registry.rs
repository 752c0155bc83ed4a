use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};

use kv3600_core::cluster::{FollowerRecord, HealthState, NodeAddress};

/// Change to the follower set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    /// A follower registered.
    Joined(NodeAddress),
    /// A follower reached the missed-heartbeat threshold. The record is the
    /// last one held, in state `Unreachable`.
    Evicted(FollowerRecord),
    /// A follower deregistered.
    Left(NodeAddress),
}

/// Outcome of recording a failed probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Below threshold; carries the new missed count.
    Missed(u32),
    /// Threshold reached; the follower was removed.
    Evicted(FollowerRecord),
    /// The follower was no longer registered.
    Unknown,
}

impl FailureOutcome {
    pub fn is_evicted(&self) -> bool {
        matches!(self, Self::Evicted(_))
    }
}

/// Follower count statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipCounts {
    /// Registered, never acknowledged.
    pub registered: usize,
    /// In state Healthy.
    pub healthy: usize,
    /// Registered followers with at least one missed heartbeat.
    pub missing: usize,
    /// Total followers.
    pub total: usize,
}

/// Authoritative follower table held by the leader.
///
/// All mutations take the write lock, so they are applied one at a time and
/// readers never see a half-updated record. Network calls must never be made
/// while holding the lock: take a [`snapshot`](Self::snapshot) first.
pub struct MembershipRegistry {
    followers: RwLock<HashMap<NodeAddress, FollowerRecord>>,
    missed_threshold: u32,
    events: broadcast::Sender<MembershipEvent>,
}

impl MembershipRegistry {
    /// Create an empty registry evicting after `missed_threshold` failures.
    pub fn new(missed_threshold: u32) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            followers: RwLock::new(HashMap::new()),
            missed_threshold: missed_threshold.max(1),
            events,
        }
    }

    /// Consecutive failures that trigger eviction.
    pub fn missed_threshold(&self) -> u32 {
        self.missed_threshold
    }

    /// Subscribe to membership changes.
    pub fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.events.subscribe()
    }

    /// Register a follower. Returns `false` if it was already present.
    pub async fn add(&self, address: NodeAddress) -> bool {
        let mut followers = self.followers.write().await;
        if followers.contains_key(&address) {
            return false;
        }

        followers.insert(address.clone(), FollowerRecord::new(address.clone()));
        // Published under the lock so events keep mutation order.
        let _ = self.events.send(MembershipEvent::Joined(address));
        true
    }

    /// Deregister a follower.
    pub async fn remove(&self, address: &NodeAddress) -> Option<FollowerRecord> {
        let mut followers = self.followers.write().await;
        let removed = followers.remove(address);
        if removed.is_some() {
            let _ = self.events.send(MembershipEvent::Left(address.clone()));
        }
        removed
    }

    /// Record an acknowledged heartbeat. Returns `false` if the follower is
    /// no longer registered.
    pub async fn record_probe_success(&self, address: &NodeAddress) -> bool {
        let mut followers = self.followers.write().await;
        match followers.get_mut(address) {
            Some(record) => {
                record.mark_healthy(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Record a missed heartbeat, evicting the follower at the threshold.
    pub async fn record_probe_failure(&self, address: &NodeAddress) -> FailureOutcome {
        let mut followers = self.followers.write().await;
        let missed = match followers.get_mut(address) {
            Some(record) => record.mark_missed(),
            None => return FailureOutcome::Unknown,
        };

        if missed < self.missed_threshold {
            return FailureOutcome::Missed(missed);
        }

        let Some(mut record) = followers.remove(address) else {
            return FailureOutcome::Unknown;
        };

        record.state = HealthState::Unreachable;
        let _ = self.events.send(MembershipEvent::Evicted(record.clone()));
        FailureOutcome::Evicted(record)
    }

    /// Point-in-time copy of every record.
    pub async fn snapshot(&self) -> Vec<FollowerRecord> {
        self.followers.read().await.values().cloned().collect()
    }

    /// Get a single record.
    pub async fn get(&self, address: &NodeAddress) -> Option<FollowerRecord> {
        self.followers.read().await.get(address).cloned()
    }

    /// Check whether a follower is registered.
    pub async fn contains(&self, address: &NodeAddress) -> bool {
        self.followers.read().await.contains_key(address)
    }

    /// Number of registered followers.
    pub async fn len(&self) -> usize {
        self.followers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.followers.read().await.is_empty()
    }

    /// Addresses of followers whose last probe succeeded.
    pub async fn live_followers(&self) -> Vec<NodeAddress> {
        self.followers
            .read()
            .await
            .values()
            .filter(|r| r.state == HealthState::Healthy)
            .map(|r| r.address.clone())
            .collect()
    }

    /// Count followers by state.
    pub async fn counts(&self) -> MembershipCounts {
        let followers = self.followers.read().await;
        let mut counts = MembershipCounts {
            total: followers.len(),
            ..Default::default()
        };

        for record in followers.values() {
            match record.state {
                HealthState::Registered => counts.registered += 1,
                HealthState::Healthy => counts.healthy += 1,
                HealthState::Unreachable | HealthState::Removed => {}
            }
            if record.missed_count > 0 {
                counts.missing += 1;
            }
        }

        counts
    }
}

impl Default for MembershipRegistry {
    fn default() -> Self {
        Self::new(3)
    }
}
