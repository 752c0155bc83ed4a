use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::node::NodeAddress;

/// Health of a registered follower as seen by the leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Registered but not probed successfully yet.
    Registered,
    /// Last probe succeeded.
    Healthy,
    /// Missed-heartbeat threshold reached.
    Unreachable,
    /// Evicted. Never stored in the registry.
    Removed,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Healthy => "healthy",
            Self::Unreachable => "unreachable",
            Self::Removed => "removed",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Health record for a single follower.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowerRecord {
    /// Follower RPC endpoint.
    pub address: NodeAddress,
    /// Current health state.
    pub state: HealthState,
    /// When the follower registered.
    pub registered_at: DateTime<Utc>,
    /// Time of the last acknowledged heartbeat (registration time until then).
    pub last_ack_time: DateTime<Utc>,
    /// Consecutive failed probes.
    pub missed_count: u32,
}

impl FollowerRecord {
    /// Create a freshly registered record.
    pub fn new(address: NodeAddress) -> Self {
        let now = Utc::now();
        Self {
            address,
            state: HealthState::Registered,
            registered_at: now,
            last_ack_time: now,
            missed_count: 0,
        }
    }

    /// Apply a successful probe observed at `at`.
    ///
    /// `last_ack_time` never moves backwards, even if acks are applied out of order.
    pub fn mark_healthy(&mut self, at: DateTime<Utc>) {
        self.state = HealthState::Healthy;
        self.missed_count = 0;
        if at > self.last_ack_time {
            self.last_ack_time = at;
        }
    }

    /// Apply a failed probe and return the new missed count.
    pub fn mark_missed(&mut self) -> u32 {
        self.missed_count = self.missed_count.saturating_add(1);
        self.missed_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> FollowerRecord {
        FollowerRecord::new(NodeAddress::new("127.0.0.1", "4000"))
    }

    #[test]
    fn test_new_record_is_registered() {
        let rec = record();
        assert_eq!(rec.state, HealthState::Registered);
        assert_eq!(rec.missed_count, 0);
        assert_eq!(rec.registered_at, rec.last_ack_time);
    }

    #[test]
    fn test_mark_healthy_resets_missed() {
        let mut rec = record();
        rec.mark_missed();
        rec.mark_missed();
        assert_eq!(rec.missed_count, 2);

        rec.mark_healthy(Utc::now());
        assert_eq!(rec.state, HealthState::Healthy);
        assert_eq!(rec.missed_count, 0);
    }

    #[test]
    fn test_last_ack_time_is_monotonic() {
        let mut rec = record();
        let later = rec.last_ack_time + chrono::Duration::seconds(5);
        rec.mark_healthy(later);
        assert_eq!(rec.last_ack_time, later);

        rec.mark_healthy(later - chrono::Duration::seconds(3));
        assert_eq!(rec.last_ack_time, later);
    }

    #[test]
    fn test_missed_keeps_state() {
        let mut rec = record();
        rec.mark_healthy(Utc::now());
        assert_eq!(rec.mark_missed(), 1);
        assert_eq!(rec.state, HealthState::Healthy);
    }

    #[test]
    fn test_state_strings() {
        assert_eq!(HealthState::Healthy.as_str(), "healthy");
        let json = serde_json::to_string(&HealthState::Unreachable).unwrap();
        assert_eq!(json, "\"unreachable\"");
    }
}
