use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Heartbeat and eviction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Interval between probe rounds in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Timeout for a single heartbeat RPC in milliseconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Consecutive missed heartbeats before a follower is evicted.
    #[serde(default = "default_missed_threshold")]
    pub missed_threshold: u32,

    /// How long a follower waits without hearing from the leader before it
    /// registers again. Derived from the other settings when unset.
    #[serde(default)]
    pub leader_loss_timeout_ms: Option<u64>,
}

impl ClusterConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Leader-loss timeout, defaulting to twice the eviction window.
    pub fn leader_loss_timeout(&self) -> Duration {
        match self.leader_loss_timeout_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self.heartbeat_interval() * self.missed_threshold.max(1) * 2,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval(),
            probe_timeout_ms: default_probe_timeout(),
            missed_threshold: default_missed_threshold(),
            leader_loss_timeout_ms: None,
        }
    }
}

fn default_heartbeat_interval() -> u64 {
    2000
}

fn default_probe_timeout() -> u64 {
    1000
}

fn default_missed_threshold() -> u32 {
    3
}

/// Registration retry policy for followers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Timeout for a single registration RPC in milliseconds.
    #[serde(default = "default_registration_timeout")]
    pub timeout_ms: u64,

    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Factor applied to the delay after every failed attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,

    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Ceiling on the delay between attempts in milliseconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl RegistrationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based), capped
    /// at `max_backoff_ms`.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.backoff_multiplier).saturating_pow(attempt.saturating_sub(1));
        let delay = self.backoff_base_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_registration_timeout(),
            backoff_base_ms: default_backoff_base(),
            backoff_multiplier: default_backoff_multiplier(),
            max_attempts: default_max_attempts(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_registration_timeout() -> u64 {
    1000
}

fn default_backoff_base() -> u64 {
    100
}

fn default_backoff_multiplier() -> u32 {
    2
}

fn default_max_attempts() -> u32 {
    5
}

fn default_max_backoff() -> u64 {
    5000
}
