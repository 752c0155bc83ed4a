//! Wire messages for the registration and heartbeat services.

use serde::{Deserialize, Serialize};

/// Path of `RegistrationService.RegisterFollower` on the leader.
pub const REGISTER_FOLLOWER_PATH: &str = "/rpc/registration/register_follower";
/// Path of `RegistrationService.DeregisterFollower` on the leader.
pub const DEREGISTER_FOLLOWER_PATH: &str = "/rpc/registration/deregister_follower";
/// Path of `HeartbeatService.SendHeartbeat` on a follower.
pub const SEND_HEARTBEAT_PATH: &str = "/rpc/heartbeat/send_heartbeat";
/// Registry snapshot on the leader.
pub const MEMBERS_PATH: &str = "/cluster/members";
/// Liveness endpoint on every node.
pub const HEALTH_PATH: &str = "/health";

/// Liveness probe sent by the leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub source_id: i64,
}

impl Heartbeat {
    pub fn new(source_id: i64) -> Self {
        Self { source_id }
    }
}

/// Answer to a [`Heartbeat`]. `source_id` identifies the responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatAck {
    pub source_id: i64,
}

/// Outcome of a registration call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub successful: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RegistrationResponse {
    /// Create an accepted response.
    pub fn accepted() -> Self {
        Self {
            successful: true,
            reason: None,
        }
    }

    /// Create a rejected response.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            successful: false,
            reason: Some(reason.into()),
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub role: String,
    pub node_id: String,
}

/// Current process id as a heartbeat source id.
pub fn process_source_id() -> i64 {
    i64::from(std::process::id())
}
