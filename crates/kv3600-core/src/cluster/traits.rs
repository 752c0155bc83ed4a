use std::future::Future;
use std::pin::Pin;

use super::node::NodeAddress;
use crate::error::Result;
use crate::rpc::{Heartbeat, HeartbeatAck, RegistrationResponse};

/// Sends heartbeats to followers.
///
/// Implementations must not apply their own retries; a returned error is
/// counted as one missed heartbeat.
pub trait HeartbeatProbe: Send + Sync {
    /// Call `HeartbeatService.SendHeartbeat` on `target`.
    fn send_heartbeat(
        &self,
        target: &NodeAddress,
        heartbeat: Heartbeat,
    ) -> Pin<Box<dyn Future<Output = Result<HeartbeatAck>> + Send + '_>>;
}

/// Talks to the leader's registration service.
pub trait RegistrationTransport: Send + Sync {
    /// Call `RegistrationService.RegisterFollower` with our own address.
    fn register_follower(
        &self,
        address: &NodeAddress,
    ) -> Pin<Box<dyn Future<Output = Result<RegistrationResponse>> + Send + '_>>;

    /// Call `RegistrationService.DeregisterFollower` with our own address.
    fn deregister_follower(
        &self,
        address: &NodeAddress,
    ) -> Pin<Box<dyn Future<Output = Result<RegistrationResponse>> + Send + '_>>;
}
