//! Membership and liveness runtime for kv3600 nodes.
//!
//! The leader keeps a [`cluster::MembershipRegistry`] fed by the registration
//! endpoint and pruned by the [`cluster::HeartbeatScheduler`]. Followers
//! register through [`cluster::RegistrationClient`] and answer heartbeats via
//! [`gateway::HeartbeatResponder`].

pub mod client;
pub mod cluster;
pub mod gateway;

pub use client::{LeaderClient, RpcClient};
pub use cluster::{
    GracefulShutdown, HeartbeatConfig, HeartbeatScheduler, LeaderWatch, MembershipEvent,
    MembershipRegistry, RegistrationClient, RegistrationError, ShutdownConfig,
};
pub use gateway::{
    follower_router, leader_router, HeartbeatResponder, NodeIdentity, RegistrationService,
    RpcError, RpcServer,
};
