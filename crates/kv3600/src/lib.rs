//! kv3600 - membership and liveness node for a distributed KV cluster.
//!
//! A leader accepts follower registrations and probes every follower on a
//! fixed interval, evicting those that miss too many heartbeats. Followers
//! register on startup, answer heartbeats and re-register when the leader
//! goes quiet.

pub mod cli;
mod runtime;

pub use runtime::{Node, NodeBuilder, RunningNode};
