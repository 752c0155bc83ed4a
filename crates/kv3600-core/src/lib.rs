pub mod cluster;
pub mod config;
pub mod error;
pub mod rpc;

pub use cluster::{FollowerRecord, HealthState, NodeAddress, NodeId, NodeRole};
pub use config::KvConfig;
pub use error::{KvError, Result};
pub use rpc::{Heartbeat, HeartbeatAck, RegistrationResponse};
