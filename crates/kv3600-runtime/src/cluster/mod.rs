mod heartbeat;
mod leader_watch;
mod registration;
mod registry;
mod shutdown;

pub use heartbeat::{HeartbeatConfig, HeartbeatScheduler, RoundReport};
pub use leader_watch::LeaderWatch;
pub use registration::{RegistrationClient, RegistrationError};
pub use registry::{FailureOutcome, MembershipCounts, MembershipEvent, MembershipRegistry};
pub use shutdown::{GracefulShutdown, ShutdownConfig};
