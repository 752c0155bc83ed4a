mod health;
mod node;
mod roles;
mod traits;

pub use health::{FollowerRecord, HealthState};
pub use node::{NodeAddress, NodeId};
pub use roles::NodeRole;
pub use traits::{HeartbeatProbe, RegistrationTransport};
