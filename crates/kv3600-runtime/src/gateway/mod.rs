mod heartbeat;
mod registration;
mod response;
mod server;

pub use heartbeat::{send_heartbeat_handler, HeartbeatResponder};
pub use registration::{
    deregister_follower_handler, members_handler, register_follower_handler, RegistrationService,
};
pub use response::RpcError;
pub use server::{follower_router, leader_router, NodeIdentity, RpcServer};
