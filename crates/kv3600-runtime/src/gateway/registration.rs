use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use kv3600_core::cluster::{FollowerRecord, NodeAddress};
use kv3600_core::rpc::RegistrationResponse;

use super::response::RpcError;
use crate::cluster::MembershipRegistry;

/// Leader-side registration endpoint.
///
/// Only touches the registry; no I/O happens on this path.
#[derive(Clone)]
pub struct RegistrationService {
    registry: Arc<MembershipRegistry>,
}

impl RegistrationService {
    /// Create a new registration service.
    pub fn new(registry: Arc<MembershipRegistry>) -> Self {
        Self { registry }
    }

    /// Get the registry.
    pub fn registry(&self) -> &Arc<MembershipRegistry> {
        &self.registry
    }

    /// Register a follower. Re-registration is a success.
    pub async fn register_follower(&self, address: NodeAddress) -> RegistrationResponse {
        if let Err(e) = address.validate() {
            tracing::warn!(follower = %address, error = %e, "Rejected follower registration");
            return RegistrationResponse::rejected(format!("invalid address: {}", e));
        }

        if self.registry.add(address.clone()).await {
            tracing::info!(follower = %address, "Registered follower");
        } else {
            tracing::debug!(follower = %address, "Follower already registered");
        }

        RegistrationResponse::accepted()
    }

    /// Remove a follower. Removing an unknown follower is a success.
    pub async fn deregister_follower(
        &self,
        address: NodeAddress,
    ) -> Result<RegistrationResponse, RpcError> {
        address.validate()?;

        if self.registry.remove(&address).await.is_some() {
            tracing::info!(follower = %address, "Deregistered follower");
        }

        Ok(RegistrationResponse::accepted())
    }
}

/// Axum handler for `RegistrationService.RegisterFollower`.
pub async fn register_follower_handler(
    State(service): State<Arc<RegistrationService>>,
    Json(address): Json<NodeAddress>,
) -> Json<RegistrationResponse> {
    tracing::debug!(follower = %address, "Register follower request received");
    Json(service.register_follower(address).await)
}

/// Axum handler for `RegistrationService.DeregisterFollower`.
pub async fn deregister_follower_handler(
    State(service): State<Arc<RegistrationService>>,
    Json(address): Json<NodeAddress>,
) -> Result<Json<RegistrationResponse>, RpcError> {
    service.deregister_follower(address).await.map(Json)
}

/// Axum handler for the registry snapshot.
pub async fn members_handler(
    State(service): State<Arc<RegistrationService>>,
) -> Json<Vec<FollowerRecord>> {
    Json(service.registry().snapshot().await)
}
