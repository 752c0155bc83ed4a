use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Extension;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use kv3600_core::cluster::{NodeId, NodeRole};
use kv3600_core::error::{KvError, Result};
use kv3600_core::rpc::{
    HealthResponse, DEREGISTER_FOLLOWER_PATH, HEALTH_PATH, MEMBERS_PATH, REGISTER_FOLLOWER_PATH,
    SEND_HEARTBEAT_PATH,
};

use super::heartbeat::{send_heartbeat_handler, HeartbeatResponder};
use super::registration::{
    deregister_follower_handler, members_handler, register_follower_handler, RegistrationService,
};

/// Identity reported by the health endpoint.
#[derive(Debug, Clone, Copy)]
pub struct NodeIdentity {
    pub node_id: NodeId,
    pub role: NodeRole,
}

/// Build the leader router.
pub fn leader_router(service: Arc<RegistrationService>, identity: NodeIdentity) -> Router {
    Router::new()
        .route(REGISTER_FOLLOWER_PATH, post(register_follower_handler))
        .route(DEREGISTER_FOLLOWER_PATH, post(deregister_follower_handler))
        .route(MEMBERS_PATH, get(members_handler))
        .with_state(service)
        .route(HEALTH_PATH, get(health_handler))
        .layer(Extension(identity))
        .layer(TraceLayer::new_for_http())
}

/// Build the follower router.
pub fn follower_router(responder: Arc<HeartbeatResponder>, identity: NodeIdentity) -> Router {
    Router::new()
        .route(SEND_HEARTBEAT_PATH, post(send_heartbeat_handler))
        .with_state(responder)
        .route(HEALTH_PATH, get(health_handler))
        .layer(Extension(identity))
        .layer(TraceLayer::new_for_http())
}

/// Health check handler.
async fn health_handler(Extension(identity): Extension<NodeIdentity>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        role: identity.role.to_string(),
        node_id: identity.node_id.to_string(),
    })
}

/// A bound RPC listener.
///
/// Binding and serving are separate so a follower can learn its ephemeral
/// port before it serves and registers that address with the leader.
pub struct RpcServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl RpcServer {
    /// Bind a listener. Port 0 picks an ephemeral port.
    pub async fn bind(host: &str, port: u16) -> Result<Self> {
        let listener = TcpListener::bind((host, port)).await.map_err(|e| {
            KvError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to listen on {}:{}: {}", host, port, e),
            ))
        })?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn serve(self, router: Router, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(addr = %self.local_addr, "RPC server listening");

        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;

        tracing::info!(addr = %self.local_addr, "RPC server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::cluster::MembershipRegistry;
    use kv3600_core::cluster::FollowerRecord;
    use kv3600_core::rpc::{HeartbeatAck, RegistrationResponse};

    fn identity(role: NodeRole) -> NodeIdentity {
        NodeIdentity {
            node_id: NodeId::new(),
            role,
        }
    }

    fn json_request(path: &str, body: &str) -> Request<Body> {
        Request::post(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_leader_register_and_members() {
        let registry = Arc::new(MembershipRegistry::new(3));
        let router = leader_router(
            Arc::new(RegistrationService::new(registry.clone())),
            identity(NodeRole::Leader),
        );

        let response = router
            .clone()
            .oneshot(json_request(
                REGISTER_FOLLOWER_PATH,
                r#"{"host":"127.0.0.1","port":"41000"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: RegistrationResponse = body_json(response).await;
        assert!(body.successful);

        let response = router
            .oneshot(Request::get(MEMBERS_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let members: Vec<FollowerRecord> = body_json(response).await;
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].address.port(), "41000");
    }

    #[tokio::test]
    async fn test_leader_rejection_is_not_transport_error() {
        let registry = Arc::new(MembershipRegistry::new(3));
        let router = leader_router(
            Arc::new(RegistrationService::new(registry.clone())),
            identity(NodeRole::Leader),
        );

        let response = router
            .oneshot(json_request(
                REGISTER_FOLLOWER_PATH,
                r#"{"host":"","port":"41000"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: RegistrationResponse = body_json(response).await;
        assert!(!body.successful);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_leader_rejects_address_missing_port() {
        let registry = Arc::new(MembershipRegistry::new(3));
        let router = leader_router(
            Arc::new(RegistrationService::new(registry.clone())),
            identity(NodeRole::Leader),
        );

        let response = router
            .oneshot(json_request(REGISTER_FOLLOWER_PATH, r#"{"host":"127.0.0.1"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: RegistrationResponse = body_json(response).await;
        assert!(!body.successful);
        assert!(body.reason.unwrap().starts_with("invalid address"));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_follower_heartbeat() {
        let responder = Arc::new(HeartbeatResponder::new(777));
        let router = follower_router(responder.clone(), identity(NodeRole::Follower));

        let response = router
            .oneshot(json_request(SEND_HEARTBEAT_PATH, r#"{"sourceId":1}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let ack: HeartbeatAck = body_json(response).await;
        assert_eq!(ack.source_id, 777);
        assert_eq!(responder.received(), 1);
    }

    #[tokio::test]
    async fn test_health() {
        let responder = Arc::new(HeartbeatResponder::new(1));
        let router = follower_router(responder, identity(NodeRole::Follower));

        let response = router
            .oneshot(Request::get(HEALTH_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let health: HealthResponse = body_json(response).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.role, "follower");
    }

    #[tokio::test]
    async fn test_bind_conflict_fails() {
        let server = RpcServer::bind("127.0.0.1", 0).await.unwrap();
        let port = server.local_addr().port();

        let err = RpcServer::bind("127.0.0.1", port).await.err().unwrap();
        assert!(matches!(err, KvError::Io(_)));
        assert!(err.to_string().contains(&port.to_string()));
    }
}
