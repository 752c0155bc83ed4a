//! Process bootstrap for leader and follower nodes.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use kv3600_core::cluster::{NodeAddress, NodeId, NodeRole};
use kv3600_core::config::{KvConfig, NodeConfig};
use kv3600_core::error::KvError;
use kv3600_core::rpc::process_source_id;

use kv3600_runtime::client::{LeaderClient, RpcClient};
use kv3600_runtime::cluster::{
    GracefulShutdown, HeartbeatConfig, HeartbeatScheduler, LeaderWatch, MembershipRegistry,
    RegistrationClient, ShutdownConfig,
};
use kv3600_runtime::gateway::{
    follower_router, leader_router, HeartbeatResponder, NodeIdentity, RegistrationService,
    RpcServer,
};

/// A configured kv3600 node, not yet started.
pub struct Node {
    config: KvConfig,
    node_id: NodeId,
    source_id: i64,
    shutdown_config: ShutdownConfig,
}

impl Node {
    /// Create a new builder for configuring a node.
    pub fn builder() -> NodeBuilder {
        NodeBuilder::new()
    }

    /// Get the node ID.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Get the configuration.
    pub fn config(&self) -> &KvConfig {
        &self.config
    }

    /// Start the node and block until shutdown.
    pub async fn run(self) -> Result<()> {
        self.start().await?.wait().await
    }

    /// Bind listeners and spawn background tasks for the configured role.
    ///
    /// Followers return only after registering with the leader; a failed
    /// registration is returned as an error.
    pub async fn start(self) -> Result<RunningNode> {
        match self.config.node.role {
            NodeRole::Leader => self.start_leader().await,
            NodeRole::Follower => self.start_follower().await,
        }
    }

    async fn start_leader(self) -> Result<RunningNode> {
        let identity = self.identity();
        let server = RpcServer::bind(&self.config.node.bind_host, self.config.leader.port).await?;
        let local_addr = server.local_addr();

        let registry = Arc::new(MembershipRegistry::new(self.config.cluster.missed_threshold));
        let service = Arc::new(RegistrationService::new(registry.clone()));

        let shutdown = GracefulShutdown::new(self.shutdown_config.clone());
        let token = shutdown.token();
        let (fatal_tx, fatal_rx) = mpsc::channel(4);
        let mut handles = Vec::new();

        handles.push(spawn_server(
            server,
            leader_router(service, identity),
            token.clone(),
            fatal_tx,
        ));

        let scheduler = HeartbeatScheduler::new(
            registry.clone(),
            Arc::new(RpcClient::new()),
            HeartbeatConfig::from(&self.config.cluster),
        )
        .with_source_id(self.source_id);
        {
            let token = token.clone();
            handles.push(tokio::spawn(async move { scheduler.run(token).await }));
        }

        tracing::info!(
            node_id = %self.node_id,
            addr = %local_addr,
            missed_threshold = self.config.cluster.missed_threshold,
            "Leader started"
        );

        Ok(RunningNode {
            node_id: self.node_id,
            role: NodeRole::Leader,
            local_addr,
            advertised: None,
            registry: Some(registry),
            responder: None,
            shutdown,
            handles,
            fatal: fatal_rx,
        })
    }

    async fn start_follower(self) -> Result<RunningNode> {
        let identity = self.identity();
        let leader = self.config.leader.address()?;
        let server = RpcServer::bind(&self.config.node.bind_host, 0).await?;
        let local_addr = server.local_addr();
        let own = advertised_address(&self.config.node, local_addr);

        let responder = Arc::new(HeartbeatResponder::new(self.source_id));
        let shutdown = GracefulShutdown::new(self.shutdown_config.clone());
        let token = shutdown.token();
        let (fatal_tx, fatal_rx) = mpsc::channel(4);
        let mut handles = Vec::new();

        handles.push(spawn_server(
            server,
            follower_router(responder.clone(), identity),
            token.clone(),
            fatal_tx.clone(),
        ));

        let transport = LeaderClient::new(RpcClient::new(), leader.clone());
        let client = Arc::new(RegistrationClient::new(
            Arc::new(transport),
            self.config.registration.clone(),
        ));

        if let Err(e) = client.register(&own, &token).await {
            shutdown.shutdown(handles).await;
            return Err(e).with_context(|| format!("failed to register with leader {}", leader));
        }

        let watch = LeaderWatch::new(
            client.clone(),
            own.clone(),
            responder.last_contact(),
            self.config.cluster.leader_loss_timeout(),
        );
        {
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                if let Err(e) = watch.run(token).await {
                    let _ = fatal_tx
                        .send(anyhow::Error::new(e).context("lost contact with leader"))
                        .await;
                }
            }));
        }

        tracing::info!(
            node_id = %self.node_id,
            addr = %own,
            leader = %leader,
            "Follower started"
        );

        Ok(RunningNode {
            node_id: self.node_id,
            role: NodeRole::Follower,
            local_addr,
            advertised: Some(own.clone()),
            registry: None,
            responder: Some(responder),
            shutdown: shutdown.with_deregistration(client, own),
            handles,
            fatal: fatal_rx,
        })
    }

    fn identity(&self) -> NodeIdentity {
        NodeIdentity {
            node_id: self.node_id,
            role: self.config.node.role,
        }
    }
}

/// A started node.
pub struct RunningNode {
    node_id: NodeId,
    role: NodeRole,
    local_addr: SocketAddr,
    advertised: Option<NodeAddress>,
    registry: Option<Arc<MembershipRegistry>>,
    responder: Option<Arc<HeartbeatResponder>>,
    shutdown: GracefulShutdown,
    handles: Vec<JoinHandle<()>>,
    fatal: mpsc::Receiver<anyhow::Error>,
}

impl RunningNode {
    /// Get the node ID.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Get the role.
    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// Address the RPC listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address this follower registered with.
    pub fn advertised_address(&self) -> Option<&NodeAddress> {
        self.advertised.as_ref()
    }

    /// Membership registry, on a leader.
    pub fn registry(&self) -> Option<&Arc<MembershipRegistry>> {
        self.registry.as_ref()
    }

    /// Heartbeat responder, on a follower.
    pub fn responder(&self) -> Option<&Arc<HeartbeatResponder>> {
        self.responder.as_ref()
    }

    /// Token that stops the node when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.token()
    }

    /// Wait for Ctrl-C, a cancelled token, or a fatal error, then shut down.
    pub async fn wait(mut self) -> Result<()> {
        let token = self.shutdown.token();

        let fatal = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
                None
            }
            _ = token.cancelled() => {
                tracing::info!("Received shutdown notification");
                None
            }
            Some(e) = self.fatal.recv() => {
                tracing::error!(error = %e, "Fatal error, shutting down");
                Some(e)
            }
        };

        self.shutdown.shutdown(self.handles).await;
        tracing::info!(role = %self.role, "kv3600 node stopped");

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Shut down without waiting for a signal.
    pub async fn stop(self) {
        self.shutdown.shutdown(self.handles).await;
    }
}

/// Builder for configuring a node.
pub struct NodeBuilder {
    config: Option<KvConfig>,
    source_id: Option<i64>,
    shutdown_config: ShutdownConfig,
}

impl NodeBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: None,
            source_id: None,
            shutdown_config: ShutdownConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: KvConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the id carried in heartbeats and acks. Defaults to the pid.
    pub fn source_id(mut self, source_id: i64) -> Self {
        self.source_id = Some(source_id);
        self
    }

    /// Set the shutdown configuration.
    pub fn shutdown_config(mut self, config: ShutdownConfig) -> Self {
        self.shutdown_config = config;
        self
    }

    /// Build the node.
    pub fn build(self) -> Result<Node> {
        let config = self
            .config
            .ok_or_else(|| KvError::Config("Configuration is required".to_string()))?;
        config.validate()?;

        Ok(Node {
            config,
            node_id: NodeId::new(),
            source_id: self.source_id.unwrap_or_else(process_source_id),
            shutdown_config: self.shutdown_config,
        })
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_server(
    server: RpcServer,
    router: axum::Router,
    token: CancellationToken,
    fatal: mpsc::Sender<anyhow::Error>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = server.serve(router, token).await {
            let _ = fatal
                .send(anyhow::Error::new(e).context("RPC server failed"))
                .await;
        }
    })
}

/// Address announced to the leader for a listener bound at `local`.
fn advertised_address(node: &NodeConfig, local: SocketAddr) -> NodeAddress {
    let host = match &node.advertise_host {
        Some(host) => host.clone(),
        None if local.ip().is_unspecified() && local.is_ipv6() => "::1".to_string(),
        None if local.ip().is_unspecified() => "127.0.0.1".to_string(),
        None => local.ip().to_string(),
    };
    NodeAddress::new(host, local.port().to_string())
}
