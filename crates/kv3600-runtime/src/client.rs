use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::Serialize;

use kv3600_core::cluster::{FollowerRecord, HeartbeatProbe, NodeAddress, RegistrationTransport};
use kv3600_core::error::{KvError, Result};
use kv3600_core::rpc::{
    Heartbeat, HeartbeatAck, RegistrationResponse, DEREGISTER_FOLLOWER_PATH, MEMBERS_PATH,
    REGISTER_FOLLOWER_PATH, SEND_HEARTBEAT_PATH,
};

/// HTTP client for the kv3600 RPC services.
///
/// No timeout is configured on the client itself; every caller bounds its own
/// call so that heartbeat and registration deadlines stay independent.
#[derive(Debug, Clone, Default)]
pub struct RpcClient {
    http: reqwest::Client,
}

impl RpcClient {
    /// Create a new client.
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// `HeartbeatService.SendHeartbeat`.
    pub async fn send_heartbeat(
        &self,
        follower: &NodeAddress,
        heartbeat: Heartbeat,
    ) -> Result<HeartbeatAck> {
        self.post(follower, SEND_HEARTBEAT_PATH, &heartbeat).await
    }

    /// `RegistrationService.RegisterFollower`.
    pub async fn register_follower(
        &self,
        leader: &NodeAddress,
        follower: &NodeAddress,
    ) -> Result<RegistrationResponse> {
        self.post(leader, REGISTER_FOLLOWER_PATH, follower).await
    }

    /// `RegistrationService.DeregisterFollower`.
    pub async fn deregister_follower(
        &self,
        leader: &NodeAddress,
        follower: &NodeAddress,
    ) -> Result<RegistrationResponse> {
        self.post(leader, DEREGISTER_FOLLOWER_PATH, follower).await
    }

    /// Fetch the leader's registry snapshot.
    pub async fn members(&self, leader: &NodeAddress) -> Result<Vec<FollowerRecord>> {
        let url = format!("{}{}", leader.base_url(), MEMBERS_PATH);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| KvError::Transport(format!("GET {}: {}", url, e)))?;

        decode(&url, response).await
    }

    async fn post<B, R>(&self, target: &NodeAddress, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", target.base_url(), path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| KvError::Transport(format!("POST {}: {}", url, e)))?;

        decode(&url, response).await
    }
}

async fn decode<R: DeserializeOwned>(url: &str, response: reqwest::Response) -> Result<R> {
    let status = response.status();
    if !status.is_success() {
        return Err(KvError::Transport(format!("{} returned {}", url, status)));
    }

    response
        .json::<R>()
        .await
        .map_err(|e| KvError::Transport(format!("{}: invalid response body: {}", url, e)))
}

impl HeartbeatProbe for RpcClient {
    fn send_heartbeat(
        &self,
        target: &NodeAddress,
        heartbeat: Heartbeat,
    ) -> Pin<Box<dyn Future<Output = Result<HeartbeatAck>> + Send + '_>> {
        let target = target.clone();
        Box::pin(async move { RpcClient::send_heartbeat(self, &target, heartbeat).await })
    }
}

/// [`RpcClient`] bound to a leader address.
#[derive(Debug, Clone)]
pub struct LeaderClient {
    rpc: RpcClient,
    leader: NodeAddress,
}

impl LeaderClient {
    pub fn new(rpc: RpcClient, leader: NodeAddress) -> Self {
        Self { rpc, leader }
    }

    /// Address of the leader.
    pub fn leader(&self) -> &NodeAddress {
        &self.leader
    }
}

impl RegistrationTransport for LeaderClient {
    fn register_follower(
        &self,
        address: &NodeAddress,
    ) -> Pin<Box<dyn Future<Output = Result<RegistrationResponse>> + Send + '_>> {
        let address = address.clone();
        Box::pin(async move { self.rpc.register_follower(&self.leader, &address).await })
    }

    fn deregister_follower(
        &self,
        address: &NodeAddress,
    ) -> Pin<Box<dyn Future<Output = Result<RegistrationResponse>> + Send + '_>> {
        let address = address.clone();
        Box::pin(async move { self.rpc.deregister_follower(&self.leader, &address).await })
    }
}
