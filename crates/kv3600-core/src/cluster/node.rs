use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{KvError, Result};

/// Unique identifier of a running node process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Generate a new random node ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// RPC endpoint of a node.
///
/// Host and port are kept as the strings the node announced; two addresses are
/// equal only when both strings match. Decoding never validates, call
/// [`NodeAddress::validate`] before trusting an address received off the wire.
/// A missing field decodes as empty so that it fails validation instead of
/// decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddress {
    #[serde(default)]
    host: String,
    #[serde(default)]
    port: String,
}

impl NodeAddress {
    /// Create an address from its parts.
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
        }
    }

    /// Create an address from a bound socket address.
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port().to_string())
    }

    /// Host name or IP literal.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port as announced.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Numeric port, if the port string is a usable TCP port.
    pub fn port_number(&self) -> Option<u16> {
        match self.port.parse::<u16>() {
            Ok(0) | Err(_) => None,
            Ok(port) => Some(port),
        }
    }

    /// Check that the address can be dialed.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(KvError::InvalidAddress("host must not be empty".into()));
        }
        if self.port.is_empty() {
            return Err(KvError::InvalidAddress("port must not be empty".into()));
        }
        if self.port_number().is_none() {
            return Err(KvError::InvalidAddress(format!(
                "'{}' is not a valid port",
                self.port
            )));
        }
        Ok(())
    }

    /// Whether the address is valid.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Base URL for HTTP RPC calls to this node.
    pub fn base_url(&self) -> String {
        format!("http://{}", self)
    }
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for NodeAddress {
    type Err = KvError;

    /// Parse `host:port` or `[v6-host]:port`.
    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| KvError::InvalidAddress(format!("'{}' is missing a port", s)))?;

        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        let addr = Self::new(host, port);
        addr.validate()?;
        Ok(addr)
    }
}

impl From<SocketAddr> for NodeAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::from_socket_addr(addr)
    }
}
