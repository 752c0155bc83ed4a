mod cluster;
mod logging;

pub use cluster::{ClusterConfig, RegistrationConfig};
pub use logging::{LogFormat, LoggingConfig};

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cluster::{NodeAddress, NodeRole};
use crate::error::{KvError, Result};

/// Root configuration for a kv3600 node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KvConfig {
    /// Local node configuration.
    #[serde(default)]
    pub node: NodeConfig,

    /// Where the leader lives.
    #[serde(default)]
    pub leader: LeaderConfig,

    /// Heartbeat and eviction configuration.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Follower registration policy.
    #[serde(default)]
    pub registration: RegistrationConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl KvConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| KvError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content);

        toml::from_str(&content)
            .map_err(|e| KvError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Check settings that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.cluster.missed_threshold == 0 {
            return Err(KvError::Config(
                "cluster.missed_threshold must be at least 1".into(),
            ));
        }
        if self.cluster.heartbeat_interval_ms == 0 {
            return Err(KvError::Config(
                "cluster.heartbeat_interval_ms must be positive".into(),
            ));
        }
        if self.cluster.probe_timeout_ms == 0
            || self.cluster.probe_timeout_ms > self.cluster.heartbeat_interval_ms
        {
            return Err(KvError::Config(format!(
                "cluster.probe_timeout_ms must be in 1..={}",
                self.cluster.heartbeat_interval_ms
            )));
        }
        if self.cluster.leader_loss_timeout() <= self.cluster.heartbeat_interval() {
            return Err(KvError::Config(format!(
                "cluster.leader_loss_timeout_ms must exceed heartbeat_interval_ms ({})",
                self.cluster.heartbeat_interval_ms
            )));
        }
        if self.registration.max_attempts == 0 {
            return Err(KvError::Config(
                "registration.max_attempts must be at least 1".into(),
            ));
        }
        if self.registration.backoff_multiplier == 0 {
            return Err(KvError::Config(
                "registration.backoff_multiplier must be at least 1".into(),
            ));
        }
        if self.registration.max_backoff_ms == 0 {
            return Err(KvError::Config(
                "registration.max_backoff_ms must be positive".into(),
            ));
        }
        if self.registration.timeout_ms == 0 {
            return Err(KvError::Config(
                "registration.timeout_ms must be positive".into(),
            ));
        }
        if self.leader.port == 0 {
            return Err(KvError::Config("leader.port must not be 0".into()));
        }
        self.leader.address()?;
        Ok(())
    }
}

/// Local node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Role of this process.
    #[serde(default)]
    pub role: NodeRole,

    /// Interface to bind listeners on.
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// Host announced to the leader. Falls back to the bound IP, or to
    /// loopback when bound to the unspecified address.
    #[serde(default)]
    pub advertise_host: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: NodeRole::default(),
            bind_host: default_bind_host(),
            advertise_host: None,
        }
    }
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

/// Leader location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderConfig {
    /// Address followers register with.
    #[serde(default = "default_leader_address")]
    pub address: String,

    /// Port the leader listens on.
    #[serde(default = "default_leader_port")]
    pub port: u16,
}

impl LeaderConfig {
    /// Parsed leader address.
    pub fn address(&self) -> Result<NodeAddress> {
        self.address
            .parse()
            .map_err(|e| KvError::Config(format!("leader.address: {}", e)))
    }
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            address: default_leader_address(),
            port: default_leader_port(),
        }
    }
}

fn default_leader_address() -> String {
    "localhost:50051".to_string()
}

fn default_leader_port() -> u16 {
    50051
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}") {
        Ok(re) => re,
        Err(_) => return result,
    };

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => result = result.replace(&cap[0], &value),
            Err(_) => tracing::warn!(var = var_name, "Config references unset environment variable"),
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_default_config() {
        let config = KvConfig::default();
        assert_eq!(config.node.role, NodeRole::Follower);
        assert_eq!(config.leader.address, "localhost:50051");
        assert_eq!(config.leader.port, 50051);
        assert_ok!(config.validate());
    }

    #[test]
    fn test_parse_empty_config() {
        let config = KvConfig::parse_toml("").unwrap();
        assert_eq!(config.cluster.missed_threshold, 3);
        assert_eq!(config.registration.max_attempts, 5);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [node]
            role = "leader"
            bind_host = "127.0.0.1"
            advertise_host = "kv-0.internal"

            [leader]
            address = "kv-0.internal:6000"
            port = 6000

            [cluster]
            heartbeat_interval_ms = 500
            probe_timeout_ms = 200
            missed_threshold = 5

            [registration]
            max_attempts = 3

            [logging]
            level = "debug"
            format = "json"
        "#;

        let config = KvConfig::parse_toml(toml).unwrap();
        assert_eq!(config.node.role, NodeRole::Leader);
        assert_eq!(config.node.advertise_host.as_deref(), Some("kv-0.internal"));
        assert_eq!(config.leader.port, 6000);
        assert_eq!(
            config.leader.address().unwrap(),
            NodeAddress::new("kv-0.internal", "6000")
        );
        assert_eq!(config.cluster.missed_threshold, 5);
        assert_eq!(config.registration.max_attempts, 3);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = KvConfig::default();
        config.cluster.missed_threshold = 0;
        assert_err!(config.validate());

        let mut config = KvConfig::default();
        config.cluster.probe_timeout_ms = config.cluster.heartbeat_interval_ms + 1;
        assert_err!(config.validate());

        let mut config = KvConfig::default();
        config.cluster.leader_loss_timeout_ms = Some(0);
        assert_err!(config.validate());

        let mut config = KvConfig::default();
        config.cluster.leader_loss_timeout_ms = Some(config.cluster.heartbeat_interval_ms);
        assert_err!(config.validate());

        let mut config = KvConfig::default();
        config.cluster.leader_loss_timeout_ms = Some(config.cluster.heartbeat_interval_ms + 1);
        assert_ok!(config.validate());

        let mut config = KvConfig::default();
        config.registration.max_backoff_ms = 0;
        assert_err!(config.validate());

        let mut config = KvConfig::default();
        config.registration.max_attempts = 0;
        assert_err!(config.validate());

        let mut config = KvConfig::default();
        config.leader.address = "no-port".into();
        assert_err!(config.validate());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("KV3600_TEST_LEADER", "10.1.2.3:7000");

        let toml = r#"
            [leader]
            address = "${KV3600_TEST_LEADER}"
        "#;

        let config = KvConfig::parse_toml(toml).unwrap();
        assert_eq!(config.leader.address, "10.1.2.3:7000");

        std::env::remove_var("KV3600_TEST_LEADER");
    }
}
