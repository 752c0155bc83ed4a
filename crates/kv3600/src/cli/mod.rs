mod logging;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use kv3600_core::cluster::NodeRole;
use kv3600_core::config::{KvConfig, LogFormat};

use crate::runtime::Node;

/// kv3600 - membership and liveness node for a distributed KV cluster
#[derive(Parser, Debug)]
#[command(name = "kv3600")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Leader address followers register with [default: localhost:50051].
    #[arg(long)]
    pub addr: Option<String>,

    /// Port the leader listens on [default: 50051].
    #[arg(long)]
    pub port: Option<u16>,

    /// Node role: leader or follower [default: follower].
    #[arg(long, value_parser = parse_role)]
    pub role: Option<NodeRole>,

    /// Configuration file path.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Interface to bind listeners on (overrides config).
    #[arg(long)]
    pub bind_host: Option<String>,

    /// Host announced to the leader (overrides config).
    #[arg(long)]
    pub advertise_host: Option<String>,

    /// Log level or filter directive (overrides config).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format: pretty or json (overrides config).
    #[arg(long, value_parser = parse_log_format)]
    pub log_format: Option<LogFormat>,
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        let config = self.load_config()?;
        logging::init(&config.logging)?;

        tracing::info!(
            pid = std::process::id(),
            role = %config.node.role,
            version = env!("CARGO_PKG_VERSION"),
            "Starting kv3600 node"
        );

        let node = Node::builder().config(config).build()?;
        node.run().await
    }

    /// Load the config file (if any) and apply command-line overrides.
    pub fn load_config(&self) -> Result<KvConfig> {
        let mut config = match &self.config {
            Some(path) => KvConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => KvConfig::default(),
        };

        if let Some(addr) = &self.addr {
            config.leader.address = addr.clone();
        }
        if let Some(port) = self.port {
            config.leader.port = port;
        }
        if let Some(role) = self.role {
            config.node.role = role;
        }
        if let Some(host) = &self.bind_host {
            config.node.bind_host = host.clone();
        }
        if let Some(host) = &self.advertise_host {
            config.node.advertise_host = Some(host.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_role(s: &str) -> std::result::Result<NodeRole, String> {
    NodeRole::from_str(s).ok_or_else(|| format!("unknown role '{}', expected leader or follower", s))
}

fn parse_log_format(s: &str) -> std::result::Result<LogFormat, String> {
    LogFormat::from_str(s).ok_or_else(|| format!("unknown log format '{}', expected pretty or json", s))
}
