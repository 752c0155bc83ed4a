use serde::{Deserialize, Serialize};

/// Role a process plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Holds the membership registry and probes followers.
    Leader,
    /// Registers with the leader and answers heartbeats.
    #[default]
    Follower,
}

impl NodeRole {
    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leader => "leader",
            Self::Follower => "follower",
        }
    }

    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "leader" => Some(Self::Leader),
            "follower" => Some(Self::Follower),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
