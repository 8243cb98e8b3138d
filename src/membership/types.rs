use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

/// Opaque identity of a cluster member.
///
/// Ordering is only used to give every node the same member order when a
/// consistent hash is built; it carries no ownership meaning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub String);

impl Address {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NodeState {
    Alive,
    Suspect,
    Dead,
}

/// Represents a single member in the cluster.
///
/// The `incarnation` field is a logical clock used to order updates and resolve conflicts
/// (e.g., refuting a false "Suspect" claim).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub address: Address,
    pub gossip_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub state: NodeState,
    pub incarnation: u64,

    #[serde(skip)]
    pub last_seen: Option<Instant>,
}

/// The wire protocol for gossip datagrams.
///
/// - `Ping/Ack`: Used for liveness checks and state synchronization.
/// - `Join`: Sent by new nodes to seed nodes to enter the cluster.
/// - `Suspect/Alive`: Disseminates changes in node health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GossipMessage {
    Ping {
        from: Address,
        incarnation: u64,
    },

    Ack {
        from: Address,
        incarnation: u64,
        members: Vec<Node>,
    },

    Join {
        node: Node,
    },

    Suspect {
        address: Address,
        incarnation: u64,
    },

    Alive {
        address: Address,
        incarnation: u64,
    },
}
