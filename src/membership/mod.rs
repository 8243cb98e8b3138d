//! Membership & Discovery Module
//!
//! Implements a Gossip-based membership protocol (inspired by SWIM) that produces the
//! live member view the routing layer builds its consistent hashes from.
//!
//! ## Core Mechanisms
//! - **Gossip Protocol**: Nodes periodically exchange status updates via UDP to maintain a consistent view of the cluster.
//! - **Failure Detection**: Uses a "Suspect" -> "Dead" transition model with timeouts to handle node crashes gracefully.
//! - **Incarnation Numbers**: Solves conflict resolution when node state (Alive/Suspect) is disputed.
//! - **View Notifications**: Every change of the live view is published on a `watch` channel;
//!   state transfer and in-flight remote calls subscribe to it.

pub mod service;
pub mod types;
