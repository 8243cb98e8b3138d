//! Distribution Module
//!
//! Decides which members own a key and keeps that answer correct while
//! members join and leave.
//!
//! ## Core Concepts
//! - **Consistent Hash**: keys hash into fixed segments; each segment has an
//!   ordered owner list whose head is the primary owner.
//! - **Topology**: an immutable `(id, read_ch, write_ch)` snapshot. During a
//!   rehash reads still go to the previous owners while writes already reach
//!   the new ones.
//! - **Locality**: whether this node owns a key, and whether that may change
//!   because the key is being transferred.
//! - **State Transfer**: new owners pull their segments from previous owners,
//!   then the rehash completes (`read_ch = write_ch`).

pub mod ch;
pub mod handlers;
pub mod locality;
pub mod manager;
pub mod state_transfer;
pub mod topology;

pub use ch::ConsistentHash;
pub use locality::DataLocality;
pub use manager::DistributionManager;
pub use topology::{CacheTopology, TopologyManager, TopologyProvider};
