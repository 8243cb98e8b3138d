//! Distributed Data Grid Library
//!
//! The routing and replication core of an in-memory data grid: every key is
//! owned by a small set of members chosen by a consistent hash, writes go
//! through the key's primary owner and are copied to its backups, and reads
//! are served locally or fetched from the owners.
//!
//! ## Architecture Modules
//! - **`membership`**: UDP gossip (SWIM-like) producing the live member view.
//! - **`distribution`**: consistent hashes, topologies, locality answers and
//!   state transfer between old and new owners.
//! - **`remoting`**: group RPC over HTTP, response modes and the clustered-get
//!   validity filter.
//! - **`commands`**: the replicable commands and their wire form.
//! - **`interceptors`**: the stages a command passes through (routing,
//!   locking, execution).
//! - **`container`**: the node-local segmented entry store and key locks.
//! - **`cache`**: the public read/write API and its HTTP handlers.

pub mod cache;
pub mod commands;
pub mod config;
pub mod container;
pub mod context;
pub mod distribution;
pub mod error;
pub mod interceptors;
pub mod membership;
pub mod notifications;
pub mod remoting;

#[cfg(test)]
pub(crate) mod test_support;
