//! Cache Module
//!
//! The node-local API (`put`, `put_if_absent`, `apply_delta`, `remove`, `get`)
//! and the handling of commands arriving from other members.
//!
//! ## Core Concepts
//! - **Write Path**: every write is a `ReplicableCommand` run through the
//!   interceptor chain (distribution, entry wrapping, call).
//! - **Read Path**: local data first; otherwise a remote read from the read
//!   owners, optionally kept as an L1 copy.
//! - **Idempotency**: remotely applied writes are remembered by operation id
//!   for a while so replays return the original result.

#[allow(clippy::module_inception)]
pub mod cache;
pub mod handlers;

pub use cache::Cache;
