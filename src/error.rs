use crate::membership::types::Address;

/// Failures surfaced by the routing, remoting and write paths.
///
/// A conditional write that does not apply is *not* an error; it is reported
/// through `WriteResult::successful`.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("consistent hash has no members")]
    EmptyTopology,
    #[error("remote invocation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("could not lock key {key} within {timeout_ms}ms")]
    LockTimeout { key: String, timeout_ms: u64 },
    #[error("remote node {address} failed: {message}")]
    RemoteException { address: Address, message: String },
    #[error("member not found: {0}")]
    NodeNotFound(Address),
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, GridError>;
