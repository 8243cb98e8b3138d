//! Grid Network Protocol
//!
//! Defines the API endpoints and Data Transfer Objects (DTOs) exchanged over HTTP,
//! both by clients and between members.
//!
//! Internode traffic goes through a single endpoint: the sender describes the
//! command as `(command_id, parameters)` and the receiver rebuilds it with
//! `ReplicableCommand::from_parameters`.

use serde::{Deserialize, Serialize};

use crate::commands::Parameter;
use crate::container::{AtomicMapDelta, CacheValue};
use crate::membership::types::Address;

// --- API Endpoints ---

/// Public endpoint for unconditional writes.
pub const ENDPOINT_PUT: &str = "/put";
/// Public endpoint for writes that only apply when the key is absent.
pub const ENDPOINT_PUT_IF_ABSENT: &str = "/put_if_absent";
/// Public endpoint for partial updates of map values.
pub const ENDPOINT_DELTA: &str = "/delta";
pub const ENDPOINT_REMOVE: &str = "/remove";
/// Public endpoint for reads.
pub const ENDPOINT_GET: &str = "/get";
/// Internal endpoint every replicable command is delivered to.
pub const ENDPOINT_COMMAND: &str = "/internal/command";
/// Management endpoints.
pub const ENDPOINT_ADMIN_LOCALITY: &str = "/admin/locality";
pub const ENDPOINT_ADMIN_LOCATE: &str = "/admin/locate";
pub const ENDPOINT_ADMIN_REHASH: &str = "/admin/rehash";

// --- Data Transfer Objects ---

/// A command sent from one member to another.
///
/// `op_id` is kept across forwarding and replication hops so a receiver that
/// already applied the operation can return the original result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub op_id: String,
    pub origin: Address,
    pub command_id: u8,
    pub parameters: Vec<Parameter>,
}

/// Client write request.
#[derive(Debug, Serialize, Deserialize)]
pub struct PutRequest {
    pub key: String,
    pub value: CacheValue,
    #[serde(default)]
    pub lifespan_ms: Option<u64>,
    #[serde(default)]
    pub max_idle_ms: Option<u64>,
}

/// Client partial-update request for a map value.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeltaRequest {
    pub key: String,
    pub delta: AtomicMapDelta,
    #[serde(default)]
    pub lifespan_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub key: String,
    /// Only remove when the key currently holds this value.
    #[serde(default)]
    pub value: Option<CacheValue>,
}

/// Acknowledgment for write operations.
#[derive(Debug, Serialize, Deserialize)]
pub struct PutResponse {
    /// False when a conditional write did not apply, or the write failed.
    pub success: bool,
    pub previous: Option<CacheValue>,
}

/// Response for data retrieval. `None` means the key does not exist.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetResponse {
    pub value: Option<CacheValue>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LocalityResponse {
    pub key: String,
    pub locality: String,
    pub located_locally: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LocateResponse {
    pub key: String,
    pub owners: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RehashStatusResponse {
    pub topology_id: u64,
    pub rehash_in_progress: bool,
    pub join_complete: bool,
    pub members: Vec<String>,
}
