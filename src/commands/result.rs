use serde::{Deserialize, Serialize};

use crate::container::{CacheValue, InternalCacheValue};

/// Outcome of a write command.
///
/// A conditional write that did not apply has `successful == false`; it is not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResult {
    pub previous: Option<CacheValue>,
    pub successful: bool,
}

impl WriteResult {
    pub fn applied(previous: Option<CacheValue>) -> Self {
        Self {
            previous,
            successful: true,
        }
    }

    pub fn rejected(previous: Option<CacheValue>) -> Self {
        Self {
            previous,
            successful: false,
        }
    }
}

/// Value produced by executing any replicable command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandResult {
    Empty,
    Entry(InternalCacheValue),
    Write(WriteResult),
    State(Vec<(String, InternalCacheValue)>),
}
