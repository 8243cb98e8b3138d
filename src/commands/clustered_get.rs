use serde::{Deserialize, Serialize};
use std::fmt;

use super::flags::{FlagSet, copy_without_non_remotable};
use super::parameters::{Parameter, ParameterReader};
use crate::container::{DataContainer, InternalCacheValue};
use crate::context::GlobalTransaction;
use crate::error::{GridError, Result};

/// Reads a key from a remote owner's container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusteredGetCommand {
    pub key: String,
    pub flags: FlagSet,
    pub acquire_remote_lock: bool,
    /// Set only when the read takes a remote lock on behalf of a transaction.
    pub gtx: Option<GlobalTransaction>,
}

impl ClusteredGetCommand {
    pub const COMMAND_ID: u8 = 16;

    pub fn new(
        key: impl Into<String>,
        flags: &FlagSet,
        acquire_remote_lock: bool,
        gtx: Option<GlobalTransaction>,
    ) -> Self {
        Self {
            key: key.into(),
            flags: copy_without_non_remotable(flags),
            acquire_remote_lock,
            gtx,
        }
    }

    pub fn perform(&self, container: &DataContainer) -> Option<InternalCacheValue> {
        container
            .get(&self.key)
            .map(|entry| entry.to_internal_cache_value())
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        vec![
            Parameter::Key(self.key.clone()),
            Parameter::Flags(self.flags.clone()),
            Parameter::Bool(self.acquire_remote_lock),
            Parameter::Transaction(self.gtx.clone()),
        ]
    }

    pub fn from_parameters(command_id: u8, params: Vec<Parameter>) -> Result<Self> {
        if command_id != Self::COMMAND_ID {
            return Err(GridError::InvalidCommand(format!(
                "ClusteredGetCommand cannot be built from command id {}",
                command_id
            )));
        }

        let mut reader = ParameterReader::new("ClusteredGetCommand", params);
        let command = Self {
            key: reader.key()?,
            flags: reader.flags()?,
            acquire_remote_lock: reader.boolean()?,
            gtx: reader.transaction()?,
        };
        reader.finish()?;
        Ok(command)
    }
}

impl fmt::Display for ClusteredGetCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ClusteredGetCommand{{key={}, flags={:?}, acquire_remote_lock={}",
            self.key, self.flags, self.acquire_remote_lock
        )?;
        if let Some(gtx) = &self.gtx {
            write!(f, ", gtx={}", gtx)?;
        }
        f.write_str("}")
    }
}
