//! Replicable Commands
//!
//! Every operation that can travel between nodes is a variant of
//! [`ReplicableCommand`]. A command describes itself as a numeric id plus an
//! ordered parameter tuple and can be rebuilt from exactly that pair on the
//! receiving node.
//!
//! ## Command Ids
//! - `7`: `InvalidateL1Command`
//! - `8`: `PutKeyValueCommand`
//! - `10`: `RemoveCommand`
//! - `15`: `StateRequestCommand`
//! - `16`: `ClusteredGetCommand`

pub mod clustered_get;
pub mod flags;
pub mod invalidate_l1;
pub mod parameters;
pub mod put;
pub mod remove;
pub mod result;
pub mod state_request;

pub use clustered_get::ClusteredGetCommand;
pub use flags::{Flag, FlagSet};
pub use invalidate_l1::InvalidateL1Command;
pub use parameters::Parameter;
pub use put::PutKeyValueCommand;
pub use remove::RemoveCommand;
pub use result::{CommandResult, WriteResult};
pub use state_request::StateRequestCommand;

use crate::error::{GridError, Result};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ReplicableCommand {
    ClusteredGet(ClusteredGetCommand),
    InvalidateL1(InvalidateL1Command),
    PutKeyValue(PutKeyValueCommand),
    Remove(RemoveCommand),
    StateRequest(StateRequestCommand),
}

impl ReplicableCommand {
    pub fn command_id(&self) -> u8 {
        match self {
            ReplicableCommand::ClusteredGet(_) => ClusteredGetCommand::COMMAND_ID,
            ReplicableCommand::InvalidateL1(_) => InvalidateL1Command::COMMAND_ID,
            ReplicableCommand::PutKeyValue(_) => PutKeyValueCommand::COMMAND_ID,
            ReplicableCommand::Remove(_) => RemoveCommand::COMMAND_ID,
            ReplicableCommand::StateRequest(_) => StateRequestCommand::COMMAND_ID,
        }
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        match self {
            ReplicableCommand::ClusteredGet(command) => command.parameters(),
            ReplicableCommand::InvalidateL1(command) => command.parameters(),
            ReplicableCommand::PutKeyValue(command) => command.parameters(),
            ReplicableCommand::Remove(command) => command.parameters(),
            ReplicableCommand::StateRequest(command) => command.parameters(),
        }
    }

    pub fn from_parameters(command_id: u8, params: Vec<Parameter>) -> Result<Self> {
        match command_id {
            ClusteredGetCommand::COMMAND_ID => Ok(ReplicableCommand::ClusteredGet(
                ClusteredGetCommand::from_parameters(command_id, params)?,
            )),
            InvalidateL1Command::COMMAND_ID => Ok(ReplicableCommand::InvalidateL1(
                InvalidateL1Command::from_parameters(command_id, params)?,
            )),
            PutKeyValueCommand::COMMAND_ID => Ok(ReplicableCommand::PutKeyValue(
                PutKeyValueCommand::from_parameters(command_id, params)?,
            )),
            RemoveCommand::COMMAND_ID => Ok(ReplicableCommand::Remove(
                RemoveCommand::from_parameters(command_id, params)?,
            )),
            StateRequestCommand::COMMAND_ID => Ok(ReplicableCommand::StateRequest(
                StateRequestCommand::from_parameters(command_id, params)?,
            )),
            other => Err(GridError::InvalidCommand(format!(
                "unknown command id {}",
                other
            ))),
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            ReplicableCommand::PutKeyValue(_) | ReplicableCommand::Remove(_)
        )
    }

    /// Key the command targets, if it targets a single key.
    pub fn key(&self) -> Option<&str> {
        match self {
            ReplicableCommand::ClusteredGet(command) => Some(&command.key),
            ReplicableCommand::PutKeyValue(command) => Some(&command.key),
            ReplicableCommand::Remove(command) => Some(&command.key),
            ReplicableCommand::InvalidateL1(_) | ReplicableCommand::StateRequest(_) => None,
        }
    }

    pub fn has_flag(&self, flag: Flag) -> bool {
        match self {
            ReplicableCommand::ClusteredGet(command) => command.flags.contains(&flag),
            ReplicableCommand::PutKeyValue(command) => command.has_flag(flag),
            ReplicableCommand::Remove(command) => command.has_flag(flag),
            ReplicableCommand::InvalidateL1(_) | ReplicableCommand::StateRequest(_) => false,
        }
    }

    /// Near-cache store of a value fetched from a remote owner.
    pub fn is_l1_store(&self) -> bool {
        self.has_flag(Flag::PutForExternalRead) && self.has_flag(Flag::CacheModeLocal)
    }

    /// Unconditional copy sent to backup owners after the primary applied a write.
    pub fn to_backup(&self) -> Self {
        match self {
            ReplicableCommand::PutKeyValue(command) => {
                ReplicableCommand::PutKeyValue(command.to_backup())
            }
            ReplicableCommand::Remove(command) => ReplicableCommand::Remove(command.to_backup()),
            other => other.clone(),
        }
    }
}

impl fmt::Display for ReplicableCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicableCommand::ClusteredGet(command) => fmt::Display::fmt(command, f),
            ReplicableCommand::InvalidateL1(command) => fmt::Display::fmt(command, f),
            ReplicableCommand::PutKeyValue(command) => fmt::Display::fmt(command, f),
            ReplicableCommand::Remove(command) => fmt::Display::fmt(command, f),
            ReplicableCommand::StateRequest(command) => fmt::Display::fmt(command, f),
        }
    }
}

#[cfg(test)]
mod tests;
