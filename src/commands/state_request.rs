use serde::{Deserialize, Serialize};
use std::fmt;

use super::parameters::{Parameter, ParameterReader};
use crate::container::{DataContainer, InternalCacheValue};
use crate::error::{GridError, Result};

/// Asks a previous owner for the contents of some segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateRequestCommand {
    pub segments: Vec<u32>,
    pub topology_id: u64,
}

impl StateRequestCommand {
    pub const COMMAND_ID: u8 = 15;

    pub fn new(segments: Vec<u32>, topology_id: u64) -> Self {
        Self {
            segments,
            topology_id,
        }
    }

    pub fn perform(&self, container: &DataContainer) -> Vec<(String, InternalCacheValue)> {
        container.dump_segments(&self.segments)
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        vec![
            Parameter::Segments(self.segments.clone()),
            Parameter::TopologyId(self.topology_id),
        ]
    }

    pub fn from_parameters(command_id: u8, params: Vec<Parameter>) -> Result<Self> {
        if command_id != Self::COMMAND_ID {
            return Err(GridError::InvalidCommand(format!(
                "StateRequestCommand cannot be built from command id {}",
                command_id
            )));
        }

        let mut reader = ParameterReader::new("StateRequestCommand", params);
        let command = Self {
            segments: reader.segments()?,
            topology_id: reader.topology_id()?,
        };
        reader.finish()?;
        Ok(command)
    }
}

impl fmt::Display for StateRequestCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StateRequestCommand{{segments={}, topology_id={}}}",
            self.segments.len(),
            self.topology_id
        )
    }
}
