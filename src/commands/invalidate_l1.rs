use serde::{Deserialize, Serialize};
use std::fmt;

use super::parameters::{Parameter, ParameterReader};
use crate::container::DataContainer;
use crate::error::{GridError, Result};

/// Drops near-cache copies of keys that were just written on their primary.
///
/// Only entries stored as L1 copies are touched; owned data is never removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvalidateL1Command {
    pub keys: Vec<String>,
}

impl InvalidateL1Command {
    pub const COMMAND_ID: u8 = 7;

    pub fn new<I>(keys: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns how many L1 copies were dropped.
    pub fn perform(&self, container: &DataContainer) -> usize {
        self.keys
            .iter()
            .filter(|key| container.invalidate_l1(key))
            .count()
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        vec![Parameter::Keys(self.keys.clone())]
    }

    pub fn from_parameters(command_id: u8, params: Vec<Parameter>) -> Result<Self> {
        if command_id != Self::COMMAND_ID {
            return Err(GridError::InvalidCommand(format!(
                "InvalidateL1Command cannot be built from command id {}",
                command_id
            )));
        }

        let mut reader = ParameterReader::new("InvalidateL1Command", params);
        let command = Self {
            keys: reader.keys()?,
        };
        reader.finish()?;
        Ok(command)
    }
}

impl fmt::Display for InvalidateL1Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InvalidateL1Command{{keys={:?}}}", self.keys)
    }
}
