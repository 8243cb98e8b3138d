use serde::{Deserialize, Serialize};
use std::fmt;

use super::flags::{Flag, FlagSet, copy_without_non_remotable};
use super::parameters::{Parameter, ParameterReader};
use super::result::WriteResult;
use crate::container::CacheValue;
use crate::context::InvocationContext;
use crate::error::{GridError, Result};
use crate::notifications::CacheNotifier;

/// Removes a key, optionally only when it currently maps to `value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoveCommand {
    pub key: String,
    pub value: Option<CacheValue>,
    pub flags: FlagSet,
}

impl RemoveCommand {
    pub const COMMAND_ID: u8 = 10;

    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            flags: FlagSet::new(),
        }
    }

    pub fn if_value(mut self, value: CacheValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_flags(mut self, flags: FlagSet) -> Self {
        self.flags.extend(flags);
        self
    }

    pub fn has_flag(&self, flag: Flag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn is_conditional(&self) -> bool {
        self.value.is_some()
    }

    pub fn perform(&self, ctx: &mut InvocationContext, notifier: &dyn CacheNotifier) -> WriteResult {
        let existing = match ctx.lookup_entry(&self.key) {
            Some(entry) if !entry.is_removed() => entry.value().cloned(),
            _ => None,
        };

        let Some(existing) = existing else {
            return if self.is_conditional() {
                WriteResult::rejected(None)
            } else {
                WriteResult::applied(None)
            };
        };

        if let Some(expected) = &self.value
            && *expected != existing
        {
            return WriteResult::rejected(Some(existing));
        }

        let notify = !self.has_flag(Flag::SkipListenerNotification);
        if notify {
            notifier.notify_cache_entry_modified(&self.key, Some(&existing), true, ctx);
        }

        if let Some(entry) = ctx.lookup_entry_mut(&self.key) {
            entry.set_removed(true);
            entry.set_valid(false);
        }

        if notify {
            notifier.notify_cache_entry_modified(&self.key, None, false, ctx);
        }

        WriteResult::applied(Some(existing))
    }

    pub fn to_backup(&self) -> Self {
        Self {
            value: None,
            ..self.clone()
        }
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        vec![
            Parameter::Key(self.key.clone()),
            Parameter::Value(self.value.clone()),
            Parameter::Flags(copy_without_non_remotable(&self.flags)),
        ]
    }

    pub fn from_parameters(command_id: u8, params: Vec<Parameter>) -> Result<Self> {
        if command_id != Self::COMMAND_ID {
            return Err(GridError::InvalidCommand(format!(
                "RemoveCommand cannot be built from command id {}",
                command_id
            )));
        }

        let mut reader = ParameterReader::new("RemoveCommand", params);
        let command = Self {
            key: reader.key()?,
            value: reader.value()?,
            flags: reader.flags()?,
        };
        reader.finish()?;
        Ok(command)
    }
}

impl fmt::Display for RemoveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoveCommand{{key={}, value=", self.key)?;
        match &self.value {
            Some(value) => write!(f, "{}", value)?,
            None => f.write_str("null")?,
        }
        write!(f, ", flags={:?}}}", self.flags)
    }
}
