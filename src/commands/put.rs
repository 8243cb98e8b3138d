use serde::{Deserialize, Serialize};
use std::fmt;

use super::flags::{Flag, FlagSet, copy_without_non_remotable};
use super::parameters::{Parameter, ParameterReader};
use super::result::WriteResult;
use crate::container::Payload;
use crate::context::InvocationContext;
use crate::error::{GridError, Result};
use crate::notifications::CacheNotifier;

/// Stores a value (or merges a delta) under a key.
///
/// Equality and hashing cover every field so a replayed command compares
/// equal to the one that was sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PutKeyValueCommand {
    pub key: String,
    pub value: Payload,
    pub put_if_absent: bool,
    pub lifespan_ms: Option<u64>,
    pub max_idle_ms: Option<u64>,
    pub flags: FlagSet,
}

impl PutKeyValueCommand {
    pub const COMMAND_ID: u8 = 8;

    pub fn new(key: impl Into<String>, value: Payload) -> Self {
        Self {
            key: key.into(),
            value,
            put_if_absent: false,
            lifespan_ms: None,
            max_idle_ms: None,
            flags: FlagSet::new(),
        }
    }

    pub fn if_absent(mut self) -> Self {
        self.put_if_absent = true;
        self
    }

    pub fn with_lifespan(mut self, lifespan_ms: Option<u64>) -> Self {
        self.lifespan_ms = lifespan_ms;
        self
    }

    pub fn with_max_idle(mut self, max_idle_ms: Option<u64>) -> Self {
        self.max_idle_ms = max_idle_ms;
        self
    }

    pub fn with_flag(mut self, flag: Flag) -> Self {
        self.flags.insert(flag);
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
        self.put_if_absent
    }

    /// Applies the write to the entry already checked out in `ctx`.
    ///
    /// The caller holds the key lock. Returns the previous value and whether the
    /// write took effect.
    pub fn perform(&self, ctx: &mut InvocationContext, notifier: &dyn CacheNotifier) -> WriteResult {
        let Some(entry) = ctx.lookup_entry(&self.key) else {
            // Not wrapped: either the key was busy for an external read, or the
            // write reached a node that does not hold the entry.
            if self.has_flag(Flag::PutForExternalRead) {
                return WriteResult::rejected(None);
            }
            return WriteResult::applied(None);
        };

        let existing = entry.value().cloned();
        if self.put_if_absent && existing.is_some() && !entry.is_removed() {
            return WriteResult::rejected(existing);
        }

        let notify = !self.has_flag(Flag::SkipListenerNotification);
        if notify {
            notifier.notify_cache_entry_modified(&self.key, existing.as_ref(), true, ctx);
        }

        let (previous, new_value) = {
            let Some(entry) = ctx.lookup_entry_mut(&self.key) else {
                return WriteResult::applied(None);
            };

            let previous = match &self.value {
                Payload::Delta(delta) => {
                    let merged = delta.merge(existing.as_ref().and_then(|v| v.as_delta_aware()));
                    entry.set_value(merged);
                    existing
                }
                Payload::Value(value) => {
                    let replaced = entry.set_value(value.clone());
                    if entry.is_removed() {
                        entry.set_removed(false);
                        entry.set_valid(true);
                        None
                    } else {
                        replaced
                    }
                }
            };
            entry.set_lifespan(self.lifespan_ms);
            entry.set_max_idle(self.max_idle_ms);

            (previous, entry.value().cloned())
        };

        if notify {
            notifier.notify_cache_entry_modified(&self.key, new_value.as_ref(), false, ctx);
        }

        WriteResult::applied(previous)
    }

    /// The form applied by backup owners once the primary has accepted the write.
    pub fn to_backup(&self) -> Self {
        Self {
            put_if_absent: false,
            ..self.clone()
        }
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        vec![
            Parameter::Key(self.key.clone()),
            Parameter::Payload(self.value.clone()),
            Parameter::Millis(self.lifespan_ms),
            Parameter::Millis(self.max_idle_ms),
            Parameter::Bool(self.put_if_absent),
            Parameter::Flags(copy_without_non_remotable(&self.flags)),
        ]
    }

    pub fn from_parameters(command_id: u8, params: Vec<Parameter>) -> Result<Self> {
        if command_id != Self::COMMAND_ID {
            return Err(GridError::InvalidCommand(format!(
                "PutKeyValueCommand cannot be built from command id {}",
                command_id
            )));
        }

        let mut reader = ParameterReader::new("PutKeyValueCommand", params);
        let command = Self {
            key: reader.key()?,
            value: reader.payload()?,
            lifespan_ms: reader.millis()?,
            max_idle_ms: reader.millis()?,
            put_if_absent: reader.boolean()?,
            flags: reader.flags()?,
        };
        reader.finish()?;
        Ok(command)
    }
}

impl fmt::Display for PutKeyValueCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PutKeyValueCommand{{key={}, value={}, flags={:?}, put_if_absent={}, lifespan_ms={:?}, max_idle_ms={:?}}}",
            self.key, self.value, self.flags, self.put_if_absent, self.lifespan_ms, self.max_idle_ms
        )
    }
}
