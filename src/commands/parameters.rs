use serde::{Deserialize, Serialize};

use super::flags::FlagSet;
use crate::container::{CacheValue, Payload};
use crate::context::GlobalTransaction;
use crate::error::{GridError, Result};

/// One positional element of a command's parameter tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Parameter {
    Key(String),
    Keys(Vec<String>),
    Payload(Payload),
    Value(Option<CacheValue>),
    Millis(Option<u64>),
    Bool(bool),
    Flags(FlagSet),
    Transaction(Option<GlobalTransaction>),
    Segments(Vec<u32>),
    TopologyId(u64),
}

/// Reads a parameter tuple back in order, rejecting anything out of shape.
pub struct ParameterReader {
    command: &'static str,
    params: std::vec::IntoIter<Parameter>,
    position: usize,
}

impl ParameterReader {
    pub fn new(command: &'static str, params: Vec<Parameter>) -> Self {
        Self {
            command,
            params: params.into_iter(),
            position: 0,
        }
    }

    fn next(&mut self, expected: &str) -> Result<Parameter> {
        self.position += 1;
        self.params.next().ok_or_else(|| {
            GridError::InvalidCommand(format!(
                "{}: missing parameter {} ({})",
                self.command, self.position, expected
            ))
        })
    }

    fn mismatch(&self, expected: &str, found: &Parameter) -> GridError {
        GridError::InvalidCommand(format!(
            "{}: parameter {} should be {}, found {:?}",
            self.command, self.position, expected, found
        ))
    }

    pub fn key(&mut self) -> Result<String> {
        match self.next("key")? {
            Parameter::Key(key) => Ok(key),
            other => Err(self.mismatch("key", &other)),
        }
    }

    pub fn keys(&mut self) -> Result<Vec<String>> {
        match self.next("keys")? {
            Parameter::Keys(keys) => Ok(keys),
            other => Err(self.mismatch("keys", &other)),
        }
    }

    pub fn payload(&mut self) -> Result<Payload> {
        match self.next("payload")? {
            Parameter::Payload(payload) => Ok(payload),
            other => Err(self.mismatch("payload", &other)),
        }
    }

    pub fn value(&mut self) -> Result<Option<CacheValue>> {
        match self.next("value")? {
            Parameter::Value(value) => Ok(value),
            other => Err(self.mismatch("value", &other)),
        }
    }

    pub fn millis(&mut self) -> Result<Option<u64>> {
        match self.next("millis")? {
            Parameter::Millis(millis) => Ok(millis),
            other => Err(self.mismatch("millis", &other)),
        }
    }

    pub fn boolean(&mut self) -> Result<bool> {
        match self.next("bool")? {
            Parameter::Bool(value) => Ok(value),
            other => Err(self.mismatch("bool", &other)),
        }
    }

    pub fn flags(&mut self) -> Result<FlagSet> {
        match self.next("flags")? {
            Parameter::Flags(flags) => Ok(flags),
            other => Err(self.mismatch("flags", &other)),
        }
    }

    pub fn transaction(&mut self) -> Result<Option<GlobalTransaction>> {
        match self.next("transaction")? {
            Parameter::Transaction(gtx) => Ok(gtx),
            other => Err(self.mismatch("transaction", &other)),
        }
    }

    pub fn segments(&mut self) -> Result<Vec<u32>> {
        match self.next("segments")? {
            Parameter::Segments(segments) => Ok(segments),
            other => Err(self.mismatch("segments", &other)),
        }
    }

    pub fn topology_id(&mut self) -> Result<u64> {
        match self.next("topology id")? {
            Parameter::TopologyId(id) => Ok(id),
            other => Err(self.mismatch("topology id", &other)),
        }
    }

    /// Fails if parameters are left over.
    pub fn finish(mut self) -> Result<()> {
        match self.params.next() {
            None => Ok(()),
            Some(_) => Err(GridError::InvalidCommand(format!(
                "{}: expected {} parameters, got more",
                self.command, self.position
            ))),
        }
    }
}
