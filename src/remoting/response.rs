use serde::{Deserialize, Serialize};

use crate::commands::CommandResult;

/// What a single member answered to a remote invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Successful(CommandResult),
    /// The member answered but had nothing useful (e.g. key not found).
    Unsuccessful,
    /// The member failed while executing the command.
    Exception(String),
}

impl Response {
    pub fn is_successful(&self) -> bool {
        matches!(self, Response::Successful(_))
    }

    /// A successful answer that carries a value.
    pub fn is_valid(&self) -> bool {
        matches!(
            self,
            Response::Successful(CommandResult::Entry(_))
                | Response::Successful(CommandResult::Write(_))
                | Response::Successful(CommandResult::State(_))
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Wait for every target.
    Synchronous,
    /// Wait until the response filter is satisfied.
    WaitForValidResponse,
    /// Fire and forget.
    Asynchronous,
}
