use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::filter::ResponseFilter;
use super::response::{Response, ResponseMode};
use crate::commands::ReplicableCommand;
use crate::error::Result;
use crate::membership::types::Address;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A command on its way to other members, tagged with an operation id so a
/// receiver applies it at most once.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub op_id: String,
    pub command: ReplicableCommand,
}

impl Invocation {
    pub fn new(command: ReplicableCommand) -> Self {
        Self {
            op_id: uuid::Uuid::new_v4().to_string(),
            command,
        }
    }

    /// Same operation id, different command. Used when the primary replicates
    /// the write it just applied.
    pub fn derive(&self, command: ReplicableCommand) -> Self {
        Self {
            op_id: self.op_id.clone(),
            command,
        }
    }
}

/// Group RPC between members.
///
/// The local node is never invoked through the transport; targets equal to
/// `address()` are dropped.
pub trait Transport: Send + Sync {
    fn address(&self) -> Address;

    /// Current live membership view, local node included.
    fn members(&self) -> Vec<Address>;

    /// Sends `invocation` to every target in parallel and collects the replies
    /// permitted by `mode` and `filter`. Fails with `GridError::Timeout` when
    /// the wait exceeds `timeout`.
    fn invoke_remotely<'a>(
        &'a self,
        targets: Vec<Address>,
        invocation: Invocation,
        mode: ResponseMode,
        timeout: Duration,
        filter: Option<Box<dyn ResponseFilter>>,
    ) -> BoxFuture<'a, Result<HashMap<Address, Response>>>;
}
