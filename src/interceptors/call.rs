use std::sync::Arc;

use super::{Interceptor, Next};
use crate::commands::{CommandResult, ReplicableCommand};
use crate::container::DataContainer;
use crate::context::InvocationContext;
use crate::error::Result;
use crate::notifications::CacheNotifier;
use crate::remoting::{BoxFuture, Invocation};

/// Terminal stage: performs the command.
pub struct CallInterceptor {
    container: Arc<DataContainer>,
    notifier: Arc<dyn CacheNotifier>,
}

impl CallInterceptor {
    pub fn new(container: Arc<DataContainer>, notifier: Arc<dyn CacheNotifier>) -> Self {
        Self {
            container,
            notifier,
        }
    }
}

impl Interceptor for CallInterceptor {
    fn visit<'a>(
        &'a self,
        ctx: &'a mut InvocationContext,
        invocation: &'a Invocation,
        _next: Next<'a>,
    ) -> BoxFuture<'a, Result<CommandResult>> {
        Box::pin(async move {
            let result = match &invocation.command {
                ReplicableCommand::PutKeyValue(command) => {
                    CommandResult::Write(command.perform(ctx, self.notifier.as_ref()))
                }
                ReplicableCommand::Remove(command) => {
                    CommandResult::Write(command.perform(ctx, self.notifier.as_ref()))
                }
                ReplicableCommand::ClusteredGet(command) => match command.perform(&self.container) {
                    Some(value) => CommandResult::Entry(value),
                    None => CommandResult::Empty,
                },
                ReplicableCommand::InvalidateL1(command) => {
                    let dropped = command.perform(&self.container);
                    if dropped > 0 {
                        tracing::trace!("Dropped {} L1 cop(ies)", dropped);
                    }
                    CommandResult::Empty
                }
                ReplicableCommand::StateRequest(command) => {
                    CommandResult::State(command.perform(&self.container))
                }
            };
            Ok(result)
        })
    }
}
