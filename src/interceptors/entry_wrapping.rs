use std::sync::Arc;

use super::{Interceptor, Next};
use crate::commands::{CommandResult, Flag, ReplicableCommand};
use crate::container::{DataContainer, LockManager, MvccEntry};
use crate::context::InvocationContext;
use crate::error::Result;
use crate::remoting::{BoxFuture, Invocation};

/// Locks the written key, checks its entry out of the container, and commits
/// the entry back after the rest of the chain succeeded.
///
/// The lock is held for the whole rest of the chain, replication included, so
/// every owner applies writes to a key in the order the primary did.
pub struct EntryWrappingInterceptor {
    container: Arc<DataContainer>,
    locks: Arc<LockManager>,
}

impl EntryWrappingInterceptor {
    pub fn new(container: Arc<DataContainer>, locks: Arc<LockManager>) -> Self {
        Self { container, locks }
    }

    async fn wrap_for_write(&self, ctx: &mut InvocationContext, command: &ReplicableCommand) -> Result<()> {
        let Some(key) = command.key() else {
            return Ok(());
        };
        if ctx.lookup_entry(key).is_some() {
            return Ok(());
        }

        let guard = if command.has_flag(Flag::PutForExternalRead) {
            match self.locks.try_lock(key) {
                Some(guard) => guard,
                None => {
                    tracing::debug!("{} is busy, not wrapping it for an external read", key);
                    return Ok(());
                }
            }
        } else {
            self.locks.lock(key).await?
        };

        let entry = match self.container.get(key) {
            Some(stored) => MvccEntry::from_stored(&stored),
            None => MvccEntry::absent(key),
        };
        ctx.put_entry(entry, Some(guard));
        Ok(())
    }

    fn commit(&self, ctx: &mut InvocationContext, command: &ReplicableCommand) {
        let l1 = command.is_l1_store();
        for wrapped in ctx.take_entries() {
            if !wrapped.entry.is_changed() {
                continue;
            }
            match wrapped.entry.to_stored() {
                Some(mut stored) => {
                    stored.l1 = l1;
                    self.container.put(stored);
                }
                None => {
                    self.container.remove(&wrapped.entry.key);
                }
            }
            tracing::trace!("Committed {}", wrapped.entry.key);
        }
    }
}

impl Interceptor for EntryWrappingInterceptor {
    fn visit<'a>(
        &'a self,
        ctx: &'a mut InvocationContext,
        invocation: &'a Invocation,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<CommandResult>> {
        Box::pin(async move {
            match &invocation.command {
                command @ (ReplicableCommand::PutKeyValue(_) | ReplicableCommand::Remove(_)) => {
                    self.wrap_for_write(ctx, command).await?;

                    let result = next.invoke(&mut *ctx, invocation).await;
                    if result.is_ok() {
                        self.commit(ctx, command);
                    } else {
                        ctx.take_entries();
                    }
                    result
                }
                ReplicableCommand::ClusteredGet(get) if get.acquire_remote_lock => {
                    // Waits out any write in flight on the key before reading it.
                    let _guard = self.locks.lock(&get.key).await?;
                    next.invoke(&mut *ctx, invocation).await
                }
                _ => next.invoke(ctx, invocation).await,
            }
        })
    }
}
