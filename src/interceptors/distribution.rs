use std::collections::HashSet;
use std::sync::Arc;

use super::{Interceptor, Next};
use crate::commands::{CommandResult, Flag, InvalidateL1Command, ReplicableCommand};
use crate::context::InvocationContext;
use crate::distribution::DistributionManager;
use crate::error::{GridError, Result};
use crate::remoting::{BoxFuture, Invocation, Response, ResponseMode};

/// Routes writes through the primary owner.
///
/// A write started on any other node is forwarded to the primary. The primary
/// performs it and pushes the unconditional form to the backup owners, reusing
/// the operation id so replays are recognised. This stage runs inside entry
/// wrapping, so the key stays locked until the backups have answered and
/// nothing is committed when replication fails.
pub struct DistributionInterceptor {
    dm: Arc<DistributionManager>,
    l1_enabled: bool,
}

impl DistributionInterceptor {
    pub fn new(dm: Arc<DistributionManager>, l1_enabled: bool) -> Self {
        Self { dm, l1_enabled }
    }

    async fn forward_to_primary(&self, invocation: &Invocation, key: &str) -> Result<CommandResult> {
        let primary = self.dm.get_primary_location(key);
        tracing::debug!("Forwarding write of {} to primary {}", key, primary);

        let mut responses = self
            .dm
            .transport()
            .invoke_remotely(
                vec![primary.clone()],
                invocation.clone(),
                ResponseMode::Synchronous,
                self.dm.sync_repl_timeout(),
                None,
            )
            .await?;

        match responses.remove(&primary) {
            Some(Response::Successful(result)) => Ok(result),
            Some(Response::Unsuccessful) => Ok(CommandResult::Empty),
            Some(Response::Exception(message)) => Err(GridError::RemoteException {
                address: primary,
                message,
            }),
            None => Err(GridError::NodeNotFound(primary)),
        }
    }

    async fn replicate_to_backups(&self, invocation: &Invocation, key: &str) -> Result<()> {
        let local = self.dm.address();
        let backups: Vec<_> = self
            .dm
            .get_affected_nodes([key])
            .into_iter()
            .filter(|owner| *owner != local)
            .collect();
        if backups.is_empty() {
            return Ok(());
        }

        let responses = self
            .dm
            .transport()
            .invoke_remotely(
                backups,
                invocation.derive(invocation.command.to_backup()),
                ResponseMode::Synchronous,
                self.dm.sync_repl_timeout(),
                None,
            )
            .await?;

        for (backup, response) in responses {
            if let Response::Exception(message) = response {
                tracing::error!("Replication of {} to {} failed: {}", key, backup, message);
                return Err(GridError::RemoteException {
                    address: backup,
                    message,
                });
            }
        }
        Ok(())
    }

    /// Drops near-cache copies of `key` held by members that do not own it.
    ///
    /// Failures are logged only; a missed copy still expires with its L1 lifespan.
    async fn invalidate_l1(&self, key: &str) {
        let local = self.dm.address();
        let owners: HashSet<_> = self.dm.get_affected_nodes([key]).into_iter().collect();
        let targets: Vec<_> = self
            .dm
            .transport()
            .members()
            .into_iter()
            .filter(|member| *member != local && !owners.contains(member))
            .collect();
        if targets.is_empty() {
            return;
        }

        let invalidation = Invocation::new(ReplicableCommand::InvalidateL1(
            InvalidateL1Command::new([key]),
        ));
        match self
            .dm
            .transport()
            .invoke_remotely(
                targets,
                invalidation,
                ResponseMode::Synchronous,
                self.dm.sync_repl_timeout(),
                None,
            )
            .await
        {
            Ok(responses) => {
                for (member, response) in responses {
                    if let Response::Exception(message) = response {
                        tracing::warn!("L1 invalidation of {} on {} failed: {}", key, member, message);
                    }
                }
            }
            Err(e) => tracing::warn!("L1 invalidation of {} failed: {}", key, e),
        }
    }
}

impl Interceptor for DistributionInterceptor {
    fn visit<'a>(
        &'a self,
        ctx: &'a mut InvocationContext,
        invocation: &'a Invocation,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<CommandResult>> {
        Box::pin(async move {
            let command = &invocation.command;
            if !command.is_write() || command.has_flag(Flag::CacheModeLocal) {
                return next.invoke(ctx, invocation).await;
            }
            let Some(key) = command.key() else {
                return next.invoke(ctx, invocation).await;
            };

            let is_primary = self.dm.get_primary_location(key) == self.dm.address();
            if !is_primary {
                if ctx.is_origin_local() {
                    // The primary may replicate back to this node; do not hold the key meanwhile.
                    ctx.take_entries();
                    return self.forward_to_primary(invocation, key).await;
                }
                // Replication from the primary, or a forward that raced a topology change.
                return next.invoke(ctx, invocation).await;
            }

            let result = next.invoke(ctx, invocation).await?;
            if let CommandResult::Write(write) = &result
                && write.successful
            {
                self.replicate_to_backups(invocation, key).await?;
                if self.l1_enabled {
                    self.invalidate_l1(key).await;
                }
            }
            Ok(result)
        })
    }
}
