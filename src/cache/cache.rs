use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::commands::{
    CommandResult, Flag, FlagSet, PutKeyValueCommand, RemoveCommand, ReplicableCommand,
    WriteResult,
};
use crate::container::entry::now_millis;
use crate::container::{AtomicMapDelta, CacheValue, DataContainer, LockManager, Payload};
use crate::context::InvocationContext;
use crate::distribution::DistributionManager;
use crate::error::{GridError, Result};
use crate::interceptors::{
    CallInterceptor, DistributionInterceptor, EntryWrappingInterceptor, Interceptor,
    InterceptorChain,
};
use crate::notifications::{CacheNotifier, ListenerRegistry};
use crate::remoting::protocol::CommandRequest;
use crate::remoting::{Invocation, Response};

/// How long the result of a remotely applied write is remembered for replays.
const PROCESSED_OP_TTL_MS: u64 = 60_000;
const PROCESSED_OP_LIMIT: usize = 10_000;

/// Outcome slot of one remote write. Whoever holds the mutex is executing it.
type ProcessedOp = Arc<Mutex<Option<Response>>>;

/// The node-local entry point for reads and writes.
pub struct Cache {
    dm: Arc<DistributionManager>,
    container: Arc<DataContainer>,
    locks: Arc<LockManager>,
    listeners: Arc<ListenerRegistry>,
    chain: InterceptorChain,
    processed_ops: DashMap<String, (u64, ProcessedOp)>,
    l1_enabled: bool,
}

impl Cache {
    pub fn new(
        dm: Arc<DistributionManager>,
        container: Arc<DataContainer>,
        locks: Arc<LockManager>,
        listeners: Arc<ListenerRegistry>,
        l1_enabled: bool,
    ) -> Arc<Self> {
        let notifier: Arc<dyn CacheNotifier> = listeners.clone();
        let stages: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(EntryWrappingInterceptor::new(container.clone(), locks.clone())),
            Arc::new(DistributionInterceptor::new(dm.clone(), l1_enabled)),
            Arc::new(CallInterceptor::new(container.clone(), notifier)),
        ];

        Arc::new(Self {
            dm,
            container,
            locks,
            listeners,
            chain: InterceptorChain::new(stages),
            processed_ops: DashMap::new(),
            l1_enabled,
        })
    }

    pub fn distribution(&self) -> &Arc<DistributionManager> {
        &self.dm
    }

    pub fn container(&self) -> &Arc<DataContainer> {
        &self.container
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    pub async fn put(
        &self,
        key: &str,
        value: CacheValue,
        lifespan_ms: Option<u64>,
        max_idle_ms: Option<u64>,
    ) -> Result<WriteResult> {
        let command = PutKeyValueCommand::new(key, Payload::Value(value))
            .with_lifespan(lifespan_ms)
            .with_max_idle(max_idle_ms);
        self.execute_write(ReplicableCommand::PutKeyValue(command))
            .await
    }

    pub async fn put_if_absent(
        &self,
        key: &str,
        value: CacheValue,
        lifespan_ms: Option<u64>,
        max_idle_ms: Option<u64>,
    ) -> Result<WriteResult> {
        let command = PutKeyValueCommand::new(key, Payload::Value(value))
            .if_absent()
            .with_lifespan(lifespan_ms)
            .with_max_idle(max_idle_ms);
        self.execute_write(ReplicableCommand::PutKeyValue(command))
            .await
    }

    /// Merges `delta` into the map stored under `key`, starting from an empty
    /// map when the key holds no map.
    pub async fn apply_delta(
        &self,
        key: &str,
        delta: AtomicMapDelta,
        lifespan_ms: Option<u64>,
    ) -> Result<WriteResult> {
        let command =
            PutKeyValueCommand::new(key, Payload::Delta(delta)).with_lifespan(lifespan_ms);
        self.execute_write(ReplicableCommand::PutKeyValue(command))
            .await
    }

    pub async fn remove(&self, key: &str, expected: Option<CacheValue>) -> Result<WriteResult> {
        let mut command = RemoveCommand::new(key);
        if let Some(expected) = expected {
            command = command.if_value(expected);
        }
        self.execute_write(ReplicableCommand::Remove(command)).await
    }

    /// Stores a value obtained from an external source. Never overwrites and
    /// never waits on a key another write holds.
    pub async fn put_for_external_read(&self, key: &str, value: CacheValue) -> Result<WriteResult> {
        let command = PutKeyValueCommand::new(key, Payload::Value(value))
            .if_absent()
            .with_flag(Flag::PutForExternalRead);
        self.execute_write(ReplicableCommand::PutKeyValue(command))
            .await
    }

    pub async fn execute_write(&self, command: ReplicableCommand) -> Result<WriteResult> {
        let mut ctx = InvocationContext::local();
        let invocation = Invocation::new(command);

        match self.chain.invoke(&mut ctx, &invocation).await? {
            CommandResult::Write(result) => Ok(result),
            CommandResult::Empty => Ok(WriteResult::rejected(None)),
            other => Err(GridError::InvalidCommand(format!(
                "write {} produced {:?}",
                invocation.command, other
            ))),
        }
    }

    /// Reads `key`, asking remote owners when this node does not hold it.
    ///
    /// Values fetched for keys this node does not own are kept as near-cache
    /// (L1) copies with a bounded lifespan. An L1 copy is not trusted while a
    /// rehash affects its key.
    pub async fn get(&self, key: &str, flags: &FlagSet) -> Result<Option<CacheValue>> {
        let locality = self.dm.get_locality(key);
        let local_entry = self.container.get(key);

        if flags.contains(&Flag::SkipRemoteLookup) {
            return Ok(local_entry.map(|entry| entry.value));
        }
        match local_entry {
            Some(entry) if entry.l1 && locality.is_uncertain() => {
                self.container.invalidate_l1(key);
            }
            Some(entry) => return Ok(Some(entry.value)),
            None if locality.is_local() && !locality.is_uncertain() => return Ok(None),
            None => {}
        }

        let ctx = InvocationContext::local();
        let Some(mut remote) = self
            .dm
            .retrieve_from_remote_source(key, &ctx, false, flags)
            .await?
        else {
            return Ok(None);
        };

        let value = remote.value.clone();
        if !locality.is_local() && self.l1_enabled {
            self.dm.transform_for_l1(&mut remote);
            let l1_put = PutKeyValueCommand::new(key, Payload::Value(remote.value))
                .if_absent()
                .with_lifespan(remote.lifespan_ms)
                .with_max_idle(remote.max_idle_ms)
                .with_flag(Flag::PutForExternalRead)
                .with_flag(Flag::CacheModeLocal)
                .with_flag(Flag::SkipListenerNotification);
            if let Err(e) = self
                .execute_write(ReplicableCommand::PutKeyValue(l1_put))
                .await
            {
                tracing::warn!("Failed to keep L1 copy of {}: {}", key, e);
            }
        }

        Ok(Some(value))
    }

    /// Executes a command received from another member.
    ///
    /// A write whose operation id was already applied is not applied again; the
    /// original response is returned instead. Concurrent deliveries of the same
    /// operation wait for the first one to finish.
    pub async fn handle_remote(&self, request: CommandRequest) -> Response {
        let command = match ReplicableCommand::from_parameters(request.command_id, request.parameters) {
            Ok(command) => command,
            Err(e) => {
                tracing::error!("Rejecting command from {}: {}", request.origin, e);
                return Response::Exception(e.to_string());
            }
        };

        let mut ctx = InvocationContext::remote(request.origin);
        let invocation = Invocation {
            op_id: request.op_id,
            command,
        };
        if !invocation.command.is_write() {
            return self.invoke_remote(&mut ctx, &invocation).await;
        }

        if self.processed_ops.len() > PROCESSED_OP_LIMIT {
            self.prune_processed_ops(0);
        }
        let slot = self
            .processed_ops
            .entry(invocation.op_id.clone())
            .or_insert_with(|| (now_millis(), Arc::new(Mutex::new(None))))
            .value()
            .1
            .clone();

        let mut outcome = slot.lock().await;
        if let Some(seen) = outcome.as_ref() {
            tracing::debug!("Operation {} already applied, replaying its result", invocation.op_id);
            return seen.clone();
        }

        let response = self.invoke_remote(&mut ctx, &invocation).await;
        if !matches!(response, Response::Exception(_)) {
            *outcome = Some(response.clone());
        }
        response
    }

    async fn invoke_remote(&self, ctx: &mut InvocationContext, invocation: &Invocation) -> Response {
        match self.chain.invoke(ctx, invocation).await {
            Ok(CommandResult::Empty) => Response::Unsuccessful,
            Ok(result) => Response::Successful(result),
            Err(e) => {
                tracing::error!("Failed to execute {}: {}", invocation.command, e);
                Response::Exception(e.to_string())
            }
        }
    }

    /// Forgets replay results older than `max_age_ms`. Operations still
    /// executing are kept.
    fn prune_processed_ops(&self, max_age_ms: u64) -> usize {
        let cutoff = now_millis().saturating_sub(max_age_ms);
        let before = self.processed_ops.len();
        self.processed_ops
            .retain(|_, (at, slot)| *at > cutoff || slot.try_lock().is_err());
        before - self.processed_ops.len()
    }

    /// Periodic cleanup: expired entries, idle locks and old replay results.
    pub fn spawn_maintenance(self: Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;

                let expired = self.container.purge_expired();
                let locks = self.locks.release_unused();
                let ops = self.prune_processed_ops(PROCESSED_OP_TTL_MS);

                if expired > 0 || ops > 0 {
                    tracing::debug!(
                        "Maintenance: purged {} expired entries, {} idle locks, {} replay results",
                        expired,
                        locks,
                        ops
                    );
                }
            }
        });
    }
}
