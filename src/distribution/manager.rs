use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::ch::ConsistentHash;
use super::locality::DataLocality;
use super::topology::TopologyProvider;
use crate::commands::{ClusteredGetCommand, CommandResult, FlagSet, ReplicableCommand};
use crate::container::InternalCacheEntry;
use crate::context::InvocationContext;
use crate::error::{GridError, Result};
use crate::membership::types::Address;
use crate::remoting::{
    ClusteredGetResponseValidityFilter, Invocation, Response, ResponseMode, Transport,
};

/// Answers "who owns this key" and fetches entries from remote owners.
///
/// Every call reads the topology afresh; no snapshot is kept between calls.
pub struct DistributionManager {
    topology: Arc<dyn TopologyProvider>,
    transport: Arc<dyn Transport>,
    sync_repl_timeout: Duration,
    l1_lifespan_ms: u64,
}

impl DistributionManager {
    pub fn new(
        topology: Arc<dyn TopologyProvider>,
        transport: Arc<dyn Transport>,
        sync_repl_timeout: Duration,
        l1_lifespan_ms: u64,
    ) -> Self {
        Self {
            topology,
            transport,
            sync_repl_timeout,
            l1_lifespan_ms,
        }
    }

    pub fn address(&self) -> Address {
        self.transport.address()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn sync_repl_timeout(&self) -> Duration {
        self.sync_repl_timeout
    }

    pub fn topology_id(&self) -> u64 {
        self.topology.current_topology().id
    }

    pub fn get_locality(&self, key: &str) -> DataLocality {
        let transfer_in_progress = self.topology.is_state_transfer_in_progress_for_key(key);
        let local = self
            .topology
            .current_topology()
            .write_ch
            .is_key_local_to_node(&self.address(), key);

        DataLocality::from_flags(local, transfer_in_progress)
    }

    pub fn is_local(&self, key: &str) -> bool {
        self.get_locality(key).is_local()
    }

    pub fn locate(&self, key: &str) -> Vec<Address> {
        self.topology
            .current_topology()
            .write_ch
            .locate_owners(key)
            .to_vec()
    }

    pub fn get_primary_location(&self, key: &str) -> Address {
        self.topology
            .current_topology()
            .write_ch
            .locate_primary_owner(key)
            .clone()
    }

    pub fn locate_all<I>(&self, keys: I) -> HashSet<Address>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.topology.current_topology().write_ch.locate_all_owners(keys)
    }

    /// Members that must see a write touching `keys`.
    pub fn get_affected_nodes<I>(&self, keys: I) -> Vec<Address>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut nodes: Vec<Address> = self.locate_all(keys).into_iter().collect();
        nodes.sort();
        nodes
    }

    /// The hash writes are routed with.
    pub fn get_consistent_hash(&self) -> Arc<ConsistentHash> {
        self.get_write_consistent_hash()
    }

    pub fn get_read_consistent_hash(&self) -> Arc<ConsistentHash> {
        self.topology.current_topology().read_ch.clone()
    }

    pub fn get_write_consistent_hash(&self) -> Arc<ConsistentHash> {
        self.topology.current_topology().write_ch.clone()
    }

    pub fn is_affected_by_rehash(&self, key: &str) -> bool {
        self.topology.is_state_transfer_in_progress_for_key(key)
    }

    pub fn is_rehash_in_progress(&self) -> bool {
        self.topology.is_state_transfer_in_progress()
    }

    pub fn is_join_complete(&self) -> bool {
        self.topology.is_join_complete()
    }

    /// Caps a near-cache copy's lifespan to the L1 lifespan, unless it already
    /// expires sooner.
    pub fn transform_for_l1(&self, entry: &mut InternalCacheEntry) {
        match entry.lifespan_ms {
            Some(lifespan) if lifespan <= self.l1_lifespan_ms => {}
            _ => entry.lifespan_ms = Some(self.l1_lifespan_ms),
        }
    }

    pub fn is_located_locally(&self, key: &str) -> bool {
        self.get_locality(key).is_local()
    }

    pub fn locate_key(&self, key: &str) -> Vec<String> {
        self.locate(key)
            .into_iter()
            .map(|address| address.to_string())
            .collect()
    }

    /// Fetches `key` from its read owners.
    ///
    /// Owners are asked in parallel; the first one that has the value wins.
    /// `Ok(None)` means every live owner answered that it has no such key, or
    /// that there was no live owner to ask.
    pub async fn retrieve_from_remote_source(
        &self,
        key: &str,
        ctx: &InvocationContext,
        acquire_remote_lock: bool,
        flags: &FlagSet,
    ) -> Result<Option<InternalCacheEntry>> {
        let gtx = if acquire_remote_lock {
            let Some(gtx) = ctx.global_transaction() else {
                return Err(GridError::InvalidCommand(format!(
                    "remote lock on {} requested outside a transaction",
                    key
                )));
            };
            Some(gtx.clone())
        } else {
            None
        };
        let command = ClusteredGetCommand::new(key, flags, acquire_remote_lock, gtx);

        let read_ch = self.get_read_consistent_hash();
        let members: HashSet<Address> = self.transport.members().into_iter().collect();
        let local = self.address();
        let targets: Vec<Address> = read_ch
            .locate_owners(key)
            .iter()
            .filter(|owner| members.contains(*owner))
            .cloned()
            .collect();

        let filter = ClusteredGetResponseValidityFilter::new(&targets, &local);
        if filter.expected().is_empty() {
            tracing::debug!("No live remote owner to read {} from", key);
            return Ok(None);
        }

        tracing::trace!("Fetching {} remotely from {:?}", key, targets);
        let responses = self
            .transport
            .invoke_remotely(
                targets,
                Invocation::new(ReplicableCommand::ClusteredGet(command)),
                ResponseMode::WaitForValidResponse,
                self.sync_repl_timeout,
                Some(Box::new(filter)),
            )
            .await?;

        let mut failure = None;
        for (sender, response) in responses {
            match response {
                Response::Successful(CommandResult::Entry(value)) => {
                    return Ok(Some(value.to_internal_cache_entry(key)));
                }
                Response::Exception(message) => {
                    tracing::warn!("Remote read of {} failed on {}: {}", key, sender, message);
                    failure = Some(GridError::RemoteException {
                        address: sender,
                        message,
                    });
                }
                _ => {}
            }
        }

        // TODO: retry when every owner answered not-found and the read hash
        // changed while the call was in flight.
        match failure {
            Some(error) => Err(error),
            None => Ok(None),
        }
    }
}
