use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::topology::{CacheTopology, TopologyManager, TopologyProvider};
use crate::commands::{CommandResult, ReplicableCommand, StateRequestCommand};
use crate::container::DataContainer;
use crate::error::Result;
use crate::membership::types::Address;
use crate::remoting::{Invocation, Response, ResponseMode, Transport};

/// Moves segments to their new owners whenever the membership view changes.
///
/// For each view: start a rehash, pull every segment this node gained from one
/// of its previous owners, complete the rehash, and later drop the segments it lost.
pub struct StateTransferTask {
    topology: Arc<TopologyManager>,
    transport: Arc<dyn Transport>,
    container: Arc<DataContainer>,
    timeout: Duration,
}

impl StateTransferTask {
    pub fn new(
        topology: Arc<TopologyManager>,
        transport: Arc<dyn Transport>,
        container: Arc<DataContainer>,
        timeout: Duration,
    ) -> Self {
        Self {
            topology,
            transport,
            container,
            timeout,
        }
    }

    pub async fn run(self, mut view_rx: watch::Receiver<Vec<Address>>) {
        let initial = view_rx.borrow_and_update().clone();
        self.on_view_change(&initial).await;

        while view_rx.changed().await.is_ok() {
            let members = view_rx.borrow_and_update().clone();
            self.on_view_change(&members).await;
        }
        tracing::info!("Membership view closed, state transfer stopped");
    }

    pub async fn on_view_change(&self, members: &[Address]) {
        if let Err(e) = self.rebalance(members).await {
            tracing::error!("State transfer for view of {} member(s) failed: {}", members.len(), e);
        }
    }

    async fn rebalance(&self, members: &[Address]) -> Result<()> {
        let topology = match self.topology.start_rehash(members)? {
            Some(topology) => topology,
            None => {
                let current = self.topology.current_topology();
                if !current.is_rehashing() {
                    return Ok(());
                }
                // A previous rehash towards the same owners never completed.
                current
            }
        };

        let transferred = self.transfer(&topology).await?;
        tracing::info!(
            "Topology {}: received {} entries",
            topology.id,
            transferred
        );

        if self.topology.complete_rehash(topology.id) {
            self.schedule_release(topology.id + 1);
        }
        Ok(())
    }

    /// Previous owners keep lost segments for one timeout so that new owners
    /// still pulling them find the data.
    fn schedule_release(&self, completed_topology_id: u64) {
        let task = Self {
            topology: self.topology.clone(),
            transport: self.transport.clone(),
            container: self.container.clone(),
            timeout: self.timeout,
        };
        tokio::spawn(async move {
            tokio::time::sleep(task.timeout).await;
            task.release_lost_segments(completed_topology_id);
        });
    }

    /// Drops segments this node no longer owns, provided `topology_id` is still
    /// the current topology. Returns the number of entries removed.
    pub fn release_lost_segments(&self, topology_id: u64) -> usize {
        let current = self.topology.current_topology();
        if current.id != topology_id || current.is_rehashing() {
            return 0;
        }

        let owned = current
            .write_ch
            .segments_owned_by(self.topology.local_address());
        let dropped = self.container.retain_segments(&owned);
        if dropped > 0 {
            tracing::info!(
                "Topology {}: dropped {} entries no longer owned",
                topology_id,
                dropped
            );
        }
        dropped
    }

    /// Pulls the segments this node gains in `topology`. Returns the number of
    /// entries installed.
    pub async fn transfer(&self, topology: &CacheTopology) -> Result<usize> {
        let local = self.topology.local_address();
        let live: HashSet<Address> = self.transport.members().into_iter().collect();

        let owned_now = topology.read_ch.segments_owned_by(local);
        let mut by_source: BTreeMap<Address, Vec<u32>> = BTreeMap::new();
        for segment in topology.write_ch.segments_owned_by(local) {
            if owned_now.contains(&segment) {
                continue;
            }
            let source = topology
                .read_ch
                .owners_of_segment(segment)
                .iter()
                .find(|owner| *owner != local && live.contains(*owner));
            match source {
                Some(source) => by_source.entry(source.clone()).or_default().push(segment),
                None => tracing::debug!("Segment {} has no live previous owner", segment),
            }
        }

        let mut installed = 0;
        for (source, mut segments) in by_source {
            segments.sort_unstable();
            let request = StateRequestCommand::new(segments, topology.id);
            tracing::debug!("Requesting {} segment(s) from {}", request.segments.len(), source);

            let mut responses = self
                .transport
                .invoke_remotely(
                    vec![source.clone()],
                    Invocation::new(ReplicableCommand::StateRequest(request)),
                    ResponseMode::Synchronous,
                    self.timeout,
                    None,
                )
                .await?;

            match responses.remove(&source) {
                Some(Response::Successful(CommandResult::State(entries))) => {
                    installed += self.container.apply_state(entries);
                }
                Some(other) => {
                    tracing::warn!("State request to {} answered {:?}", source, other);
                }
                None => {
                    tracing::warn!("State request to {} got no answer", source);
                }
            }
        }

        Ok(installed)
    }
}
