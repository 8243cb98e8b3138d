use arc_swap::ArcSwap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::ch::ConsistentHash;
use crate::error::Result;
use crate::membership::types::Address;

/// Immutable snapshot of the ownership state.
///
/// Outside a rehash `read_ch` and `write_ch` are the same hash. During a rehash
/// reads still consult the previous owners while writes already go to the new ones.
#[derive(Debug, Clone)]
pub struct CacheTopology {
    pub id: u64,
    pub read_ch: Arc<ConsistentHash>,
    pub write_ch: Arc<ConsistentHash>,
}

impl CacheTopology {
    pub fn steady(id: u64, ch: ConsistentHash) -> Self {
        let ch = Arc::new(ch);
        Self {
            id,
            read_ch: ch.clone(),
            write_ch: ch,
        }
    }

    pub fn rehashing(id: u64, read_ch: ConsistentHash, write_ch: ConsistentHash) -> Self {
        Self {
            id,
            read_ch: Arc::new(read_ch),
            write_ch: Arc::new(write_ch),
        }
    }

    pub fn is_rehashing(&self) -> bool {
        !Arc::ptr_eq(&self.read_ch, &self.write_ch)
    }

    /// The key's read owners differ from its write owners in this snapshot.
    pub fn is_key_moving(&self, key: &str) -> bool {
        self.is_rehashing() && self.read_ch.locate_owners(key) != self.write_ch.locate_owners(key)
    }
}

/// Source of the current topology and state-transfer status.
pub trait TopologyProvider: Send + Sync {
    fn current_topology(&self) -> Arc<CacheTopology>;
    fn is_state_transfer_in_progress_for_key(&self, key: &str) -> bool;
    fn is_state_transfer_in_progress(&self) -> bool;
    fn is_join_complete(&self) -> bool;
}

/// Node-local holder of the current topology.
///
/// Readers get a lock-free snapshot; `start_rehash` and `complete_rehash` swap
/// in a new one.
pub struct TopologyManager {
    local: Address,
    num_owners: usize,
    num_segments: u32,
    topology: ArcSwap<CacheTopology>,
    join_complete: AtomicBool,
}

impl TopologyManager {
    /// A founder starts out owning everything with its join complete. A joiner
    /// owns nothing it can serve until the first rehash completes.
    pub fn new(local: Address, num_owners: usize, num_segments: u32, founder: bool) -> Result<Self> {
        let initial = ConsistentHash::new(std::slice::from_ref(&local), num_owners, num_segments)?;

        Ok(Self {
            local,
            num_owners,
            num_segments,
            topology: ArcSwap::from_pointee(CacheTopology::steady(1, initial)),
            join_complete: AtomicBool::new(founder),
        })
    }

    pub fn local_address(&self) -> &Address {
        &self.local
    }

    pub fn install(&self, topology: CacheTopology) {
        tracing::info!(
            "Installing topology {} (rehashing: {})",
            topology.id,
            topology.is_rehashing()
        );
        self.topology.store(Arc::new(topology));
        if !self.topology.load().is_rehashing() {
            self.join_complete.store(true, Ordering::Release);
        }
    }

    /// Starts a rehash towards `members`. Returns the new topology, or `None`
    /// when the write owners would not change.
    ///
    /// While this node's join is incomplete it holds no data, so reads are
    /// routed to the other members until the rehash completes.
    pub fn start_rehash(&self, members: &[Address]) -> Result<Option<Arc<CacheTopology>>> {
        let write_ch = Arc::new(ConsistentHash::new(
            members,
            self.num_owners,
            self.num_segments,
        )?);

        if *self.topology.load().write_ch == *write_ch {
            return Ok(None);
        }

        let joiner_read_ch = if self.is_join_complete() {
            None
        } else {
            let others: Vec<Address> = members
                .iter()
                .filter(|member| **member != self.local)
                .cloned()
                .collect();
            ConsistentHash::new(&others, self.num_owners, self.num_segments)
                .ok()
                .map(Arc::new)
        };

        self.topology.rcu(|current| {
            let read_ch = match &joiner_read_ch {
                Some(read_ch) => read_ch.clone(),
                None => current.read_ch.clone(),
            };
            CacheTopology {
                id: current.id + 1,
                read_ch,
                write_ch: write_ch.clone(),
            }
        });

        let topology = self.topology.load_full();
        tracing::info!(
            "Rehash started: topology {} with {} member(s)",
            topology.id,
            topology.write_ch.members().len()
        );
        Ok(Some(topology))
    }

    /// Ends the rehash begun by topology `topology_id`. Returns false when a
    /// newer topology has been installed since.
    pub fn complete_rehash(&self, topology_id: u64) -> bool {
        let mut applied = false;

        self.topology.rcu(|current| {
            applied = current.id == topology_id;
            if !applied {
                return (**current).clone();
            }
            CacheTopology {
                id: current.id + 1,
                read_ch: current.write_ch.clone(),
                write_ch: current.write_ch.clone(),
            }
        });

        if applied {
            self.join_complete.store(true, Ordering::Release);
            tracing::info!("Rehash of topology {} complete", topology_id);
        } else {
            tracing::debug!("Ignoring completion of stale topology {}", topology_id);
        }
        applied
    }
}

impl TopologyProvider for TopologyManager {
    fn current_topology(&self) -> Arc<CacheTopology> {
        self.topology.load_full()
    }

    fn is_state_transfer_in_progress_for_key(&self, key: &str) -> bool {
        self.topology.load().is_key_moving(key)
    }

    fn is_state_transfer_in_progress(&self) -> bool {
        self.topology.load().is_rehashing()
    }

    fn is_join_complete(&self) -> bool {
        self.join_complete.load(Ordering::Acquire)
    }
}
