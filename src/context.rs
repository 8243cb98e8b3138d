use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::OwnedMutexGuard;

use crate::container::MvccEntry;
use crate::membership::types::Address;

/// Cluster-wide transaction identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalTransaction {
    pub id: String,
    pub origin: Address,
}

impl GlobalTransaction {
    pub fn new(origin: Address) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            origin,
        }
    }
}

impl fmt::Display for GlobalTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GlobalTransaction:{}@{}", self.id, self.origin)
    }
}

/// A checked-out entry and the key lock that protects it.
pub struct WrappedEntry {
    pub entry: MvccEntry,
    pub(crate) guard: Option<OwnedMutexGuard<()>>,
}

/// Per-invocation state: who started it, the enclosing transaction, and the
/// entries checked out so far.
///
/// Entries live only as long as the context; dropping it releases their locks.
#[derive(Default)]
pub struct InvocationContext {
    origin: Option<Address>,
    transaction: Option<GlobalTransaction>,
    entries: HashMap<String, WrappedEntry>,
}

impl InvocationContext {
    pub fn local() -> Self {
        Self::default()
    }

    pub fn remote(origin: Address) -> Self {
        Self {
            origin: Some(origin),
            ..Self::default()
        }
    }

    pub fn with_transaction(mut self, transaction: GlobalTransaction) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn is_origin_local(&self) -> bool {
        self.origin.is_none()
    }

    /// Originating member, `None` for local invocations.
    pub fn origin(&self) -> Option<&Address> {
        self.origin.as_ref()
    }

    pub fn is_in_tx_scope(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn global_transaction(&self) -> Option<&GlobalTransaction> {
        self.transaction.as_ref()
    }

    pub fn lookup_entry(&self, key: &str) -> Option<&MvccEntry> {
        self.entries.get(key).map(|wrapped| &wrapped.entry)
    }

    pub fn lookup_entry_mut(&mut self, key: &str) -> Option<&mut MvccEntry> {
        self.entries.get_mut(key).map(|wrapped| &mut wrapped.entry)
    }

    pub fn put_entry(&mut self, entry: MvccEntry, guard: Option<OwnedMutexGuard<()>>) {
        self.entries
            .insert(entry.key.clone(), WrappedEntry { entry, guard });
    }

    /// Hands back every checked-out entry. Locks are released when the returned
    /// values are dropped.
    pub fn take_entries(&mut self) -> Vec<WrappedEntry> {
        self.entries.drain().map(|(_, wrapped)| wrapped).collect()
    }
}
