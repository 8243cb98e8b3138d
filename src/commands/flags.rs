use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Per-invocation behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Flag {
    /// Store a value read from elsewhere; never overwrite, never block on a busy key.
    PutForExternalRead,
    /// Apply on this node only.
    CacheModeLocal,
    /// Answer from local data without asking remote owners.
    SkipRemoteLookup,
    SkipListenerNotification,
}

impl Flag {
    /// Whether the flag still means something once the command reaches another node.
    pub fn is_remotable(self) -> bool {
        !matches!(self, Flag::CacheModeLocal | Flag::SkipRemoteLookup)
    }
}

pub type FlagSet = BTreeSet<Flag>;

pub fn copy_without_non_remotable(flags: &FlagSet) -> FlagSet {
    flags.iter().copied().filter(|flag| flag.is_remotable()).collect()
}
