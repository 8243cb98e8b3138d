use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use super::value::CacheValue;

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// An entry as held by the data container.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalCacheEntry {
    pub key: String,
    pub value: CacheValue,
    pub lifespan_ms: Option<u64>,
    pub max_idle_ms: Option<u64>,
    pub created_ms: u64,
    pub last_used_ms: u64,
    /// Near-cache copy of an entry owned elsewhere.
    pub l1: bool,
}

impl InternalCacheEntry {
    pub fn new(key: impl Into<String>, value: CacheValue) -> Self {
        let now = now_millis();
        Self {
            key: key.into(),
            value,
            lifespan_ms: None,
            max_idle_ms: None,
            created_ms: now,
            last_used_ms: now,
            l1: false,
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        let lifespan_over = self
            .lifespan_ms
            .is_some_and(|lifespan| self.created_ms.saturating_add(lifespan) <= now);
        let idle_over = self
            .max_idle_ms
            .is_some_and(|max_idle| self.last_used_ms.saturating_add(max_idle) <= now);
        lifespan_over || idle_over
    }

    pub fn touch(&mut self, now: u64) {
        self.last_used_ms = now;
    }

    pub fn to_internal_cache_value(&self) -> InternalCacheValue {
        InternalCacheValue {
            value: self.value.clone(),
            lifespan_ms: self.lifespan_ms,
            max_idle_ms: self.max_idle_ms,
            created_ms: self.created_ms,
        }
    }
}

/// Wire form of an entry, without its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalCacheValue {
    pub value: CacheValue,
    pub lifespan_ms: Option<u64>,
    pub max_idle_ms: Option<u64>,
    pub created_ms: u64,
}

impl InternalCacheValue {
    pub fn to_internal_cache_entry(self, key: impl Into<String>) -> InternalCacheEntry {
        InternalCacheEntry {
            key: key.into(),
            value: self.value,
            lifespan_ms: self.lifespan_ms,
            max_idle_ms: self.max_idle_ms,
            created_ms: self.created_ms,
            last_used_ms: now_millis(),
            l1: false,
        }
    }
}

/// Working copy of an entry inside an invocation.
///
/// Checked out of the container under the key lock, mutated by commands and
/// committed back only if `changed` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct MvccEntry {
    pub key: String,
    value: Option<CacheValue>,
    lifespan_ms: Option<u64>,
    max_idle_ms: Option<u64>,
    removed: bool,
    valid: bool,
    changed: bool,
}

impl MvccEntry {
    /// Entry for a key the container does not hold.
    pub fn absent(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            lifespan_ms: None,
            max_idle_ms: None,
            removed: false,
            valid: true,
            changed: false,
        }
    }

    pub fn from_stored(entry: &InternalCacheEntry) -> Self {
        Self {
            key: entry.key.clone(),
            value: Some(entry.value.clone()),
            lifespan_ms: entry.lifespan_ms,
            max_idle_ms: entry.max_idle_ms,
            removed: false,
            valid: true,
            changed: false,
        }
    }

    pub fn value(&self) -> Option<&CacheValue> {
        self.value.as_ref()
    }

    /// Replaces the value and returns the previous one.
    pub fn set_value(&mut self, value: CacheValue) -> Option<CacheValue> {
        self.changed = true;
        self.value.replace(value)
    }

    pub fn lifespan_ms(&self) -> Option<u64> {
        self.lifespan_ms
    }

    pub fn set_lifespan(&mut self, lifespan_ms: Option<u64>) {
        self.changed = true;
        self.lifespan_ms = lifespan_ms;
    }

    pub fn max_idle_ms(&self) -> Option<u64> {
        self.max_idle_ms
    }

    pub fn set_max_idle(&mut self, max_idle_ms: Option<u64>) {
        self.changed = true;
        self.max_idle_ms = max_idle_ms;
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn set_removed(&mut self, removed: bool) {
        self.changed = true;
        self.removed = removed;
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// The stored form of this entry, or `None` if committing it deletes the key.
    pub fn to_stored(&self) -> Option<InternalCacheEntry> {
        if self.removed || !self.valid {
            return None;
        }
        let value = self.value.clone()?;
        let now = now_millis();
        Some(InternalCacheEntry {
            key: self.key.clone(),
            value,
            lifespan_ms: self.lifespan_ms,
            max_idle_ms: self.max_idle_ms,
            created_ms: now,
            last_used_ms: now,
            l1: false,
        })
    }
}
