use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

use super::entry::{InternalCacheEntry, InternalCacheValue, now_millis};
use crate::distribution::ch::segment_for;

/// Node-local entry store, partitioned by hash segment so whole segments can be
/// shipped or dropped during state transfer.
pub struct DataContainer {
    segments: Arc<DashMap<u32, DashMap<String, InternalCacheEntry>>>,
    num_segments: u32,
}

impl DataContainer {
    pub fn new(num_segments: u32) -> Self {
        Self {
            segments: Arc::new(DashMap::new()),
            num_segments,
        }
    }

    pub fn segment_of(&self, key: &str) -> u32 {
        segment_for(key, self.num_segments)
    }

    /// Returns a live entry and refreshes its idle timer. Expired entries are
    /// dropped on the way.
    pub fn get(&self, key: &str) -> Option<InternalCacheEntry> {
        let segment = self.segment_of(key);
        let segment_map = self.segments.get(&segment)?;
        let now = now_millis();

        {
            let mut entry = segment_map.get_mut(key)?;
            if !entry.is_expired(now) {
                entry.touch(now);
                return Some(entry.value().clone());
            }
        }

        segment_map.remove(key);
        None
    }

    /// Like `get` but without touching or evicting.
    pub fn peek(&self, key: &str) -> Option<InternalCacheEntry> {
        let segment = self.segment_of(key);
        self.segments
            .get(&segment)
            .and_then(|segment_map| segment_map.get(key).map(|entry| entry.value().clone()))
    }

    pub fn put(&self, entry: InternalCacheEntry) {
        let segment = self.segment_of(&entry.key);
        let segment_map = self.segments.entry(segment).or_default();
        segment_map.insert(entry.key.clone(), entry);
    }

    pub fn remove(&self, key: &str) -> Option<InternalCacheEntry> {
        let segment = self.segment_of(key);
        self.segments
            .get(&segment)
            .and_then(|segment_map| segment_map.remove(key).map(|(_, entry)| entry))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.peek(key)
            .is_some_and(|entry| !entry.is_expired(now_millis()))
    }

    pub fn dump_segments(&self, segments: &[u32]) -> Vec<(String, InternalCacheValue)> {
        let now = now_millis();
        let mut entries = Vec::new();
        for segment in segments {
            if let Some(segment_map) = self.segments.get(segment) {
                for entry in segment_map.iter() {
                    if !entry.l1 && !entry.is_expired(now) {
                        entries.push((entry.key().clone(), entry.to_internal_cache_value()));
                    }
                }
            }
        }
        entries
    }

    /// Installs transferred entries. Owned keys already present were written
    /// after the rehash started and win over the transferred copy; L1 copies
    /// and expired entries do not.
    pub fn apply_state(&self, entries: Vec<(String, InternalCacheValue)>) -> usize {
        let now = now_millis();
        let mut applied = 0;
        for (key, value) in entries {
            let segment = self.segment_of(&key);
            let segment_map = self.segments.entry(segment).or_default();
            let keep_existing = segment_map
                .get(&key)
                .is_some_and(|existing| !existing.l1 && !existing.is_expired(now));
            if !keep_existing {
                segment_map.insert(key.clone(), value.to_internal_cache_entry(key));
                applied += 1;
            }
        }
        applied
    }

    /// Removes `key` if it is held as an L1 copy. Returns whether it was.
    pub fn invalidate_l1(&self, key: &str) -> bool {
        let segment = self.segment_of(key);
        self.segments.get(&segment).is_some_and(|segment_map| {
            segment_map
                .remove_if(key, |_, entry| entry.l1)
                .is_some()
        })
    }

    /// Drops every segment not in `keep`. Returns the number of entries removed.
    pub fn retain_segments(&self, keep: &HashSet<u32>) -> usize {
        let doomed: Vec<u32> = self
            .segments
            .iter()
            .map(|entry| *entry.key())
            .filter(|segment| !keep.contains(segment))
            .collect();

        doomed
            .into_iter()
            .filter_map(|segment| self.segments.remove(&segment))
            .map(|(_, segment_map)| segment_map.len())
            .sum()
    }

    pub fn purge_expired(&self) -> usize {
        let now = now_millis();
        let mut purged = 0;
        for segment_map in self.segments.iter() {
            let before = segment_map.len();
            segment_map.retain(|_, entry| !entry.is_expired(now));
            purged += before - segment_map.len();
        }
        purged
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn entry_count(&self) -> usize {
        self.segments.iter().map(|entry| entry.value().len()).sum()
    }
}
