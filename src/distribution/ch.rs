use crate::error::{GridError, Result};
use crate::membership::types::Address;
use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Segment a key falls into for a hash with `num_segments` segments.
pub fn segment_for(key: &str, num_segments: u32) -> u32 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let hash = hasher.finish() as u32;
    hash % num_segments
}

/// Immutable key -> owners mapping.
///
/// Keys hash into a fixed number of segments; every segment carries an ordered,
/// non-empty owner list whose first element is the primary owner.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsistentHash {
    members: Vec<Address>,
    num_owners: usize,
    segment_owners: Vec<Vec<Address>>,
}

impl ConsistentHash {
    /// Builds the default placement: segment `s` is owned by `members[s % n]`
    /// followed by the next `num_owners - 1` members in sorted order.
    pub fn new(members: &[Address], num_owners: usize, num_segments: u32) -> Result<Self> {
        let mut members = members.to_vec();
        members.sort();
        members.dedup();

        if members.is_empty() || num_segments == 0 {
            return Err(GridError::EmptyTopology);
        }

        let n = members.len();
        let num_owners = num_owners.clamp(1, n);

        let segment_owners = (0..num_segments as usize)
            .map(|segment| {
                (0..num_owners)
                    .map(|offset| members[(segment + offset) % n].clone())
                    .collect()
            })
            .collect();

        Ok(Self {
            members,
            num_owners,
            segment_owners,
        })
    }

    /// Builds a hash from an explicit per-segment placement.
    pub fn from_segment_owners(segment_owners: Vec<Vec<Address>>) -> Result<Self> {
        if segment_owners.is_empty() || segment_owners.iter().any(|owners| owners.is_empty()) {
            return Err(GridError::EmptyTopology);
        }

        let mut members: Vec<Address> = segment_owners.iter().flatten().cloned().collect();
        members.sort();
        members.dedup();
        let num_owners = segment_owners.iter().map(Vec::len).max().unwrap_or(1);

        Ok(Self {
            members,
            num_owners,
            segment_owners,
        })
    }

    pub fn members(&self) -> &[Address] {
        &self.members
    }

    pub fn num_owners(&self) -> usize {
        self.num_owners
    }

    pub fn num_segments(&self) -> u32 {
        self.segment_owners.len() as u32
    }

    pub fn segment_of(&self, key: &str) -> u32 {
        segment_for(key, self.num_segments())
    }

    pub fn owners_of_segment(&self, segment: u32) -> &[Address] {
        &self.segment_owners[segment as usize % self.segment_owners.len()]
    }

    pub fn locate_owners(&self, key: &str) -> &[Address] {
        self.owners_of_segment(self.segment_of(key))
    }

    pub fn locate_primary_owner(&self, key: &str) -> &Address {
        &self.locate_owners(key)[0]
    }

    pub fn locate_all_owners<I>(&self, keys: I) -> HashSet<Address>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        keys.into_iter()
            .flat_map(|key| self.locate_owners(key.as_ref()).to_vec())
            .collect()
    }

    pub fn is_key_local_to_node(&self, address: &Address, key: &str) -> bool {
        self.locate_owners(key).contains(address)
    }

    /// Segments for which `address` is one of the owners.
    pub fn segments_owned_by(&self, address: &Address) -> HashSet<u32> {
        self.segment_owners
            .iter()
            .enumerate()
            .filter(|(_, owners)| owners.contains(address))
            .map(|(segment, _)| segment as u32)
            .collect()
    }
}
