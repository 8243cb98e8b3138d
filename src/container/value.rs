use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A value stored in the grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheValue {
    Text(String),
    Bytes(Vec<u8>),
    Map(AtomicMap),
}

impl CacheValue {
    /// The value as a merge target for deltas, if it is one.
    pub fn as_delta_aware(&self) -> Option<&AtomicMap> {
        match self {
            CacheValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl fmt::Display for CacheValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheValue::Text(text) => write!(f, "{:?}", text),
            CacheValue::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
            CacheValue::Map(map) => write!(f, "{:?}", map.0),
        }
    }
}

/// A string map that accepts partial updates through [`AtomicMapDelta`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtomicMap(pub BTreeMap<String, String>);

impl AtomicMap {
    pub fn get(&self, key: &str) -> Option<&String> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeltaOp {
    Put { key: String, value: String },
    Remove { key: String },
    Clear,
}

/// An ordered list of changes to an [`AtomicMap`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtomicMapDelta {
    pub ops: Vec<DeltaOp>,
}

impl AtomicMapDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ops.push(DeltaOp::Put {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.ops.push(DeltaOp::Remove { key: key.into() });
        self
    }

    pub fn clear(mut self) -> Self {
        self.ops.push(DeltaOp::Clear);
        self
    }

    /// Applies the delta on top of `base`, or on an empty map when there is none.
    pub fn merge(&self, base: Option<&AtomicMap>) -> CacheValue {
        let mut map = base.cloned().unwrap_or_default();
        for op in &self.ops {
            match op {
                DeltaOp::Put { key, value } => {
                    map.0.insert(key.clone(), value.clone());
                }
                DeltaOp::Remove { key } => {
                    map.0.remove(key);
                }
                DeltaOp::Clear => map.0.clear(),
            }
        }
        CacheValue::Map(map)
    }
}

/// What a write carries: a full value or a delta to merge into the current one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Payload {
    Value(CacheValue),
    Delta(AtomicMapDelta),
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Value(value) => fmt::Display::fmt(value, f),
            Payload::Delta(delta) => write!(f, "delta({} ops)", delta.ops.len()),
        }
    }
}
