//! Local Data Container
//!
//! Node-local storage for the entries this node owns or caches.
//!
//! ## Core Concepts
//! - **Values**: `CacheValue` is either an opaque value or an `AtomicMap`, which
//!   accepts partial updates (`AtomicMapDelta`).
//! - **Entries**: `InternalCacheEntry` is the stored form with expiry metadata,
//!   `InternalCacheValue` its wire form and `MvccEntry` the working copy a command mutates.
//! - **Segments**: `DataContainer` groups entries by hash segment for state transfer.
//! - **Locks**: `LockManager` serialises writers of the same key.

pub mod data_container;
pub mod entry;
pub mod lock;
pub mod value;

pub use data_container::DataContainer;
pub use entry::{InternalCacheEntry, InternalCacheValue, MvccEntry};
pub use lock::LockManager;
pub use value::{AtomicMap, AtomicMapDelta, CacheValue, DeltaOp, Payload};
