//! Local sync cache.
//!
//! The store mirrors the remote account as of the last sync cursor. It is
//! persisted as a single JSON file, advanced by merging server deltas, and
//! patched optimistically after accepted mutations.

pub mod codec;
pub mod layer;
pub mod merge;
pub mod optimistic;
pub mod store;
mod traits;

#[cfg(test)]
pub(crate) mod fixtures;

pub use codec::{CacheStorage, JsonFileStorage};
pub use layer::{CacheLayer, CacheStatus, SyncSummary};
pub use store::LocalStore;
pub use traits::{RemoteSync, SyncEntity};
