//! Persistence boundary
//!
//! The graph hands out a complete, flushed [`GraphSnapshot`] of its catalogs
//! and matrices; where the bytes go is up to the caller.

pub mod snapshot;

pub use snapshot::{
    GraphSnapshot, SnapshotError, SnapshotResult, StoredEdge, StoredNode, SNAPSHOT_VERSION,
};
