//! Sparse matrix capability
//!
//! The storage layer only needs a small surface from its matrices:
//! - typed get/set/delete of single cells
//! - resize and an explicit flush of queued structural changes
//! - boolean multiply/union/transpose for traversal

pub mod ops;
pub mod sparse;

pub use ops::{ewise_union, mxm, transpose};
pub use sparse::{MatrixError, MatrixResult, SparseMatrix, SyncState};
