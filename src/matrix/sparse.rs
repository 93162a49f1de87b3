//! Compressed sparse matrix with deferred structural updates
//!
//! Inserting or removing an element of a compressed row structure shifts every
//! element stored after it. Structural changes are therefore staged in two
//! deltas and folded into the compressed arrays in a single pass by
//! [`SparseMatrix::wait`]:
//! - pending insertions: cells that are logically present but not yet stored
//! - pending deletions: stored cells that are logically absent

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by the matrix capability
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatrixError {
    #[error("index ({row}, {col}) out of bounds for {nrows}x{ncols} matrix")]
    OutOfBounds {
        row: u64,
        col: u64,
        nrows: u64,
        ncols: u64,
    },

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("cannot shrink matrix from {from_rows}x{from_cols} to {to_rows}x{to_cols}")]
    Shrink {
        from_rows: u64,
        from_cols: u64,
        to_rows: u64,
        to_cols: u64,
    },

    #[error("operation requires a flushed matrix ({0} pending changes)")]
    PendingChanges(usize),

    #[error("inconsistent matrix state: {0}")]
    Inconsistent(String),
}

pub type MatrixResult<T> = Result<T, MatrixError>;

/// Synchronization state of a single matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// No queued deletions; the compressed structure matches the logical view
    Clean,
    /// At least one stored cell is hidden by a queued deletion
    PendingDeletions,
}

/// Sparse matrix stored in compressed row form plus pending deltas.
///
/// Rows past `row_ptr.len() - 1` are empty and are materialized lazily by
/// [`SparseMatrix::wait`], so growing the dimensions is O(1).
#[derive(Debug, Clone)]
pub struct SparseMatrix<T> {
    nrows: u64,
    ncols: u64,
    row_ptr: Vec<usize>,
    col_idx: Vec<u64>,
    values: Vec<T>,
    pending_insert: FxHashMap<(u64, u64), T>,
    pending_delete: FxHashSet<(u64, u64)>,
}

impl<T> SparseMatrix<T> {
    /// Create an empty `nrows x ncols` matrix
    pub fn new(nrows: u64, ncols: u64) -> Self {
        SparseMatrix {
            nrows,
            ncols,
            row_ptr: vec![0],
            col_idx: Vec::new(),
            values: Vec::new(),
            pending_insert: FxHashMap::default(),
            pending_delete: FxHashSet::default(),
        }
    }

    /// Build a clean matrix from already sorted compressed rows
    pub(crate) fn from_rows(nrows: u64, ncols: u64, rows: Vec<Vec<(u64, T)>>) -> Self {
        let total = rows.iter().map(Vec::len).sum();
        let mut row_ptr = Vec::with_capacity(rows.len() + 1);
        let mut col_idx = Vec::with_capacity(total);
        let mut values = Vec::with_capacity(total);
        row_ptr.push(0);
        for row in rows {
            for (col, value) in row {
                col_idx.push(col);
                values.push(value);
            }
            row_ptr.push(col_idx.len());
        }

        SparseMatrix {
            nrows,
            ncols,
            row_ptr,
            col_idx,
            values,
            pending_insert: FxHashMap::default(),
            pending_delete: FxHashSet::default(),
        }
    }

    pub fn nrows(&self) -> u64 {
        self.nrows
    }

    pub fn ncols(&self) -> u64 {
        self.ncols
    }

    /// Number of logically present cells
    pub fn nvals(&self) -> usize {
        self.col_idx.len() - self.pending_delete.len() + self.pending_insert.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nvals() == 0
    }

    /// Grow the matrix. Shrinking is refused.
    pub fn resize(&mut self, nrows: u64, ncols: u64) -> MatrixResult<()> {
        if nrows < self.nrows || ncols < self.ncols {
            return Err(MatrixError::Shrink {
                from_rows: self.nrows,
                from_cols: self.ncols,
                to_rows: nrows,
                to_cols: ncols,
            });
        }
        self.nrows = nrows;
        self.ncols = ncols;
        Ok(())
    }

    fn check_bounds(&self, row: u64, col: u64) -> MatrixResult<()> {
        if row >= self.nrows || col >= self.ncols {
            return Err(MatrixError::OutOfBounds {
                row,
                col,
                nrows: self.nrows,
                ncols: self.ncols,
            });
        }
        Ok(())
    }

    /// Number of rows present in the compressed arrays
    pub(crate) fn stored_rows(&self) -> usize {
        self.row_ptr.len() - 1
    }

    /// Compressed (flushed) contents of `row`
    pub(crate) fn stored_row(&self, row: usize) -> (&[u64], &[T]) {
        if row >= self.stored_rows() {
            return (&[], &[]);
        }
        let (start, end) = (self.row_ptr[row], self.row_ptr[row + 1]);
        (&self.col_idx[start..end], &self.values[start..end])
    }

    fn stored_index(&self, row: u64, col: u64) -> Option<usize> {
        let r = row as usize;
        if r >= self.stored_rows() {
            return None;
        }
        let start = self.row_ptr[r];
        self.col_idx[start..self.row_ptr[r + 1]]
            .binary_search(&col)
            .ok()
            .map(|offset| start + offset)
    }

    /// Whether the compressed structure physically holds `(row, col)`,
    /// regardless of queued changes
    pub fn is_stored(&self, row: u64, col: u64) -> bool {
        self.stored_index(row, col).is_some()
    }

    /// Logical read of a single cell
    pub fn get(&self, row: u64, col: u64) -> MatrixResult<Option<&T>> {
        self.check_bounds(row, col)?;
        let key = (row, col);
        if self.pending_delete.contains(&key) {
            return Ok(None);
        }
        if let Some(value) = self.pending_insert.get(&key) {
            return Ok(Some(value));
        }
        Ok(self.stored_index(row, col).map(|i| &self.values[i]))
    }

    pub fn contains(&self, row: u64, col: u64) -> MatrixResult<bool> {
        Ok(self.get(row, col)?.is_some())
    }

    /// Set a cell, returning the previous logical value.
    ///
    /// A stored cell is overwritten in place. If that cell was queued for
    /// deletion the deletion is cancelled, so a later flush cannot erase the
    /// new value.
    pub fn set(&mut self, row: u64, col: u64, value: T) -> MatrixResult<Option<T>> {
        self.check_bounds(row, col)?;
        let key = (row, col);
        match self.stored_index(row, col) {
            Some(i) => {
                let previous = std::mem::replace(&mut self.values[i], value);
                if self.pending_delete.remove(&key) {
                    Ok(None)
                } else {
                    Ok(Some(previous))
                }
            }
            None => Ok(self.pending_insert.insert(key, value)),
        }
    }

    /// Queue removal of a cell. Returns whether the cell was logically present.
    pub fn delete(&mut self, row: u64, col: u64) -> MatrixResult<bool> {
        self.check_bounds(row, col)?;
        let key = (row, col);
        if self.pending_insert.remove(&key).is_some() {
            return Ok(true);
        }
        if self.stored_index(row, col).is_some() {
            return Ok(self.pending_delete.insert(key));
        }
        Ok(false)
    }

    pub fn state(&self) -> SyncState {
        if self.pending_delete.is_empty() {
            SyncState::Clean
        } else {
            SyncState::PendingDeletions
        }
    }

    pub fn pending_deletions(&self) -> usize {
        self.pending_delete.len()
    }

    pub fn pending_insertions(&self) -> usize {
        self.pending_insert.len()
    }

    /// Whether any queued work remains, insertions included
    pub fn has_pending(&self) -> bool {
        !self.pending_delete.is_empty() || !self.pending_insert.is_empty()
    }

    pub(crate) fn require_flushed(&self) -> MatrixResult<()> {
        if self.has_pending() {
            return Err(MatrixError::PendingChanges(
                self.pending_delete.len() + self.pending_insert.len(),
            ));
        }
        Ok(())
    }

    /// Apply every queued insertion and deletion to the compressed arrays.
    /// Returns the number of changes applied.
    pub fn wait(&mut self) -> usize {
        let applied = self.pending_insert.len() + self.pending_delete.len();
        if applied == 0 {
            return 0;
        }

        let mut inserts: Vec<((u64, u64), T)> = self.pending_insert.drain().collect();
        inserts.sort_unstable_by_key(|(key, _)| *key);
        let deletes = std::mem::take(&mut self.pending_delete);

        let old_ptr = std::mem::take(&mut self.row_ptr);
        let old_cols = std::mem::take(&mut self.col_idx);
        let old_values = std::mem::take(&mut self.values);
        let stored_rows = old_ptr.len() - 1;
        let rows = inserts
            .last()
            .map(|((row, _), _)| (*row as usize + 1).max(stored_rows))
            .unwrap_or(stored_rows);

        let capacity = (old_cols.len() + inserts.len()).saturating_sub(deletes.len());
        let mut row_ptr = Vec::with_capacity(rows + 1);
        let mut col_idx = Vec::with_capacity(capacity);
        let mut values = Vec::with_capacity(capacity);
        row_ptr.push(0);

        let mut stored = old_cols.into_iter().zip(old_values);
        let mut inserts = inserts.into_iter().peekable();

        for r in 0..rows {
            let row = r as u64;
            let count = if r < stored_rows { old_ptr[r + 1] - old_ptr[r] } else { 0 };
            let mut row_stored = stored
                .by_ref()
                .take(count)
                .filter(|(col, _)| !deletes.contains(&(row, *col)))
                .peekable();

            loop {
                let next_insert = match inserts.peek() {
                    Some(((r, c), _)) if *r == row => Some(*c),
                    _ => None,
                };
                let take_insert = match (row_stored.peek().map(|(c, _)| *c), next_insert) {
                    (None, None) => break,
                    (Some(stored_col), Some(insert_col)) => insert_col < stored_col,
                    (Some(_), None) => false,
                    (None, Some(_)) => true,
                };
                let next = if take_insert {
                    inserts.next().map(|((_, c), v)| (c, v))
                } else {
                    row_stored.next()
                };
                if let Some((col, value)) = next {
                    col_idx.push(col);
                    values.push(value);
                }
            }
            row_ptr.push(col_idx.len());
        }

        self.row_ptr = row_ptr;
        self.col_idx = col_idx;
        self.values = values;
        applied
    }

    /// Logical entries: stored cells not queued for deletion, then pending
    /// insertions in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64, &T)> + '_ {
        (0..self.stored_rows())
            .flat_map(move |r| {
                (self.row_ptr[r]..self.row_ptr[r + 1])
                    .map(move |i| (r as u64, self.col_idx[i], &self.values[i]))
            })
            .filter(move |(r, c, _)| !self.pending_delete.contains(&(*r, *c)))
            .chain(self.pending_insert.iter().map(|((r, c), v)| (*r, *c, v)))
    }

    /// Logical entries of one row, sorted by column
    pub fn row(&self, row: u64) -> Vec<(u64, &T)> {
        let (cols, values) = self.stored_row(row as usize);
        let mut entries: Vec<(u64, &T)> = cols
            .iter()
            .copied()
            .zip(values.iter())
            .filter(|(col, _)| !self.pending_delete.contains(&(row, *col)))
            .collect();
        entries.extend(
            self.pending_insert
                .iter()
                .filter(|((r, _), _)| *r == row)
                .map(|((_, c), v)| (*c, v)),
        );
        entries.sort_unstable_by_key(|(col, _)| *col);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut m = SparseMatrix::new(4, 4);
        assert_eq!(m.set(1, 2, 10i64).unwrap(), None);
        assert_eq!(m.get(1, 2).unwrap(), Some(&10));
        assert_eq!(m.get(2, 1).unwrap(), None);
        assert_eq!(m.nvals(), 1);
        assert_eq!(m.pending_insertions(), 1);
        assert!(!m.is_stored(1, 2));

        m.wait();
        assert!(m.is_stored(1, 2));
        assert_eq!(m.set(1, 2, 11).unwrap(), Some(10));
        assert_eq!(m.get(1, 2).unwrap(), Some(&11));
        assert!(!m.has_pending());
    }

    #[test]
    fn test_out_of_bounds() {
        let mut m: SparseMatrix<bool> = SparseMatrix::new(2, 2);
        assert!(matches!(m.set(2, 0, true), Err(MatrixError::OutOfBounds { .. })));
        assert!(m.get(0, 5).is_err());
        assert!(m.delete(9, 9).is_err());
    }

    #[test]
    fn test_delete_is_deferred() {
        let mut m = SparseMatrix::new(3, 3);
        m.set(0, 1, true).unwrap();
        m.wait();

        assert!(m.delete(0, 1).unwrap());
        assert_eq!(m.state(), SyncState::PendingDeletions);
        assert_eq!(m.get(0, 1).unwrap(), None);
        assert!(m.is_stored(0, 1));
        assert_eq!(m.nvals(), 0);

        assert_eq!(m.wait(), 1);
        assert_eq!(m.state(), SyncState::Clean);
        assert!(!m.is_stored(0, 1));
    }

    #[test]
    fn test_set_after_delete_cancels_deletion() {
        let mut m = SparseMatrix::new(3, 3);
        m.set(2, 2, "old".to_string()).unwrap();
        m.wait();

        m.delete(2, 2).unwrap();
        assert_eq!(m.set(2, 2, "new".to_string()).unwrap(), None);
        assert_eq!(m.state(), SyncState::Clean);

        m.wait();
        assert_eq!(m.get(2, 2).unwrap().map(String::as_str), Some("new"));
    }

    #[test]
    fn test_delete_pending_insert_and_absent() {
        let mut m = SparseMatrix::new(3, 3);
        m.set(1, 1, 5u8).unwrap();
        assert!(m.delete(1, 1).unwrap());
        assert_eq!(m.state(), SyncState::Clean);
        assert!(!m.has_pending());
        assert!(!m.delete(1, 1).unwrap());
        assert!(!m.delete(0, 2).unwrap());
    }

    #[test]
    fn test_wait_merges_rows_in_order() {
        let mut m = SparseMatrix::new(5, 5);
        for (r, c) in [(0, 4), (0, 1), (3, 3), (1, 0)] {
            m.set(r, c, r * 10 + c).unwrap();
        }
        m.wait();
        m.set(0, 2, 2).unwrap();
        m.set(4, 0, 40).unwrap();
        m.delete(0, 4).unwrap();
        m.delete(3, 3).unwrap();
        assert_eq!(m.wait(), 4);

        let entries: Vec<(u64, u64, u64)> = m.iter().map(|(r, c, v)| (r, c, *v)).collect();
        assert_eq!(entries, vec![(0, 1, 1), (0, 2, 2), (1, 0, 10), (4, 0, 40)]);
    }

    #[test]
    fn test_resize_grows_only() {
        let mut m: SparseMatrix<bool> = SparseMatrix::new(2, 2);
        m.resize(8, 8).unwrap();
        m.set(7, 7, true).unwrap();
        m.wait();
        assert!(m.is_stored(7, 7));
        assert!(matches!(m.resize(4, 4), Err(MatrixError::Shrink { .. })));
    }

    #[test]
    fn test_row_view_includes_pending() {
        let mut m = SparseMatrix::new(3, 6);
        m.set(1, 5, 'a').unwrap();
        m.wait();
        m.set(1, 0, 'b').unwrap();
        let row: Vec<(u64, char)> = m.row(1).into_iter().map(|(c, v)| (c, *v)).collect();
        assert_eq!(row, vec![(0, 'b'), (5, 'a')]);
    }
}
