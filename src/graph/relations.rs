//! Relation and label matrix sets
//!
//! One boolean matrix per relationship type (cell `(src, dst)`) and one per
//! label (diagonal cell `(node, node)`), each paired with a unified matrix
//! whose nonzero set is the union of the per-type matrices.

use super::catalog::Catalog;
use super::store::GraphResult;
use super::types::{EntityId, LabelId, RelationId};
use crate::matrix::{MatrixResult, SparseMatrix, SyncState};
use rayon::prelude::*;

/// Flush a group of matrices, fanning out over rayon when enough of them are
/// dirty. Returns `(matrices flushed, changes applied)`.
pub(crate) fn flush_matrices<'a, T, I>(matrices: I, parallel_threshold: usize) -> (usize, usize)
where
    T: Send + 'a,
    I: Iterator<Item = &'a mut SparseMatrix<T>>,
{
    let mut dirty: Vec<&mut SparseMatrix<T>> = matrices.filter(|m| m.has_pending()).collect();
    let count = dirty.len();
    let applied = if count >= parallel_threshold {
        dirty.par_iter_mut().map(|m| m.wait()).sum::<usize>()
    } else {
        dirty.iter_mut().map(|m| m.wait()).sum::<usize>()
    };
    (count, applied)
}

/// Named boolean matrices plus their unified union
#[derive(Debug, Clone)]
struct NamedMatrices {
    catalog: Catalog,
    matrices: Vec<SparseMatrix<bool>>,
    unified: SparseMatrix<bool>,
    dim: u64,
}

impl NamedMatrices {
    fn new(dim: u64) -> Self {
        NamedMatrices {
            catalog: Catalog::new(),
            matrices: Vec::new(),
            unified: SparseMatrix::new(dim, dim),
            dim,
        }
    }

    fn get_or_create(&mut self, name: &str) -> usize {
        let (id, created) = self.catalog.lookup_or_create(name);
        if created {
            self.matrices.push(SparseMatrix::new(self.dim, self.dim));
        }
        id
    }

    /// Returns whether the typed cell was newly set
    fn set(&mut self, id: usize, row: u64, col: u64) -> MatrixResult<bool> {
        let previous = self.matrices[id].set(row, col, true)?;
        self.unified.set(row, col, true)?;
        Ok(previous.is_none())
    }

    /// Returns whether the typed cell was present
    fn unset(&mut self, id: usize, row: u64, col: u64) -> MatrixResult<bool> {
        if !self.matrices[id].delete(row, col)? {
            return Ok(false);
        }
        let mut still_connected = false;
        for matrix in &self.matrices {
            if matrix.contains(row, col)? {
                still_connected = true;
                break;
            }
        }
        if !still_connected {
            self.unified.delete(row, col)?;
        }
        Ok(true)
    }

    fn contains(&self, id: usize, row: u64, col: u64) -> MatrixResult<bool> {
        match self.matrices.get(id) {
            Some(matrix) => matrix.contains(row, col),
            None => Ok(false),
        }
    }

    fn resize(&mut self, dim: u64) -> MatrixResult<()> {
        for matrix in &mut self.matrices {
            matrix.resize(dim, dim)?;
        }
        self.unified.resize(dim, dim)?;
        self.dim = dim;
        Ok(())
    }

    fn flush(&mut self, parallel_threshold: usize) -> (usize, usize) {
        flush_matrices(
            self.matrices.iter_mut().chain(std::iter::once(&mut self.unified)),
            parallel_threshold,
        )
    }

    fn state(&self) -> SyncState {
        if self
            .matrices
            .iter()
            .chain(std::iter::once(&self.unified))
            .any(|m| m.state() == SyncState::PendingDeletions)
        {
            SyncState::PendingDeletions
        } else {
            SyncState::Clean
        }
    }

    fn has_pending(&self) -> bool {
        self.unified.has_pending() || self.matrices.iter().any(SparseMatrix::has_pending)
    }
}

/// Adjacency matrices, one per relationship type
#[derive(Debug, Clone)]
pub struct RelationMatrixSet {
    inner: NamedMatrices,
}

impl RelationMatrixSet {
    pub fn new(dim: u64) -> Self {
        RelationMatrixSet {
            inner: NamedMatrices::new(dim),
        }
    }

    pub fn dimension(&self) -> u64 {
        self.inner.dim
    }

    /// Register a relationship type, creating its empty matrix
    pub fn intern(&mut self, relation: &str) -> RelationId {
        RelationId(self.inner.get_or_create(relation) as u32)
    }

    pub fn relation_id(&self, relation: &str) -> Option<RelationId> {
        self.inner.catalog.lookup(relation).map(|id| RelationId(id as u32))
    }

    pub fn relation_name(&self, id: RelationId) -> Option<&str> {
        self.inner.catalog.name_of(id.index())
    }

    pub fn relation_count(&self) -> usize {
        self.inner.matrices.len()
    }

    /// Set `(src, dst)` in the relation matrix and the unified matrix.
    /// Setting an already connected pair is a no-op.
    pub fn connect(&mut self, relation: &str, src: EntityId, dst: EntityId) -> GraphResult<RelationId> {
        let id = self.intern(relation);
        self.connect_id(id, src, dst)?;
        Ok(id)
    }

    pub(crate) fn connect_id(&mut self, id: RelationId, src: EntityId, dst: EntityId) -> GraphResult<bool> {
        Ok(self.inner.set(id.index(), src.0, dst.0)?)
    }

    /// Queue removal of `(src, dst)` from the relation matrix; the unified
    /// cell goes too unless another relation type still connects the pair.
    /// Disconnecting an unconnected pair is a no-op.
    pub fn disconnect(&mut self, relation: &str, src: EntityId, dst: EntityId) -> GraphResult<bool> {
        match self.relation_id(relation) {
            Some(id) => self.disconnect_id(id, src, dst),
            None => Ok(false),
        }
    }

    pub(crate) fn disconnect_id(&mut self, id: RelationId, src: EntityId, dst: EntityId) -> GraphResult<bool> {
        Ok(self.inner.unset(id.index(), src.0, dst.0)?)
    }

    pub fn is_connected(&self, relation: &str, src: EntityId, dst: EntityId) -> GraphResult<bool> {
        match self.relation_id(relation) {
            Some(id) => Ok(self.inner.contains(id.index(), src.0, dst.0)?),
            None => Ok(false),
        }
    }

    pub fn matrix(&self, relation: &str) -> Option<&SparseMatrix<bool>> {
        self.relation_id(relation)
            .and_then(|id| self.inner.matrices.get(id.index()))
    }

    pub fn matrix_by_id(&self, id: RelationId) -> Option<&SparseMatrix<bool>> {
        self.inner.matrices.get(id.index())
    }

    /// Union of every relation matrix
    pub fn adjacency(&self) -> &SparseMatrix<bool> {
        &self.inner.unified
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.inner.catalog.names()
    }

    pub fn resize(&mut self, dim: u64) -> GraphResult<()> {
        Ok(self.inner.resize(dim)?)
    }

    pub fn flush(&mut self, parallel_threshold: usize) -> (usize, usize) {
        self.inner.flush(parallel_threshold)
    }

    pub fn state(&self) -> SyncState {
        self.inner.state()
    }

    pub fn has_pending(&self) -> bool {
        self.inner.has_pending()
    }
}

/// Label matrices, one per label, populated on the diagonal
#[derive(Debug, Clone)]
pub struct LabelMatrixSet {
    inner: NamedMatrices,
}

impl LabelMatrixSet {
    pub fn new(dim: u64) -> Self {
        LabelMatrixSet {
            inner: NamedMatrices::new(dim),
        }
    }

    pub fn intern(&mut self, label: &str) -> LabelId {
        LabelId(self.inner.get_or_create(label) as u32)
    }

    pub fn label_id(&self, label: &str) -> Option<LabelId> {
        self.inner.catalog.lookup(label).map(|id| LabelId(id as u32))
    }

    pub fn label_name(&self, id: LabelId) -> Option<&str> {
        self.inner.catalog.name_of(id.index())
    }

    pub fn label_count(&self) -> usize {
        self.inner.matrices.len()
    }

    /// Mark `node` with `label`. Returns whether the label was newly added.
    pub fn label(&mut self, node: EntityId, label: &str) -> GraphResult<bool> {
        let id = self.intern(label);
        Ok(self.inner.set(id.index(), node.0, node.0)?)
    }

    /// Queue removal of `label` from `node`. Returns whether it was present.
    pub fn unlabel(&mut self, node: EntityId, label: &str) -> GraphResult<bool> {
        match self.label_id(label) {
            Some(id) => Ok(self.inner.unset(id.index(), node.0, node.0)?),
            None => Ok(false),
        }
    }

    pub fn has_label(&self, node: EntityId, label: &str) -> bool {
        self.label_id(label)
            .map(|id| self.inner.contains(id.index(), node.0, node.0).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Labels of `node` in ascending label id
    pub fn labels_of(&self, node: EntityId) -> GraphResult<Vec<LabelId>> {
        let mut labels = Vec::new();
        for (id, matrix) in self.inner.matrices.iter().enumerate() {
            if matrix.contains(node.0, node.0)? {
                labels.push(LabelId(id as u32));
            }
        }
        Ok(labels)
    }

    pub fn matrix(&self, label: &str) -> Option<&SparseMatrix<bool>> {
        self.label_id(label)
            .and_then(|id| self.inner.matrices.get(id.index()))
    }

    /// Union of every label matrix
    pub fn all_labels(&self) -> &SparseMatrix<bool> {
        &self.inner.unified
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.inner.catalog.names()
    }

    pub fn resize(&mut self, dim: u64) -> GraphResult<()> {
        Ok(self.inner.resize(dim)?)
    }

    pub fn flush(&mut self, parallel_threshold: usize) -> (usize, usize) {
        self.inner.flush(parallel_threshold)
    }

    pub fn state(&self) -> SyncState {
        self.inner.state()
    }

    pub fn has_pending(&self) -> bool {
        self.inner.has_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::ewise_union;

    fn id(n: u64) -> EntityId {
        EntityId(n)
    }

    #[test]
    fn test_connect_sets_typed_and_unified() {
        let mut rels = RelationMatrixSet::new(4);
        rels.connect("KNOWS", id(0), id(1)).unwrap();
        assert!(rels.is_connected("KNOWS", id(0), id(1)).unwrap());
        assert!(rels.adjacency().contains(0, 1).unwrap());
        assert!(!rels.is_connected("LIKES", id(0), id(1)).unwrap());
    }

    #[test]
    fn test_connect_is_idempotent() {
        let mut rels = RelationMatrixSet::new(4);
        rels.connect("KNOWS", id(0), id(1)).unwrap();
        rels.connect("KNOWS", id(0), id(1)).unwrap();
        assert_eq!(rels.matrix("KNOWS").unwrap().nvals(), 1);
        assert_eq!(rels.adjacency().nvals(), 1);
    }

    #[test]
    fn test_disconnect_keeps_unified_while_shared() {
        let mut rels = RelationMatrixSet::new(4);
        rels.connect("KNOWS", id(0), id(1)).unwrap();
        rels.connect("LIKES", id(0), id(1)).unwrap();
        rels.flush(usize::MAX);

        assert!(rels.disconnect("KNOWS", id(0), id(1)).unwrap());
        assert!(rels.adjacency().contains(0, 1).unwrap());

        assert!(rels.disconnect("LIKES", id(0), id(1)).unwrap());
        assert!(!rels.adjacency().contains(0, 1).unwrap());
        assert_eq!(rels.state(), SyncState::PendingDeletions);

        rels.flush(usize::MAX);
        assert_eq!(rels.state(), SyncState::Clean);
        assert!(!rels.adjacency().is_stored(0, 1));
    }

    #[test]
    fn test_disconnect_unconnected_is_noop() {
        let mut rels = RelationMatrixSet::new(4);
        assert!(!rels.disconnect("KNOWS", id(0), id(1)).unwrap());
        rels.connect("KNOWS", id(1), id(2)).unwrap();
        assert!(!rels.disconnect("KNOWS", id(0), id(1)).unwrap());
        assert_eq!(rels.state(), SyncState::Clean);
    }

    #[test]
    fn test_unified_is_union_after_flush() {
        let mut rels = RelationMatrixSet::new(8);
        rels.connect("A", id(0), id(1)).unwrap();
        rels.connect("B", id(2), id(3)).unwrap();
        rels.connect("B", id(0), id(1)).unwrap();
        rels.disconnect("A", id(0), id(1)).unwrap();
        rels.flush(1);

        let union = ewise_union(rels.matrix("A").unwrap(), rels.matrix("B").unwrap(), usize::MAX).unwrap();
        let expected: Vec<(u64, u64)> = union.iter().map(|(r, c, _)| (r, c)).collect();
        let unified: Vec<(u64, u64)> = rels.adjacency().iter().map(|(r, c, _)| (r, c)).collect();
        assert_eq!(expected, unified);
    }

    #[test]
    fn test_labels_on_diagonal() {
        let mut labels = LabelMatrixSet::new(4);
        assert!(labels.label(id(2), "Person").unwrap());
        assert!(!labels.label(id(2), "Person").unwrap());
        labels.label(id(2), "Employee").unwrap();
        assert_eq!(labels.labels_of(id(2)).unwrap(), vec![LabelId(0), LabelId(1)]);
        assert!(labels.matrix("Person").unwrap().contains(2, 2).unwrap());

        assert!(labels.unlabel(id(2), "Person").unwrap());
        assert!(!labels.has_label(id(2), "Person"));
        assert!(labels.all_labels().contains(2, 2).unwrap());
        assert!(!labels.unlabel(id(2), "Ghost").unwrap());
    }

    #[test]
    fn test_resize_all() {
        let mut rels = RelationMatrixSet::new(2);
        rels.connect("KNOWS", id(0), id(1)).unwrap();
        assert!(rels.connect("KNOWS", id(5), id(1)).is_err());
        rels.resize(8).unwrap();
        rels.connect("KNOWS", id(5), id(1)).unwrap();
        assert_eq!(rels.matrix("KNOWS").unwrap().nrows(), 8);
        assert_eq!(rels.adjacency().ncols(), 8);
    }
}
