//! Attribute matrix set
//!
//! One matrix per attribute id. Values live on the diagonal: cell `(id, id)`
//! of matrix `a` holds entity `id`'s value for attribute `a`.

use super::property::PropertyValue;
use super::relations::flush_matrices;
use super::store::GraphResult;
use super::types::{AttributeId, EntityId};
use crate::matrix::{SparseMatrix, SyncState};

#[derive(Debug, Clone)]
pub struct AttributeMatrixSet {
    matrices: Vec<SparseMatrix<PropertyValue>>,
    dim: u64,
}

impl AttributeMatrixSet {
    pub fn new(dim: u64) -> Self {
        AttributeMatrixSet {
            matrices: Vec::new(),
            dim,
        }
    }

    /// Make sure matrices exist for every attribute id up to `attribute`
    pub fn ensure(&mut self, attribute: AttributeId) {
        let dim = self.dim;
        while self.matrices.len() <= attribute.index() {
            self.matrices.push(SparseMatrix::new(dim, dim));
        }
    }

    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    pub fn matrix(&self, attribute: AttributeId) -> Option<&SparseMatrix<PropertyValue>> {
        self.matrices.get(attribute.index())
    }

    pub fn get(&self, attribute: AttributeId, id: EntityId) -> GraphResult<Option<&PropertyValue>> {
        match self.matrices.get(attribute.index()) {
            Some(matrix) => Ok(matrix.get(id.0, id.0)?),
            None => Ok(None),
        }
    }

    pub fn set(
        &mut self,
        attribute: AttributeId,
        id: EntityId,
        value: PropertyValue,
    ) -> GraphResult<Option<PropertyValue>> {
        self.ensure(attribute);
        Ok(self.matrices[attribute.index()].set(id.0, id.0, value)?)
    }

    /// Queue removal of the cell; returns whether it was present
    pub fn delete(&mut self, attribute: AttributeId, id: EntityId) -> GraphResult<bool> {
        match self.matrices.get_mut(attribute.index()) {
            Some(matrix) => Ok(matrix.delete(id.0, id.0)?),
            None => Ok(false),
        }
    }

    /// Number of attribute matrices holding a cell for `id`
    pub fn present_count(&self, id: EntityId) -> GraphResult<usize> {
        let mut count = 0;
        for matrix in &self.matrices {
            if matrix.contains(id.0, id.0)? {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn resize(&mut self, dim: u64) -> GraphResult<()> {
        for matrix in &mut self.matrices {
            matrix.resize(dim, dim)?;
        }
        self.dim = dim;
        Ok(())
    }

    pub fn flush(&mut self, parallel_threshold: usize) -> (usize, usize) {
        flush_matrices(self.matrices.iter_mut(), parallel_threshold)
    }

    pub fn state(&self) -> SyncState {
        if self
            .matrices
            .iter()
            .any(|m| m.state() == SyncState::PendingDeletions)
        {
            SyncState::PendingDeletions
        } else {
            SyncState::Clean
        }
    }

    pub fn has_pending(&self) -> bool {
        self.matrices.iter().any(SparseMatrix::has_pending)
    }

    /// Every stored `(attribute, entity, value)` triple
    pub fn iter(&self) -> impl Iterator<Item = (AttributeId, EntityId, &PropertyValue)> + '_ {
        self.matrices.iter().enumerate().flat_map(|(attr, matrix)| {
            matrix
                .iter()
                .map(move |(row, _, value)| (AttributeId(attr as u16), EntityId(row), value))
        })
    }
}
