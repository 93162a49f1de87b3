//! Name catalogs
//!
//! A catalog maps names to dense integer ids in first-seen order and never
//! frees an id. The attribute catalog is the name⇄id mapping for property
//! names; label and relationship-type schemas use the same structure to number
//! their matrices.

use super::store::{GraphError, GraphResult};
use super::types::AttributeId;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Bidirectional name ⇄ dense id mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    names: IndexSet<String>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.names.get_index_of(name)
    }

    /// Returns the id of `name` and whether it was assigned by this call
    pub fn lookup_or_create(&mut self, name: &str) -> (usize, bool) {
        if let Some(id) = self.names.get_index_of(name) {
            return (id, false);
        }
        let (id, _) = self.names.insert_full(name.to_string());
        (id, true)
    }

    pub fn name_of(&self, id: usize) -> Option<&str> {
        self.names.get_index(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in id order
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(String::as_str)
    }
}

/// Attribute name catalog.
///
/// Not synchronized on its own: mutation happens under the graph's exclusive
/// write access.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeCatalog {
    inner: Catalog,
}

impl AttributeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: returns the existing id or assigns the next unused one
    pub fn lookup_or_create(&mut self, name: &str) -> GraphResult<(AttributeId, bool)> {
        if let Some(id) = self.inner.lookup(name) {
            return Ok((AttributeId(id as u16), false));
        }
        if self.inner.len() >= AttributeId::NOT_FOUND.index() {
            return Err(GraphError::ResourceExhausted(format!(
                "attribute id space exhausted while adding '{}'",
                name
            )));
        }
        let (id, created) = self.inner.lookup_or_create(name);
        Ok((AttributeId(id as u16), created))
    }

    pub fn lookup(&self, name: &str) -> Option<AttributeId> {
        self.inner.lookup(name).map(|id| AttributeId(id as u16))
    }

    pub fn name_of(&self, id: AttributeId) -> GraphResult<&str> {
        self.inner
            .name_of(id.index())
            .ok_or_else(|| GraphError::NotFound(format!("attribute {}", id)))
    }

    pub fn contains(&self, id: AttributeId) -> bool {
        id.index() < self.inner.len()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.inner.names()
    }
}
