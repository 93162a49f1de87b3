//! Core type definitions for the matrix-backed graph

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier shared by nodes and edges.
///
/// Doubles as the row/column index of every matrix the graph keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl EntityId {
    pub fn new(id: u64) -> Self {
        EntityId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        EntityId(id)
    }
}

/// Identifier of an attribute (property name)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct AttributeId(pub u16);

impl AttributeId {
    /// Sentinel handed out for names the catalog has never seen
    pub const NOT_FOUND: AttributeId = AttributeId(u16::MAX);

    pub fn new(id: u16) -> Self {
        AttributeId(id)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }

    pub fn is_not_found(&self) -> bool {
        *self == Self::NOT_FOUND
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttributeId({})", self.0)
    }
}

/// Identifier of a node label, the index of its label matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct LabelId(pub u32);

impl LabelId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Identifier of a relationship type, the index of its relation matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct RelationId(pub u32);

impl RelationId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Type tag carried by every entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Node,
    Edge,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityType::Node => write!(f, "node"),
            EntityType::Edge => write!(f, "edge"),
        }
    }
}
