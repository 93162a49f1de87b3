//! Matrix-backed property graph
//!
//! This module implements the property graph data model with:
//! - Nodes and edges sharing one dense entity id range
//! - One boolean matrix per relationship type and per label
//! - One diagonal attribute matrix per property name
//! - Deferred matrix deletions applied at flush points

pub mod attributes;
pub mod catalog;
pub mod entity;
pub mod facade;
pub mod property;
pub mod relations;
pub mod store;
pub mod transaction;
pub mod types;

// Re-export main types
pub use attributes::AttributeMatrixSet;
pub use catalog::{AttributeCatalog, Catalog};
pub use entity::{Edge, Entity, EntityFormat, GraphEntity, IdAllocator, Node};
pub use facade::PropertyChange;
pub use property::{PropertyValue, PROPERTY_NOTFOUND};
pub use relations::{LabelMatrixSet, RelationMatrixSet};
pub use store::{FlushStats, Graph, GraphError, GraphResult};
pub use transaction::{CommitStats, TxState, WriteTransaction};
pub use types::{AttributeId, EntityId, EntityType, LabelId, RelationId};
