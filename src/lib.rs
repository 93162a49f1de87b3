//! Matrixgraph
//!
//! Storage core of a property-graph database. The whole graph lives in
//! sparse matrices over one shared entity id range:
//!
//! - one boolean adjacency matrix per relationship type, plus their union
//! - one boolean diagonal matrix per node label, plus their union
//! - one diagonal attribute matrix per property name, holding each entity's
//!   value for that property
//!
//! Matrix deletions are queued and applied at flush points, so readers never
//! see a half-restructured matrix.
//!
//! ## Example Usage
//!
//! ```rust
//! use matrixgraph::{Graph, GraphEntity, PropertyValue};
//!
//! let mut graph = Graph::new();
//!
//! let alice = graph.create_node(&["Person"]).unwrap();
//! let bob = graph.create_node(&["Person"]).unwrap();
//! graph.set_property_by_name(alice, "name", &"Alice".into()).unwrap();
//!
//! let knows = graph.create_edge(alice, bob, "KNOWS").unwrap();
//! graph.set_property_by_name(knows, "since", &PropertyValue::Integer(2020)).unwrap();
//! graph.flush();
//!
//! let node = graph.node(alice).unwrap();
//! assert_eq!(node.property("name"), &PropertyValue::from("Alice"));
//! assert_eq!(node.prop_count(), 1);
//! assert!(graph.adjacency_matrix().contains(alice.0, bob.0).unwrap());
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod graph;
pub mod matrix;
pub mod persistence;
pub mod registry;

// Re-export main types for convenience
pub use config::{ConfigError, ConfigResult, GraphConfig};

pub use graph::{
    AttributeId, CommitStats, Edge, Entity, EntityFormat, EntityId, EntityType, FlushStats, Graph,
    GraphEntity, GraphError, GraphResult, LabelId, Node, PropertyChange, PropertyValue,
    RelationId, TxState, WriteTransaction, PROPERTY_NOTFOUND,
};

pub use matrix::{MatrixError, MatrixResult, SparseMatrix, SyncState};

pub use persistence::{GraphSnapshot, SnapshotError, SnapshotResult};

pub use registry::{GraphHandle, GraphRegistry, RegistryError, RegistryResult};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
