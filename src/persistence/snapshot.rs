//! Graph snapshots
//!
//! A snapshot captures the catalogs, every live entity and every stored
//! attribute cell of a flushed graph. Relation and label matrices are rebuilt
//! from the entity records on load. Byte encoding uses bincode; a JSON form
//! is available for inspection and hand-edited fixtures.

use crate::config::{ConfigError, GraphConfig};
use crate::graph::{AttributeId, EntityId, Graph, GraphEntity, GraphError, LabelId, PropertyValue};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use thiserror::Error;
use tracing::{debug, info};

/// Bumped whenever the snapshot layout changes
pub const SNAPSHOT_VERSION: u32 = 1;

/// Snapshot errors
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The graph still has pending matrix work
    #[error("graph has pending operations; flush before taking a snapshot")]
    PendingOperations,

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported snapshot version {found} (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("corrupt snapshot: {0}")]
    Corrupt(String),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Serialized node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredNode {
    pub id: u64,
    pub labels: Vec<u32>,
    pub properties: Vec<(u16, PropertyValue)>,
}

/// Serialized edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEdge {
    pub id: u64,
    pub relation: u32,
    pub src: u64,
    pub dst: u64,
    pub properties: Vec<(u16, PropertyValue)>,
}

/// Everything needed to rebuild a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub version: u32,
    pub config: GraphConfig,
    pub dimension: u64,
    /// Attribute names in attribute id order
    pub attributes: Vec<String>,
    /// Label names in label id order
    pub labels: Vec<String>,
    /// Relationship type names in relation id order
    pub relations: Vec<String>,
    pub nodes: Vec<StoredNode>,
    pub edges: Vec<StoredEdge>,
}

impl GraphSnapshot {
    pub fn encode(&self) -> SnapshotResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> SnapshotResult<Self> {
        let snapshot: GraphSnapshot = bincode::deserialize(bytes)?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    pub fn write_to<W: Write>(&self, writer: W) -> SnapshotResult<()> {
        Ok(bincode::serialize_into(writer, self)?)
    }

    pub fn read_from<R: Read>(reader: R) -> SnapshotResult<Self> {
        let snapshot: GraphSnapshot = bincode::deserialize_from(reader)?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    pub fn to_json(&self) -> SnapshotResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> SnapshotResult<Self> {
        let snapshot: GraphSnapshot = serde_json::from_str(json)?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    fn check_version(&self) -> SnapshotResult<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                found: self.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(())
    }
}

fn stored_properties(graph: &Graph, id: EntityId) -> SnapshotResult<Vec<(u16, PropertyValue)>> {
    Ok(graph
        .get_properties(id)?
        .into_iter()
        .map(|(attribute, value)| (attribute.0, value.clone()))
        .collect())
}

impl GraphSnapshot {
    /// Reject ids outside the recorded dimension or the configured cap
    /// before anything is allocated
    fn check_bounds(&self) -> SnapshotResult<()> {
        let config = &self.config;
        if let Some(max) = config.max_entities {
            // growth doubles or jumps to id + 1, so a capped graph never
            // grows past twice its cap
            let reachable = max.saturating_mul(2).max(config.initial_capacity);
            if self.dimension > reachable {
                return Err(SnapshotError::Corrupt(format!(
                    "dimension {} unreachable under entity cap {}",
                    self.dimension, max
                )));
            }
        }

        let ids = self
            .nodes
            .iter()
            .map(|node| node.id)
            .chain(self.edges.iter().flat_map(|edge| [edge.id, edge.src, edge.dst]));
        for id in ids {
            if id >= self.dimension {
                return Err(SnapshotError::Corrupt(format!(
                    "entity id {} outside dimension {}",
                    id, self.dimension
                )));
            }
            if let Some(max) = config.max_entities {
                if id >= max {
                    return Err(GraphError::ResourceExhausted(format!(
                        "entity id {} outside range capped at {}",
                        id, max
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }
}

fn name_at<'a>(names: &'a [String], index: usize, what: &str) -> SnapshotResult<&'a str> {
    names
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| SnapshotError::Corrupt(format!("unknown {} id {}", what, index)))
}

impl Graph {
    /// Capture the graph. Fails while any matrix has pending work.
    pub fn snapshot(&self) -> SnapshotResult<GraphSnapshot> {
        if self.has_pending() {
            return Err(SnapshotError::PendingOperations);
        }

        let mut nodes = Vec::with_capacity(self.node_count());
        for node in self.nodes() {
            let id = node.id();
            let labels = self
                .labels()
                .labels_of(id)?
                .into_iter()
                .map(|label: LabelId| label.0)
                .collect();
            nodes.push(StoredNode {
                id: id.0,
                labels,
                properties: stored_properties(self, id)?,
            });
        }

        let mut edges = Vec::with_capacity(self.edge_count());
        for edge in self.edges() {
            let id = edge.id();
            edges.push(StoredEdge {
                id: id.0,
                relation: edge.relation_id().0,
                src: edge.src().0,
                dst: edge.dst().0,
                properties: stored_properties(self, id)?,
            });
        }

        debug!("Captured snapshot of {} nodes and {} edges", nodes.len(), edges.len());
        Ok(GraphSnapshot {
            version: SNAPSHOT_VERSION,
            config: self.config().clone(),
            dimension: self.dimension(),
            attributes: self.attribute_catalog().names().map(str::to_string).collect(),
            labels: self.labels().names().map(str::to_string).collect(),
            relations: self.relations().names().map(str::to_string).collect(),
            nodes,
            edges,
        })
    }

    /// Rebuild a flushed graph. Ids missing from the snapshot below its
    /// highest id become reclaimable.
    pub fn from_snapshot(snapshot: &GraphSnapshot) -> SnapshotResult<Graph> {
        snapshot.check_version()?;
        snapshot.config.validate()?;
        snapshot.check_bounds()?;
        let mut config = snapshot.config.clone();
        config.initial_capacity = config.initial_capacity.max(snapshot.dimension);
        let mut graph = Graph::with_config(config);

        for name in &snapshot.attributes {
            graph.intern_attribute(name)?;
        }
        for name in &snapshot.labels {
            graph.intern_label(name);
        }
        for name in &snapshot.relations {
            graph.intern_relation(name);
        }

        for node in &snapshot.nodes {
            let labels = node
                .labels
                .iter()
                .map(|label| name_at(&snapshot.labels, *label as usize, "label").map(str::to_string))
                .collect::<SnapshotResult<Vec<String>>>()?;
            graph.restore_node(EntityId(node.id), &labels)?;
        }
        for edge in &snapshot.edges {
            let relation = name_at(&snapshot.relations, edge.relation as usize, "relation")?;
            graph.restore_edge(EntityId(edge.id), relation, EntityId(edge.src), EntityId(edge.dst))?;
        }

        let entities = snapshot
            .nodes
            .iter()
            .map(|node| (node.id, &node.properties))
            .chain(snapshot.edges.iter().map(|edge| (edge.id, &edge.properties)));
        for (id, properties) in entities {
            for (attribute, value) in properties {
                graph.add_property(EntityId(id), AttributeId(*attribute), value)?;
            }
        }

        graph.flush();
        info!(
            "Restored graph with {} nodes and {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }
}
