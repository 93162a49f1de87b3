//! Matrix-backed graph storage
//!
//! A [`Graph`] owns every matrix that encodes the graph:
//! - one boolean relation matrix per relationship type plus their union
//! - one boolean label matrix per label plus their union
//! - one attribute matrix per property name, values on the diagonal
//!
//! All of them share a single dimension that tracks the entity id range.

use super::attributes::AttributeMatrixSet;
use super::catalog::AttributeCatalog;
use super::entity::{Edge, Entity, IdAllocator, Node};
use super::relations::{LabelMatrixSet, RelationMatrixSet};
use super::types::{AttributeId, EntityId, EntityType, RelationId};
use crate::config::GraphConfig;
use crate::matrix::{mxm, MatrixError, SparseMatrix, SyncState};
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during graph operations
#[derive(Error, Debug, PartialEq)]
pub enum GraphError {
    #[error("{0} is not a live entity")]
    InvalidEntity(EntityId),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Matrix operation failed: {0}")]
    MatrixOperationFailed(#[from] MatrixError),

    #[error("{entity} already has {attribute} set")]
    PropertyAlreadySet {
        entity: EntityId,
        attribute: AttributeId,
    },

    #[error("{id} is not a {expected}")]
    WrongEntityType { id: EntityId, expected: EntityType },
}

pub type GraphResult<T> = Result<T, GraphError>;

/// What a live id refers to besides its identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordKind {
    Node,
    Edge {
        relation: RelationId,
        src: EntityId,
        dst: EntityId,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct EntityRecord {
    pub(crate) entity: Entity,
    pub(crate) kind: RecordKind,
}

/// Outcome of [`Graph::flush`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Matrices that had pending work
    pub matrices: usize,
    /// Pending insertions and deletions applied
    pub changes: usize,
}

impl FlushStats {
    fn add(&mut self, (matrices, changes): (usize, usize)) {
        self.matrices += matrices;
        self.changes += changes;
    }
}

/// A property graph stored as sparse matrices over one entity id range
#[derive(Debug, Clone)]
pub struct Graph {
    config: GraphConfig,

    /// Current dimension of every matrix
    dim: u64,

    allocator: IdAllocator,

    /// Indexed by entity id; `None` for free ids
    records: Vec<Option<EntityRecord>>,

    attribute_catalog: AttributeCatalog,
    attributes: AttributeMatrixSet,
    relations: RelationMatrixSet,
    labels: LabelMatrixSet,

    /// Edges per (relation, src, dst); the relation cell stays set while this
    /// list is non-empty
    edge_index: FxHashMap<(RelationId, EntityId, EntityId), Vec<EntityId>>,

    /// Edges touching each node, in creation order
    incident: FxHashMap<EntityId, Vec<EntityId>>,

    node_count: usize,
    edge_count: usize,
}

impl Graph {
    /// Create an empty graph with the default configuration
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        let dim = config.initial_capacity;
        debug!("Creating graph with dimension {}", dim);
        Graph {
            dim,
            allocator: IdAllocator::new(config.max_entities),
            records: Vec::new(),
            attribute_catalog: AttributeCatalog::new(),
            attributes: AttributeMatrixSet::new(dim),
            relations: RelationMatrixSet::new(dim),
            labels: LabelMatrixSet::new(dim),
            edge_index: FxHashMap::default(),
            incident: FxHashMap::default(),
            node_count: 0,
            edge_count: 0,
            config,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Current dimension shared by every matrix
    pub fn dimension(&self) -> u64 {
        self.dim
    }

    /// Grow every matrix so that `id` is a valid row and column.
    ///
    /// All matrix sets are resized inside the same `&mut` borrow, so nothing
    /// can observe a graph whose matrices disagree on their dimension.
    fn ensure_dimension(&mut self, id: EntityId) -> GraphResult<()> {
        if id.0 < self.dim {
            return Ok(());
        }
        let required = id.0.checked_add(1).ok_or_else(|| {
            GraphError::ResourceExhausted("matrix dimension overflow".to_string())
        })?;
        let dim = self.dim.saturating_mul(2).max(required);

        self.relations.resize(dim)?;
        self.labels.resize(dim)?;
        self.attributes.resize(dim)?;

        info!("Resized graph matrices from {} to {}", self.dim, dim);
        self.dim = dim;
        Ok(())
    }

    fn allocate(&mut self, entity_type: EntityType) -> GraphResult<EntityId> {
        let id = self.allocator.allocate()?;
        if let Err(e) = self.ensure_dimension(id) {
            self.allocator.retract(id)?;
            return Err(e);
        }
        self.place_record(id, entity_type);
        Ok(id)
    }

    /// Take `id` back out of the free range, as when restoring an entity
    fn allocate_exact(&mut self, id: EntityId, entity_type: EntityType) -> GraphResult<()> {
        self.ensure_dimension(id)?;
        self.allocator.allocate_exact(id)?;
        self.place_record(id, entity_type);
        Ok(())
    }

    fn place_record(&mut self, id: EntityId, entity_type: EntityType) {
        let slot = id.0 as usize;
        if self.records.len() <= slot {
            self.records.resize(slot + 1, None);
        }
        self.records[slot] = Some(EntityRecord {
            entity: Entity::new(id, entity_type),
            kind: RecordKind::Node,
        });
    }

    fn release(&mut self, id: EntityId, retract: bool) -> GraphResult<()> {
        if let Some(slot) = self.records.get_mut(id.0 as usize) {
            *slot = None;
        }
        if retract {
            self.allocator.retract(id)
        } else {
            self.allocator.release(id)
        }
    }

    pub(crate) fn record(&self, id: EntityId) -> GraphResult<&EntityRecord> {
        self.records
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(GraphError::InvalidEntity(id))
    }

    pub(crate) fn entity_mut(&mut self, id: EntityId) -> GraphResult<&mut Entity> {
        self.records
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .map(|record| &mut record.entity)
            .ok_or(GraphError::InvalidEntity(id))
    }

    fn require_node(&self, id: EntityId) -> GraphResult<&EntityRecord> {
        let record = self.record(id)?;
        match record.kind {
            RecordKind::Node => Ok(record),
            RecordKind::Edge { .. } => Err(GraphError::WrongEntityType {
                id,
                expected: EntityType::Node,
            }),
        }
    }

    /// Relation and endpoints of a live edge
    pub(crate) fn edge_endpoints(&self, id: EntityId) -> GraphResult<(RelationId, EntityId, EntityId)> {
        match self.record(id)?.kind {
            RecordKind::Edge { relation, src, dst } => Ok((relation, src, dst)),
            RecordKind::Node => Err(GraphError::WrongEntityType {
                id,
                expected: EntityType::Edge,
            }),
        }
    }

    /// Create a node carrying `labels`
    pub fn create_node(&mut self, labels: &[&str]) -> GraphResult<EntityId> {
        let id = self.allocate(EntityType::Node)?;
        for label in labels {
            self.labels.label(id, label)?;
        }
        self.node_count += 1;
        debug!("Created node {} with {} labels", id.0, labels.len());
        Ok(id)
    }

    /// Create an edge of type `relation` from `src` to `dst`.
    ///
    /// Parallel edges of the same type share one relation cell.
    pub fn create_edge(&mut self, src: EntityId, dst: EntityId, relation: &str) -> GraphResult<EntityId> {
        self.require_node(src)?;
        self.require_node(dst)?;

        let id = self.allocate(EntityType::Edge)?;
        let relation = self.relations.intern(relation);
        self.link_edge(id, relation, src, dst)?;
        self.edge_count += 1;
        debug!("Created edge {} ({} -> {})", id.0, src.0, dst.0);
        Ok(id)
    }

    fn link_edge(
        &mut self,
        id: EntityId,
        relation: RelationId,
        src: EntityId,
        dst: EntityId,
    ) -> GraphResult<()> {
        self.relations.connect_id(relation, src, dst)?;
        self.edge_index
            .entry((relation, src, dst))
            .or_default()
            .push(id);
        self.incident.entry(src).or_default().push(id);
        if dst != src {
            self.incident.entry(dst).or_default().push(id);
        }
        if let Some(Some(record)) = self.records.get_mut(id.0 as usize) {
            record.kind = RecordKind::Edge { relation, src, dst };
        }
        Ok(())
    }

    fn unlink_edge(
        &mut self,
        id: EntityId,
        relation: RelationId,
        src: EntityId,
        dst: EntityId,
    ) -> GraphResult<()> {
        let key = (relation, src, dst);
        let last = match self.edge_index.get_mut(&key) {
            Some(parallel) => {
                parallel.retain(|e| *e != id);
                parallel.is_empty()
            }
            None => true,
        };
        if last {
            self.edge_index.remove(&key);
            self.relations.disconnect_id(relation, src, dst)?;
        }
        for endpoint in [src, dst] {
            if let Some(edges) = self.incident.get_mut(&endpoint) {
                edges.retain(|e| *e != id);
                if edges.is_empty() {
                    self.incident.remove(&endpoint);
                }
            }
        }
        Ok(())
    }

    /// Delete an edge, its properties and its relation cell if it was the
    /// last edge of its type between its endpoints
    pub fn delete_edge(&mut self, id: EntityId) -> GraphResult<()> {
        self.remove_edge(id, false)
    }

    fn remove_edge(&mut self, id: EntityId, retract: bool) -> GraphResult<()> {
        let (relation, src, dst) = self.edge_endpoints(id)?;
        self.unlink_edge(id, relation, src, dst)?;
        self.destroy_properties(id)?;
        self.release(id, retract)?;
        self.edge_count -= 1;
        debug!("Deleted edge {}", id.0);
        Ok(())
    }

    /// Delete a node together with every edge touching it
    pub fn delete_node(&mut self, id: EntityId) -> GraphResult<()> {
        self.remove_node(id, false)
    }

    fn remove_node(&mut self, id: EntityId, retract: bool) -> GraphResult<()> {
        self.require_node(id)?;
        for edge in self.incident_edges(id) {
            self.delete_edge(edge)?;
        }
        let labels: Vec<String> = self.node_labels(id).into_iter().map(str::to_string).collect();
        for label in &labels {
            self.labels.unlabel(id, label)?;
        }
        self.destroy_properties(id)?;
        self.release(id, retract)?;
        self.node_count -= 1;
        debug!("Deleted node {}", id.0);
        Ok(())
    }

    /// Remove an entity created inside an aborted transaction and give its id
    /// back to the top of the range when possible
    pub(crate) fn discard(&mut self, id: EntityId) -> GraphResult<()> {
        match self.record(id)?.kind {
            RecordKind::Node => self.remove_node(id, true),
            RecordKind::Edge { .. } => self.remove_edge(id, true),
        }
    }

    /// Bring a node back under the id it held before
    pub(crate) fn restore_node(&mut self, id: EntityId, labels: &[String]) -> GraphResult<()> {
        self.allocate_exact(id, EntityType::Node)?;
        for label in labels {
            self.labels.label(id, label)?;
        }
        self.node_count += 1;
        Ok(())
    }

    /// Bring an edge back under the id it held before
    pub(crate) fn restore_edge(
        &mut self,
        id: EntityId,
        relation: &str,
        src: EntityId,
        dst: EntityId,
    ) -> GraphResult<()> {
        self.require_node(src)?;
        self.require_node(dst)?;
        self.allocate_exact(id, EntityType::Edge)?;
        let relation = self.relations.intern(relation);
        self.link_edge(id, relation, src, dst)?;
        self.edge_count += 1;
        Ok(())
    }

    /// Returns whether the label was newly added
    pub fn add_label(&mut self, node: EntityId, label: &str) -> GraphResult<bool> {
        self.require_node(node)?;
        self.labels.label(node, label)
    }

    /// Returns whether the node carried the label
    pub fn remove_label(&mut self, node: EntityId, label: &str) -> GraphResult<bool> {
        self.require_node(node)?;
        self.labels.unlabel(node, label)
    }

    pub fn node(&self, id: EntityId) -> GraphResult<Node<'_>> {
        let record = self.require_node(id)?;
        Ok(Node::new(self, &record.entity))
    }

    pub fn edge(&self, id: EntityId) -> GraphResult<Edge<'_>> {
        let record = self.record(id)?;
        match record.kind {
            RecordKind::Edge { relation, src, dst } => {
                Ok(Edge::new(self, &record.entity, relation, src, dst))
            }
            RecordKind::Node => Err(GraphError::WrongEntityType {
                id,
                expected: EntityType::Edge,
            }),
        }
    }

    pub fn entity(&self, id: EntityId) -> GraphResult<&Entity> {
        self.record(id).map(|record| &record.entity)
    }

    pub fn is_live(&self, id: EntityId) -> bool {
        self.allocator.is_live(id)
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Every live node in id order
    pub fn nodes(&self) -> impl Iterator<Item = Node<'_>> + '_ {
        self.records.iter().flatten().filter_map(move |record| match record.kind {
            RecordKind::Node => Some(Node::new(self, &record.entity)),
            RecordKind::Edge { .. } => None,
        })
    }

    /// Every live edge in id order
    pub fn edges(&self) -> impl Iterator<Item = Edge<'_>> + '_ {
        self.records.iter().flatten().filter_map(move |record| match record.kind {
            RecordKind::Edge { relation, src, dst } => {
                Some(Edge::new(self, &record.entity, relation, src, dst))
            }
            RecordKind::Node => None,
        })
    }

    /// Edges touching `node`, in creation order
    pub fn incident_edges(&self, node: EntityId) -> Vec<EntityId> {
        self.incident.get(&node).cloned().unwrap_or_default()
    }

    /// Edges of type `relation` from `src` to `dst`
    pub fn edges_between(&self, src: EntityId, dst: EntityId, relation: &str) -> Vec<EntityId> {
        self.relations
            .relation_id(relation)
            .and_then(|id| self.edge_index.get(&(id, src, dst)))
            .cloned()
            .unwrap_or_default()
    }

    /// Attribute id for `name`, or [`AttributeId::NOT_FOUND`]
    pub fn attribute_id(&self, name: &str) -> AttributeId {
        self.attribute_catalog
            .lookup(name)
            .unwrap_or(AttributeId::NOT_FOUND)
    }

    pub fn attribute_name(&self, id: AttributeId) -> GraphResult<&str> {
        self.attribute_catalog.name_of(id)
    }

    /// Look up `name`, assigning it an id and an empty attribute matrix on
    /// first use
    pub fn intern_attribute(&mut self, name: &str) -> GraphResult<AttributeId> {
        let (id, created) = self.attribute_catalog.lookup_or_create(name)?;
        if created {
            self.attributes.ensure(id);
            debug!("Registered attribute '{}' as {}", name, id.0);
        }
        Ok(id)
    }

    pub fn attribute_catalog(&self) -> &AttributeCatalog {
        &self.attribute_catalog
    }

    pub fn attributes(&self) -> &AttributeMatrixSet {
        &self.attributes
    }

    pub(crate) fn attributes_mut(&mut self) -> &mut AttributeMatrixSet {
        &mut self.attributes
    }

    pub fn relations(&self) -> &RelationMatrixSet {
        &self.relations
    }

    pub fn labels(&self) -> &LabelMatrixSet {
        &self.labels
    }

    /// Register a relationship type without creating an edge
    pub fn intern_relation(&mut self, relation: &str) -> RelationId {
        self.relations.intern(relation)
    }

    /// Register a label without attaching it to a node
    pub fn intern_label(&mut self, label: &str) {
        self.labels.intern(label);
    }

    pub fn relation_matrix(&self, relation: &str) -> Option<&SparseMatrix<bool>> {
        self.relations.matrix(relation)
    }

    pub fn label_matrix(&self, label: &str) -> Option<&SparseMatrix<bool>> {
        self.labels.matrix(label)
    }

    /// Union of every relation matrix
    pub fn adjacency_matrix(&self) -> &SparseMatrix<bool> {
        self.relations.adjacency()
    }

    /// Union of every label matrix
    pub fn node_label_matrix(&self) -> &SparseMatrix<bool> {
        self.labels.all_labels()
    }

    /// Label names of `node` in label id order
    pub fn node_labels(&self, node: EntityId) -> Vec<&str> {
        self.labels
            .labels_of(node)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| self.labels.label_name(id))
            .collect()
    }

    /// Apply every pending insertion and deletion
    pub fn flush(&mut self) -> FlushStats {
        let threshold = self.config.parallel_flush_threshold;
        let mut stats = FlushStats::default();
        stats.add(self.relations.flush(threshold));
        stats.add(self.labels.flush(threshold));
        stats.add(self.attributes.flush(threshold));
        if stats.matrices > 0 {
            debug!(
                "Flushed {} matrices ({} pending changes)",
                stats.matrices, stats.changes
            );
        }
        stats
    }

    pub fn sync_state(&self) -> SyncState {
        let dirty = [
            self.relations.state(),
            self.labels.state(),
            self.attributes.state(),
        ];
        if dirty.contains(&SyncState::PendingDeletions) {
            SyncState::PendingDeletions
        } else {
            SyncState::Clean
        }
    }

    /// Whether any matrix still has pending insertions or deletions
    pub fn has_pending(&self) -> bool {
        self.relations.has_pending() || self.labels.has_pending() || self.attributes.has_pending()
    }

    /// Boolean product of the named relation matrices: cell `(i, j)` is set
    /// when `j` is reachable from `i` by following one edge of each type in
    /// order. Flushes first since the product needs compressed operands.
    pub fn traverse(&mut self, relations: &[&str]) -> GraphResult<SparseMatrix<bool>> {
        self.require_relations(relations)?;
        self.flush();
        self.traverse_flushed(relations)
    }

    /// Same product as [`Graph::traverse`] for readers holding `&Graph`.
    /// Fails with [`MatrixError::PendingChanges`] while an operand has
    /// pending work.
    pub fn traverse_flushed(&self, relations: &[&str]) -> GraphResult<SparseMatrix<bool>> {
        let (first, rest) = relations
            .split_first()
            .ok_or_else(|| GraphError::NotFound("empty traversal".to_string()))?;
        let first = self.relation_operand(first)?;
        first.require_flushed()?;
        let mut product = first.clone();
        for relation in rest {
            let next = self.relation_operand(relation)?;
            product = mxm(&product, next, self.config.parallel_multiply_rows)?;
        }
        Ok(product)
    }

    fn relation_operand(&self, relation: &str) -> GraphResult<&SparseMatrix<bool>> {
        self.relations
            .matrix(relation)
            .ok_or_else(|| GraphError::NotFound(format!("relationship type '{}'", relation)))
    }

    fn require_relations(&self, relations: &[&str]) -> GraphResult<()> {
        if relations.is_empty() {
            return Err(GraphError::NotFound("empty traversal".to_string()));
        }
        for relation in relations {
            if self.relations.relation_id(relation).is_none() {
                return Err(GraphError::NotFound(format!("relationship type '{}'", relation)));
            }
        }
        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
