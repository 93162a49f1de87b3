//! Entity identity and lifecycle
//!
//! Nodes and edges share one identity substrate: an id drawn from a single
//! dense range, a type tag, and a property count. Everything else an entity
//! "has" lives in matrix cells indexed by its id.

use super::property::PropertyValue;
use super::store::{Graph, GraphError, GraphResult};
use super::types::{AttributeId, EntityId, EntityType, RelationId};
use bitflags::bitflags;
use std::collections::BTreeSet;
use std::fmt;

/// Identity shared by nodes and edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entity {
    pub(crate) id: EntityId,
    pub(crate) entity_type: EntityType,
    /// Number of attribute matrices holding a diagonal cell for `id`.
    /// Only the property façade changes it.
    pub(crate) prop_count: usize,
}

impl Entity {
    pub(crate) fn new(id: EntityId, entity_type: EntityType) -> Self {
        Entity {
            id,
            entity_type,
            prop_count: 0,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn prop_count(&self) -> usize {
        self.prop_count
    }
}

/// Allocator for the dense entity id range.
///
/// Reclaimed ids are handed out smallest first before the range grows.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next: u64,
    free: BTreeSet<u64>,
    max: Option<u64>,
}

impl IdAllocator {
    pub fn new(max: Option<u64>) -> Self {
        IdAllocator {
            next: 0,
            free: BTreeSet::new(),
            max,
        }
    }

    pub fn allocate(&mut self) -> GraphResult<EntityId> {
        if let Some(id) = self.free.pop_first() {
            return Ok(EntityId(id));
        }
        if let Some(max) = self.max {
            if self.next >= max {
                return Err(GraphError::ResourceExhausted(format!(
                    "entity id range capped at {}",
                    max
                )));
            }
        }
        let id = self.next;
        self.next = self.next.checked_add(1).ok_or_else(|| {
            GraphError::ResourceExhausted("entity id range overflow".to_string())
        })?;
        Ok(EntityId(id))
    }

    pub fn is_live(&self, id: EntityId) -> bool {
        id.0 < self.next && !self.free.contains(&id.0)
    }

    /// Mark `id` reclaimable
    pub fn release(&mut self, id: EntityId) -> GraphResult<()> {
        if !self.is_live(id) {
            return Err(GraphError::InvalidEntity(id));
        }
        self.free.insert(id.0);
        Ok(())
    }

    /// Take a specific id out of the free range; used when restoring an
    /// entity under the id it held before
    pub(crate) fn allocate_exact(&mut self, id: EntityId) -> GraphResult<()> {
        if self.is_live(id) {
            return Err(GraphError::InvalidEntity(id));
        }
        if let Some(max) = self.max {
            if id.0 >= max {
                return Err(GraphError::ResourceExhausted(format!(
                    "entity id {} outside range capped at {}",
                    id.0, max
                )));
            }
        }
        if id.0 >= self.next {
            self.free.extend(self.next..id.0);
            self.next = id.0 + 1;
        } else {
            self.free.remove(&id.0);
        }
        Ok(())
    }

    /// Undo an allocation: release `id` and pull the high-water mark back
    /// over any trailing free ids
    pub(crate) fn retract(&mut self, id: EntityId) -> GraphResult<()> {
        self.release(id)?;
        while self.next > 0 && self.free.remove(&(self.next - 1)) {
            self.next -= 1;
        }
        Ok(())
    }

    /// One past the highest id ever handed out
    pub fn high_water(&self) -> u64 {
        self.next
    }

    pub fn live_count(&self) -> usize {
        self.next as usize - self.free.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}

bitflags! {
    /// Parts of an entity rendered by [`Graph::entity_to_string`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntityFormat: u8 {
        const ID = 1;
        const LABELS_OR_RELATIONS = 1 << 1;
        const PROPERTIES = 1 << 2;
    }
}

/// Operations available on nodes and edges alike
pub trait GraphEntity {
    fn entity(&self) -> &Entity;

    fn id(&self) -> EntityId {
        self.entity().id
    }

    fn entity_type(&self) -> EntityType {
        self.entity().entity_type
    }

    fn prop_count(&self) -> usize {
        self.entity().prop_count
    }
}

/// Read view of a live node
#[derive(Clone, Copy)]
pub struct Node<'g> {
    graph: &'g Graph,
    entity: &'g Entity,
}

impl<'g> Node<'g> {
    pub(crate) fn new(graph: &'g Graph, entity: &'g Entity) -> Self {
        Node { graph, entity }
    }

    /// Labels carried by the node, in label id order
    pub fn labels(&self) -> Vec<&'g str> {
        self.graph.node_labels(self.entity.id)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.graph.labels().has_label(self.entity.id, label)
    }

    pub fn property(&self, name: &str) -> &'g PropertyValue {
        self.graph
            .get_property(self.entity.id, self.graph.attribute_id(name))
            .unwrap_or(&super::property::PROPERTY_NOTFOUND)
    }

    pub fn properties(&self) -> GraphResult<Vec<(&'g str, &'g PropertyValue)>> {
        self.graph.get_properties_named(self.entity.id)
    }

    pub fn render(&self, format: EntityFormat) -> GraphResult<String> {
        self.graph.entity_to_string(self.entity.id, format)
    }
}

impl GraphEntity for Node<'_> {
    fn entity(&self) -> &Entity {
        self.entity
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.entity.id)
            .field("prop_count", &self.entity.prop_count)
            .finish()
    }
}

/// Read view of a live edge
#[derive(Clone, Copy)]
pub struct Edge<'g> {
    graph: &'g Graph,
    entity: &'g Entity,
    relation: RelationId,
    src: EntityId,
    dst: EntityId,
}

impl<'g> Edge<'g> {
    pub(crate) fn new(
        graph: &'g Graph,
        entity: &'g Entity,
        relation: RelationId,
        src: EntityId,
        dst: EntityId,
    ) -> Self {
        Edge {
            graph,
            entity,
            relation,
            src,
            dst,
        }
    }

    pub fn relation_id(&self) -> RelationId {
        self.relation
    }

    pub fn relation(&self) -> &'g str {
        self.graph
            .relations()
            .relation_name(self.relation)
            .unwrap_or_default()
    }

    pub fn src(&self) -> EntityId {
        self.src
    }

    pub fn dst(&self) -> EntityId {
        self.dst
    }

    pub fn property(&self, name: &str) -> &'g PropertyValue {
        self.graph
            .get_property(self.entity.id, self.graph.attribute_id(name))
            .unwrap_or(&super::property::PROPERTY_NOTFOUND)
    }

    pub fn property_by_id(&self, attribute: AttributeId) -> &'g PropertyValue {
        self.graph
            .get_property(self.entity.id, attribute)
            .unwrap_or(&super::property::PROPERTY_NOTFOUND)
    }

    pub fn properties(&self) -> GraphResult<Vec<(&'g str, &'g PropertyValue)>> {
        self.graph.get_properties_named(self.entity.id)
    }

    pub fn render(&self, format: EntityFormat) -> GraphResult<String> {
        self.graph.entity_to_string(self.entity.id, format)
    }
}

impl GraphEntity for Edge<'_> {
    fn entity(&self) -> &Entity {
        self.entity
    }
}

impl fmt::Debug for Edge<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge")
            .field("id", &self.entity.id)
            .field("relation", &self.relation)
            .field("src", &self.src)
            .field("dst", &self.dst)
            .field("prop_count", &self.entity.prop_count)
            .finish()
    }
}
