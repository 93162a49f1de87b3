//! Property operations shared by nodes and edges
//!
//! Every property lives in an attribute matrix cell on the diagonal at the
//! entity's id. The entity's `prop_count` must always equal the number of
//! attribute matrices holding such a cell; only the functions here touch it.

use super::entity::EntityFormat;
use super::property::{PropertyValue, PROPERTY_NOTFOUND};
use super::store::{Graph, GraphError, GraphResult, RecordKind};
use super::types::{AttributeId, EntityId};
use crate::matrix::MatrixError;
use std::fmt::{self, Write};

/// Net effect of [`Graph::set_property`] on an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyChange {
    /// Null written to an absent attribute
    Unchanged,
    /// `prop_count` grew by one
    Added,
    /// Null written to a present attribute; `prop_count` shrank by one
    Removed,
    /// Value overwritten in place
    Replaced,
}

impl Graph {
    fn require_attribute(&self, attribute: AttributeId) -> GraphResult<()> {
        if attribute.is_not_found() || !self.attribute_catalog().contains(attribute) {
            return Err(GraphError::NotFound(format!("attribute {}", attribute)));
        }
        Ok(())
    }

    /// Attach a property the entity does not carry yet.
    ///
    /// The value is cloned into the matrix. Adding `Null` stores nothing.
    pub fn add_property(
        &mut self,
        id: EntityId,
        attribute: AttributeId,
        value: &PropertyValue,
    ) -> GraphResult<()> {
        self.require_attribute(attribute)?;
        self.entity(id)?;
        if value.is_null() {
            return Ok(());
        }
        if self.attributes().get(attribute, id)?.is_some() {
            return Err(GraphError::PropertyAlreadySet {
                entity: id,
                attribute,
            });
        }
        self.attributes_mut().set(attribute, id, value.clone())?;
        self.entity_mut(id)?.prop_count += 1;
        Ok(())
    }

    /// Borrow a property value, or [`PROPERTY_NOTFOUND`] when it is not set
    pub fn get_property(&self, id: EntityId, attribute: AttributeId) -> GraphResult<&PropertyValue> {
        let entity = self.entity(id)?;
        if attribute.is_not_found() || entity.prop_count == 0 {
            return Ok(&PROPERTY_NOTFOUND);
        }
        Ok(self
            .attributes()
            .get(attribute, id)?
            .unwrap_or(&PROPERTY_NOTFOUND))
    }

    /// All properties of an entity in ascending attribute id.
    ///
    /// Probes attribute matrices from id 0 upward and stops once
    /// `prop_count` values were found.
    pub fn get_properties(&self, id: EntityId) -> GraphResult<Vec<(AttributeId, &PropertyValue)>> {
        let wanted = self.entity(id)?.prop_count;
        let mut found = Vec::with_capacity(wanted);
        let mut attribute = 0usize;
        while found.len() < wanted {
            if attribute >= self.attributes().len() {
                return Err(MatrixError::Inconsistent(format!(
                    "entity {} counts {} properties but only {} are stored",
                    id.0,
                    wanted,
                    found.len()
                ))
                .into());
            }
            let attr = AttributeId(attribute as u16);
            if let Some(value) = self.attributes().get(attr, id)? {
                found.push((attr, value));
            }
            attribute += 1;
        }
        Ok(found)
    }

    /// Like [`Graph::get_properties`] with attribute names resolved
    pub fn get_properties_named(&self, id: EntityId) -> GraphResult<Vec<(&str, &PropertyValue)>> {
        self.get_properties(id)?
            .into_iter()
            .map(|(attr, value)| Ok((self.attribute_name(attr)?, value)))
            .collect()
    }

    /// Write a property. `Null` removes it.
    pub fn set_property(
        &mut self,
        id: EntityId,
        attribute: AttributeId,
        value: &PropertyValue,
    ) -> GraphResult<PropertyChange> {
        self.require_attribute(attribute)?;
        self.entity(id)?;
        let present = self.attributes().get(attribute, id)?.is_some();

        match (present, value.is_null()) {
            (false, true) => Ok(PropertyChange::Unchanged),
            (false, false) => {
                self.add_property(id, attribute, value)?;
                Ok(PropertyChange::Added)
            }
            (true, true) => {
                self.remove_property(id, attribute)?;
                Ok(PropertyChange::Removed)
            }
            (true, false) => {
                self.attributes_mut().set(attribute, id, value.clone())?;
                Ok(PropertyChange::Replaced)
            }
        }
    }

    /// [`Graph::set_property`] keyed by attribute name, registering the name
    /// if needed
    pub fn set_property_by_name(
        &mut self,
        id: EntityId,
        name: &str,
        value: &PropertyValue,
    ) -> GraphResult<PropertyChange> {
        self.entity(id)?;
        let attribute = self.intern_attribute(name)?;
        self.set_property(id, attribute, value)
    }

    /// Queue removal of one property. Removing an unset attribute is a no-op.
    pub(crate) fn remove_property(&mut self, id: EntityId, attribute: AttributeId) -> GraphResult<bool> {
        if self.entity(id)?.prop_count == 0 || attribute.is_not_found() {
            return Ok(false);
        }
        if !self.attributes_mut().delete(attribute, id)? {
            return Ok(false);
        }
        self.entity_mut(id)?.prop_count -= 1;
        Ok(true)
    }

    /// Remove every property cell of an entity
    pub(crate) fn destroy_properties(&mut self, id: EntityId) -> GraphResult<()> {
        let mut attribute = 0usize;
        while self.entity(id)?.prop_count > 0 {
            if attribute >= self.attributes().len() {
                return Err(MatrixError::Inconsistent(format!(
                    "entity {} still counts {} properties after every attribute was cleared",
                    id.0,
                    self.entity(id)?.prop_count
                ))
                .into());
            }
            self.remove_property(id, AttributeId(attribute as u16))?;
            attribute += 1;
        }
        Ok(())
    }

    /// Render an entity as `(id:Label{key:value, ...})` for nodes or
    /// `[id:TYPE{key:value, ...}]` for edges
    pub fn entity_to_string(&self, id: EntityId, format: EntityFormat) -> GraphResult<String> {
        self.record(id)?;
        let properties = if format.contains(EntityFormat::PROPERTIES) {
            self.get_properties_named(id)?
        } else {
            Vec::new()
        };
        let display = EntityDisplay {
            graph: self,
            id,
            format,
            properties,
        };
        let mut out = String::new();
        write!(out, "{}", display)
            .map_err(|_| GraphError::InvalidEntity(id))?;
        Ok(out)
    }
}

struct EntityDisplay<'g> {
    graph: &'g Graph,
    id: EntityId,
    format: EntityFormat,
    properties: Vec<(&'g str, &'g PropertyValue)>,
}

impl fmt::Display for EntityDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.graph.record(self.id).map_err(|_| fmt::Error)?.kind;
        let (open, close) = match kind {
            RecordKind::Node => ("(", ")"),
            RecordKind::Edge { .. } => ("[", "]"),
        };
        f.write_str(open)?;

        if self.format.contains(EntityFormat::ID) {
            write!(f, "{}", self.id.0)?;
        }

        if self.format.contains(EntityFormat::LABELS_OR_RELATIONS) {
            match kind {
                RecordKind::Node => {
                    for label in self.graph.node_labels(self.id) {
                        write!(f, ":{}", label)?;
                    }
                }
                RecordKind::Edge { relation, .. } => {
                    if let Some(name) = self.graph.relations().relation_name(relation) {
                        write!(f, ":{}", name)?;
                    }
                }
            }
        }

        if self.format.contains(EntityFormat::PROPERTIES) {
            f.write_str("{")?;
            for (i, (name, value)) in self.properties.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}:{}", name, value)?;
            }
            f.write_str("}")?;
        }

        f.write_str(close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::matrix::SyncState;

    fn graph_with_node() -> (Graph, EntityId) {
        let mut graph = Graph::with_config(GraphConfig::with_capacity(8));
        let id = graph.create_node(&["Person"]).unwrap();
        (graph, id)
    }

    #[test]
    fn test_add_and_get_property() {
        let (mut graph, id) = graph_with_node();
        let name = graph.intern_attribute("name").unwrap();
        graph.add_property(id, name, &"Alice".into()).unwrap();

        assert_eq!(graph.get_property(id, name).unwrap(), &PropertyValue::from("Alice"));
        assert_eq!(graph.entity(id).unwrap().prop_count(), 1);
        assert_eq!(
            graph.get_properties_named(id).unwrap(),
            vec![("name", &PropertyValue::from("Alice"))]
        );
    }

    #[test]
    fn test_duplicate_add_rejected() {
        let (mut graph, id) = graph_with_node();
        let name = graph.intern_attribute("name").unwrap();
        graph.add_property(id, name, &"Alice".into()).unwrap();

        assert_eq!(
            graph.add_property(id, name, &"Bob".into()),
            Err(GraphError::PropertyAlreadySet {
                entity: id,
                attribute: name
            })
        );
        assert_eq!(graph.entity(id).unwrap().prop_count(), 1);
        assert_eq!(graph.get_property(id, name).unwrap(), &PropertyValue::from("Alice"));
    }

    #[test]
    fn test_missing_property_is_sentinel() {
        let (mut graph, id) = graph_with_node();
        let age = graph.intern_attribute("age").unwrap();
        assert!(graph.get_property(id, age).unwrap().is_null());
        assert!(graph.get_property(id, AttributeId::NOT_FOUND).unwrap().is_null());
        assert!(graph.get_property(id, graph.attribute_id("nope")).unwrap().is_null());
        assert_eq!(
            graph.get_property(EntityId(7), age),
            Err(GraphError::InvalidEntity(EntityId(7)))
        );
    }

    #[test]
    fn test_set_property_transitions() {
        let (mut graph, id) = graph_with_node();
        let age = graph.intern_attribute("age").unwrap();

        assert_eq!(
            graph.set_property(id, age, &PropertyValue::Null).unwrap(),
            PropertyChange::Unchanged
        );
        assert_eq!(
            graph.set_property(id, age, &30i64.into()).unwrap(),
            PropertyChange::Added
        );
        assert_eq!(
            graph.set_property(id, age, &31i64.into()).unwrap(),
            PropertyChange::Replaced
        );
        assert_eq!(graph.entity(id).unwrap().prop_count(), 1);
        assert_eq!(graph.get_property(id, age).unwrap().as_integer(), Some(31));

        assert_eq!(
            graph.set_property(id, age, &PropertyValue::Null).unwrap(),
            PropertyChange::Removed
        );
        assert_eq!(graph.entity(id).unwrap().prop_count(), 0);
        assert!(graph.get_property(id, age).unwrap().is_null());
        assert_eq!(graph.attributes().state(), SyncState::Clean);
    }

    #[test]
    fn test_removal_hidden_before_flush() {
        let (mut graph, id) = graph_with_node();
        let age = graph.intern_attribute("age").unwrap();
        graph.set_property(id, age, &30i64.into()).unwrap();
        graph.flush();

        graph.set_property(id, age, &PropertyValue::Null).unwrap();
        assert!(graph.get_property(id, age).unwrap().is_null());
        assert!(graph.attributes().matrix(age).unwrap().is_stored(id.0, id.0));

        graph.flush();
        assert!(!graph.attributes().matrix(age).unwrap().is_stored(id.0, id.0));
    }

    #[test]
    fn test_properties_in_attribute_order() {
        let (mut graph, id) = graph_with_node();
        graph.intern_attribute("unused").unwrap();
        graph.set_property_by_name(id, "b", &2i64.into()).unwrap();
        graph.set_property_by_name(id, "a", &1i64.into()).unwrap();

        let names: Vec<&str> = graph
            .get_properties_named(id)
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_destroy_clears_every_cell() {
        let (mut graph, id) = graph_with_node();
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            graph.set_property_by_name(id, name, &(i as i64).into()).unwrap();
        }
        graph.destroy_properties(id).unwrap();
        assert_eq!(graph.entity(id).unwrap().prop_count(), 0);
        assert_eq!(graph.attributes().present_count(id).unwrap(), 0);
    }

    #[test]
    fn test_entity_to_string() {
        let (mut graph, alice) = graph_with_node();
        graph.set_property_by_name(alice, "name", &"Alice".into()).unwrap();
        graph.set_property_by_name(alice, "age", &30i64.into()).unwrap();
        let bob = graph.create_node(&[]).unwrap();
        let edge = graph.create_edge(alice, bob, "KNOWS").unwrap();
        graph.set_property_by_name(edge, "since", &2020i64.into()).unwrap();

        let all = EntityFormat::all();
        assert_eq!(
            graph.entity_to_string(alice, all).unwrap(),
            "(0:Person{name:\"Alice\", age:30})"
        );
        assert_eq!(
            graph.entity_to_string(edge, all).unwrap(),
            format!("[{}:KNOWS{{since:2020}}]", edge.0)
        );
        assert_eq!(graph.entity_to_string(bob, EntityFormat::ID).unwrap(), "(1)");
        assert_eq!(
            graph
                .entity_to_string(alice, EntityFormat::LABELS_OR_RELATIONS)
                .unwrap(),
            "(:Person)"
        );
    }
}
