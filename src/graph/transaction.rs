//! Write transactions
//!
//! A [`WriteTransaction`] holds the graph exclusively and records an undo
//! entry for every mutation it performs. Committing flushes every matrix;
//! aborting (explicitly or by dropping an uncommitted transaction) replays
//! the undo log backwards so the graph looks as if the transaction never ran.

use super::facade::PropertyChange;
use super::property::PropertyValue;
use super::store::{FlushStats, Graph, GraphResult, RecordKind};
use super::types::{AttributeId, EntityId};
use tracing::{debug, info, warn};

/// The state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Active,
    Committed,
    RolledBack,
}

/// Result of a successful commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    /// Mutations recorded by the transaction
    pub operations: usize,
    pub flushed: FlushStats,
}

/// Everything needed to bring a deleted entity back under its old id
#[derive(Debug, Clone)]
struct EntityImage {
    id: EntityId,
    kind: ImageKind,
    properties: Vec<(AttributeId, PropertyValue)>,
}

#[derive(Debug, Clone)]
enum ImageKind {
    Node {
        labels: Vec<String>,
    },
    Edge {
        relation: String,
        src: EntityId,
        dst: EntityId,
    },
}

#[derive(Debug, Clone)]
enum UndoEntry {
    Created(EntityId),
    Deleted(EntityImage),
    /// `previous` is `Null` when the attribute was not set
    Property {
        id: EntityId,
        attribute: AttributeId,
        previous: PropertyValue,
    },
    Labeled {
        node: EntityId,
        label: String,
    },
    Unlabeled {
        node: EntityId,
        label: String,
    },
}

/// Exclusive, reversible write access to a [`Graph`]
#[derive(Debug)]
pub struct WriteTransaction<'g> {
    graph: &'g mut Graph,
    undo: Vec<UndoEntry>,
    state: TxState,
}

impl<'g> WriteTransaction<'g> {
    pub fn begin(graph: &'g mut Graph) -> Self {
        debug!("Write transaction started");
        WriteTransaction {
            graph,
            undo: Vec::new(),
            state: TxState::Active,
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// Read access to the graph, including this transaction's changes
    pub fn graph(&self) -> &Graph {
        self.graph
    }

    /// Number of recorded mutations
    pub fn operations(&self) -> usize {
        self.undo.len()
    }

    pub fn create_node(&mut self, labels: &[&str]) -> GraphResult<EntityId> {
        let id = self.graph.create_node(labels)?;
        self.undo.push(UndoEntry::Created(id));
        Ok(id)
    }

    pub fn create_edge(&mut self, src: EntityId, dst: EntityId, relation: &str) -> GraphResult<EntityId> {
        let id = self.graph.create_edge(src, dst, relation)?;
        self.undo.push(UndoEntry::Created(id));
        Ok(id)
    }

    pub fn delete_edge(&mut self, id: EntityId) -> GraphResult<()> {
        let image = self.capture(id)?;
        self.graph.delete_edge(id)?;
        self.undo.push(UndoEntry::Deleted(image));
        Ok(())
    }

    /// Delete a node; its incident edges are deleted first, each recorded on
    /// its own so a rollback restores them after the node
    pub fn delete_node(&mut self, id: EntityId) -> GraphResult<()> {
        self.graph.node(id)?;
        for edge in self.graph.incident_edges(id) {
            self.delete_edge(edge)?;
        }
        let image = self.capture(id)?;
        self.graph.delete_node(id)?;
        self.undo.push(UndoEntry::Deleted(image));
        Ok(())
    }

    pub fn add_label(&mut self, node: EntityId, label: &str) -> GraphResult<bool> {
        let added = self.graph.add_label(node, label)?;
        if added {
            self.undo.push(UndoEntry::Labeled {
                node,
                label: label.to_string(),
            });
        }
        Ok(added)
    }

    pub fn remove_label(&mut self, node: EntityId, label: &str) -> GraphResult<bool> {
        let removed = self.graph.remove_label(node, label)?;
        if removed {
            self.undo.push(UndoEntry::Unlabeled {
                node,
                label: label.to_string(),
            });
        }
        Ok(removed)
    }

    pub fn intern_attribute(&mut self, name: &str) -> GraphResult<AttributeId> {
        self.graph.intern_attribute(name)
    }

    pub fn add_property(
        &mut self,
        id: EntityId,
        attribute: AttributeId,
        value: &PropertyValue,
    ) -> GraphResult<()> {
        self.graph.add_property(id, attribute, value)?;
        if !value.is_null() {
            self.undo.push(UndoEntry::Property {
                id,
                attribute,
                previous: PropertyValue::Null,
            });
        }
        Ok(())
    }

    pub fn set_property(
        &mut self,
        id: EntityId,
        attribute: AttributeId,
        value: &PropertyValue,
    ) -> GraphResult<PropertyChange> {
        let previous = self.graph.get_property(id, attribute)?.clone();
        let change = self.graph.set_property(id, attribute, value)?;
        if change != PropertyChange::Unchanged {
            self.undo.push(UndoEntry::Property {
                id,
                attribute,
                previous,
            });
        }
        Ok(change)
    }

    pub fn set_property_by_name(
        &mut self,
        id: EntityId,
        name: &str,
        value: &PropertyValue,
    ) -> GraphResult<PropertyChange> {
        self.graph.entity(id)?;
        let attribute = self.graph.intern_attribute(name)?;
        self.set_property(id, attribute, value)
    }

    fn capture(&self, id: EntityId) -> GraphResult<EntityImage> {
        let kind = match self.graph.record(id)?.kind {
            RecordKind::Node => ImageKind::Node {
                labels: self
                    .graph
                    .node_labels(id)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            },
            RecordKind::Edge { relation, src, dst } => ImageKind::Edge {
                relation: self
                    .graph
                    .relations()
                    .relation_name(relation)
                    .unwrap_or_default()
                    .to_string(),
                src,
                dst,
            },
        };
        let properties = self
            .graph
            .get_properties(id)?
            .into_iter()
            .map(|(attribute, value)| (attribute, value.clone()))
            .collect();
        Ok(EntityImage {
            id,
            kind,
            properties,
        })
    }

    /// Flush every matrix and make the changes permanent
    pub fn commit(mut self) -> GraphResult<CommitStats> {
        let flushed = self.graph.flush();
        let stats = CommitStats {
            operations: self.undo.len(),
            flushed,
        };
        self.undo.clear();
        self.state = TxState::Committed;
        info!(
            "Committed transaction: {} operations, {} matrices flushed",
            stats.operations, stats.flushed.matrices
        );
        Ok(stats)
    }

    /// Undo every change made by this transaction
    pub fn abort(mut self) -> GraphResult<()> {
        self.rollback()
    }

    fn rollback(&mut self) -> GraphResult<()> {
        let operations = self.undo.len();
        self.state = TxState::RolledBack;
        while let Some(entry) = self.undo.pop() {
            self.revert(entry)?;
        }
        self.graph.flush();
        info!("Rolled back transaction: {} operations undone", operations);
        Ok(())
    }

    fn revert(&mut self, entry: UndoEntry) -> GraphResult<()> {
        match entry {
            UndoEntry::Created(id) => self.graph.discard(id),
            UndoEntry::Deleted(image) => {
                match image.kind {
                    ImageKind::Node { labels } => self.graph.restore_node(image.id, &labels)?,
                    ImageKind::Edge { relation, src, dst } => {
                        self.graph.restore_edge(image.id, &relation, src, dst)?
                    }
                }
                for (attribute, value) in &image.properties {
                    self.graph.add_property(image.id, *attribute, value)?;
                }
                Ok(())
            }
            UndoEntry::Property {
                id,
                attribute,
                previous,
            } => self.graph.set_property(id, attribute, &previous).map(|_| ()),
            UndoEntry::Labeled { node, label } => self.graph.remove_label(node, &label).map(|_| ()),
            UndoEntry::Unlabeled { node, label } => self.graph.add_label(node, &label).map(|_| ()),
        }
    }
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        if self.state == TxState::Active {
            if let Err(e) = self.rollback() {
                warn!("Rollback of dropped transaction failed: {}", e);
            }
        }
    }
}
