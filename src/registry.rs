//! Named graph registry
//!
//! Graphs are looked up by name and checked out as [`GraphHandle`] leases.
//! A lease is the only way to reach a registered graph; cloning a handle
//! checks out another reference and dropping it checks the reference back
//! in. Deleting a graph removes the name right away, while the graph itself
//! lives until its last lease is dropped.

use crate::config::{ConfigError, GraphConfig};
use crate::graph::{Graph, GraphError, GraphResult, WriteTransaction};
use crate::persistence::{GraphSnapshot, SnapshotError};
use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Graph not found: {0}")]
    NotFound(String),

    #[error("Invalid graph name: {0:?}")]
    InvalidName(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// A registered graph and its write lock
#[derive(Debug)]
struct GraphSlot {
    name: String,
    graph: RwLock<Graph>,
}

impl Drop for GraphSlot {
    fn drop(&mut self) {
        info!("Released graph '{}'", self.name);
    }
}

/// Lease on a registered graph
#[derive(Debug, Clone)]
pub struct GraphHandle {
    slot: Arc<GraphSlot>,
}

impl GraphHandle {
    pub fn name(&self) -> &str {
        &self.slot.name
    }

    /// Shared read access. Blocks while a write is in progress.
    pub fn read(&self) -> RwLockReadGuard<'_, Graph> {
        self.slot.graph.read()
    }

    /// Run `f` inside a write transaction holding the graph exclusively.
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back when it
    /// returns `Err`.
    pub fn write<T, F>(&self, f: F) -> RegistryResult<T>
    where
        F: FnOnce(&mut WriteTransaction<'_>) -> GraphResult<T>,
    {
        let mut graph = self.slot.graph.write();
        let mut txn = WriteTransaction::begin(&mut graph);
        match f(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = txn.abort() {
                    warn!("Rollback on graph '{}' failed: {}", self.slot.name, rollback);
                }
                Err(e.into())
            }
        }
    }

    /// Snapshot the graph for persistence
    pub fn snapshot(&self) -> RegistryResult<GraphSnapshot> {
        Ok(self.read().snapshot()?)
    }

    /// Live leases on this graph, the registry's own entry included
    pub fn lease_count(&self) -> usize {
        Arc::strong_count(&self.slot)
    }
}

/// Graphs by name
#[derive(Debug)]
pub struct GraphRegistry {
    config: GraphConfig,
    graphs: RwLock<HashMap<String, Arc<GraphSlot>>>,
}

impl GraphRegistry {
    /// Create a registry whose graphs use `config`
    pub fn new(config: GraphConfig) -> RegistryResult<Self> {
        config.validate()?;
        Ok(GraphRegistry {
            config,
            graphs: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Check out `name`, creating an empty graph if it does not exist
    pub fn retrieve(&self, name: &str) -> RegistryResult<GraphHandle> {
        if name.is_empty() {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if let Some(slot) = self.graphs.read().get(name) {
            return Ok(GraphHandle { slot: Arc::clone(slot) });
        }

        let mut graphs = self.graphs.write();
        let slot = graphs.entry(name.to_string()).or_insert_with(|| {
            info!("Created graph '{}'", name);
            Arc::new(GraphSlot {
                name: name.to_string(),
                graph: RwLock::new(Graph::with_config(self.config.clone())),
            })
        });
        Ok(GraphHandle { slot: Arc::clone(slot) })
    }

    /// Check out an existing graph
    pub fn get(&self, name: &str) -> RegistryResult<GraphHandle> {
        self.graphs
            .read()
            .get(name)
            .map(|slot| GraphHandle { slot: Arc::clone(slot) })
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Register a graph rebuilt from a snapshot under `name`, replacing any
    /// graph of that name
    pub fn restore(&self, name: &str, snapshot: &GraphSnapshot) -> RegistryResult<GraphHandle> {
        if name.is_empty() {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        let graph = Graph::from_snapshot(snapshot)?;
        let slot = Arc::new(GraphSlot {
            name: name.to_string(),
            graph: RwLock::new(graph),
        });
        self.graphs.write().insert(name.to_string(), Arc::clone(&slot));
        info!("Restored graph '{}' from snapshot", name);
        Ok(GraphHandle { slot })
    }

    /// Remove `name`; the graph is released once every lease is dropped
    pub fn delete(&self, name: &str) -> RegistryResult<()> {
        let slot = self
            .graphs
            .write()
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        let outstanding = Arc::strong_count(&slot) - 1;
        if outstanding > 0 {
            debug!(
                "Deleted graph '{}', release deferred until {} leases are dropped",
                name, outstanding
            );
        } else {
            debug!("Deleted graph '{}'", name);
        }
        Ok(())
    }

    /// Registered names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.graphs.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.graphs.read().contains_key(name)
    }

    /// Outstanding leases on `name`, not counting the registry itself
    pub fn ref_count(&self, name: &str) -> Option<usize> {
        self.graphs
            .read()
            .get(name)
            .map(|slot| Arc::strong_count(slot) - 1)
    }
}

impl Default for GraphRegistry {
    fn default() -> Self {
        GraphRegistry {
            config: GraphConfig::default(),
            graphs: RwLock::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> GraphRegistry {
        GraphRegistry::new(GraphConfig::with_capacity(16)).unwrap()
    }

    #[test]
    fn test_retrieve_creates_once() {
        let registry = registry();
        let first = registry.retrieve("social").unwrap();
        first.write(|txn| txn.create_node(&["Person"])).unwrap();

        let second = registry.retrieve("social").unwrap();
        assert_eq!(second.read().node_count(), 1);
        assert_eq!(registry.ref_count("social"), Some(2));
        assert_eq!(registry.list(), vec!["social".to_string()]);
    }

    #[test]
    fn test_handles_check_in_on_drop() {
        let registry = registry();
        let handle = registry.retrieve("g").unwrap();
        let clone = handle.clone();
        assert_eq!(registry.ref_count("g"), Some(2));
        drop(clone);
        drop(handle);
        assert_eq!(registry.ref_count("g"), Some(0));
    }

    #[test]
    fn test_delete_defers_release() {
        let registry = registry();
        let handle = registry.retrieve("g").unwrap();
        registry.delete("g").unwrap();

        assert!(!registry.contains("g"));
        assert!(matches!(registry.get("g"), Err(RegistryError::NotFound(_))));
        // the lease keeps the graph usable until it is dropped
        handle.write(|txn| txn.create_node(&[])).unwrap();
        assert_eq!(handle.lease_count(), 1);
        assert!(matches!(registry.delete("g"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let registry = registry();
        let handle = registry.retrieve("g").unwrap();
        let result: RegistryResult<()> = handle.write(|txn| {
            let a = txn.create_node(&["Person"])?;
            txn.create_edge(a, crate::graph::EntityId(99), "KNOWS")?;
            Ok(())
        });

        assert!(matches!(
            result,
            Err(RegistryError::Graph(GraphError::InvalidEntity(_)))
        ));
        let graph = handle.read();
        assert_eq!(graph.node_count(), 0);
        assert!(!graph.has_pending());
    }

    #[test]
    fn test_rejects_invalid_input() {
        let registry = registry();
        assert!(matches!(registry.retrieve(""), Err(RegistryError::InvalidName(_))));

        let mut config = GraphConfig::default();
        config.initial_capacity = 0;
        assert!(matches!(
            GraphRegistry::new(config),
            Err(RegistryError::Config(ConfigError::Invalid(_)))
        ));
    }
}
