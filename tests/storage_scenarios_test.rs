//! End-to-end storage scenarios
//!
//! Exercises the matrix layout through the public graph API:
//! - relation and unified matrices under connect/disconnect
//! - property add/set/get through the façade
//! - id reuse after delete, with property cells cleared

use matrixgraph::*;

fn small_graph() -> Graph {
    Graph::with_config(GraphConfig::with_capacity(8))
}

#[test]
fn test_connect_then_disconnect_relation() {
    let mut graph = small_graph();
    let n0 = graph.create_node(&[]).unwrap();
    let n1 = graph.create_node(&[]).unwrap();
    let _n2 = graph.create_node(&[]).unwrap();
    assert_eq!((n0, n1), (EntityId(0), EntityId(1)));

    let edge = graph.create_edge(n0, n1, "KNOWS").unwrap();
    assert!(graph.adjacency_matrix().contains(0, 1).unwrap());
    assert!(graph.relation_matrix("KNOWS").unwrap().contains(0, 1).unwrap());
    graph.flush();

    graph.delete_edge(edge).unwrap();
    // logically gone, structurally still there
    assert!(!graph.relation_matrix("KNOWS").unwrap().contains(0, 1).unwrap());
    assert!(!graph.adjacency_matrix().contains(0, 1).unwrap());
    assert!(graph.relation_matrix("KNOWS").unwrap().is_stored(0, 1));
    assert!(graph.adjacency_matrix().is_stored(0, 1));
    assert_eq!(graph.sync_state(), SyncState::PendingDeletions);

    graph.flush();
    assert!(!graph.relation_matrix("KNOWS").unwrap().is_stored(0, 1));
    assert!(!graph.adjacency_matrix().is_stored(0, 1));
    assert_eq!(graph.sync_state(), SyncState::Clean);
}

#[test]
fn test_connect_is_idempotent_through_relations() {
    let mut graph = small_graph();
    let a = graph.create_node(&[]).unwrap();
    let b = graph.create_node(&[]).unwrap();
    graph.create_edge(a, b, "KNOWS").unwrap();
    graph.flush();
    let before: Vec<(u64, u64)> = graph.adjacency_matrix().iter().map(|(r, c, _)| (r, c)).collect();

    // a parallel edge does not add a cell
    graph.create_edge(a, b, "KNOWS").unwrap();
    graph.flush();
    let after: Vec<(u64, u64)> = graph.adjacency_matrix().iter().map(|(r, c, _)| (r, c)).collect();
    assert_eq!(before, after);
    assert_eq!(graph.relation_matrix("KNOWS").unwrap().nvals(), 1);
}

#[test]
fn test_add_property_then_list() {
    let mut graph = small_graph();
    let node0 = graph.create_node(&["Person"]).unwrap();
    let name = graph.intern_attribute("name").unwrap();

    graph.add_property(node0, name, &"Alice".into()).unwrap();

    let props = graph.get_properties_named(node0).unwrap();
    assert_eq!(props, vec![("name", &PropertyValue::from("Alice"))]);
    assert_eq!(graph.entity(node0).unwrap().prop_count(), 1);
}

#[test]
fn test_set_property_overwrites() {
    let mut graph = small_graph();
    let node0 = graph.create_node(&["Person"]).unwrap();
    let name = graph.intern_attribute("name").unwrap();
    graph.add_property(node0, name, &"Alice".into()).unwrap();

    let change = graph.set_property(node0, name, &"Bob".into()).unwrap();
    assert_eq!(change, PropertyChange::Replaced);
    assert_eq!(graph.get_property(node0, name).unwrap(), &PropertyValue::from("Bob"));
    assert_eq!(graph.entity(node0).unwrap().prop_count(), 1);
}

#[test]
fn test_set_null_removes_exactly_once() {
    let mut graph = small_graph();
    let node = graph.create_node(&[]).unwrap();
    let age = graph.intern_attribute("age").unwrap();
    graph.set_property(node, age, &PropertyValue::Integer(41)).unwrap();

    graph.set_property(node, age, &PropertyValue::Null).unwrap();
    assert!(graph.get_property(node, age).unwrap().is_null());
    assert_eq!(graph.entity(node).unwrap().prop_count(), 0);

    graph.set_property(node, age, &PropertyValue::Null).unwrap();
    assert_eq!(graph.entity(node).unwrap().prop_count(), 0);
}

#[test]
fn test_reused_id_starts_clean() {
    let mut graph = small_graph();
    let node0 = graph.create_node(&["Person"]).unwrap();
    let other = graph.create_node(&[]).unwrap();
    graph.set_property_by_name(node0, "name", &"Alice".into()).unwrap();
    graph.set_property_by_name(node0, "age", &PropertyValue::Integer(30)).unwrap();
    graph.set_property_by_name(other, "name", &"Other".into()).unwrap();
    graph.flush();

    graph.delete_node(node0).unwrap();
    assert_eq!(graph.attributes().present_count(node0).unwrap(), 0);

    let fresh = graph.create_node(&[]).unwrap();
    assert_eq!(fresh, node0);
    assert_eq!(graph.entity(fresh).unwrap().prop_count(), 0);
    assert!(graph.node(fresh).unwrap().property("name").is_null());
    assert!(!graph.labels().has_label(fresh, "Person"));
    assert!(graph.get_properties(fresh).unwrap().is_empty());

    graph.flush();
    let name = graph.attribute_id("name");
    assert!(!graph.attributes().matrix(name).unwrap().is_stored(fresh.0, fresh.0));
    assert_eq!(graph.node(other).unwrap().property("name"), &PropertyValue::from("Other"));
}

#[test]
fn test_reuse_takes_smallest_reclaimed_id() {
    let mut graph = small_graph();
    let ids: Vec<EntityId> = (0..5).map(|_| graph.create_node(&[]).unwrap()).collect();
    graph.delete_node(ids[3]).unwrap();
    graph.delete_node(ids[1]).unwrap();

    assert_eq!(graph.create_node(&[]).unwrap(), ids[1]);
    assert_eq!(graph.create_node(&[]).unwrap(), ids[3]);
    assert_eq!(graph.create_node(&[]).unwrap(), EntityId(5));
}

#[test]
fn test_released_id_is_not_live() {
    let mut graph = small_graph();
    let node = graph.create_node(&[]).unwrap();
    graph.delete_node(node).unwrap();

    assert!(!graph.is_live(node));
    assert_eq!(graph.delete_node(node), Err(GraphError::InvalidEntity(node)));
    assert!(graph.node(node).is_err());
    assert!(graph
        .set_property_by_name(node, "name", &"ghost".into())
        .is_err());
}

#[test]
fn test_properties_on_edges_share_attribute_matrices() {
    let mut graph = small_graph();
    let a = graph.create_node(&[]).unwrap();
    let b = graph.create_node(&[]).unwrap();
    let edge = graph.create_edge(a, b, "KNOWS").unwrap();

    graph.set_property_by_name(a, "weight", &PropertyValue::Float(1.5)).unwrap();
    graph.set_property_by_name(edge, "weight", &PropertyValue::Float(0.5)).unwrap();

    let weight = graph.attribute_id("weight");
    assert_eq!(graph.attributes().matrix(weight).unwrap().nvals(), 2);
    assert_eq!(graph.edge(edge).unwrap().property_by_id(weight).as_float(), Some(0.5));
    assert_eq!(
        graph.entity_to_string(edge, EntityFormat::all()).unwrap(),
        "[2:KNOWS{weight:0.5}]"
    );
}

#[test]
fn test_label_union_matrix() {
    let mut graph = small_graph();
    let a = graph.create_node(&["Person", "Employee"]).unwrap();
    let b = graph.create_node(&["Company"]).unwrap();

    assert!(graph.node_label_matrix().contains(a.0, a.0).unwrap());
    assert!(graph.node_label_matrix().contains(b.0, b.0).unwrap());

    graph.remove_label(a, "Person").unwrap();
    assert!(graph.node_label_matrix().contains(a.0, a.0).unwrap());
    graph.remove_label(a, "Employee").unwrap();
    assert!(!graph.node_label_matrix().contains(a.0, a.0).unwrap());
    assert_eq!(graph.node(a).unwrap().labels(), Vec::<&str>::new());
}
