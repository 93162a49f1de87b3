use anyhow::Context;
use matrixgraph::{EntityFormat, GraphConfig, GraphEntity, GraphRegistry, PropertyValue};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Matrixgraph v{}", matrixgraph::version());
    println!("==========================================");
    println!();

    let config = GraphConfig::from_env().context("loading graph configuration")?;
    let registry = GraphRegistry::new(config)?;

    demo_property_graph(&registry)?;
    demo_traversal(&registry)?;
    demo_rollback(&registry)?;

    registry.delete("social")?;
    println!("\n✅ Demo complete");
    Ok(())
}

fn demo_property_graph(registry: &GraphRegistry) -> anyhow::Result<()> {
    println!("=== Demo 1: Property Graph ===");
    let handle = registry.retrieve("social")?;

    handle.write(|txn| {
        let people = [("Alice", 30i64), ("Bob", 25), ("Charlie", 35)];
        let mut ids = Vec::new();
        for (name, age) in people {
            let id = txn.create_node(&["Person"])?;
            txn.set_property_by_name(id, "name", &name.into())?;
            txn.set_property_by_name(id, "age", &PropertyValue::Integer(age))?;
            println!("✓ Created Person: {} (age {})", name, age);
            ids.push(id);
        }

        let knows = txn.create_edge(ids[0], ids[1], "KNOWS")?;
        txn.set_property_by_name(knows, "since", &PropertyValue::Integer(2020))?;
        txn.create_edge(ids[1], ids[2], "KNOWS")?;
        txn.create_edge(ids[0], ids[2], "FOLLOWS")?;
        println!("✓ Alice -[KNOWS]-> Bob -[KNOWS]-> Charlie, Alice -[FOLLOWS]-> Charlie");
        Ok(())
    })?;

    let graph = handle.read();
    println!("\nGraph Statistics:");
    println!("  Total nodes: {}", graph.node_count());
    println!("  Total edges: {}", graph.edge_count());
    println!("  Matrix dimension: {}", graph.dimension());
    for node in graph.nodes() {
        println!("  {}", node.render(EntityFormat::all())?);
    }
    for edge in graph.edges() {
        println!("  {} ({} props)", edge.render(EntityFormat::all())?, edge.prop_count());
    }
    Ok(())
}

fn demo_traversal(registry: &GraphRegistry) -> anyhow::Result<()> {
    println!("\n=== Demo 2: Matrix Traversal ===");
    let handle = registry.get("social")?;

    // committed writes are flushed, so readers can multiply in place
    let two_hops = handle.read().traverse_flushed(&["KNOWS", "KNOWS"])?;
    for (src, dst, _) in two_hops.iter() {
        println!("  {} reaches {} in two KNOWS hops", src, dst);
    }
    Ok(())
}

fn demo_rollback(registry: &GraphRegistry) -> anyhow::Result<()> {
    println!("\n=== Demo 3: Transaction Rollback ===");
    let handle = registry.get("social")?;
    let before = handle.read().node_count();

    let result: Result<(), _> = handle.write(|txn| {
        let id = txn.create_node(&["Person"])?;
        txn.delete_node(id)?;
        txn.delete_node(id)
    });
    if let Err(e) = result {
        println!("  transaction failed: {}", e);
    }
    println!(
        "  nodes before: {}, after rollback: {}",
        before,
        handle.read().node_count()
    );

    let snapshot = handle.snapshot()?;
    let bytes = snapshot.encode()?;
    println!("  snapshot: {} bytes, {} nodes", bytes.len(), snapshot.nodes.len());
    let json = snapshot.to_json()?;
    println!("  json export: {} bytes", json.len());
    Ok(())
}
