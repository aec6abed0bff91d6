//! Referential invariants observed through the public surface.

use crate::common::*;
use nendb::Engine;

/// Every active edge endpoint and embedding owner must resolve to an
/// active node, and every scanned node must look itself up.
fn assert_invariants(engine: &Engine) {
    let nodes = engine.scan_nodes(None);
    assert_eq!(nodes.len(), engine.stats().nodes.live as usize);

    for node in &nodes {
        let found = engine
            .lookup_node(node.id)
            .expect("scanned node must be indexed");
        assert_eq!(found, *node);
    }

    let mut edge_count = 0;
    for node in &nodes {
        for edge in engine.scan_edges_from(node.id) {
            assert!(engine.lookup_node(edge.from).is_some());
            assert!(engine.lookup_node(edge.to).is_some());
            edge_count += 1;
        }
    }
    assert_eq!(edge_count, engine.stats().edges.live as usize);

    let mut embedding_count = 0;
    for node in &nodes {
        if engine.get_embedding(node.id).is_some() {
            embedding_count += 1;
        }
    }
    assert_eq!(embedding_count, engine.stats().embeddings.live as usize);
}

#[test]
fn invariants_hold_across_mixed_workload() {
    let mut db = TestEngine::new();
    let engine = db.engine();

    let mut batch = engine.batch();
    for i in 0..50u64 {
        batch.add_create_node(i, (i % 3) as u8, b"").unwrap();
    }
    for i in 0..49u64 {
        batch.add_create_edge(i, i + 1, 1, b"").unwrap();
    }
    for i in (0..50u64).step_by(5) {
        batch.add_set_embedding(i, &[i as f32; 4]).unwrap();
    }
    assert!(engine.execute(&mut batch).success);
    assert_invariants(engine);

    // Cascading deletes keep endpoints resolvable.
    let mut batch = engine.batch();
    for i in [0u64, 10, 20, 30, 40] {
        batch.add_delete_node(i).unwrap();
    }
    assert!(engine.execute(&mut batch).success);
    assert_invariants(engine);

    db.reopen();
    assert_invariants(db.engine());
}

#[test]
fn delete_node_cascades_to_edges_and_embedding() {
    let db = TestEngine::new();
    let engine = db.engine();

    let mut batch = engine.batch();
    batch.add_create_node(1, 0, b"").unwrap();
    batch.add_create_node(2, 0, b"").unwrap();
    batch.add_create_edge(1, 2, 0, b"").unwrap();
    batch.add_create_edge(2, 1, 0, b"").unwrap();
    batch.add_set_embedding(1, &[1.0; 4]).unwrap();
    assert!(engine.execute(&mut batch).success);

    let mut batch = engine.batch();
    batch.add_delete_node(1).unwrap();
    assert!(engine.execute(&mut batch).success);

    assert!(engine.lookup_node(1).is_none());
    assert!(engine.get_embedding(1).is_none());
    assert!(engine.scan_edges_from(2).is_empty());
    assert_eq!(engine.stats().edges.live, 0);
    assert_invariants(engine);
}

#[test]
fn readers_see_committed_state_only() {
    use std::sync::atomic::{AtomicBool, Ordering};

    let db = TestEngine::new();
    let engine = db.engine();

    // Writer commits batches of (node, node, edge); readers must always
    // observe the edge's endpoints, never a half-applied batch.
    let stop = AtomicBool::new(false);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            while !stop.load(Ordering::Relaxed) {
                for node in engine.scan_nodes(None) {
                    for edge in engine.scan_edges_from(node.id) {
                        assert!(
                            engine.lookup_node(edge.to).is_some(),
                            "dangling endpoint observed"
                        );
                    }
                }
            }
        });

        for i in 0..100u64 {
            let mut batch = engine.batch();
            batch.add_create_node(i * 2, 0, b"").unwrap();
            batch.add_create_node(i * 2 + 1, 0, b"").unwrap();
            batch.add_create_edge(i * 2, i * 2 + 1, 0, b"").unwrap();
            assert!(engine.execute(&mut batch).success);
        }

        stop.store(true, Ordering::Relaxed);
    });
}

#[test]
fn stats_counters_track_commits() {
    let db = TestEngine::new();
    let engine = db.engine();

    commit_nodes(engine, &[(1, 0), (2, 0)]);
    let mut batch = engine.batch();
    batch.add_create_node(1, 0, b"").unwrap();
    let _ = engine.execute(&mut batch);

    let stats = engine.stats();
    assert_eq!(stats.batches_committed, 1);
    assert_eq!(stats.batches_rejected, 1);
    assert_eq!(stats.records_committed, 2);
}
