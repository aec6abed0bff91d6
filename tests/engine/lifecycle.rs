//! Open / write / reopen lifecycle.

use crate::common::*;

#[test]
fn fresh_open_insert_reopen() {
    let mut db = TestEngine::new();

    let engine = db.engine();
    let mut batch = engine.batch();
    batch.add_create_node(1, b'A', b"").unwrap();
    batch.add_create_node(2, b'B', b"").unwrap();
    batch.add_create_edge(1, 2, 10, b"").unwrap();
    let result = engine.execute(&mut batch);
    assert!(result.success);
    assert_eq!(result.processed, 3);

    db.reopen();

    let engine = db.engine();
    assert_eq!(engine.lookup_node(1).unwrap().kind, b'A');
    assert_eq!(engine.lookup_node(2).unwrap().kind, b'B');

    let edges = engine.scan_edges_from(1);
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].to, 2);
    assert_eq!(edges[0].label, 10);

    let stats = engine.stats();
    assert!(stats.wal.healthy);
    assert_eq!(stats.nodes.live, 2);
    assert_eq!(stats.edges.live, 1);
}

#[test]
fn duplicate_id_rejected_and_state_unchanged() {
    let db = TestEngine::new();
    let engine = db.engine();
    commit_nodes(engine, &[(1, b'A'), (2, b'B')]);

    let mut batch = engine.batch();
    batch.add_create_node(1, b'X', b"").unwrap();
    let result = engine.execute(&mut batch);

    assert!(!result.success);
    assert_eq!(result.processed, 0);
    assert!(matches!(
        result.first_error,
        Some(nendb::Error::DuplicateId(1))
    ));
    // Pre-batch state is intact.
    assert_eq!(engine.lookup_node(1).unwrap().kind, b'A');
    assert_eq!(engine.stats().nodes.live, 2);
    assert_eq!(engine.stats().batches_rejected, 1);
}

#[test]
fn pool_exhaustion_leaves_wal_without_the_batch() {
    let mut db = TestEngine::with_config(|c| c.node_capacity = 2);

    let engine = db.engine();
    commit_nodes(engine, &[(1, 0), (2, 0)]);

    let mut batch = engine.batch();
    batch.add_create_node(3, 0, b"").unwrap();
    let result = engine.execute(&mut batch);
    assert!(matches!(
        result.first_error,
        Some(nendb::Error::PoolExhausted {
            pool: "nodes",
            capacity: 2
        })
    ));
    assert_eq!(engine.stats().nodes.live, 2);

    // The rejected batch never reached the WAL: a reopen replays only the
    // two successful creates.
    db.reopen();
    let engine = db.engine();
    assert_eq!(engine.stats().nodes.live, 2);
    assert!(engine.lookup_node(3).is_none());
}

#[test]
fn close_reports_clean_shutdown() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = nendb::EngineConfig::new(dir.path())
        .with_capacities(16, 16, 4)
        .with_embedding_dim(4);
    let engine = nendb::Engine::open(config).unwrap();
    commit_nodes(&engine, &[(1, 0)]);
    // Healthy WAL closes cleanly (drivers map this to exit code 0).
    engine.close().unwrap();
}

#[test]
fn updates_and_deletes_survive_reopen() {
    let mut db = TestEngine::new();

    let engine = db.engine();
    commit_nodes(engine, &[(1, b'A'), (2, b'B'), (3, b'C')]);

    let mut batch = engine.batch();
    batch.add_update_node(2, b'Z', b"updated").unwrap();
    batch.add_delete_node(3).unwrap();
    assert!(engine.execute(&mut batch).success);

    db.reopen();
    let engine = db.engine();
    let node = engine.lookup_node(2).unwrap();
    assert_eq!(node.kind, b'Z');
    assert_eq!(&node.properties[..7], b"updated");
    assert!(engine.lookup_node(3).is_none());
    assert_eq!(engine.stats().nodes.live, 2);
}

#[test]
fn embeddings_survive_reopen() {
    let mut db = TestEngine::new();

    let engine = db.engine();
    let mut batch = engine.batch();
    batch.add_create_node(7, 0, b"").unwrap();
    batch.add_set_embedding(7, &[0.1, 0.2, 0.3, 0.4]).unwrap();
    assert!(engine.execute(&mut batch).success);

    db.reopen();
    let em = db.engine().get_embedding(7).unwrap();
    assert_eq!(em.vector, vec![0.1, 0.2, 0.3, 0.4]);
}
