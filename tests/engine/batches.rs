//! Batch boundary and atomicity behaviors.

use crate::common::*;

#[test]
fn batch_of_exactly_max_size_commits() {
    let db = TestEngine::with_config(|c| c.batch_max_size = 8);
    let engine = db.engine();

    let mut batch = engine.batch();
    for i in 0..8u64 {
        batch.add_create_node(i, 0, b"").unwrap();
    }
    // Slot 9 does not exist.
    assert!(matches!(
        batch.add_create_node(99, 0, b""),
        Err(nendb::Error::BatchFull { capacity: 8 })
    ));

    let result = engine.execute(&mut batch);
    assert!(result.success);
    assert_eq!(result.processed, 8);
    assert_eq!(engine.stats().nodes.live, 8);
}

#[test]
fn rejected_batch_is_kept_for_correction() {
    let db = TestEngine::new();
    let engine = db.engine();
    commit_nodes(engine, &[(1, 0)]);

    let mut batch = engine.batch();
    batch.add_create_node(2, 0, b"").unwrap();
    batch.add_create_edge(2, 42, 0, b"").unwrap(); // unknown endpoint
    let result = engine.execute(&mut batch);
    assert!(matches!(
        result.first_error,
        Some(nendb::Error::UnknownNode(42))
    ));
    assert_eq!(batch.len(), 2);

    // Fix and resubmit.
    batch.clear();
    batch.add_create_node(2, 0, b"").unwrap();
    batch.add_create_edge(2, 1, 0, b"").unwrap();
    assert!(engine.execute(&mut batch).success);
    assert!(batch.is_empty());
}

#[test]
fn delete_of_missing_records_commits_as_noop() {
    let mut db = TestEngine::new();
    let engine = db.engine();

    let lsn_before = engine.stats().applied_lsn;
    let mut batch = engine.batch();
    batch.add_delete_node(404).unwrap();
    batch.add_delete_edge(404, 405, 0).unwrap();
    let result = engine.execute(&mut batch);
    assert!(result.success);
    assert_eq!(result.processed, 2);

    // The no-op deletes still produced WAL records (the LSN advanced) and
    // replay cleanly.
    assert!(engine.stats().applied_lsn > lsn_before);
    db.reopen();
    assert_eq!(db.engine().stats().nodes.live, 0);
}

#[test]
fn double_delete_is_idempotent() {
    let db = TestEngine::new();
    let engine = db.engine();
    commit_nodes(engine, &[(1, 0)]);

    let mut batch = engine.batch();
    batch.add_delete_node(1).unwrap();
    assert!(engine.execute(&mut batch).success);

    let mut batch = engine.batch();
    batch.add_delete_node(1).unwrap();
    assert!(engine.execute(&mut batch).success);

    assert_eq!(engine.stats().nodes.live, 0);
}

#[test]
fn self_loop_allowed_by_default() {
    let db = TestEngine::new();
    let engine = db.engine();
    commit_nodes(engine, &[(1, 0)]);

    let mut batch = engine.batch();
    batch.add_create_edge(1, 1, 3, b"").unwrap();
    assert!(engine.execute(&mut batch).success);
    assert_eq!(engine.scan_edges_from(1)[0].to, 1);
}

#[test]
fn self_loop_rejected_when_disabled() {
    let db = TestEngine::with_config(|c| c.allow_self_loops = false);
    let engine = db.engine();
    commit_nodes(engine, &[(1, 0)]);

    let mut batch = engine.batch();
    batch.add_create_edge(1, 1, 3, b"").unwrap();
    let result = engine.execute(&mut batch);
    assert!(matches!(
        result.first_error,
        Some(nendb::Error::SelfLoopRejected(1))
    ));
}

#[test]
fn oversized_property_rejected_at_add_time() {
    let db = TestEngine::new();
    let engine = db.engine();

    let mut batch = engine.batch();
    // node_prop_size is 16 in the test config.
    assert!(matches!(
        batch.add_create_node(1, 0, &[0u8; 17]),
        Err(nendb::Error::PropertyOverflow { got: 17, max: 16 })
    ));
    assert!(batch.is_empty());
}

#[test]
fn wrong_dimension_rejected_at_add_time() {
    let db = TestEngine::new();
    let engine = db.engine();

    let mut batch = engine.batch();
    assert!(matches!(
        batch.add_set_embedding(1, &[0.0; 5]),
        Err(nendb::Error::DimensionMismatch {
            expected: 4,
            got: 5
        })
    ));
}

#[test]
fn large_batch_round_trips_through_recovery() {
    let mut db = TestEngine::new();
    let engine = db.engine();

    let mut batch = engine.batch();
    for i in 0..500u64 {
        batch.add_create_node(i, (i % 7) as u8, &i.to_le_bytes()).unwrap();
    }
    for i in 1..500u64 {
        batch.add_create_edge(i - 1, i, (i % 3) as u16, b"").unwrap();
    }
    let result = engine.execute(&mut batch);
    assert!(result.success);
    assert_eq!(result.processed, 999);

    db.crash_and_reopen();
    let engine = db.engine();
    assert_eq!(engine.stats().nodes.live, 500);
    assert_eq!(engine.stats().edges.live, 499);
    let node = engine.lookup_node(123).unwrap();
    assert_eq!(node.kind, (123 % 7) as u8);
    assert_eq!(&node.properties[..8], &123u64.to_le_bytes());
}
