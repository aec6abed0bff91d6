//! Snapshot creation, rotation, and fallback.

use crate::common::*;

fn seed_two_nodes_and_edge(db: &TestEngine) {
    let engine = db.engine();
    let mut batch = engine.batch();
    batch.add_create_node(1, b'A', b"").unwrap();
    batch.add_create_node(2, b'B', b"").unwrap();
    batch.add_create_edge(1, 2, 10, b"").unwrap();
    assert!(engine.execute(&mut batch).success);
}

#[test]
fn snapshot_rotates_wal_and_reload_sees_everything() {
    let mut db = TestEngine::new();
    seed_two_nodes_and_edge(&db);

    let engine = db.engine();
    let info = engine.snapshot().unwrap();
    // Three records plus the sealing marker.
    assert_eq!(info.lsn, 4);
    assert!(db.snapshot_path().exists());

    // The WAL restarts just past the snapshot and holds only what follows.
    commit_nodes(engine, &[(3, b'C')]);
    let segments = db.wal_segments();
    assert_eq!(segments.len(), 1, "old segments deleted after snapshot");

    db.crash_and_reopen();
    let engine = db.engine();
    assert_eq!(engine.stats().nodes.live, 3);
    assert_eq!(engine.lookup_node(3).unwrap().kind, b'C');
    assert_eq!(engine.scan_edges_from(1).len(), 1);
    assert_eq!(engine.stats().last_snapshot_lsn, 4);
}

#[test]
fn snapshot_reload_equals_pre_snapshot_state() {
    let mut db = TestEngine::new();

    let engine = db.engine();
    let mut batch = engine.batch();
    for i in 0..20u64 {
        batch
            .add_create_node(i, (i % 4) as u8, &i.to_le_bytes())
            .unwrap();
    }
    for i in 1..20u64 {
        batch.add_create_edge(i - 1, i, 2, b"x").unwrap();
    }
    batch.add_set_embedding(5, &[5.0; 4]).unwrap();
    assert!(engine.execute(&mut batch).success);

    let mut batch = engine.batch();
    batch.add_delete_node(10).unwrap();
    assert!(engine.execute(&mut batch).success);

    let before_nodes = engine.scan_nodes(None);
    let before_stats = engine.stats();
    engine.snapshot().unwrap();

    db.reopen();
    let engine = db.engine();

    let after_nodes = engine.scan_nodes(None);
    assert_eq!(before_nodes, after_nodes);
    assert_eq!(engine.stats().nodes.live, before_stats.nodes.live);
    assert_eq!(engine.stats().edges.live, before_stats.edges.live);
    assert_eq!(engine.get_embedding(5).unwrap().vector, vec![5.0; 4]);
    // Reload compacted the tombstoned slots away.
    assert_eq!(engine.stats().nodes.cursor, engine.stats().nodes.live);

    // Compaction shifted every node behind the deleted one into a new
    // slot; lookups by id must still resolve each survivor to itself.
    assert!(engine.lookup_node(10).is_none());
    for i in (0..20u64).filter(|&i| i != 10) {
        let node = engine.lookup_node(i).unwrap();
        assert_eq!(node.id, i);
        assert_eq!(node.kind, (i % 4) as u8);
        assert_eq!(&node.properties[..8], &i.to_le_bytes());
    }
}

#[test]
fn second_snapshot_keeps_backup() {
    let db = TestEngine::new();
    seed_two_nodes_and_edge(&db);

    let engine = db.engine();
    engine.snapshot().unwrap();
    assert!(!db.snapshot_bak_path().exists());

    commit_nodes(engine, &[(3, b'C')]);
    engine.snapshot().unwrap();
    assert!(db.snapshot_bak_path().exists());
}

#[test]
fn corrupted_snapshot_falls_back_to_backup() {
    let mut db = TestEngine::new();
    seed_two_nodes_and_edge(&db);

    let engine = db.engine();
    engine.snapshot().unwrap();
    commit_nodes(engine, &[(3, b'C')]);
    engine.snapshot().unwrap();
    db.crash();

    // Damage the current image; the backup (without node 3) must load,
    // and the WAL no longer holds node 3's batch after rotation.
    let size = file_size(&db.snapshot_path());
    corrupt_file_at_offset(&db.snapshot_path(), size / 2, &[0xFF, 0xFF]);

    db.open_again();
    let engine = db.engine();
    assert_eq!(engine.stats().nodes.live, 2);
    assert!(engine.lookup_node(3).is_none());
    assert_eq!(engine.lookup_node(1).unwrap().kind, b'A');
}

#[test]
fn both_images_invalid_refuses_to_open() {
    let mut db = TestEngine::new();
    seed_two_nodes_and_edge(&db);

    let engine = db.engine();
    engine.snapshot().unwrap();
    commit_nodes(engine, &[(3, b'C')]);
    engine.snapshot().unwrap();
    db.crash();

    std::fs::write(db.snapshot_path(), b"garbage").unwrap();
    std::fs::write(db.snapshot_bak_path(), b"more garbage").unwrap();

    let err = db.try_open_again().unwrap_err();
    assert!(matches!(err, nendb::Error::SnapshotCorruption(_)));
}

#[test]
fn start_empty_on_corruption_opens_empty() {
    let mut db = TestEngine::with_config(|c| c.start_empty_on_corruption = true);
    seed_two_nodes_and_edge(&db);

    let engine = db.engine();
    engine.snapshot().unwrap();
    db.crash();

    std::fs::write(db.snapshot_path(), b"garbage").unwrap();

    db.open_again();
    // No backup existed and the image is gone; the engine starts empty by
    // explicit configuration (the rotated WAL holds nothing either).
    assert_eq!(db.engine().stats().nodes.live, 0);
}

#[test]
fn snapshot_of_empty_engine_round_trips() {
    let mut db = TestEngine::new();
    let info = db.engine().snapshot().unwrap();
    assert_eq!(info.lsn, 0);

    db.reopen();
    assert_eq!(db.engine().stats().nodes.live, 0);
    assert_eq!(db.engine().stats().last_snapshot_lsn, 0);
}

#[test]
fn snapshot_then_more_batches_then_snapshot_again() {
    let mut db = TestEngine::new();
    let engine = db.engine();

    for round in 0..3u64 {
        commit_nodes(engine, &[(round, 0)]);
        engine.snapshot().unwrap();
    }
    commit_nodes(engine, &[(100, b'Z')]);

    db.crash_and_reopen();
    let engine = db.engine();
    assert_eq!(engine.stats().nodes.live, 4);
    assert_eq!(engine.lookup_node(100).unwrap().kind, b'Z');
}
