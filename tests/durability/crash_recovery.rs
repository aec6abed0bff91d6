//! Crash and corruption scenarios.

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
fn crash_after_execute_replays_the_wal() {
    let mut db = TestEngine::new();
    seed_two_nodes_and_edge(&db);

    // Terminate without close and without any snapshot.
    db.crash_and_reopen();

    let engine = db.engine();
    assert_eq!(engine.lookup_node(1).unwrap().kind, b'A');
    assert_eq!(engine.lookup_node(2).unwrap().kind, b'B');
    let edges = engine.scan_edges_from(1);
    assert_eq!(edges.len(), 1);
    assert_eq!((edges[0].to, edges[0].label), (2, 10));
    assert!(engine.stats().wal.healthy);
}

#[test]
fn recovery_is_idempotent_across_repeated_crashes() {
    let mut db = TestEngine::new();
    seed_two_nodes_and_edge(&db);

    for _ in 0..3 {
        db.crash_and_reopen();
        let stats = db.engine().stats();
        assert_eq!(stats.nodes.live, 2);
        assert_eq!(stats.edges.live, 1);
        assert_eq!(stats.nodes.cursor, 2, "replay must not double-apply");
    }
}

#[test]
fn torn_wal_tail_is_repaired() {
    let mut db = TestEngine::new();
    seed_two_nodes_and_edge(&db);

    // A second batch whose tail will be torn.
    let engine = db.engine();
    let mut batch = engine.batch();
    batch.add_create_node(3, b'C', b"").unwrap();
    assert!(engine.execute(&mut batch).success);
    db.crash();

    // Tear the last 4 bytes of the newest segment (inside the second
    // batch's sealing marker).
    let segments = db.wal_segments();
    let wal_path = segments.last().unwrap();
    let size = file_size(wal_path);
    truncate_file(wal_path, size - 4);

    db.open_again();
    let engine = db.engine();

    // The torn batch is gone; the sealed one survived.
    assert!(engine.lookup_node(3).is_none());
    assert_eq!(engine.lookup_node(1).unwrap().kind, b'A');
    assert_eq!(engine.stats().nodes.live, 2);
    assert_eq!(engine.stats().edges.live, 1);

    let wal = engine.stats().wal;
    assert_eq!(wal.repair_events, 1);
    assert!(wal.last_error.unwrap().contains("corruption"));
    assert!(wal.healthy, "repair leaves the append path usable");
}

#[test]
fn corrupted_record_discards_the_rest_of_the_segment() {
    let mut db = TestEngine::new();
    seed_two_nodes_and_edge(&db);

    let engine = db.engine();
    commit_nodes(engine, &[(3, b'C')]);
    commit_nodes(engine, &[(4, b'D')]);
    db.crash();

    // Flip one byte early in the segment, inside the first batch.
    let segments = db.wal_segments();
    let wal_path = segments.last().unwrap();
    corrupt_file_at_offset(wal_path, 40, &[0xFF]);

    db.open_again();
    let engine = db.engine();

    // Everything from the corrupted record onward is lost.
    assert_eq!(engine.stats().nodes.live, 0);
    assert_eq!(engine.stats().wal.repair_events, 1);

    // The engine continues in a consistent state and accepts new writes.
    commit_nodes(engine, &[(10, b'X')]);
    assert_eq!(engine.lookup_node(10).unwrap().kind, b'X');
}

#[test]
fn new_writes_after_repair_survive_reopen() {
    let mut db = TestEngine::new();
    seed_two_nodes_and_edge(&db);

    let engine = db.engine();
    commit_nodes(engine, &[(3, b'C')]);
    db.crash();

    let segments = db.wal_segments();
    let wal_path = segments.last().unwrap();
    let size = file_size(wal_path);
    truncate_file(wal_path, size - 2);

    db.open_again();
    commit_nodes(db.engine(), &[(5, b'E')]);

    db.crash_and_reopen();
    let engine = db.engine();
    assert!(engine.lookup_node(3).is_none());
    assert_eq!(engine.lookup_node(5).unwrap().kind, b'E');
    assert_eq!(engine.stats().nodes.live, 3);
}

#[test]
fn crash_between_batches_keeps_each_batch_atomic() {
    let mut db = TestEngine::new();

    let engine = db.engine();
    for round in 0..5u64 {
        let mut batch = engine.batch();
        batch.add_create_node(round * 2, 0, b"").unwrap();
        batch.add_create_node(round * 2 + 1, 0, b"").unwrap();
        batch
            .add_create_edge(round * 2, round * 2 + 1, 0, b"")
            .unwrap();
        assert!(engine.execute(&mut batch).success);
    }

    db.crash_and_reopen();
    let engine = db.engine();
    // All five batches are present in full.
    assert_eq!(engine.stats().nodes.live, 10);
    assert_eq!(engine.stats().edges.live, 5);
    for round in 0..5u64 {
        assert_eq!(engine.scan_edges_from(round * 2).len(), 1);
    }
}
