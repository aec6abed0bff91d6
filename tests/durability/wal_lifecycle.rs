//! WAL segment lifecycle under the engine.

use crate::common::*;
use nendb::WalSyncPolicy;

#[test]
fn small_segment_limit_rotates_and_recovers() {
    let mut db = TestEngine::with_config(|c| c.wal_segment_max_bytes = 512);

    let engine = db.engine();
    for i in 0..40u64 {
        commit_nodes(engine, &[(i, (i % 5) as u8)]);
    }
    assert!(
        db.wal_segments().len() > 1,
        "512-byte limit must force rotation"
    );

    db.crash_and_reopen();
    let engine = db.engine();
    assert_eq!(engine.stats().nodes.live, 40);
    for i in 0..40u64 {
        assert_eq!(engine.lookup_node(i).unwrap().kind, (i % 5) as u8);
    }
}

#[test]
fn every_n_records_policy_survives_clean_close() {
    let mut db = TestEngine::with_config(|c| {
        c.wal_sync_policy = WalSyncPolicy::EveryNRecords(1000);
    });

    commit_nodes(db.engine(), &[(1, b'A'), (2, b'B')]);
    // Clean close flushes regardless of the policy counter.
    db.reopen();
    assert_eq!(db.engine().stats().nodes.live, 2);
}

#[test]
fn periodic_policy_survives_clean_close() {
    let mut db = TestEngine::with_config(|c| {
        c.wal_sync_policy = WalSyncPolicy::PeriodicMs(60_000);
    });

    commit_nodes(db.engine(), &[(1, b'A')]);
    db.reopen();
    assert_eq!(db.engine().stats().nodes.live, 1);
}

#[test]
fn lockfile_blocks_second_writer_process_state() {
    let db = TestEngine::new();
    let config = nendb::EngineConfig::new(db.data_dir())
        .with_capacities(1024, 4096, 128)
        .with_embedding_dim(4);
    assert!(matches!(
        nendb::Engine::open(config),
        Err(nendb::Error::DatabaseLocked { .. })
    ));
    // Lockfile content is the writer PID.
    let pid = std::fs::read_to_string(db.data_dir().join("nendb.lock")).unwrap();
    assert_eq!(pid.trim(), std::process::id().to_string());
}

#[test]
fn wal_end_position_tracks_appends() {
    let db = TestEngine::new();
    let engine = db.engine();

    let before = engine.stats().wal.end_position;
    commit_nodes(engine, &[(1, 0)]);
    let after = engine.stats().wal.end_position;
    assert!(after > before);
    assert_eq!(engine.stats().wal.io_error_count, 0);
}

#[test]
fn empty_reopen_cycle_is_stable() {
    let mut db = TestEngine::new();
    for _ in 0..3 {
        db.reopen();
        assert_eq!(db.engine().stats().nodes.live, 0);
        assert_eq!(db.engine().stats().applied_lsn, 0);
    }
}
