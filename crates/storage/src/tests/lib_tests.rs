use super::*;
use chrono::Duration;
use shared::domain::{BallOutcome, InningsState};

fn snapshot(session_id: SessionId, seq: i64, runs: u32) -> InningsSnapshot {
    let mut state = InningsState::default();
    state.total_runs = runs;
    state.legal_balls_in_current_over = 1;
    state.current_over_deliveries = vec![BallOutcome::runs(runs)];
    InningsSnapshot {
        session_id,
        seq,
        state,
        updated_at: Utc::now() + Duration::milliseconds(seq),
    }
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("scorer.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn saves_and_loads_latest_snapshot() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let session = storage.create_session().await.expect("session");
    assert!(storage
        .load_latest_snapshot(session)
        .await
        .expect("load")
        .is_none());

    let first = snapshot(session, 0, 0);
    let second = snapshot(session, 1, 4);
    storage.save_snapshot(&first).await.expect("save first");
    storage.save_snapshot(&second).await.expect("save second");

    let latest = storage
        .load_latest_snapshot(session)
        .await
        .expect("load")
        .expect("snapshot present");
    assert_eq!(latest.seq, 1);
    assert_eq!(latest.state, second.state);
    assert_eq!(latest.state.over_labels(), vec!["4"]);
}

#[tokio::test]
async fn rejects_duplicate_sequence_numbers() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let session = storage.create_session().await.expect("session");
    storage
        .save_snapshot(&snapshot(session, 3, 1))
        .await
        .expect("save");
    let err = storage
        .save_snapshot(&snapshot(session, 3, 2))
        .await
        .expect_err("duplicate seq must fail");
    assert!(format!("{err:#}").contains("snapshot 3"));
}

#[tokio::test]
async fn rejects_snapshot_for_unknown_session() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .save_snapshot(&snapshot(SessionId(404), 0, 0))
        .await
        .expect_err("foreign key must hold");
}

#[tokio::test]
async fn history_returns_recent_snapshots_oldest_first() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let session = storage.create_session().await.expect("session");
    let other = storage.create_session().await.expect("other session");
    for seq in 0..5 {
        storage
            .save_snapshot(&snapshot(session, seq, seq as u32))
            .await
            .expect("save");
    }
    storage
        .save_snapshot(&snapshot(other, 0, 6))
        .await
        .expect("save other");

    let history = storage.snapshot_history(session, 3).await.expect("history");
    let seqs: Vec<i64> = history.iter().map(|s| s.seq).collect();
    assert_eq!(seqs, vec![2, 3, 4]);
    assert!(history.iter().all(|s| s.session_id == session));
}

#[tokio::test]
async fn lists_sessions_with_snapshot_counts() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let empty = storage.create_session().await.expect("session");
    let busy = storage.create_session().await.expect("session");
    for seq in 0..2 {
        storage
            .save_snapshot(&snapshot(busy, seq, 1))
            .await
            .expect("save");
    }

    let sessions = storage.list_sessions(10).await.expect("sessions");
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].session_id, busy);
    assert_eq!(sessions[0].snapshot_count, 2);
    assert_eq!(sessions[1].session_id, empty);
    assert_eq!(sessions[1].snapshot_count, 0);

    assert_eq!(storage.latest_session().await.expect("latest"), Some(busy));
    assert!(storage.session_exists(empty).await.expect("exists"));
    assert!(!storage.session_exists(SessionId(99)).await.expect("exists"));
}

#[tokio::test]
async fn trait_object_delegates_to_storage() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let session = storage.create_session().await.expect("session");
    let store: std::sync::Arc<dyn SnapshotStore> = std::sync::Arc::new(storage.clone());

    store
        .save_snapshot(&snapshot(session, 0, 2))
        .await
        .expect("save");
    store.health_check().await.expect("health");
    let latest = store
        .load_latest_snapshot(session)
        .await
        .expect("load")
        .expect("present");
    assert_eq!(latest.state.total_runs, 2);
}

#[test]
fn sqlite_path_skips_memory_urls() {
    assert_eq!(sqlite_path("sqlite::memory:"), None);
    assert_eq!(sqlite_path("postgres://localhost/db"), None);
    assert_eq!(
        sqlite_path("sqlite://data/scorer.db?mode=rwc"),
        Some(PathBuf::from("data/scorer.db"))
    );
}
