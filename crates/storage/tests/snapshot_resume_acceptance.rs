use chrono::Utc;
use scoring::apply;
use shared::{
    domain::{ExtraKind, InningsState, ScoreCommand},
    protocol::InningsSnapshot,
};
use storage::Storage;

#[tokio::test]
async fn innings_survives_a_restart_and_resumes_from_latest_snapshot() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("scorer.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let commands = [
        ScoreCommand::AddRuns {
            runs: 4,
            ball_number: None,
        },
        ScoreCommand::DeclareExtra {
            kind: ExtraKind::NoBall,
            runs: 0,
            ball_number: None,
        },
        ScoreCommand::DeclareWicket {
            runs_on_dismissal: 1,
            ball_number: None,
        },
    ];

    let (session, expected) = {
        let storage = Storage::new(&database_url).await.expect("db");
        let session = storage.create_session().await.expect("session");
        let mut state = InningsState::default();
        storage
            .save_snapshot(&InningsSnapshot {
                session_id: session,
                seq: 0,
                state: state.clone(),
                updated_at: Utc::now(),
            })
            .await
            .expect("initial snapshot");

        for (seq, command) in commands.iter().enumerate() {
            state = apply(&state, command);
            storage
                .save_snapshot(&InningsSnapshot {
                    session_id: session,
                    seq: seq as i64 + 1,
                    state: state.clone(),
                    updated_at: Utc::now(),
                })
                .await
                .expect("snapshot");
        }
        (session, state)
    };

    let storage = Storage::new(&database_url).await.expect("reopen db");
    assert_eq!(storage.latest_session().await.expect("latest"), Some(session));
    let resumed = storage
        .load_latest_snapshot(session)
        .await
        .expect("load")
        .expect("snapshot present");
    assert_eq!(resumed.seq, 3);
    assert_eq!(resumed.state, expected);
    assert_eq!(resumed.state.over_labels(), vec!["4", "nb", "W+1"]);

    let next = apply(
        &resumed.state,
        &ScoreCommand::AddRuns {
            runs: 2,
            ball_number: Some(1),
        },
    );
    assert_eq!(next.score_line(), "4-1");
    assert_eq!(next.overs_line(), "0.2");

    let history = storage.snapshot_history(session, 10).await.expect("history");
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].state, InningsState::default());
}
