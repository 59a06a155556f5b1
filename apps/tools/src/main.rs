use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use scoring::ScoreboardView;
use shared::{
    domain::{InningsState, SessionId},
    protocol::InningsSnapshot,
};
use storage::Storage;

#[derive(Parser, Debug)]
#[command(about = "Offline access to the scorer's snapshot database")]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/scorer.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List recent sessions.
    Sessions {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Print the latest scoreboard of a session (default: most recent session).
    Show { session_id: Option<i64> },
    History {
        session_id: i64,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Dump every snapshot of a session as JSON lines.
    Export { session_id: i64 },
    /// Open an empty session; start the server with APP__SESSION_ID to use it.
    NewSession {
        #[arg(long, default_value_t = shared::domain::DEFAULT_OVERS_LIMIT)]
        overs: u32,
        #[arg(long, default_value_t = shared::domain::DEFAULT_WICKETS_LIMIT)]
        wickets: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::Sessions { limit } => {
            for session in storage.list_sessions(limit).await? {
                println!(
                    "session {:<5} snapshots={:<5} created={} updated={}",
                    session.session_id.0,
                    session.snapshot_count,
                    fmt_time(&session.created_at),
                    fmt_time(&session.updated_at)
                );
            }
        }
        Command::Show { session_id } => {
            let session_id = match session_id {
                Some(id) => SessionId(id),
                None => storage
                    .latest_session()
                    .await?
                    .context("no sessions recorded yet")?,
            };
            let snapshot = storage
                .load_latest_snapshot(session_id)
                .await?
                .with_context(|| format!("session {} has no snapshots", session_id.0))?;
            println!("session {} #{}", session_id.0, snapshot.seq);
            println!("{}", ScoreboardView::from_state(&snapshot.state));
        }
        Command::History { session_id, limit } => {
            for snapshot in storage
                .snapshot_history(SessionId(session_id), limit)
                .await?
            {
                let view = ScoreboardView::from_state(&snapshot.state);
                println!(
                    "#{:<5} {}  {:>6} ov  {:<7} {}",
                    snapshot.seq,
                    fmt_time(&snapshot.updated_at),
                    view.overs,
                    view.score,
                    view.this_over.join(" ")
                );
            }
        }
        Command::Export { session_id } => {
            let snapshots = storage
                .snapshot_history(SessionId(session_id), u32::MAX)
                .await?;
            for snapshot in snapshots {
                println!("{}", serde_json::to_string(&snapshot)?);
            }
        }
        Command::NewSession { overs, wickets } => {
            let session_id = storage.create_session().await?;
            storage
                .save_snapshot(&InningsSnapshot {
                    session_id,
                    seq: 0,
                    state: InningsState::new(overs, wickets),
                    updated_at: Utc::now(),
                })
                .await?;
            println!("created session {}", session_id.0);
        }
    }

    Ok(())
}

fn fmt_time(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}
