use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{BridgeEvent, ScoreboardClient, ScoreboardView, SpeechBridge};
use futures::StreamExt;
use shared::{
    domain::{ExtraKind, ScoreCommand, TransitionEffect},
    protocol::{FunctionCall, ScoreEvent},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voice_integration::{LoopbackConnector, SpeechEvent};

#[derive(Parser, Debug)]
#[command(about = "Operator console for the innings scorer")]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8787")]
    server_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Extra {
    Wide,
    NoBall,
}

impl From<Extra> for ExtraKind {
    fn from(value: Extra) -> Self {
        match value {
            Extra::Wide => ExtraKind::Wide,
            Extra::NoBall => ExtraKind::NoBall,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the scoreboard.
    Show,
    AddRuns {
        #[arg(value_parser = clap::value_parser!(u32).range(0..=6))]
        runs: u32,
        /// Correct this 1-based ball of the current over instead of adding one.
        #[arg(long)]
        ball: Option<i32>,
    },
    Wicket {
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=6))]
        runs: u32,
        #[arg(long)]
        ball: Option<i32>,
    },
    Extra {
        #[arg(value_enum)]
        kind: Extra,
        /// Runs on top of the one-run penalty.
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=6))]
        runs: u32,
        #[arg(long)]
        ball: Option<i32>,
    },
    /// Remove the last delivery of the current over.
    Undo,
    NewInnings {
        #[arg(long)]
        overs: Option<u32>,
    },
    WicketsLimit {
        limit: u32,
    },
    OversLimit {
        limit: u32,
    },
    History {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Send one function call as the speech service would, e.g.
    /// `call add_runs '{"runs":4}'`.
    Call {
        name: String,
        #[arg(default_value = "{}")]
        args: String,
    },
    /// Feed newline-delimited function calls through the speech bridge.
    Replay {
        file: PathBuf,
    },
    /// Print live score events until interrupted.
    Follow,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let args = Args::parse();
    let client = ScoreboardClient::new(&args.server_url)?;

    match args.command {
        Command::Show => print_view(&client.view().await?),
        Command::AddRuns { runs, ball } => {
            submit(
                &client,
                ScoreCommand::AddRuns {
                    runs,
                    ball_number: ball,
                },
            )
            .await?
        }
        Command::Wicket { runs, ball } => {
            submit(
                &client,
                ScoreCommand::DeclareWicket {
                    runs_on_dismissal: runs,
                    ball_number: ball,
                },
            )
            .await?
        }
        Command::Extra { kind, runs, ball } => {
            submit(
                &client,
                ScoreCommand::DeclareExtra {
                    kind: kind.into(),
                    runs,
                    ball_number: ball,
                },
            )
            .await?
        }
        Command::Undo => submit(&client, ScoreCommand::ClearLastBall).await?,
        Command::NewInnings { overs } => {
            describe(&client.new_innings(overs).await?.effect);
            print_view(&client.view().await?);
        }
        Command::WicketsLimit { limit } => {
            describe(&client.set_wickets_limit(limit).await?.effect);
            print_view(&client.view().await?);
        }
        Command::OversLimit { limit } => {
            describe(&client.set_overs_limit(limit).await?.effect);
            print_view(&client.view().await?);
        }
        Command::History { limit } => {
            for snapshot in client.history(Some(limit)).await? {
                let view = ScoreboardView::from_state(&snapshot.state);
                println!(
                    "#{:<4} {}  {:>6} ov  [{}]",
                    snapshot.seq,
                    snapshot.updated_at.format("%H:%M:%S"),
                    view.overs,
                    view.score
                );
            }
        }
        Command::Call { name, args } => {
            let args = serde_json::from_str(&args).context("args must be a JSON object")?;
            let response = client
                .function_call(&FunctionCall {
                    call_id: None,
                    name,
                    args,
                })
                .await?;
            describe(&response.effect);
            print_view(&ScoreboardView::from_state(&response.snapshot.state));
        }
        Command::Replay { file } => replay(client, file).await?,
        Command::Follow => follow(&client).await?,
    }

    Ok(())
}

async fn submit(client: &ScoreboardClient, command: ScoreCommand) -> Result<()> {
    let response = client.submit(&command).await?;
    describe(&response.effect);
    print_view(&ScoreboardView::from_state(&response.snapshot.state));
    Ok(())
}

fn describe(effect: &TransitionEffect) {
    match effect {
        TransitionEffect::Appended {
            requested_ball: Some(requested),
            ball,
        } => println!("ball {requested} is not in this over; recorded as ball {ball}"),
        TransitionEffect::Edited { ball } => println!("corrected ball {ball}"),
        TransitionEffect::OverCompleted { over } => println!("end of over {over}"),
        TransitionEffect::Dropped => println!("over already complete; runs counted only"),
        TransitionEffect::Cleared { ball } => println!("removed ball {ball}"),
        TransitionEffect::Reset => println!("new innings"),
        TransitionEffect::Ignored { reason } => println!("ignored: {reason:?}"),
        TransitionEffect::Appended { .. } | TransitionEffect::Configured => {}
    }
}

fn print_view(view: &ScoreboardView) {
    println!("{view}");
}

async fn replay(client: ScoreboardClient, file: PathBuf) -> Result<()> {
    let input = tokio::fs::File::open(&file)
        .await
        .with_context(|| format!("failed to open {}", file.display()))?;

    let connector = LoopbackConnector::default();
    let bridge = SpeechBridge::connect(client.clone(), &connector, "loopback").await?;
    let session = connector
        .last_session()
        .context("loopback connector kept no session")?;
    let printer = tokio::spawn(print_bridge_events(bridge.subscribe()));
    let run = tokio::spawn(bridge.run());

    let mut lines = BufReader::new(input).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<FunctionCall>(line) {
            Ok(call) => {
                // The bridge stopped early; its own error is reported below.
                if session.push(SpeechEvent::FunctionCall(call)).await.is_err() {
                    break;
                }
            }
            Err(error) => warn!(line = line_no, %error, "skipping malformed function call"),
        }
    }
    let _ = session
        .push(SpeechEvent::Closed {
            reason: "end of replay".to_string(),
        })
        .await;

    run.await.context("bridge task panicked")??;
    printer.await.context("printer task panicked")?;
    print_view(&client.view().await?);
    Ok(())
}

/// Prints bridge outcomes until the bridge is dropped.
async fn print_bridge_events(mut bridged: broadcast::Receiver<BridgeEvent>) {
    loop {
        match bridged.recv().await {
            Ok(BridgeEvent::Applied { call, response }) => {
                println!(
                    "{:<16} -> {} ({} ov)",
                    call.name,
                    response.snapshot.state.score_line(),
                    response.snapshot.state.overs_line()
                );
            }
            Ok(BridgeEvent::Rejected { call, error }) => {
                println!("{:<16} !! {error}", call.name);
            }
            Ok(BridgeEvent::Closed { reason }) => info!(%reason, "replay finished"),
            Ok(BridgeEvent::Transcript { .. } | BridgeEvent::TurnComplete) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "output fell behind; some outcomes not printed")
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn follow(client: &ScoreboardClient) -> Result<()> {
    let mut events = client.subscribe_events().await?;
    while let Some(event) = events.next().await {
        match event? {
            ScoreEvent::Snapshot { snapshot } => {
                print_view(&ScoreboardView::from_state(&snapshot.state));
            }
            ScoreEvent::InningsUpdated { snapshot, effect } => {
                println!("--- #{}", snapshot.seq);
                describe(&effect);
                print_view(&ScoreboardView::from_state(&snapshot.state));
            }
            ScoreEvent::InningsEnded { snapshot } => {
                println!(
                    "=== innings complete: {} in {} overs",
                    snapshot.state.score_line(),
                    snapshot.state.overs_line()
                );
            }
            ScoreEvent::Error(error) => warn!(code = ?error.code, message = %error.message, "server error"),
        }
    }
    Ok(())
}
