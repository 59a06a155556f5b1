//! Owner of the live innings.
//!
//! One task holds the only writable `InningsState`. Every change arrives on a
//! bounded queue and is applied in arrival order; readers get whole snapshots
//! from a `watch` channel and change notifications from a `broadcast` channel.

use std::sync::Arc;

use chrono::Utc;
use shared::{
    domain::{IgnoreReason, InningsState, ScoreCommand, SessionId, TransitionEffect},
    error::{ApiError, ErrorCode},
    protocol::{CommandResponse, InningsSnapshot, ScoreEvent},
};
use storage::{SnapshotStore, Storage};
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

type Reply = oneshot::Sender<Result<CommandResponse, ApiError>>;

enum Request {
    Apply { command: ScoreCommand, reply: Reply },
    SetOversLimit { limit: u32, reply: Reply },
}

#[derive(Clone)]
pub struct ScorekeeperHandle {
    requests: mpsc::Sender<Request>,
    snapshots: watch::Receiver<InningsSnapshot>,
    events: broadcast::Sender<ScoreEvent>,
}

impl ScorekeeperHandle {
    pub async fn submit(&self, command: ScoreCommand) -> Result<CommandResponse, ApiError> {
        self.request(|reply| Request::Apply { command, reply })
            .await
    }

    pub async fn set_overs_limit(&self, limit: u32) -> Result<CommandResponse, ApiError> {
        self.request(|reply| Request::SetOversLimit { limit, reply })
            .await
    }

    pub fn current(&self) -> InningsSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<InningsSnapshot> {
        self.snapshots.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScoreEvent> {
        self.events.subscribe()
    }

    async fn request(
        &self,
        build: impl FnOnce(Reply) -> Request,
    ) -> Result<CommandResponse, ApiError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(build(reply))
            .await
            .map_err(|_| stopped())?;
        response.await.map_err(|_| stopped())?
    }
}

fn stopped() -> ApiError {
    ApiError::new(ErrorCode::Unavailable, "scorekeeper is not running")
}

struct Scorekeeper {
    store: Arc<dyn SnapshotStore>,
    current: InningsSnapshot,
    snapshots: watch::Sender<InningsSnapshot>,
    events: broadcast::Sender<ScoreEvent>,
}

/// Starts the scorekeeper task from `initial`, which must already be persisted.
pub fn spawn(
    store: Arc<dyn SnapshotStore>,
    initial: InningsSnapshot,
    queue_depth: usize,
    events: broadcast::Sender<ScoreEvent>,
) -> (ScorekeeperHandle, JoinHandle<()>) {
    let (requests, mut inbox) = mpsc::channel(queue_depth.max(1));
    let (snapshots_tx, snapshots) = watch::channel(initial.clone());

    let mut keeper = Scorekeeper {
        store,
        current: initial,
        snapshots: snapshots_tx,
        events: events.clone(),
    };

    let task = tokio::spawn(async move {
        info!(
            session_id = keeper.current.session_id.0,
            seq = keeper.current.seq,
            "scorekeeper started"
        );
        while let Some(request) = inbox.recv().await {
            let (outcome, reply) = match request {
                Request::Apply { command, reply } => (keeper.apply(command).await, reply),
                Request::SetOversLimit { limit, reply } => {
                    (keeper.set_overs_limit(limit).await, reply)
                }
            };
            if reply.send(outcome).is_err() {
                debug!("caller went away before the reply");
            }
        }
        info!("scorekeeper stopped");
    });

    (
        ScorekeeperHandle {
            requests,
            snapshots,
            events,
        },
        task,
    )
}

impl Scorekeeper {
    async fn apply(&mut self, command: ScoreCommand) -> Result<CommandResponse, ApiError> {
        let transition = scoring::reduce(&self.current.state, &command);
        log_effect(command.name(), &transition.effect);
        self.commit(transition.state, transition.effect).await
    }

    async fn set_overs_limit(&mut self, limit: u32) -> Result<CommandResponse, ApiError> {
        let state = &self.current.state;
        let effect = if limit < 1 {
            TransitionEffect::Ignored {
                reason: IgnoreReason::InvalidLimit,
            }
        } else if state.has_started() {
            TransitionEffect::Ignored {
                reason: IgnoreReason::InningsStarted,
            }
        } else {
            TransitionEffect::Configured
        };
        log_effect("set_overs_limit", &effect);

        let mut next = state.clone();
        if effect == TransitionEffect::Configured {
            next.overs_limit = limit;
        }
        self.commit(next, effect).await
    }

    /// Publishes and persists a transition. Ignored commands leave `seq` alone.
    async fn commit(
        &mut self,
        state: InningsState,
        effect: TransitionEffect,
    ) -> Result<CommandResponse, ApiError> {
        if matches!(effect, TransitionEffect::Ignored { .. }) {
            return Ok(CommandResponse {
                snapshot: self.current.clone(),
                effect,
            });
        }

        let was_ended = self.current.state.innings_ended;
        let snapshot = InningsSnapshot {
            session_id: self.current.session_id,
            seq: self.current.seq + 1,
            state,
            updated_at: Utc::now(),
        };
        self.current = snapshot.clone();
        self.snapshots.send_replace(snapshot.clone());

        let _ = self.events.send(ScoreEvent::InningsUpdated {
            snapshot: snapshot.clone(),
            effect: effect.clone(),
        });
        if snapshot.state.innings_ended && !was_ended {
            info!(
                score = %snapshot.state.score_line(),
                overs = %snapshot.state.overs_line(),
                "innings ended"
            );
            let _ = self.events.send(ScoreEvent::InningsEnded {
                snapshot: snapshot.clone(),
            });
        }

        if let Err(error) = self.store.save_snapshot(&snapshot).await {
            error!(
                session_id = snapshot.session_id.0,
                seq = snapshot.seq,
                error = %format!("{error:#}"),
                "failed to persist innings snapshot"
            );
            return Err(ApiError::new(
                ErrorCode::Internal,
                format!("snapshot {} was applied but not saved", snapshot.seq),
            ));
        }

        Ok(CommandResponse { snapshot, effect })
    }
}

fn log_effect(command: &str, effect: &TransitionEffect) {
    match effect {
        TransitionEffect::Appended {
            ball,
            requested_ball: Some(requested),
        } => warn!(
            command,
            requested_ball = requested,
            ball,
            "ball number did not address a recorded delivery; appended instead"
        ),
        TransitionEffect::Dropped => warn!(
            command,
            "over already holds six legal balls; runs counted, delivery not shown"
        ),
        TransitionEffect::Ignored { reason } => info!(command, ?reason, "command ignored"),
        TransitionEffect::OverCompleted { over } => info!(command, over, "over completed"),
        other => debug!(command, effect = ?other, "command applied"),
    }
}

/// Resumes `session_id` when it exists, otherwise opens a fresh session with
/// the given limits and stores its first snapshot.
pub async fn resume_or_start(
    storage: &Storage,
    session_id: Option<SessionId>,
    overs_limit: u32,
    wickets_limit: u32,
) -> anyhow::Result<InningsSnapshot> {
    if let Some(session_id) = session_id {
        if storage.session_exists(session_id).await? {
            if let Some(snapshot) = storage.load_latest_snapshot(session_id).await? {
                info!(
                    session_id = session_id.0,
                    seq = snapshot.seq,
                    score = %snapshot.state.score_line(),
                    "resuming innings session"
                );
                return Ok(snapshot);
            }
            let snapshot = fresh_snapshot(session_id, overs_limit, wickets_limit);
            storage.save_snapshot(&snapshot).await?;
            return Ok(snapshot);
        }
        warn!(
            session_id = session_id.0,
            "configured session does not exist; starting a new one"
        );
    }

    let session_id = storage.create_session().await?;
    let snapshot = fresh_snapshot(session_id, overs_limit, wickets_limit);
    storage.save_snapshot(&snapshot).await?;
    info!(session_id = session_id.0, "started new innings session");
    Ok(snapshot)
}

fn fresh_snapshot(session_id: SessionId, overs_limit: u32, wickets_limit: u32) -> InningsSnapshot {
    InningsSnapshot {
        session_id,
        seq: 0,
        state: InningsState::new(overs_limit, wickets_limit),
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
#[path = "tests/scorekeeper_tests.rs"]
mod tests;
