use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{ws::Message, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use scoring::ScoreboardView;
use serde::Deserialize;
use shared::{
    domain::ScoreCommand,
    error::ApiError,
    protocol::{
        CommandResponse, FunctionCall, FunctionCallResponse, InningsSnapshot, LimitRequest,
        NewInningsRequest, ScoreEvent, SpeechToolsResponse,
    },
};
use storage::{SnapshotStore, Storage};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;
mod scorekeeper;

use api::{status_for, ApiContext};
use app_state::AppState;
use config::{load_settings, prepare_database_url};

const MAX_BODY_BYTES: usize = 64 * 1024;

type HttpError = (StatusCode, Json<ApiError>);

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            error = %format!("{error:#}"),
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let initial = scorekeeper::resume_or_start(
        &storage,
        settings.session_id,
        settings.overs_limit,
        settings.wickets_limit,
    )
    .await?;

    let store: Arc<dyn SnapshotStore> = Arc::new(storage);
    let (events, _) = broadcast::channel(256);
    let (scorekeeper, _task) = scorekeeper::spawn(
        store.clone(),
        initial,
        settings.command_queue_depth,
        events.clone(),
    );

    let state = AppState {
        api: ApiContext { scorekeeper, store },
        events,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "scorer listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/innings", get(get_innings))
        .route("/innings/view", get(get_view))
        .route("/innings/commands", post(post_command))
        .route("/innings/function_calls", post(post_function_call))
        .route("/innings/new", post(post_new_innings))
        .route("/innings/wickets_limit", post(post_wickets_limit))
        .route("/innings/overs_limit", post(post_overs_limit))
        .route("/innings/history", get(get_history))
        .route("/speech/tools", get(get_speech_tools))
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

fn http_error(err: ApiError) -> HttpError {
    (status_for(err.code), Json(err))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    api::health(&state.api).await.map_err(http_error)?;
    Ok("ok")
}

async fn get_innings(State(state): State<Arc<AppState>>) -> Json<InningsSnapshot> {
    Json(api::current_snapshot(&state.api))
}

async fn get_view(State(state): State<Arc<AppState>>) -> Json<ScoreboardView> {
    Json(api::scoreboard_view(&state.api))
}

async fn get_speech_tools() -> Json<SpeechToolsResponse> {
    Json(api::speech_tools())
}

async fn post_command(
    State(state): State<Arc<AppState>>,
    Json(command): Json<ScoreCommand>,
) -> Result<Json<CommandResponse>, HttpError> {
    let response = api::submit_command(&state.api, command)
        .await
        .map_err(http_error)?;
    Ok(Json(response))
}

async fn post_function_call(
    State(state): State<Arc<AppState>>,
    Json(call): Json<FunctionCall>,
) -> Result<Json<FunctionCallResponse>, HttpError> {
    let name = call.name.clone();
    let response = api::submit_function_call(&state.api, call)
        .await
        .map_err(|err| {
            warn!(function = %name, code = ?err.code, message = %err.message, "function call rejected");
            http_error(err)
        })?;
    Ok(Json(response))
}

async fn post_new_innings(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NewInningsRequest>,
) -> Result<Json<CommandResponse>, HttpError> {
    let response = api::new_innings(&state.api, request)
        .await
        .map_err(http_error)?;
    Ok(Json(response))
}

async fn post_wickets_limit(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LimitRequest>,
) -> Result<Json<CommandResponse>, HttpError> {
    let response = api::set_wickets_limit(&state.api, request.limit)
        .await
        .map_err(http_error)?;
    Ok(Json(response))
}

async fn post_overs_limit(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LimitRequest>,
) -> Result<Json<CommandResponse>, HttpError> {
    let response = api::set_overs_limit(&state.api, request.limit)
        .await
        .map_err(http_error)?;
    Ok(Json(response))
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<InningsSnapshot>>, HttpError> {
    let history = api::snapshot_history(&state.api, q.limit)
        .await
        .map_err(http_error)?;
    Ok(Json(history))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: axum::extract::ws::WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    // Subscribe before reading the snapshot so nothing falls in between.
    let mut events = BroadcastStream::new(state.events.subscribe());
    let first = ScoreEvent::Snapshot {
        snapshot: api::current_snapshot(&state.api),
    };

    let api = state.api.clone();
    let send_task = tokio::spawn(async move {
        let mut last_seq = match send_event(&mut sender, &first).await {
            Ok(()) => first.snapshot().map(|s| s.seq).unwrap_or_default(),
            Err(()) => return,
        };

        while let Some(item) = events.next().await {
            let event = match item {
                Ok(event) => event,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    debug!(skipped, "websocket subscriber lagged; resending snapshot");
                    ScoreEvent::Snapshot {
                        snapshot: api::current_snapshot(&api),
                    }
                }
            };
            if let Some(snapshot) = event.snapshot() {
                if snapshot.seq < last_seq {
                    continue;
                }
                last_seq = snapshot.seq;
            }
            if send_event(&mut sender, &event).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
}

async fn send_event<S>(sender: &mut S, event: &ScoreEvent) -> Result<(), ()>
where
    S: futures::Sink<Message> + Unpin,
{
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(error) => {
            warn!(%error, "failed to encode score event");
            return Ok(());
        }
    };
    sender.send(Message::Text(text)).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
