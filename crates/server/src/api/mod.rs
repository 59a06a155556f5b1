use std::sync::Arc;

use axum::http::StatusCode;
use scoring::{command_from_call, validate_command, ScoreboardView};
use shared::{
    domain::{IgnoreReason, ScoreCommand, TransitionEffect},
    error::{ApiError, ApiException, ErrorCode},
    protocol::{
        CommandResponse, FunctionCall, FunctionCallResponse, InningsSnapshot, NewInningsRequest,
        SpeechToolsResponse,
    },
};
use storage::SnapshotStore;

use crate::scorekeeper::ScorekeeperHandle;

pub const DEFAULT_HISTORY_LIMIT: u32 = 20;
pub const MAX_HISTORY_LIMIT: u32 = 200;

#[derive(Clone)]
pub struct ApiContext {
    pub scorekeeper: ScorekeeperHandle,
    pub store: Arc<dyn SnapshotStore>,
}

pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn current_snapshot(ctx: &ApiContext) -> InningsSnapshot {
    ctx.scorekeeper.current()
}

pub fn scoreboard_view(ctx: &ApiContext) -> ScoreboardView {
    ScoreboardView::from_state(&ctx.scorekeeper.current().state)
}

pub fn speech_tools() -> SpeechToolsResponse {
    scoring::speech_tools()
}

pub async fn submit_command(
    ctx: &ApiContext,
    command: ScoreCommand,
) -> Result<CommandResponse, ApiError> {
    validate_command(&command).map_err(|err| ApiError::from(ApiException::from(err)))?;
    ctx.scorekeeper.submit(command).await
}

pub async fn submit_function_call(
    ctx: &ApiContext,
    call: FunctionCall,
) -> Result<FunctionCallResponse, ApiError> {
    let command =
        command_from_call(&call).map_err(|err| ApiError::from(ApiException::from(err)))?;
    let CommandResponse { snapshot, effect } = ctx.scorekeeper.submit(command).await?;
    Ok(FunctionCallResponse {
        call_id: call.call_id,
        snapshot,
        effect,
    })
}

pub async fn new_innings(
    ctx: &ApiContext,
    request: NewInningsRequest,
) -> Result<CommandResponse, ApiError> {
    if request.overs_limit == Some(0) {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "overs limit must be at least 1",
        ));
    }
    ctx.scorekeeper
        .submit(ScoreCommand::NewInnings {
            overs_limit: request.overs_limit,
        })
        .await
}

pub async fn set_wickets_limit(ctx: &ApiContext, limit: u32) -> Result<CommandResponse, ApiError> {
    ensure_limit(limit, "wickets")?;
    let response = ctx
        .scorekeeper
        .submit(ScoreCommand::SetWicketsLimit { limit })
        .await?;
    configured(response, "wickets")
}

pub async fn set_overs_limit(ctx: &ApiContext, limit: u32) -> Result<CommandResponse, ApiError> {
    ensure_limit(limit, "overs")?;
    let response = ctx.scorekeeper.set_overs_limit(limit).await?;
    configured(response, "overs")
}

pub async fn snapshot_history(
    ctx: &ApiContext,
    limit: Option<u32>,
) -> Result<Vec<InningsSnapshot>, ApiError> {
    let limit = limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let session_id = ctx.scorekeeper.current().session_id;
    ctx.store
        .snapshot_history(session_id, limit)
        .await
        .map_err(internal)
}

pub async fn health(ctx: &ApiContext) -> Result<(), ApiError> {
    ctx.store
        .health_check()
        .await
        .map_err(|err| ApiError::new(ErrorCode::Unavailable, format!("{err:#}")))
}

fn ensure_limit(limit: u32, what: &str) -> Result<(), ApiError> {
    if limit < 1 {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("{what} limit must be at least 1"),
        ));
    }
    Ok(())
}

fn configured(response: CommandResponse, what: &str) -> Result<CommandResponse, ApiError> {
    match response.effect {
        TransitionEffect::Ignored {
            reason: IgnoreReason::InningsStarted,
        } => Err(ApiError::new(
            ErrorCode::Conflict,
            format!("{what} limit cannot change once the innings has started"),
        )),
        TransitionEffect::Ignored {
            reason: IgnoreReason::InvalidLimit,
        } => Err(ApiError::new(
            ErrorCode::Validation,
            format!("{what} limit must be at least 1"),
        )),
        _ => Ok(response),
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, format!("{err:#}"))
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
