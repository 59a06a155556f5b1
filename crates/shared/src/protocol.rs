use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{InningsState, SessionId, TransitionEffect},
    error::ApiError,
};

/// A named function invocation emitted by the speech service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Declaration of a callable function, registered with the speech service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechToolsResponse {
    pub system_instruction: String,
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InningsSnapshot {
    pub session_id: SessionId,
    pub seq: i64,
    pub state: InningsState,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub snapshot: InningsSnapshot,
    pub effect: TransitionEffect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub snapshot: InningsSnapshot,
    pub effect: TransitionEffect,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewInningsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overs_limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitRequest {
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub snapshot_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ScoreEvent {
    /// Sent once to every new subscriber.
    Snapshot {
        snapshot: InningsSnapshot,
    },
    InningsUpdated {
        snapshot: InningsSnapshot,
        effect: TransitionEffect,
    },
    InningsEnded {
        snapshot: InningsSnapshot,
    },
    Error(ApiError),
}

impl ScoreEvent {
    pub fn snapshot(&self) -> Option<&InningsSnapshot> {
        match self {
            ScoreEvent::Snapshot { snapshot }
            | ScoreEvent::InningsUpdated { snapshot, .. }
            | ScoreEvent::InningsEnded { snapshot } => Some(snapshot),
            ScoreEvent::Error(_) => None,
        }
    }
}
