use std::sync::Arc;

use anyhow::{anyhow, Context};
use serde_json::{json, Value};
use shared::protocol::{FunctionCall, FunctionCallResponse};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use voice_integration::{
    SpeechEvent, SpeechSession, SpeechSessionConnector, SpeechSessionOptions, ToolResponse,
};

use crate::{ClientError, ScoreboardClient};

#[derive(Debug, Clone)]
pub enum BridgeEvent {
    Transcript { text: String, is_final: bool },
    Applied {
        call: FunctionCall,
        response: FunctionCallResponse,
    },
    Rejected { call: FunctionCall, error: String },
    TurnComplete,
    Closed { reason: String },
}

/// Forwards a speech session's function calls to the scorer, one at a time
/// and in arrival order, and answers each call on the session.
///
/// Outcomes are re-published on a broadcast channel; a subscriber that falls
/// behind loses outcomes, never deliveries.
pub struct SpeechBridge {
    client: ScoreboardClient,
    session: Arc<dyn SpeechSession>,
    session_events: mpsc::Receiver<SpeechEvent>,
    events: broadcast::Sender<BridgeEvent>,
}

impl SpeechBridge {
    /// Fails if another consumer already took the session's events.
    pub fn new(client: ScoreboardClient, session: Arc<dyn SpeechSession>) -> anyhow::Result<Self> {
        let session_events = session
            .take_events()
            .ok_or_else(|| anyhow!("speech session events are already being consumed"))?;
        let (events, _) = broadcast::channel(256);
        Ok(Self {
            client,
            session,
            session_events,
            events,
        })
    }

    /// Opens a session registered with the scorer's published function
    /// declarations.
    pub async fn connect(
        client: ScoreboardClient,
        connector: &dyn SpeechSessionConnector,
        model: &str,
    ) -> anyhow::Result<Self> {
        let tools = client
            .speech_tools()
            .await
            .context("failed to fetch speech tools from scorer")?;
        let session = connector
            .connect(SpeechSessionOptions {
                model: model.to_string(),
                system_instruction: tools.system_instruction,
                function_declarations: tools.function_declarations,
            })
            .await
            .context("failed to open speech session")?;
        info!(model, "speech session connected");
        Self::new(client, session)
    }

    pub fn session(&self) -> Arc<dyn SpeechSession> {
        Arc::clone(&self.session)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    /// Runs until the session reports `Closed` or its event channel shuts.
    pub async fn run(mut self) -> anyhow::Result<()> {
        while let Some(event) = self.session_events.recv().await {
            let bridged = match event {
                SpeechEvent::Transcript { text, is_final } => {
                    BridgeEvent::Transcript { text, is_final }
                }
                SpeechEvent::FunctionCall(call) => self.handle_call(call).await?,
                SpeechEvent::TurnComplete => BridgeEvent::TurnComplete,
                SpeechEvent::Closed { reason } => {
                    info!(%reason, "speech session closed");
                    let _ = self.events.send(BridgeEvent::Closed { reason });
                    return Ok(());
                }
            };
            let _ = self.events.send(bridged);
        }
        Ok(())
    }

    async fn handle_call(&self, call: FunctionCall) -> anyhow::Result<BridgeEvent> {
        let result = self.client.function_call(&call).await;
        self.session
            .send_tool_response(ToolResponse {
                call_id: call.call_id.clone(),
                name: call.name.clone(),
                response: tool_response_for(&result),
            })
            .await
            .context("failed to answer function call")?;

        Ok(match result {
            Ok(response) => BridgeEvent::Applied { call, response },
            Err(err) => {
                warn!(function = %call.name, error = %err, "function call rejected by scorer");
                BridgeEvent::Rejected {
                    call,
                    error: rejection_message(&err),
                }
            }
        })
    }
}

/// Body of the tool response sent back to the speech service.
pub fn tool_response_for(result: &Result<FunctionCallResponse, ClientError>) -> Value {
    match result {
        Ok(response) => json!({
            "ok": true,
            "score": response.snapshot.state.score_line(),
            "overs": response.snapshot.state.overs_line(),
        }),
        Err(err) => json!({
            "ok": false,
            "error": rejection_message(err),
        }),
    }
}

fn rejection_message(err: &ClientError) -> String {
    err.api_error()
        .map(|api| api.message.clone())
        .unwrap_or_else(|| err.to_string())
}
