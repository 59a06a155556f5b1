//! Boundary to the remote speech-understanding service.
//!
//! The service itself lives outside this workspace. A connector opens a
//! session that accepts raw audio and emits transcripts and function calls;
//! the scorer answers each function call with a tool response.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use shared::protocol::{FunctionCall, FunctionDeclaration};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechSessionOptions {
    pub model: String,
    pub system_instruction: String,
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpeechEvent {
    Transcript { text: String, is_final: bool },
    FunctionCall(FunctionCall),
    TurnComplete,
    Closed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolResponse {
    pub call_id: Option<String>,
    pub name: String,
    pub response: Value,
}

#[async_trait]
pub trait SpeechSession: Send + Sync {
    /// 16-bit little-endian PCM, mono.
    async fn send_audio(&self, pcm: &[u8]) -> anyhow::Result<()>;
    async fn send_tool_response(&self, response: ToolResponse) -> anyhow::Result<()>;
    async fn close(&self) -> anyhow::Result<()>;
    /// Hands out the session's event queue. Events are delivered to exactly
    /// one consumer, in order, so only the first call returns `Some`.
    fn take_events(&self) -> Option<mpsc::Receiver<SpeechEvent>>;
}

#[async_trait]
pub trait SpeechSessionConnector: Send + Sync {
    async fn connect(&self, options: SpeechSessionOptions)
        -> anyhow::Result<Arc<dyn SpeechSession>>;
}

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// A session fed from inside the process.
///
/// Events pushed with [`LoopbackSession::push`] reach the consumer as if the
/// remote service had sent them; tool responses are kept for inspection.
/// `push` waits while the queue is full.
pub struct LoopbackSession {
    options: SpeechSessionOptions,
    events: mpsc::Sender<SpeechEvent>,
    receiver: Mutex<Option<mpsc::Receiver<SpeechEvent>>>,
    responses: Mutex<Vec<ToolResponse>>,
    audio_bytes: Mutex<usize>,
}

impl LoopbackSession {
    pub fn new(options: SpeechSessionOptions) -> Self {
        Self::with_capacity(options, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(options: SpeechSessionOptions, capacity: usize) -> Self {
        let (events, receiver) = mpsc::channel(capacity.max(1));
        Self {
            options,
            events,
            receiver: Mutex::new(Some(receiver)),
            responses: Mutex::new(Vec::new()),
            audio_bytes: Mutex::new(0),
        }
    }

    pub fn options(&self) -> &SpeechSessionOptions {
        &self.options
    }

    /// Fails once the consumer has dropped its receiver.
    pub async fn push(&self, event: SpeechEvent) -> anyhow::Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| anyhow::anyhow!("speech event consumer has gone away"))
    }

    pub fn tool_responses(&self) -> Vec<ToolResponse> {
        self.responses
            .lock()
            .map(|responses| responses.clone())
            .unwrap_or_default()
    }

    pub fn audio_bytes_received(&self) -> usize {
        self.audio_bytes.lock().map(|n| *n).unwrap_or_default()
    }
}

#[async_trait]
impl SpeechSession for LoopbackSession {
    async fn send_audio(&self, pcm: &[u8]) -> anyhow::Result<()> {
        let mut total = self
            .audio_bytes
            .lock()
            .map_err(|_| anyhow::anyhow!("audio counter poisoned"))?;
        *total += pcm.len();
        Ok(())
    }

    async fn send_tool_response(&self, response: ToolResponse) -> anyhow::Result<()> {
        self.responses
            .lock()
            .map_err(|_| anyhow::anyhow!("tool response log poisoned"))?
            .push(response);
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        // A consumer that already left has nothing to be told.
        let _ = self
            .push(SpeechEvent::Closed {
                reason: "closed locally".to_string(),
            })
            .await;
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::Receiver<SpeechEvent>> {
        self.receiver.lock().ok().and_then(|mut receiver| receiver.take())
    }
}

/// Hands out [`LoopbackSession`]s and remembers the last one.
pub struct LoopbackConnector {
    capacity: usize,
    last: Mutex<Option<Arc<LoopbackSession>>>,
}

impl Default for LoopbackConnector {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl LoopbackConnector {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            last: Mutex::new(None),
        }
    }

    pub fn last_session(&self) -> Option<Arc<LoopbackSession>> {
        self.last.lock().ok().and_then(|last| last.clone())
    }
}

#[async_trait]
impl SpeechSessionConnector for LoopbackConnector {
    async fn connect(
        &self,
        options: SpeechSessionOptions,
    ) -> anyhow::Result<Arc<dyn SpeechSession>> {
        let session = Arc::new(LoopbackSession::with_capacity(options, self.capacity));
        *self
            .last
            .lock()
            .map_err(|_| anyhow::anyhow!("connector state poisoned"))? = Some(session.clone());
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options() -> SpeechSessionOptions {
        SpeechSessionOptions {
            model: "test-model".to_string(),
            system_instruction: "score the innings".to_string(),
            function_declarations: Vec::new(),
        }
    }

    #[tokio::test]
    async fn loopback_delivers_pushed_events_to_the_consumer() {
        let connector = LoopbackConnector::default();
        let session = connector.connect(options()).await.expect("connect");
        let mut events = session.take_events().expect("events");
        assert!(session.take_events().is_none());

        let loopback = connector.last_session().expect("session kept");
        assert_eq!(loopback.options().model, "test-model");
        loopback
            .push(SpeechEvent::FunctionCall(FunctionCall {
                call_id: Some("c1".to_string()),
                name: "add_runs".to_string(),
                args: json!({ "runs": 4 }),
            }))
            .await
            .expect("push");

        match events.recv().await.expect("event") {
            SpeechEvent::FunctionCall(call) => assert_eq!(call.name, "add_runs"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn loopback_records_tool_responses_and_audio() {
        let session = LoopbackSession::new(options());
        session.send_audio(&[0u8; 320]).await.expect("audio");
        session
            .send_tool_response(ToolResponse {
                call_id: None,
                name: "clear_last_ball".to_string(),
                response: json!({ "ok": true }),
            })
            .await
            .expect("response");

        assert_eq!(session.audio_bytes_received(), 320);
        assert_eq!(session.tool_responses().len(), 1);
    }

    #[tokio::test]
    async fn close_emits_closed_event() {
        let session = LoopbackSession::new(options());
        let mut events = session.take_events().expect("events");
        session.close().await.expect("close");
        assert!(matches!(
            events.recv().await.expect("event"),
            SpeechEvent::Closed { .. }
        ));
    }

    #[tokio::test]
    async fn push_waits_for_the_consumer_instead_of_dropping() {
        let session = Arc::new(LoopbackSession::with_capacity(options(), 2));
        let mut events = session.take_events().expect("events");

        let producer = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                for n in 0..10 {
                    session
                        .push(SpeechEvent::Transcript {
                            text: n.to_string(),
                            is_final: true,
                        })
                        .await
                        .expect("push");
                }
            })
        };

        let mut seen = Vec::new();
        while seen.len() < 10 {
            match events.recv().await.expect("event") {
                SpeechEvent::Transcript { text, .. } => seen.push(text),
                other => panic!("unexpected event {other:?}"),
            }
        }
        producer.await.expect("producer");
        let expected: Vec<String> = (0..10).map(|n: i32| n.to_string()).collect();
        assert_eq!(seen, expected);

        drop(events);
        assert!(session.push(SpeechEvent::TurnComplete).await.is_err());
    }
}
