//! Client side of the scorer: an HTTP/WebSocket client for the server and a
//! bridge that feeds a speech session's function calls into it.

use futures::{stream::BoxStream, StreamExt};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::ScoreCommand,
    error::ApiError,
    protocol::{
        CommandResponse, FunctionCall, FunctionCallResponse, InningsSnapshot, LimitRequest,
        NewInningsRequest, ScoreEvent, SpeechToolsResponse,
    },
};
use thiserror::Error;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

pub mod bridge;

pub use bridge::{tool_response_for, BridgeEvent, SpeechBridge};

/// Rendered scoreboard as served by `/innings/view`.
pub use scoring::ScoreboardView;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("server url must start with http:// or https://, got `{0}`")]
    UnsupportedScheme(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server rejected request ({status}): {}", .error.message)]
    Api { status: u16, error: ApiError },
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("malformed server payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::WebSocket(Box::new(value))
    }
}

impl ClientError {
    /// The server's error body, when the server answered with one.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            ClientError::Api { error, .. } => Some(error),
            _ => None,
        }
    }
}

pub type EventStream = BoxStream<'static, Result<ScoreEvent, ClientError>>;

#[derive(Debug, Clone)]
pub struct ScoreboardClient {
    http: Client,
    server_url: Url,
}

impl ScoreboardClient {
    pub fn new(server_url: &str) -> Result<Self, ClientError> {
        Self::with_http_client(Client::new(), server_url)
    }

    pub fn with_http_client(http: Client, server_url: &str) -> Result<Self, ClientError> {
        let mut server_url = Url::parse(server_url.trim())?;
        if !matches!(server_url.scheme(), "http" | "https") {
            return Err(ClientError::UnsupportedScheme(server_url.to_string()));
        }
        if !server_url.path().ends_with('/') {
            let path = format!("{}/", server_url.path());
            server_url.set_path(&path);
        }
        Ok(Self { http, server_url })
    }

    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.server_url.join(path.trim_start_matches('/'))?)
    }

    /// `ws://` or `wss://` address of the live event stream.
    pub fn ws_url(&self) -> Result<Url, ClientError> {
        let mut url = self.endpoint("ws")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| ClientError::UnsupportedScheme(url.to_string()))?;
        Ok(url)
    }

    pub async fn health(&self) -> Result<(), ClientError> {
        let response = self.http.get(self.endpoint("healthz")?).send().await?;
        check(response).await.map(|_| ())
    }

    pub async fn snapshot(&self) -> Result<InningsSnapshot, ClientError> {
        self.get_json("innings").await
    }

    pub async fn view(&self) -> Result<ScoreboardView, ClientError> {
        self.get_json("innings/view").await
    }

    pub async fn speech_tools(&self) -> Result<SpeechToolsResponse, ClientError> {
        self.get_json("speech/tools").await
    }

    pub async fn history(&self, limit: Option<u32>) -> Result<Vec<InningsSnapshot>, ClientError> {
        let mut url = self.endpoint("innings/history")?;
        if let Some(limit) = limit {
            url.query_pairs_mut()
                .append_pair("limit", &limit.to_string());
        }
        let response = self.http.get(url).send().await?;
        read_json(response).await
    }

    pub async fn submit(&self, command: &ScoreCommand) -> Result<CommandResponse, ClientError> {
        self.post_json("innings/commands", command).await
    }

    pub async fn function_call(
        &self,
        call: &FunctionCall,
    ) -> Result<FunctionCallResponse, ClientError> {
        self.post_json("innings/function_calls", call).await
    }

    pub async fn new_innings(
        &self,
        overs_limit: Option<u32>,
    ) -> Result<CommandResponse, ClientError> {
        self.post_json("innings/new", &NewInningsRequest { overs_limit })
            .await
    }

    pub async fn set_wickets_limit(&self, limit: u32) -> Result<CommandResponse, ClientError> {
        self.post_json("innings/wickets_limit", &LimitRequest { limit })
            .await
    }

    pub async fn set_overs_limit(&self, limit: u32) -> Result<CommandResponse, ClientError> {
        self.post_json("innings/overs_limit", &LimitRequest { limit })
            .await
    }

    /// Live events, starting with the current snapshot. Ends when the server
    /// closes the socket.
    pub async fn subscribe_events(&self) -> Result<EventStream, ClientError> {
        let ws_url = self.ws_url()?;
        let (ws_stream, _) = connect_async(ws_url.as_str()).await?;
        debug!(%ws_url, "subscribed to score events");
        let (_, ws_reader) = ws_stream.split();

        Ok(ws_reader
            .filter_map(|msg| async move {
                match msg {
                    Ok(Message::Text(text)) => {
                        Some(serde_json::from_str::<ScoreEvent>(&text).map_err(ClientError::from))
                    }
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "score event stream closed by server");
                        None
                    }
                    Ok(_) => None,
                    Err(err) => {
                        warn!(error = %err, "score event stream failed");
                        Some(Err(ClientError::from(err)))
                    }
                }
            })
            .boxed())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.http.get(self.endpoint(path)?).send().await?;
        read_json(response).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.endpoint(path)?)
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }
}

async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let error = serde_json::from_str::<ApiError>(&body).unwrap_or_else(|_| {
        ApiError::new(
            shared::error::ErrorCode::Internal,
            if body.is_empty() {
                status.to_string()
            } else {
                body
            },
        )
    });
    Err(ClientError::Api {
        status: status.as_u16(),
        error,
    })
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let bytes = check(response).await?.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
