//! Connection to the OpenAI Realtime websocket.

use crate::config::RealtimeConfig;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, client::IntoClientRequest, http::StatusCode},
};
use tracing::info;

pub type BackendSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Websocket close reasons are limited to 123 bytes.
const MAX_CLOSE_REASON: usize = 123;

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("realtime backend rejected the credentials (HTTP {0})")]
    Unauthorized(StatusCode),
    #[error("realtime backend connection failed: {0}")]
    Transport(tungstenite::Error),
    #[error("invalid realtime request: {0}")]
    Request(String),
}

impl From<tungstenite::Error> for ConnectError {
    fn from(err: tungstenite::Error) -> Self {
        match &err {
            tungstenite::Error::Http(response)
                if matches!(
                    response.status(),
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
                ) =>
            {
                ConnectError::Unauthorized(response.status())
            }
            _ => ConnectError::Transport(err),
        }
    }
}

impl ConnectError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ConnectError::Unauthorized(_))
    }

    /// Reason sent to the telephony client when the call is dropped.
    pub fn close_reason(&self) -> String {
        let reason = match self {
            ConnectError::Unauthorized(_) => "AI backend unauthorized".to_string(),
            other => format!("AI backend connection failed: {}", other),
        };
        truncate_on_char_boundary(reason, MAX_CLOSE_REASON)
    }
}

fn truncate_on_char_boundary(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

/// Opens the realtime websocket. One attempt; no retry.
pub async fn connect(config: &RealtimeConfig) -> Result<BackendSocket, ConnectError> {
    let mut request = config
        .endpoint()
        .into_client_request()
        .map_err(|e| ConnectError::Request(e.to_string()))?;
    let authorization = format!("Bearer {}", config.api_key)
        .parse()
        .map_err(|_| ConnectError::Request("API key is not a valid header value".into()))?;
    request.headers_mut().insert("Authorization", authorization);
    request
        .headers_mut()
        .insert("OpenAI-Beta", tungstenite::http::HeaderValue::from_static("realtime=v1"));

    let (socket, _) = connect_async(request).await?;
    info!(model = %config.model, "Connected to OpenAI Realtime API.");
    Ok(socket)
}
