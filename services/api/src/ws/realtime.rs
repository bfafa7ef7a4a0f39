//! OpenAI Realtime protocol, limited to the events the bridge sends or acts on.
//!
//! Server events outside that set decode to [`ServerEvent::Unknown`].

use anyhow::Result;
use futures_util::{Stream, StreamExt, future};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::warn;

// --- Client events ---

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
    #[serde(rename = "response.create")]
    ResponseCreate,
    #[serde(rename = "response.cancel")]
    ResponseCancel,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub voice: String,
    pub instructions: String,
    pub modalities: Vec<String>,
    pub temperature: f32,
    pub turn_detection: TurnDetection,
    pub input_audio_transcription: InputAudioTranscription,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnDetection {
    ServerVad {
        threshold: f32,
        prefix_padding_ms: u32,
        silence_duration_ms: u32,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct InputAudioTranscription {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    pub item_type: String,
    pub role: String,
    pub content: Vec<InputContent>,
}

impl ConversationItem {
    /// A user message made of a single text part.
    pub fn user_text(text: &str) -> Self {
        Self {
            item_type: "message".to_string(),
            role: "user".to_string(),
            content: vec![InputContent {
                content_type: "input_text".to_string(),
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct InputContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

// --- Server events ---

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated { session: SessionInfo },
    #[serde(rename = "session.updated")]
    SessionUpdated { session: SessionInfo },
    #[serde(rename = "response.created")]
    ResponseCreated { response: ResponseInfo },
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        #[serde(default)]
        response_id: Option<String>,
        delta: String,
    },
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted { transcript: String },
    #[serde(rename = "response.done")]
    ResponseDone { response: ResponseInfo },
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        #[serde(default)]
        audio_start_ms: u64,
    },
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        #[serde(default)]
        audio_end_ms: u64,
    },
    #[serde(rename = "error")]
    Error { error: ErrorDetail },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SessionInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ResponseInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

impl ResponseInfo {
    /// The assistant transcript: the first content entry, across all output
    /// items, that carries one.
    pub fn assistant_transcript(&self) -> Option<&str> {
        self.output
            .iter()
            .flat_map(|item| item.content.iter())
            .find_map(|part| part.transcript.as_deref())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct OutputItem {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Vec<OutputContent>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct OutputContent {
    #[serde(rename = "type", default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorDetail {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

/// Decodes one text frame, logging and discarding malformed input.
pub fn decode(text: &str) -> Option<ServerEvent> {
    match serde_json::from_str(text) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "Skipping malformed realtime event");
            None
        }
    }
}

/// Serializes a client event into a websocket text frame.
pub fn encode(event: ClientEvent) -> Result<WsMessage> {
    let serialized = serde_json::to_string(&event)?;
    Ok(WsMessage::Text(serialized.into()))
}

/// Adapts the backend socket into a stream of decoded events.
///
/// The stream ends at the first close frame; transport errors are yielded.
pub fn events<S, E>(socket_rx: S) -> impl Stream<Item = Result<ServerEvent>> + Unpin
where
    S: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: Into<anyhow::Error>,
{
    socket_rx
        .take_while(|msg| future::ready(!matches!(msg, Ok(WsMessage::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(WsMessage::Text(text)) => decode(text.as_str()).map(Ok),
                Ok(_) => None,
                Err(e) => Some(Err(Into::<anyhow::Error>::into(e))),
            })
        })
}
