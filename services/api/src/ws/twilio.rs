//! Twilio Media Streams protocol.
//!
//! Inbound frames are decoded once, at the socket boundary, into
//! [`StreamEvent`]; frames that fail to decode are logged and skipped.

use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{Stream, StreamExt, future, stream::SplitStream};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Events sent by Twilio over the media stream.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum StreamEvent {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },
    Start {
        start: StartMetadata,
    },
    Media {
        media: MediaPayload,
    },
    Stop {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
    },
    Mark {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartMetadata {
    pub stream_sid: String,
    pub call_sid: String,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

impl StartMetadata {
    /// The caller address passed through the `caller` stream parameter.
    pub fn caller(&self) -> &str {
        self.custom_parameters
            .get("caller")
            .map(String::as_str)
            .filter(|c| !c.is_empty())
            .unwrap_or("unknown")
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct MediaPayload {
    #[serde(default)]
    pub track: Option<String>,
    pub payload: String,
}

/// Commands sent to Twilio over the media stream.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum PlaybackCommand {
    /// Queue audio for playback on the call.
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    /// Discard all audio queued but not yet played.
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OutboundMedia {
    pub payload: String,
}

impl PlaybackCommand {
    pub fn media(stream_sid: &str, payload: String) -> Self {
        Self::Media {
            stream_sid: stream_sid.to_string(),
            media: OutboundMedia { payload },
        }
    }

    pub fn clear(stream_sid: &str) -> Self {
        Self::Clear {
            stream_sid: stream_sid.to_string(),
        }
    }
}

/// Decodes one text frame, logging and discarding malformed input.
pub fn decode(text: &str) -> Option<StreamEvent> {
    match serde_json::from_str(text) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "Skipping malformed telephony event");
            None
        }
    }
}

/// Serializes a command into a websocket text frame.
pub fn encode(command: PlaybackCommand) -> Result<Message> {
    let serialized = serde_json::to_string(&command)?;
    Ok(Message::Text(serialized.into()))
}

/// Adapts the telephony socket into a stream of decoded events.
///
/// The stream ends at the first close frame; transport errors are yielded.
pub fn events(
    socket_rx: SplitStream<WebSocket>,
) -> impl Stream<Item = Result<StreamEvent>> + Unpin {
    socket_rx
        .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => decode(text.as_str()).map(Ok),
                Ok(_) => None,
                Err(e) => Some(Err(anyhow::Error::from(e))),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_start_event() {
        let raw = r#"{
            "event": "start",
            "sequenceNumber": "1",
            "start": {
                "accountSid": "AC1",
                "streamSid": "MZ1",
                "callSid": "CA1",
                "tracks": ["inbound"],
                "mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1},
                "customParameters": {"caller": "+34600000000"}
            },
            "streamSid": "MZ1"
        }"#;

        match decode(raw) {
            Some(StreamEvent::Start { start }) => {
                assert_eq!(start.stream_sid, "MZ1");
                assert_eq!(start.call_sid, "CA1");
                assert_eq!(start.caller(), "+34600000000");
            }
            other => panic!("Expected start event, got {:?}", other),
        }
    }

    #[test]
    fn test_caller_defaults_when_not_passed() {
        let raw = r#"{"event":"start","start":{"streamSid":"MZ1","callSid":"CA1"}}"#;
        let Some(StreamEvent::Start { start }) = decode(raw) else {
            panic!("Expected start event");
        };
        assert_eq!(start.caller(), "unknown");
    }

    #[test]
    fn test_decode_media_and_stop() {
        let media = r#"{"event":"media","sequenceNumber":"3","media":{"track":"inbound","chunk":"1","timestamp":"5","payload":"f39/"},"streamSid":"MZ1"}"#;
        assert_eq!(
            decode(media),
            Some(StreamEvent::Media {
                media: MediaPayload {
                    track: Some("inbound".into()),
                    payload: "f39/".into(),
                }
            })
        );

        let stop = r#"{"event":"stop","sequenceNumber":"5","stop":{"callSid":"CA1"},"streamSid":"MZ1"}"#;
        assert_eq!(
            decode(stop),
            Some(StreamEvent::Stop {
                stream_sid: Some("MZ1".into())
            })
        );
    }

    #[test]
    fn test_unknown_event_kind_is_not_an_error() {
        assert_eq!(
            decode(r#"{"event":"dtmf","dtmf":{"digit":"1"}}"#),
            Some(StreamEvent::Unknown)
        );
    }

    #[test]
    fn test_malformed_frames_are_skipped() {
        assert_eq!(decode("not json"), None);
        assert_eq!(decode(r#"{"event":"media","media":{}}"#), None);
    }

    #[test]
    fn test_encode_playback_commands() {
        let media = serde_json::to_value(PlaybackCommand::media("MZ1", "AAA=".into())).unwrap();
        assert_eq!(
            media,
            serde_json::json!({"event": "media", "streamSid": "MZ1", "media": {"payload": "AAA="}})
        );

        let clear = serde_json::to_value(PlaybackCommand::clear("MZ1")).unwrap();
        assert_eq!(clear, serde_json::json!({"event": "clear", "streamSid": "MZ1"}));
    }
}
