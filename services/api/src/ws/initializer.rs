//! Realtime session setup: the one-time configuration and the greeting that
//! makes the assistant speak first.

use super::realtime::{
    ClientEvent, ConversationItem, InputAudioTranscription, SessionConfig, TurnDetection,
};
use crate::{audio::G711_ULAW, config::RealtimeConfig};
use anyhow::Result;
use futures_util::{Sink, SinkExt};
use tokio::sync::Mutex;
use tracing::info;

/// Everything needed to configure a realtime session, resolved at startup.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub instructions: String,
    pub voice: String,
    pub temperature: f32,
    pub vad_threshold: f32,
    pub vad_prefix_padding_ms: u32,
    pub vad_silence_duration_ms: u32,
    pub transcription_model: String,
    pub transcription_language: Option<String>,
    pub greeting_text: String,
}

impl SessionSettings {
    pub fn from_config(config: &RealtimeConfig, instructions: String) -> Self {
        Self {
            instructions,
            voice: config.voice.clone(),
            temperature: config.temperature,
            vad_threshold: config.vad.threshold,
            vad_prefix_padding_ms: config.vad.prefix_padding_ms,
            vad_silence_duration_ms: config.vad.silence_duration_ms,
            transcription_model: config.transcription_model.clone(),
            transcription_language: config.transcription_language.clone(),
            greeting_text: config.greeting_text.clone(),
        }
    }

    pub fn session_update(&self) -> ClientEvent {
        ClientEvent::SessionUpdate {
            session: SessionConfig {
                input_audio_format: G711_ULAW.to_string(),
                output_audio_format: G711_ULAW.to_string(),
                voice: self.voice.clone(),
                instructions: self.instructions.clone(),
                modalities: vec!["text".to_string(), "audio".to_string()],
                temperature: self.temperature,
                turn_detection: TurnDetection::ServerVad {
                    threshold: self.vad_threshold,
                    prefix_padding_ms: self.vad_prefix_padding_ms,
                    silence_duration_ms: self.vad_silence_duration_ms,
                },
                input_audio_transcription: InputAudioTranscription {
                    model: self.transcription_model.clone(),
                    language: self.transcription_language.clone(),
                },
            },
        }
    }

    /// The synthetic user turn and the response request that trigger the greeting.
    pub fn greeting(&self) -> [ClientEvent; 2] {
        [
            ClientEvent::ConversationItemCreate {
                item: ConversationItem::user_text(&self.greeting_text),
            },
            ClientEvent::ResponseCreate,
        ]
    }
}

/// Sends the session configuration. Must precede any audio.
pub async fn configure_session<A>(backend: &Mutex<A>, settings: &SessionSettings) -> Result<()>
where
    A: Sink<ClientEvent, Error = anyhow::Error> + Unpin,
{
    backend.lock().await.send(settings.session_update()).await?;
    info!(voice = %settings.voice, "Realtime session configuration sent");
    Ok(())
}

/// Injects the greeting. Both events go out under one lock so no audio frame
/// lands between them.
pub async fn trigger_greeting<A>(backend: &Mutex<A>, settings: &SessionSettings) -> Result<()>
where
    A: Sink<ClientEvent, Error = anyhow::Error> + Unpin,
{
    let mut backend = backend.lock().await;
    for event in settings.greeting() {
        backend.feed(event).await?;
    }
    backend.flush().await?;
    info!("Greeting requested from the assistant");
    Ok(())
}
