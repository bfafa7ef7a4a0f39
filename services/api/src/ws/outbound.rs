//! AI → telephony leg of the bridge.
//!
//! Events are handled strictly in arrival order, one at a time. Barge-in runs
//! inline, so nothing from the canceled response can be forwarded until both
//! the clear and the cancel have gone out.

use super::{
    interrupt::{ResponseTracker, barge_in},
    realtime::{ClientEvent, ServerEvent},
    session::RelayExit,
    twilio::PlaybackCommand,
};
use crate::audio::normalize_payload;
use anyhow::Result;
use chrono::Utc;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};
use voxbridge_core::{CallSession, TurnReconstructor};

pub async fn relay<B, P, A>(
    mut events: B,
    playback: &mut P,
    backend: &Mutex<A>,
    call: &CallSession,
    turns: &mut TurnReconstructor,
) -> Result<RelayExit>
where
    B: Stream<Item = Result<ServerEvent>> + Unpin,
    P: Sink<PlaybackCommand, Error = anyhow::Error> + Unpin,
    A: Sink<ClientEvent, Error = anyhow::Error> + Unpin,
{
    let mut responses = ResponseTracker::default();

    while let Some(event) = events.next().await {
        match event? {
            ServerEvent::SessionCreated { session } => {
                if let Some(id) = session.id {
                    tracing::Span::current().record("backend_session", id.as_str());
                    if !call.set_backend_session(id) {
                        warn!("Backend reported a second session id; keeping the first");
                    }
                }
                info!(model = ?session.model, "Realtime session created");
            }
            ServerEvent::SessionUpdated { .. } => {
                info!("Realtime session configuration acknowledged");
            }
            ServerEvent::ResponseCreated { response } => {
                debug!(response_id = ?response.id, "Response started");
                responses.started(response.id);
            }
            ServerEvent::AudioDelta { response_id, delta } => {
                responses.observe(response_id.as_deref());
                if !responses.should_forward(response_id.as_deref()) {
                    trace!(?response_id, "Dropping audio from a canceled response");
                    continue;
                }
                let Some(stream_sid) = call.stream_sid() else {
                    debug!("Dropping audio received before the media stream started");
                    continue;
                };
                match normalize_payload(&delta) {
                    Ok((payload, _)) => {
                        playback
                            .send(PlaybackCommand::media(stream_sid, payload))
                            .await?;
                    }
                    Err(e) => warn!(error = %e, "Dropping undecodable audio frame"),
                }
            }
            ServerEvent::TranscriptionCompleted { transcript } => {
                info!(transcript = %transcript, "User transcript completed");
                turns.record_user_transcript(transcript);
            }
            ServerEvent::ResponseDone { response } => {
                responses.finished(response.id.as_deref());
                match response.assistant_transcript() {
                    Some(transcript) => {
                        let turn = turns.record_ai_transcript(transcript.to_string(), Utc::now());
                        info!(
                            user = %turn.user_text,
                            ai = %turn.ai_text,
                            greeting = turn.is_greeting(),
                            "Turn committed"
                        );
                    }
                    None => debug!(
                        response_id = ?response.id,
                        status = ?response.status,
                        "Response finished without a transcript"
                    ),
                }
            }
            ServerEvent::SpeechStarted { audio_start_ms } => {
                debug!(audio_start_ms, "Speech started");
                barge_in(&mut *playback, backend, call, &mut responses).await?;
            }
            ServerEvent::SpeechStopped { audio_end_ms } => {
                debug!(audio_end_ms, "Speech stopped");
            }
            ServerEvent::Error { error } => {
                warn!(
                    error_type = ?error.error_type,
                    code = ?error.code,
                    message = %error.message,
                    "Realtime backend reported an error"
                );
            }
            ServerEvent::Unknown => trace!("Ignoring realtime event"),
        }
    }

    info!("Realtime backend closed the connection");
    Ok(RelayExit::BackendClosed)
}
