//! Barge-in: when the caller starts talking over the assistant, stop playback
//! on the call and cancel the response that is still being generated.

use super::{realtime::ClientEvent, twilio::PlaybackCommand};
use anyhow::Result;
use futures_util::{Sink, SinkExt};
use tokio::sync::Mutex;
use tracing::{debug, info};
use voxbridge_core::CallSession;

/// Which assistant response is currently playing, and which one was last
/// canceled so its late audio deltas can be dropped.
#[derive(Debug, Default)]
pub struct ResponseTracker {
    active: Option<String>,
    canceled: Option<String>,
}

impl ResponseTracker {
    pub fn started(&mut self, response_id: Option<String>) {
        if response_id.is_some() && response_id != self.canceled {
            self.active = response_id;
        }
    }

    /// Adopts the id carried by an audio delta when `response.created` was missed.
    pub fn observe(&mut self, response_id: Option<&str>) {
        if self.active.is_none() && response_id.is_some() && response_id != self.canceled.as_deref()
        {
            self.active = response_id.map(str::to_string);
        }
    }

    pub fn finished(&mut self, response_id: Option<&str>) {
        if response_id.is_none() || self.active.as_deref() == response_id {
            self.active = None;
        }
    }

    /// Marks the active response as canceled, returning its id.
    pub fn cancel_active(&mut self) -> Option<String> {
        let active = self.active.take();
        if active.is_some() {
            self.canceled = active.clone();
        }
        active
    }

    /// Whether audio belonging to `response_id` should still reach the caller.
    pub fn should_forward(&self, response_id: Option<&str>) -> bool {
        match (response_id, self.canceled.as_deref()) {
            (Some(id), Some(canceled)) => id != canceled,
            _ => true,
        }
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }
}

/// Handles `speech_started`. The clear always goes out before the cancel.
///
/// Without a stream id there is nothing queued on the call, so only the cancel
/// is sent.
pub async fn barge_in<P, A>(
    playback: &mut P,
    backend: &Mutex<A>,
    call: &CallSession,
    tracker: &mut ResponseTracker,
) -> Result<()>
where
    P: Sink<PlaybackCommand, Error = anyhow::Error> + Unpin,
    A: Sink<ClientEvent, Error = anyhow::Error> + Unpin,
{
    match call.stream_sid() {
        Some(stream_sid) => playback.send(PlaybackCommand::clear(stream_sid)).await?,
        None => debug!("Speech started before the media stream began; nothing to clear"),
    }

    let canceled = tracker.cancel_active();
    backend.lock().await.send(ClientEvent::ResponseCancel).await?;
    info!(response_id = ?canceled, "Caller interrupted; playback cleared and response canceled");
    Ok(())
}
