//! Telephony → AI leg of the bridge.

use super::{
    initializer::{SessionSettings, trigger_greeting},
    realtime::ClientEvent,
    session::RelayExit,
    twilio::StreamEvent,
};
use anyhow::Result;
use futures_util::{Sink, SinkExt, Stream, StreamExt, future::BoxFuture};
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace, warn};
use voxbridge_core::{CallSession, CallStore, StreamIdentity};

/// The call-record insert, polled next to the event stream so a slow store
/// never holds back caller audio.
type Registration<'a> = Option<BoxFuture<'a, Result<i64>>>;

async fn registered(pending: &mut Registration<'_>) -> Result<i64> {
    match pending {
        Some(insert) => insert.await,
        None => futures_util::future::pending().await,
    }
}

fn log_registration(result: Result<i64>) {
    match result {
        Ok(id) => debug!(record_id = id, "Call record created"),
        Err(e) => error!(error = ?e, "Failed to create call record"),
    }
}

/// Forwards caller audio to the backend until the media stream stops.
///
/// Frames are appended one at a time, in arrival order, with the payload
/// untouched. A transport error on either socket ends the relay with `Err`.
/// An unfinished call-record insert is awaited before a clean return.
pub async fn relay<T, A>(
    mut events: T,
    backend: &Mutex<A>,
    call: &CallSession,
    store: &dyn CallStore,
    settings: &SessionSettings,
) -> Result<RelayExit>
where
    T: Stream<Item = Result<StreamEvent>> + Unpin,
    A: Sink<ClientEvent, Error = anyhow::Error> + Unpin,
{
    let mut registration: Registration<'_> = None;

    let exit = loop {
        let event = tokio::select! {
            result = registered(&mut registration), if registration.is_some() => {
                registration = None;
                log_registration(result);
                continue;
            }
            event = events.next() => event,
        };
        let Some(event) = event else {
            info!("Telephony client disconnected");
            break RelayExit::TelephonyDisconnected;
        };

        match event? {
            StreamEvent::Connected { protocol } => {
                debug!(?protocol, "Telephony media stream connected");
            }
            StreamEvent::Start { start } => {
                let caller = start.caller().to_string();
                let identity = StreamIdentity {
                    call_sid: start.call_sid,
                    stream_sid: start.stream_sid,
                    caller,
                };
                if let Err(duplicate) = call.bind(identity) {
                    warn!(stream_sid = %duplicate.stream_sid, "Ignoring repeated start event");
                    continue;
                }
                let Some(identity) = call.identity() else {
                    continue;
                };
                tracing::Span::current().record("call_sid", identity.call_sid.as_str());
                info!(
                    stream_sid = %identity.stream_sid,
                    caller = %identity.caller,
                    "Incoming stream has started"
                );

                trigger_greeting(backend, settings).await?;
                registration = Some(store.create_session(&identity.call_sid, &identity.caller));
            }
            StreamEvent::Media { media } => {
                backend
                    .lock()
                    .await
                    .send(ClientEvent::InputAudioBufferAppend {
                        audio: media.payload,
                    })
                    .await?;
            }
            StreamEvent::Stop { .. } => {
                info!("Telephony stream stopped");
                break RelayExit::TelephonyStopped;
            }
            StreamEvent::Mark { .. } | StreamEvent::Unknown => {
                trace!("Ignoring telephony event");
            }
        }
    };

    if let Some(insert) = registration.take() {
        log_registration(insert.await);
    }
    Ok(exit)
}
