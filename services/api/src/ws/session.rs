//! Manages the lifetime of one bridged call, from the telephony handshake to
//! the final hand-off of the conversation to the store.

use super::{
    backend, inbound,
    initializer::{SessionSettings, configure_session},
    outbound,
    realtime::{self, ClientEvent, ServerEvent},
    twilio::{self, PlaybackCommand, StreamEvent},
};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use futures_util::{FutureExt, Sink, SinkExt, Stream, StreamExt, future};
use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use voxbridge_core::{CallSession, CallStore, TurnReconstructor, flush_call};

/// Why a relay returned without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayExit {
    /// Telephony sent `stop`.
    TelephonyStopped,
    /// The telephony socket closed without `stop`.
    TelephonyDisconnected,
    /// The realtime backend closed its socket.
    BackendClosed,
}

/// How a call session ended.
#[derive(Debug)]
pub enum SessionEnd {
    Completed(RelayExit),
    /// The session configuration could not be sent.
    SetupFailed(anyhow::Error),
    InboundFailed(anyhow::Error),
    OutboundFailed(anyhow::Error),
    /// A relay panicked; the payload message is kept.
    Panicked(String),
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(message) => *message,
        Err(panic) => match panic.downcast_ref::<&str>() {
            Some(message) => (*message).to_string(),
            None => "non-string panic payload".into(),
        },
    }
}

/// Axum handler to upgrade the Twilio media stream request to a WebSocket.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_media_stream(socket, state))
}

/// Bridges one telephony connection to a fresh realtime backend connection.
#[instrument(name = "call_session", skip_all, fields(call_sid, backend_session))]
async fn handle_media_stream(mut socket: WebSocket, state: Arc<AppState>) {
    info!("Telephony client connected");

    let backend = match backend::connect(&state.config.realtime).await {
        Ok(backend) => backend,
        Err(e) => {
            if e.is_unauthorized() {
                error!(error = %e, "Realtime backend rejected the API key; dropping call");
            } else {
                error!(error = %e, "Could not reach the realtime backend; dropping call");
            }
            let frame = CloseFrame {
                code: close_code::ERROR,
                reason: e.close_reason().into(),
            };
            if let Err(e) = socket.send(Message::Close(Some(frame))).await {
                debug!(error = %e, "Telephony socket already gone");
            }
            return;
        }
    };

    let (telephony_tx, telephony_rx) = socket.split();
    let (backend_tx, backend_rx) = backend.split();

    let end = run_call(
        twilio::events(telephony_rx),
        telephony_tx.with(|command: PlaybackCommand| future::ready(twilio::encode(command))),
        realtime::events(backend_rx),
        backend_tx.with(|event: ClientEvent| future::ready(realtime::encode(event))),
        state.store.as_ref(),
        &state.session,
    )
    .await;

    match end {
        SessionEnd::Completed(exit) => info!(?exit, "Call session finished"),
        SessionEnd::SetupFailed(e) => error!(error = ?e, "Realtime session setup failed"),
        SessionEnd::InboundFailed(e) => error!(error = ?e, "Telephony leg failed"),
        SessionEnd::OutboundFailed(e) => error!(error = ?e, "Realtime leg failed"),
        SessionEnd::Panicked(message) => error!(panic = %message, "Call session panicked"),
    }
}

/// Runs a call over already-connected sockets.
///
/// Both relays run in this task and the first one to return ends the session;
/// the other is dropped mid-await. Whatever the cause, a relay panic included,
/// the conversation is flushed to the store exactly once before the sockets
/// are closed.
pub async fn run_call<TR, TW, AR, AW>(
    telephony_rx: TR,
    mut telephony_tx: TW,
    backend_rx: AR,
    backend_tx: AW,
    store: &dyn CallStore,
    settings: &SessionSettings,
) -> SessionEnd
where
    TR: Stream<Item = Result<StreamEvent>> + Unpin,
    TW: Sink<PlaybackCommand, Error = anyhow::Error> + Unpin,
    AR: Stream<Item = Result<ServerEvent>> + Unpin,
    AW: Sink<ClientEvent, Error = anyhow::Error> + Unpin,
{
    let call = CallSession::new();
    let backend_tx = Mutex::new(backend_tx);
    let mut turns = TurnReconstructor::new();

    let end = match configure_session(&backend_tx, settings).await {
        Err(e) => SessionEnd::SetupFailed(e),
        Ok(()) => {
            let inbound = inbound::relay(telephony_rx, &backend_tx, &call, store, settings);
            let outbound = outbound::relay(
                backend_rx,
                &mut telephony_tx,
                &backend_tx,
                &call,
                &mut turns,
            );
            let relays = async {
                tokio::select! {
                    result = inbound => match result {
                        Ok(exit) => SessionEnd::Completed(exit),
                        Err(e) => SessionEnd::InboundFailed(e),
                    },
                    result = outbound => match result {
                        Ok(exit) => SessionEnd::Completed(exit),
                        Err(e) => SessionEnd::OutboundFailed(e),
                    },
                }
            };
            // Committed turns stay valid after a panic; each commit is a single push.
            match AssertUnwindSafe(relays).catch_unwind().await {
                Ok(end) => end,
                Err(panic) => SessionEnd::Panicked(panic_message(panic)),
            }
        }
    };

    let duration = call.elapsed();
    let turns = turns.into_turns();
    match call.call_sid() {
        Some(call_sid) => {
            info!(
                started_at = %call.started_at(),
                duration_secs = duration.as_secs(),
                turns = turns.len(),
                "Call ended; storing conversation"
            );
            flush_call(store, call_sid, &turns, duration).await
        }
        None => warn!(
            turns = turns.len(),
            "Session ended before the media stream started; nothing to store"
        ),
    }

    if let Err(e) = telephony_tx.close().await {
        debug!(error = ?e, "Telephony socket did not close cleanly");
    }
    if let Err(e) = backend_tx.into_inner().close().await {
        debug!(error = ?e, "Realtime socket did not close cleanly");
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::{
        realtime::{OutputContent, OutputItem, ResponseInfo},
        testing::{RecordingStore, StoreCall, capture, settings, wait_for},
        twilio::{MediaPayload, StartMetadata},
    };
    use anyhow::anyhow;
    use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
    use voxbridge_core::ConversationTurn;
    use std::collections::HashMap;

    type Feed<T> = UnboundedSender<Result<T>>;

    fn start(call_sid: &str, stream_sid: &str) -> StreamEvent {
        StreamEvent::Start {
            start: StartMetadata {
                stream_sid: stream_sid.into(),
                call_sid: call_sid.into(),
                custom_parameters: HashMap::from([("caller".into(), "+34600000000".into())]),
            },
        }
    }

    fn media(payload: &str) -> StreamEvent {
        StreamEvent::Media {
            media: MediaPayload {
                track: Some("inbound".into()),
                payload: payload.into(),
            },
        }
    }

    fn done(transcript: &str) -> ServerEvent {
        ServerEvent::ResponseDone {
            response: ResponseInfo {
                id: Some("resp_1".into()),
                status: Some("completed".into()),
                output: vec![OutputItem {
                    role: Some("assistant".into()),
                    content: vec![OutputContent {
                        content_type: Some("audio".into()),
                        transcript: Some(transcript.into()),
                    }],
                }],
            },
        }
    }

    /// Sends `response.done` for the greeting, then waits until the relay is
    /// past it: audio queued behind the commit only plays once it happened.
    async fn commit_greeting(
        backend: &Feed<ServerEvent>,
        played: &mut UnboundedReceiver<PlaybackCommand>,
    ) {
        backend.unbounded_send(Ok(done("Hola, soy tu asistente."))).unwrap();
        backend
            .unbounded_send(Ok(ServerEvent::AudioDelta {
                response_id: None,
                delta: "gA==".into(),
            }))
            .unwrap();
        wait_for(played, |_| true).await;
    }

    fn assert_only_greeting_stored(store: &RecordingStore) {
        let appended = store.appended();
        assert_eq!(appended.len(), 1);
        let turns: &[ConversationTurn] = &appended[0];
        assert_eq!(turns.len(), 1);
        assert!(turns[0].is_greeting());
        assert_eq!(turns[0].ai_text, "Hola, soy tu asistente.");
        assert!(matches!(
            store.calls().last(),
            Some(StoreCall::Finalize { call_sid, .. }) if call_sid == "CA1"
        ));
        assert_eq!(store.finalize_count(), 1);
    }

    /// Sends `start` and waits until the greeting went out, which means the
    /// call identity is bound.
    async fn start_call(telephony: &Feed<StreamEvent>, sent: &mut UnboundedReceiver<ClientEvent>) {
        telephony.unbounded_send(Ok(start("CA1", "S1"))).unwrap();
        wait_for(sent, |event| *event == ClientEvent::ResponseCreate).await;
    }

    #[tokio::test]
    async fn test_scenario_call_with_one_exchange() {
        let (telephony, telephony_rx) = mpsc::unbounded();
        let (backend, backend_rx) = mpsc::unbounded();
        let (playback, mut played) = capture::<PlaybackCommand>();
        let (backend_tx, mut sent) = capture::<ClientEvent>();
        let store = RecordingStore::default();
        let settings = settings();

        let script = async {
            let first = wait_for(&mut sent, |_| true).await;
            assert!(matches!(first[0], ClientEvent::SessionUpdate { .. }));

            start_call(&telephony, &mut sent).await;
            telephony.unbounded_send(Ok(media("f39/"))).unwrap();
            wait_for(&mut sent, |event| {
                matches!(event, ClientEvent::InputAudioBufferAppend { .. })
            })
            .await;

            backend
                .unbounded_send(Ok(ServerEvent::TranscriptionCompleted {
                    transcript: "hola".into(),
                }))
                .unwrap();
            backend.unbounded_send(Ok(done("hola, bienvenido"))).unwrap();
            // Audio is forwarded after the commit; seeing it means the relay
            // got past the response.
            backend
                .unbounded_send(Ok(ServerEvent::AudioDelta {
                    response_id: None,
                    delta: "gA==".into(),
                }))
                .unwrap();
            wait_for(&mut played, |_| true).await;

            telephony
                .unbounded_send(Ok(StreamEvent::Stop { stream_sid: None }))
                .unwrap();
        };

        let (end, ()) = tokio::join!(
            run_call(telephony_rx, playback, backend_rx, backend_tx, &store, &settings),
            script
        );

        assert!(matches!(
            end,
            SessionEnd::Completed(RelayExit::TelephonyStopped)
        ));
        let calls = store.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(&calls[0], StoreCall::Create { call_sid, .. } if call_sid == "CA1"));
        match &calls[1] {
            StoreCall::Append { call_sid, turns } => {
                assert_eq!(call_sid, "CA1");
                assert_eq!(turns.len(), 1);
                assert_eq!(turns[0].user_text, "hola");
                assert_eq!(turns[0].ai_text, "hola, bienvenido");
            }
            other => panic!("Expected append_turns, got {:?}", other),
        }
        assert!(matches!(&calls[2], StoreCall::Finalize { call_sid, .. } if call_sid == "CA1"));
    }

    #[tokio::test]
    async fn test_scenario_backend_drops_before_answering() {
        let (telephony, telephony_rx) = mpsc::unbounded::<Result<StreamEvent>>();
        let (backend, backend_rx) = mpsc::unbounded();
        let (playback, _played) = capture::<PlaybackCommand>();
        let (backend_tx, mut sent) = capture::<ClientEvent>();
        let store = RecordingStore::default();
        let settings = settings();

        let script = async {
            start_call(&telephony, &mut sent).await;
            backend
                .unbounded_send(Ok(ServerEvent::TranscriptionCompleted {
                    transcript: "¿hola?".into(),
                }))
                .unwrap();
            backend.close_channel();
        };

        let (end, ()) = tokio::join!(
            run_call(telephony_rx, playback, backend_rx, backend_tx, &store, &settings),
            script
        );

        assert!(matches!(end, SessionEnd::Completed(RelayExit::BackendClosed)));
        assert_eq!(store.appended(), vec![Vec::new()]);
        assert_eq!(store.finalize_count(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_still_flushes_once() {
        let (telephony, telephony_rx) = mpsc::unbounded();
        let (backend, backend_rx) = mpsc::unbounded::<Result<ServerEvent>>();
        let (playback, mut played) = capture::<PlaybackCommand>();
        let (backend_tx, mut sent) = capture::<ClientEvent>();
        let store = RecordingStore::default();
        let settings = settings();

        let script = async {
            start_call(&telephony, &mut sent).await;
            commit_greeting(&backend, &mut played).await;
            telephony
                .unbounded_send(Err(anyhow!("connection reset by peer")))
                .unwrap();
        };

        let (end, ()) = tokio::join!(
            run_call(telephony_rx, playback, backend_rx, backend_tx, &store, &settings),
            script
        );

        assert!(matches!(end, SessionEnd::InboundFailed(_)));
        assert_only_greeting_stored(&store);
    }

    #[tokio::test]
    async fn test_backend_failure_still_flushes_once() {
        let (telephony, telephony_rx) = mpsc::unbounded::<Result<StreamEvent>>();
        let (backend, backend_rx) = mpsc::unbounded();
        let (playback, _played) = capture::<PlaybackCommand>();
        let (backend_tx, mut sent) = capture::<ClientEvent>();
        let store = RecordingStore::default();
        let settings = settings();

        let script = async {
            start_call(&telephony, &mut sent).await;
            backend.unbounded_send(Ok(done("Hola, soy tu asistente."))).unwrap();
            backend.unbounded_send(Err(anyhow!("reset"))).unwrap();
        };

        let (end, ()) = tokio::join!(
            run_call(telephony_rx, playback, backend_rx, backend_tx, &store, &settings),
            script
        );

        match end {
            SessionEnd::OutboundFailed(e) => assert_eq!(e.to_string(), "reset"),
            other => panic!("Expected a realtime leg failure, got {:?}", other),
        }
        assert_only_greeting_stored(&store);
    }

    #[tokio::test]
    async fn test_relay_panic_still_flushes_once() {
        let (telephony, telephony_rx) = mpsc::unbounded::<Result<StreamEvent>>();
        let (_backend, backend_rx) = mpsc::unbounded::<Result<ServerEvent>>();
        let (playback, _played) = capture::<PlaybackCommand>();
        let (backend_tx, mut sent) = capture::<ClientEvent>();
        let store = RecordingStore::panicking_create();
        let settings = settings();

        let script = start_call(&telephony, &mut sent);

        let (end, ()) = tokio::join!(
            run_call(telephony_rx, playback, backend_rx, backend_tx, &store, &settings),
            script
        );

        match end {
            SessionEnd::Panicked(message) => assert_eq!(message, "call record insert blew up"),
            other => panic!("Expected a panicked session, got {:?}", other),
        }
        assert_eq!(store.appended(), vec![Vec::new()]);
        assert_eq!(store.finalize_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_before_start_stores_nothing() {
        let (telephony, telephony_rx) = mpsc::unbounded::<Result<StreamEvent>>();
        let (_backend, backend_rx) = mpsc::unbounded::<Result<ServerEvent>>();
        let (playback, _played) = capture::<PlaybackCommand>();
        let (backend_tx, _sent) = capture::<ClientEvent>();
        let store = RecordingStore::default();
        telephony.close_channel();

        let end = run_call(
            telephony_rx,
            playback,
            backend_rx,
            backend_tx,
            &store,
            &settings(),
        )
        .await;

        assert!(matches!(
            end,
            SessionEnd::Completed(RelayExit::TelephonyDisconnected)
        ));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_setup_failure_ends_the_session() {
        let (_telephony, telephony_rx) = mpsc::unbounded::<Result<StreamEvent>>();
        let (_backend, backend_rx) = mpsc::unbounded::<Result<ServerEvent>>();
        let (playback, _played) = capture::<PlaybackCommand>();
        let (backend_tx, sent) = capture::<ClientEvent>();
        drop(sent);
        let store = RecordingStore::default();

        let end = run_call(
            telephony_rx,
            playback,
            backend_rx,
            backend_tx,
            &store,
            &settings(),
        )
        .await;

        assert!(matches!(end, SessionEnd::SetupFailed(_)));
        assert!(store.calls().is_empty());
    }
}
