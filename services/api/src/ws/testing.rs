//! Fakes shared by the relay and session tests.

use super::initializer::SessionSettings;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures::channel::mpsc;
use futures_util::{Sink, SinkExt, StreamExt};
use std::{sync::Mutex, time::Duration};
use tokio::sync::Notify;
use voxbridge_core::{CallStore, ConversationTurn};

pub fn settings() -> SessionSettings {
    SessionSettings {
        instructions: "Eres un asistente.".into(),
        voice: "alloy".into(),
        temperature: 0.8,
        vad_threshold: 0.5,
        vad_prefix_padding_ms: 300,
        vad_silence_duration_ms: 500,
        transcription_model: "whisper-1".into(),
        transcription_language: Some("es".into()),
        greeting_text: "Hola".into(),
    }
}

/// An in-memory sink plus the receiver that observes what was sent to it.
pub fn capture<T>() -> (
    impl Sink<T, Error = anyhow::Error> + Unpin,
    mpsc::UnboundedReceiver<T>,
) {
    let (tx, rx) = mpsc::unbounded();
    (tx.sink_map_err(anyhow::Error::from), rx)
}

/// Everything currently buffered in `rx`, without waiting.
pub fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}

/// Collects items from `rx` until one matches `until`, inclusive.
pub async fn wait_for<T>(
    rx: &mut mpsc::UnboundedReceiver<T>,
    until: impl Fn(&T) -> bool,
) -> Vec<T> {
    let mut seen = Vec::new();
    while let Some(item) = rx.next().await {
        let done = until(&item);
        seen.push(item);
        if done {
            break;
        }
    }
    seen
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Create { call_sid: String, caller: String },
    Append { call_sid: String, turns: Vec<ConversationTurn> },
    Finalize { call_sid: String, duration: Duration },
}

/// A `CallStore` that records every call it receives.
///
/// `create_session` is recorded when it returns, so a gated insert shows up
/// only after `release`.
#[derive(Default)]
pub struct RecordingStore {
    calls: Mutex<Vec<StoreCall>>,
    fail_create: bool,
    panic_on_create: bool,
    create_gate: Option<Notify>,
}

impl RecordingStore {
    pub fn failing_create() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    pub fn panicking_create() -> Self {
        Self {
            panic_on_create: true,
            ..Self::default()
        }
    }

    /// A store whose `create_session` blocks until `release` is called.
    pub fn gated_create() -> Self {
        Self {
            create_gate: Some(Notify::new()),
            ..Self::default()
        }
    }

    pub fn release(&self) {
        if let Some(gate) = &self.create_gate {
            gate.notify_one();
        }
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn appended(&self) -> Vec<Vec<ConversationTurn>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Append { turns, .. } => Some(turns),
                _ => None,
            })
            .collect()
    }

    pub fn finalize_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, StoreCall::Finalize { .. }))
            .count()
    }
}

#[async_trait]
impl CallStore for RecordingStore {
    async fn create_session(&self, call_sid: &str, caller: &str) -> Result<i64> {
        if self.panic_on_create {
            panic!("call record insert blew up");
        }
        if let Some(gate) = &self.create_gate {
            gate.notified().await;
        }
        self.calls.lock().unwrap().push(StoreCall::Create {
            call_sid: call_sid.into(),
            caller: caller.into(),
        });
        if self.fail_create {
            return Err(anyhow!("database unavailable"));
        }
        Ok(1)
    }

    async fn append_turns(&self, call_sid: &str, turns: &[ConversationTurn]) -> Result<()> {
        self.calls.lock().unwrap().push(StoreCall::Append {
            call_sid: call_sid.into(),
            turns: turns.to_vec(),
        });
        Ok(())
    }

    async fn finalize(
        &self,
        call_sid: &str,
        duration: Duration,
        _detected_intent: Option<String>,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(StoreCall::Finalize {
            call_sid: call_sid.into(),
            duration,
        });
        Ok(())
    }
}
