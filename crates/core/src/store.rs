//! Call Storage Contract
//!
//! The bridge never reads stored calls back; it only announces a new call,
//! hands over the finished conversation, and closes the record.

use crate::conversation::ConversationTurn;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, info};

/// Persistence collaborator for bridged calls.
///
/// Implementations are shared by every live session and must tolerate
/// concurrent calls from independent sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallStore: Send + Sync {
    /// Registers a new call and returns its storage id.
    async fn create_session(&self, call_sid: &str, caller: &str) -> Result<i64>;

    /// Appends the given turns, in order, to the call's interaction log.
    async fn append_turns(&self, call_sid: &str, turns: &[ConversationTurn]) -> Result<()>;

    /// Marks the call completed with its measured duration.
    async fn finalize(
        &self,
        call_sid: &str,
        duration: Duration,
        detected_intent: Option<String>,
    ) -> Result<()>;
}

/// Hands a finished conversation to the store and closes the call record.
///
/// Store failures are logged and swallowed; `finalize` is attempted even when
/// appending the turns failed.
pub async fn flush_call(
    store: &dyn CallStore,
    call_sid: &str,
    turns: &[ConversationTurn],
    duration: Duration,
) {
    match store.append_turns(call_sid, turns).await {
        Ok(()) => info!(call_sid, turns = turns.len(), "Conversation stored"),
        Err(e) => error!(call_sid, error = ?e, "Failed to store conversation"),
    }
    match store.finalize(call_sid, duration, None).await {
        Ok(()) => info!(call_sid, duration_secs = duration.as_secs(), "Call finalized"),
        Err(e) => error!(call_sid, error = ?e, "Failed to finalize call"),
    }
}
