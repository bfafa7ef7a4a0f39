//! Conversation Turn Reconstruction
//!
//! The realtime backend reports what the user said and what the assistant
//! answered as two unrelated event streams. This module pairs them back into
//! `ConversationTurn`s, the unit that is finally stored with the call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One committed exchange: what the user said and what the assistant replied.
///
/// `user_text` is empty only for a turn that had no preceding user utterance,
/// which in practice is the assistant's opening greeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    #[serde(rename = "user")]
    pub user_text: String,
    #[serde(rename = "ai")]
    pub ai_text: String,
    /// Unix time in seconds at which the turn was committed.
    pub timestamp: f64,
}

impl ConversationTurn {
    pub fn new(user_text: String, ai_text: String, committed_at: DateTime<Utc>) -> Self {
        Self {
            user_text,
            ai_text,
            timestamp: committed_at.timestamp_micros() as f64 / 1_000_000.0,
        }
    }

    /// True for a turn the assistant produced without any user prompt.
    pub fn is_greeting(&self) -> bool {
        self.user_text.is_empty()
    }
}

/// Transcript fragments that have arrived but are not yet part of a turn.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PendingTurn {
    pub current_user_text: Option<String>,
    pub current_ai_text: Option<String>,
}

impl PendingTurn {
    pub fn is_empty(&self) -> bool {
        self.current_user_text.is_none() && self.current_ai_text.is_none()
    }
}

/// Pairs user and assistant transcripts into an append-only turn buffer.
///
/// The reconstructor is owned by a single consumer; it is not meant to be
/// shared between tasks.
#[derive(Debug, Default)]
pub struct TurnReconstructor {
    pending: PendingTurn,
    buffer: Vec<ConversationTurn>,
}

impl TurnReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a completed user transcript, replacing any earlier one that was
    /// never paired with a response.
    pub fn record_user_transcript(&mut self, transcript: String) {
        if let Some(previous) = self.pending.current_user_text.replace(transcript) {
            tracing::debug!(
                dropped = %previous,
                "Unpaired user transcript overwritten by a newer one"
            );
        }
    }

    /// Stores the assistant transcript of a finished response and commits a
    /// turn. Returns the turn that was appended.
    pub fn record_ai_transcript(
        &mut self,
        transcript: String,
        committed_at: DateTime<Utc>,
    ) -> &ConversationTurn {
        self.pending.current_ai_text = Some(transcript);
        self.commit(committed_at)
    }

    fn commit(&mut self, committed_at: DateTime<Utc>) -> &ConversationTurn {
        let ai_text = self.pending.current_ai_text.take().unwrap_or_default();
        // A response with nobody having spoken yet is the greeting.
        let user_text = self.pending.current_user_text.take().unwrap_or_default();
        self.buffer
            .push(ConversationTurn::new(user_text, ai_text, committed_at));
        &self.buffer[self.buffer.len() - 1]
    }

    pub fn pending(&self) -> &PendingTurn {
        &self.pending
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.buffer
    }

    /// Consumes the reconstructor, returning every committed turn in order.
    ///
    /// A user transcript still waiting for its response is discarded.
    pub fn into_turns(self) -> Vec<ConversationTurn> {
        if let Some(orphan) = &self.pending.current_user_text {
            tracing::warn!(
                transcript = %orphan,
                "Session ended before the assistant answered; user transcript not stored"
            );
        }
        self.buffer
    }
}
