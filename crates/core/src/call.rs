//! Per-call session state shared by the inbound and outbound relays.

use chrono::{DateTime, Utc};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Identifiers announced by the telephony `start` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamIdentity {
    pub call_sid: String,
    pub stream_sid: String,
    pub caller: String,
}

/// State for one bridged call.
///
/// Identifiers are written exactly once and are immutable afterwards, so both
/// relays can read them without locking.
#[derive(Debug)]
pub struct CallSession {
    identity: OnceLock<StreamIdentity>,
    backend_session: OnceLock<String>,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl CallSession {
    pub fn new() -> Self {
        Self {
            identity: OnceLock::new(),
            backend_session: OnceLock::new(),
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Binds the telephony identifiers. Fails, returning the rejected value,
    /// if the session was already bound.
    pub fn bind(&self, identity: StreamIdentity) -> Result<(), StreamIdentity> {
        self.identity.set(identity)
    }

    pub fn identity(&self) -> Option<&StreamIdentity> {
        self.identity.get()
    }

    pub fn call_sid(&self) -> Option<&str> {
        self.identity().map(|id| id.call_sid.as_str())
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.identity().map(|id| id.stream_sid.as_str())
    }

    /// Records the session id assigned by the realtime backend. Later values
    /// are ignored.
    pub fn set_backend_session(&self, id: String) -> bool {
        self.backend_session.set(id).is_ok()
    }

    pub fn backend_session(&self) -> Option<&str> {
        self.backend_session.get().map(String::as_str)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for CallSession {
    fn default() -> Self {
        Self::new()
    }
}
