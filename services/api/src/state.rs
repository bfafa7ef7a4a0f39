//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the database pool and the telephony client.

use crate::{config::Config, db::Db, ws::SessionSettings};
use std::sync::Arc;
use voxbridge_core::{CallStore, telephony::CallPlacer};

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Db>,
    /// Where media sessions hand their conversations; normally the same `Db`.
    pub store: Arc<dyn CallStore>,
    pub call_placer: Arc<dyn CallPlacer>,
    /// Realtime session parameters shared by every call.
    pub session: Arc<SessionSettings>,
    pub config: Arc<Config>,
}
