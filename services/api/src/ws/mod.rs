//! Media Bridge
//!
//! This module bridges a Twilio media stream to the OpenAI Realtime API. It is
//! structured into submodules:
//!
//! - `twilio` / `realtime`: the two wire protocols, decoded once at the socket boundary.
//! - `backend`: opens the realtime websocket.
//! - `initializer`: session configuration and the opening greeting.
//! - `inbound` / `outbound`: the two relay legs.
//! - `interrupt`: barge-in handling.
//! - `session`: the per-call lifetime that ties the legs together.

mod backend;
mod inbound;
pub mod initializer;
pub mod interrupt;
mod outbound;
pub mod realtime;
pub mod session;
#[cfg(test)]
mod testing;
pub mod twilio;

pub use initializer::SessionSettings;
pub use session::media_stream_handler;
