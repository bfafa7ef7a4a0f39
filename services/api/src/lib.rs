//! Voxbridge API Library Crate
//!
//! This library contains all the logic for the voice bridge service: the
//! Twilio ⇄ OpenAI Realtime media bridge, the call dashboard API, the Twilio
//! webhooks, database access, and routing. The binaries are thin wrappers
//! around this library.

pub mod audio;
pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod twiml;
pub mod webhooks;
pub mod ws;
