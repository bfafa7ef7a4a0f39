//! Core domain types for the voxbridge call bridge.
//!
//! Everything here is transport-agnostic: the conversation model and the
//! rules that turn fragmentary transcript events into committed turns, the
//! per-call identity shared by the relays, and the traits through which the
//! service talks to its external collaborators (call storage, call placement).

pub mod call;
pub mod conversation;
pub mod store;
pub mod telephony;

pub use call::{CallSession, StreamIdentity};
pub use conversation::{ConversationTurn, PendingTurn, TurnReconstructor};
pub use store::{CallStore, flush_call};
