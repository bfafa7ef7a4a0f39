//! API and Database Models
//!
//! This module defines the core data structures used for both database mapping
//! with `sqlx` and for generating OpenAPI documentation with `utoipa`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use std::fmt;
use utoipa::{IntoParams, ToSchema};
use voxbridge_core::ConversationTurn;

#[derive(sqlx::Type, Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq)]
#[sqlx(type_name = "call_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Active,
    Completed,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::Active => write!(f, "active"),
            CallStatus::Completed => write!(f, "completed"),
        }
    }
}

/// One entry of a call's interaction log, as stored and served.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct InteractionLog {
    #[schema(example = "¿Qué productos tienes?")]
    pub user: String,
    pub ai: String,
    /// Unix time in seconds.
    #[schema(example = 1764311500.73)]
    pub timestamp: f64,
}

impl From<&ConversationTurn> for InteractionLog {
    fn from(turn: &ConversationTurn) -> Self {
        Self {
            user: turn.user_text.clone(),
            ai: turn.ai_text.clone(),
            timestamp: turn.timestamp,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct Call {
    pub id: i64,
    pub call_sid: String,
    pub user_phone: String,
    pub start_time: DateTime<Utc>,
    #[schema(value_type = Vec<InteractionLog>)]
    pub interaction_log: Json<Vec<InteractionLog>>,
    #[schema(value_type = String, example = "active")]
    pub status: CallStatus,
    /// Call duration in seconds, set when the call ends.
    pub duration: Option<i32>,
    pub user_intent: Option<String>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct CallListResponse {
    pub calls: Vec<Call>,
    pub total: i64,
}

/// Partial update of a call; absent fields are left unchanged.
#[derive(Deserialize, ToSchema, Debug, Default)]
pub struct CallUpdate {
    pub interaction_log: Option<Vec<InteractionLog>>,
    #[schema(value_type = Option<String>, example = "completed")]
    pub status: Option<CallStatus>,
    pub duration: Option<i32>,
    pub user_intent: Option<String>,
}

#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Number of records to skip.
    #[serde(default)]
    pub skip: i64,
    /// Maximum number of records to return.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Full or partial phone number.
    pub phone: String,
}

#[derive(Deserialize, ToSchema)]
pub struct MakeCallPayload {
    #[schema(example = "+34600000000")]
    pub to_phone_number: String,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct MakeCallResponse {
    pub call_sid: String,
    #[schema(example = "success")]
    pub status: String,
}

/// Form body Twilio posts when a recording changes state.
#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct RecordingStatusForm {
    pub call_sid: Option<String>,
    pub recording_sid: Option<String>,
    pub recording_status: Option<String>,
    pub recording_url: Option<String>,
    pub recording_duration: Option<String>,
}

/// The subset of Twilio's voice webhook form needed to answer a call.
#[derive(Deserialize, ToSchema, Debug, Default)]
#[serde(rename_all = "PascalCase")]
pub struct VoiceWebhookForm {
    pub call_sid: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub direction: Option<String>,
}

impl VoiceWebhookForm {
    /// The remote party: the dialed number for calls we placed, the calling
    /// number otherwise.
    pub fn remote_party(&self) -> Option<&str> {
        let outbound = self
            .direction
            .as_deref()
            .is_some_and(|d| d.starts_with("outbound"));
        if outbound {
            self.to.as_deref()
        } else {
            self.from.as_deref()
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

/// Acknowledgement returned to provider webhooks.
#[derive(Serialize, ToSchema)]
pub struct AckResponse {
    #[schema(example = "received")]
    pub status: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
