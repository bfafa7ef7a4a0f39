//! Telephony control-plane endpoints: placing calls and the webhooks Twilio
//! invokes before and after the media stream.

use axum::{
    Form,
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::{info, warn};
use voxbridge_core::telephony::OutboundCall;

use crate::{
    handlers::ApiError,
    models::{
        AckResponse, ErrorResponse, MakeCallPayload, MakeCallResponse, RecordingStatusForm,
        StatusResponse, VoiceWebhookForm,
    },
    state::AppState,
    twiml,
};

/// Health check.
#[utoipa::path(
    get,
    path = "/",
    tag = "Service",
    responses((status = 200, description = "Service is running", body = StatusResponse))
)]
pub async fn health() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "healthy".to_string(),
        message: "Voice bridge is running".to_string(),
    })
}

/// Place an outbound call that will be bridged to the assistant.
#[utoipa::path(
    post,
    path = "/make-call",
    tag = "Telephony",
    request_body = MakeCallPayload,
    responses(
        (status = 200, description = "Call placed", body = MakeCallResponse),
        (status = 400, description = "Missing phone number", body = ErrorResponse),
        (status = 502, description = "The telephony provider rejected the call", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn make_call(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<MakeCallPayload>,
) -> Result<Json<MakeCallResponse>, ApiError> {
    let to = payload.to_phone_number.trim();
    if to.is_empty() {
        return Err(ApiError::BadRequest("Phone number is required".to_string()));
    }
    let public_url = state.config.public_url.as_deref().ok_or_else(|| {
        ApiError::InternalServerError(anyhow::anyhow!(
            "PUBLIC_URL must be set to place outbound calls"
        ))
    })?;

    let call = OutboundCall {
        to: to.to_string(),
        twiml_url: format!("{}/outgoing-call", public_url),
        recording_status_callback: Some(format!("{}/recording-status", public_url)),
    };
    let call_sid = state
        .call_placer
        .place_call(&call)
        .await
        .map_err(ApiError::Upstream)?;

    info!(%call_sid, to = %call.to, "Outbound call placed");
    Ok(Json(MakeCallResponse {
        call_sid,
        status: "success".to_string(),
    }))
}

/// TwiML for a call: speak the intro, then connect the audio to the bridge.
#[utoipa::path(
    post,
    path = "/outgoing-call",
    tag = "Telephony",
    responses(
        (status = 200, description = "TwiML document", content_type = "application/xml", body = String),
        (status = 400, description = "No host to point the media stream at", body = ErrorResponse)
    )
)]
pub async fn outgoing_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<VoiceWebhookForm>,
) -> Result<impl IntoResponse, ApiError> {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok());
    let stream_url = twiml::media_stream_url(state.config.public_url.as_deref(), host)
        .ok_or_else(|| ApiError::BadRequest("Host header is required".to_string()))?;

    info!(
        call_sid = ?form.call_sid,
        caller = ?form.remote_party(),
        %stream_url,
        "Answering call with media stream"
    );
    let document = twiml::connect_stream(&state.config.call_intro, &stream_url, form.remote_party());
    Ok(([(header::CONTENT_TYPE, "application/xml")], document))
}

/// Recording status callback.
#[utoipa::path(
    post,
    path = "/recording-status",
    tag = "Telephony",
    responses((status = 200, description = "Acknowledged", body = AckResponse))
)]
pub async fn recording_status(Form(form): Form<RecordingStatusForm>) -> Json<AckResponse> {
    match form.recording_status.as_deref() {
        Some("completed") => info!(
            call_sid = ?form.call_sid,
            recording_sid = ?form.recording_sid,
            recording_url = ?form.recording_url,
            duration_secs = ?form.recording_duration,
            "Recording completed"
        ),
        Some("failed") | Some("absent") => warn!(
            call_sid = ?form.call_sid,
            recording_sid = ?form.recording_sid,
            status = ?form.recording_status,
            "Recording unavailable"
        ),
        status => info!(
            call_sid = ?form.call_sid,
            recording_sid = ?form.recording_sid,
            ?status,
            "Recording status update"
        ),
    }
    Json(AckResponse {
        status: "received".to_string(),
    })
}
