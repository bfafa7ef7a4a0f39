//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the call dashboard API, the Twilio webhooks, the media stream
//! WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        AckResponse, Call, CallListResponse, CallStatus, CallUpdate, ErrorResponse,
        InteractionLog, MakeCallPayload, MakeCallResponse, RecordingStatusForm, StatusResponse,
        VoiceWebhookForm,
    },
    state::AppState,
    twiml::MEDIA_STREAM_PATH,
    webhooks,
    ws::media_stream_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        webhooks::health,
        webhooks::make_call,
        webhooks::outgoing_call,
        webhooks::recording_status,
        handlers::list_calls,
        handlers::get_call,
        handlers::get_call_by_sid,
        handlers::search_calls,
        handlers::update_call,
        handlers::delete_call,
        handlers::openapi_yaml,
    ),
    components(
        schemas(Call, CallListResponse, CallUpdate, CallStatus, InteractionLog, MakeCallPayload, MakeCallResponse, StatusResponse, AckResponse, ErrorResponse, VoiceWebhookForm, RecordingStatusForm)
    ),
    tags(
        (name = "Calls", description = "Stored calls and their conversations"),
        (name = "Telephony", description = "Call placement and Twilio webhooks"),
        (name = "Service", description = "Service status"),
        (name = "Documentation", description = "API documentation downloads")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let calls_router = Router::new()
        .route("/calls", get(handlers::list_calls))
        .route(
            "/calls/{id}",
            get(handlers::get_call)
                .put(handlers::update_call)
                .delete(handlers::delete_call),
        )
        .route("/calls/sid/{call_sid}", get(handlers::get_call_by_sid))
        .route("/search", get(handlers::search_calls))
        .route("/openapi.yaml", get(handlers::openapi_yaml));

    // Group all routes that require AppState into their own router.
    let app_router = Router::new()
        .route("/", get(webhooks::health))
        .route("/make-call", post(webhooks::make_call))
        .route(
            "/outgoing-call",
            get(webhooks::outgoing_call).post(webhooks::outgoing_call),
        )
        .route("/recording-status", post(webhooks::recording_status))
        .route(MEDIA_STREAM_PATH, get(media_stream_handler))
        .nest("/api", calls_router)
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    // Create the final router that merges the stateful routes
    // with the stateless routes (like Swagger UI).
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(app_router)
}
