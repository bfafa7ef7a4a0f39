//! Axum Handlers for the REST API
//!
//! This module contains the call dashboard endpoints: reading, searching,
//! correcting and deleting stored calls. It uses `utoipa` doc comments to
//! generate OpenAPI documentation.

use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::OpenApi;

use crate::{
    models::{
        Call, CallListResponse, CallUpdate, ErrorResponse, ListParams, SearchParams,
        StatusResponse,
    },
    router::ApiDoc,
    state::AppState,
};

const MAX_PAGE_SIZE: i64 = 1000;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    /// A third-party service (the telephony provider) rejected the request.
    Upstream(anyhow::Error),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Upstream(err) => {
                error!("Upstream Error: {:?}", err);
                let message = err.to_string();
                (StatusCode::BAD_GATEWAY, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn call_not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("Call with id {} not found", id))
}

/// List stored calls, most recent first.
#[utoipa::path(
    get,
    path = "/api/calls",
    tag = "Calls",
    params(ListParams),
    responses(
        (status = 200, description = "Page of calls and the total count", body = CallListResponse),
        (status = 400, description = "Invalid paging parameters", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn list_calls(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<CallListResponse>, ApiError> {
    if params.skip < 0 {
        return Err(ApiError::BadRequest("skip must not be negative".to_string()));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&params.limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let calls = state.db.list_calls(params.skip, params.limit).await?;
    let total = state.db.count_calls().await?;
    Ok(Json(CallListResponse { calls, total }))
}

/// Get a call by its numeric id.
#[utoipa::path(
    get,
    path = "/api/calls/{id}",
    tag = "Calls",
    params(("id" = i64, Path, description = "Call id")),
    responses(
        (status = 200, description = "Call details", body = Call),
        (status = 404, description = "Call not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_call(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Call>, ApiError> {
    let call = state.db.get_call(id).await?.ok_or_else(|| call_not_found(id))?;
    Ok(Json(call))
}

/// Get a call by its Twilio call SID.
#[utoipa::path(
    get,
    path = "/api/calls/sid/{call_sid}",
    tag = "Calls",
    params(("call_sid" = String, Path, description = "Twilio call SID")),
    responses(
        (status = 200, description = "Call details", body = Call),
        (status = 404, description = "Call not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_call_by_sid(
    State(state): State<Arc<AppState>>,
    Path(call_sid): Path<String>,
) -> Result<Json<Call>, ApiError> {
    let call = state
        .db
        .get_call_by_sid(&call_sid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Call with SID {} not found", call_sid)))?;
    Ok(Json(call))
}

/// Search calls by full or partial phone number.
#[utoipa::path(
    get,
    path = "/api/search",
    tag = "Calls",
    params(SearchParams),
    responses(
        (status = 200, description = "Matching calls", body = CallListResponse),
        (status = 400, description = "Empty search term", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn search_calls(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<CallListResponse>, ApiError> {
    let phone = params.phone.trim();
    if phone.is_empty() {
        return Err(ApiError::BadRequest("phone must not be empty".to_string()));
    }
    let calls = state.db.search_calls(phone).await?;
    let total = calls.len() as i64;
    Ok(Json(CallListResponse { calls, total }))
}

/// Correct a stored call. Only the fields present in the body change.
#[utoipa::path(
    put,
    path = "/api/calls/{id}",
    tag = "Calls",
    request_body = CallUpdate,
    params(("id" = i64, Path, description = "Call id")),
    responses(
        (status = 200, description = "Updated call", body = Call),
        (status = 404, description = "Call not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn update_call(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(update): Json<CallUpdate>,
) -> Result<Json<Call>, ApiError> {
    if update.duration.is_some_and(|d| d < 0) {
        return Err(ApiError::BadRequest(
            "duration must not be negative".to_string(),
        ));
    }
    let call = state
        .db
        .update_call(id, update)
        .await?
        .ok_or_else(|| call_not_found(id))?;
    info!(call_id = id, "Call updated");
    Ok(Json(call))
}

/// Delete a call.
#[utoipa::path(
    delete,
    path = "/api/calls/{id}",
    tag = "Calls",
    params(("id" = i64, Path, description = "Call id")),
    responses(
        (status = 200, description = "Call deleted", body = StatusResponse),
        (status = 404, description = "Call not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn delete_call(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !state.db.delete_call(id).await? {
        return Err(call_not_found(id));
    }
    info!(call_id = id, "Call deleted");
    Ok(Json(StatusResponse {
        status: "deleted".to_string(),
        message: format!("Call {} deleted successfully", id),
    }))
}

/// Download the OpenAPI document as YAML.
#[utoipa::path(
    get,
    path = "/api/openapi.yaml",
    tag = "Documentation",
    responses(
        (status = 200, description = "OpenAPI document", content_type = "application/x-yaml", body = String)
    )
)]
pub async fn openapi_yaml() -> Result<impl IntoResponse, ApiError> {
    let yaml = ApiDoc::openapi().to_yaml()?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/x-yaml"),
            (
                header::CONTENT_DISPOSITION,
                r#"attachment; filename="openapi.yaml""#,
            ),
        ],
        yaml,
    ))
}
