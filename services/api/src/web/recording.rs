//! services/api/src/web/recording.rs
//!
//! Endpoints that start, stop and inspect a user's chunked recording session.
//! The heavy lifting happens in the session registry; these handlers only
//! validate input and translate results.

use crate::web::{
    http_error::{required_username, HttpError},
    protocol::{
        ErrorResponse, RecordedChunkResponse, RecordingStatusResponse, StartRecordingRequest,
        StartRecordingResponse, StopRecordingResponse, UsernameRequest,
    },
    state::AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use recording_core::domain::{DEFAULT_CHUNK_DURATION_SECONDS, DEFAULT_TOTAL_DURATION_SECONDS};
use recording_core::{PortError, RecordingConfig};
use std::sync::Arc;

/// POST /start-recording - Start a chunked recording for a registered user
#[utoipa::path(
    post,
    path = "/api/start-recording",
    request_body = StartRecordingRequest,
    responses(
        (status = 200, description = "Recording started", body = StartRecordingResponse),
        (status = 400, description = "Missing username or invalid durations", body = ErrorResponse),
        (status = 404, description = "User not registered", body = ErrorResponse),
        (status = 409, description = "Recording already in progress", body = ErrorResponse)
    )
)]
pub async fn start_recording_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StartRecordingRequest>, JsonRejection>,
) -> Result<Json<StartRecordingResponse>, HttpError> {
    let Json(req) = payload?;
    let username = required_username(req.username)?;
    let total = req
        .total_duration_seconds
        .unwrap_or(DEFAULT_TOTAL_DURATION_SECONDS);
    let chunk = req
        .chunk_duration_seconds
        .unwrap_or(DEFAULT_CHUNK_DURATION_SECONDS);

    // Reject bad durations before touching the database.
    RecordingConfig::new(username.as_str(), chunk, total).validate()?;

    let user = state
        .db
        .get_user_by_username(&username)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => HttpError::not_found("User not found. Please register first."),
            other => other.into(),
        })?;

    let handle = state
        .sessions
        .start_session(&username, total, chunk, user.id)
        .await?;

    Ok(Json(StartRecordingResponse {
        message: format!("Recording started for user {}", username),
        username: handle.user_name,
        total_duration_seconds: handle.total_duration_seconds,
        chunk_duration_seconds: handle.chunk_duration_seconds,
        expected_chunks: handle.expected_chunks,
    }))
}

/// POST /stop-recording - Stop a user's recording and return its chunks
#[utoipa::path(
    post,
    path = "/api/stop-recording",
    request_body = UsernameRequest,
    responses(
        (status = 200, description = "Recording stopped", body = StopRecordingResponse),
        (status = 400, description = "Missing username", body = ErrorResponse),
        (status = 404, description = "No recording for this user", body = ErrorResponse)
    )
)]
pub async fn stop_recording_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UsernameRequest>, JsonRejection>,
) -> Result<Json<StopRecordingResponse>, HttpError> {
    let Json(req) = payload?;
    let username = required_username(req.username)?;

    let summary = state.sessions.stop_session(&username).await?;

    Ok(Json(StopRecordingResponse {
        message: format!("Recording stopped for user {}", username),
        username: summary.user_name,
        total_chunks: summary.chunks.len(),
        chunks: summary
            .chunks
            .into_iter()
            .map(RecordedChunkResponse::from)
            .collect(),
    }))
}

/// GET /recording-status/{username} - Report a user's recording state
///
/// Never fails: a user without a session is reported as not recording.
#[utoipa::path(
    get,
    path = "/api/recording-status/{username}",
    params(("username" = String, Path, description = "The user's unique name.")),
    responses(
        (status = 200, description = "Current recording state", body = RecordingStatusResponse)
    )
)]
pub async fn recording_status_handler(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Json<RecordingStatusResponse> {
    Json(state.sessions.status(&username).await.into())
}
