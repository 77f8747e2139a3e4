//! services/api/src/web/rest.rs
//!
//! Contains the master definition for the OpenAPI specification and the
//! health check endpoint.

use crate::web::{
    protocol::{
        ChunkListResponse, ChunkResponse, ErrorResponse, HealthResponse, MessageResponse,
        RecordedChunkResponse, RecordingStatusResponse, RegisterRequest, StartRecordingRequest,
        StartRecordingResponse, StopRecordingResponse, UserEnvelope, UserListResponse,
        UserResponse, UsernameRequest,
    },
    recording, users, videos,
};
use axum::response::Json;
use utoipa::OpenApi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        users::register_handler,
        users::login_handler,
        users::list_users_handler,
        users::get_user_handler,
        recording::start_recording_handler,
        recording::stop_recording_handler,
        recording::recording_status_handler,
        videos::list_videos_handler,
        videos::list_user_videos_handler,
        videos::get_video_handler,
        videos::download_video_handler,
        videos::delete_video_handler,
    ),
    components(
        schemas(
            RegisterRequest, UsernameRequest, StartRecordingRequest,
            UserResponse, UserEnvelope, UserListResponse,
            StartRecordingResponse, StopRecordingResponse, RecordedChunkResponse,
            RecordingStatusResponse, ChunkResponse, ChunkListResponse,
            MessageResponse, ErrorResponse, HealthResponse
        )
    ),
    tags(
        (name = "Chunked Recording API", description = "Start, stop and manage chunked webcam recordings.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Health
//=========================================================================================

/// GET /health - Liveness probe
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}
