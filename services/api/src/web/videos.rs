//! services/api/src/web/videos.rs
//!
//! Endpoints for listing, downloading and deleting recorded chunks.

use crate::web::{
    http_error::HttpError,
    protocol::{ChunkListResponse, ChunkResponse, ErrorResponse, MessageResponse},
    state::AppState,
};
use axum::{
    body::Body,
    extract::{rejection::PathRejection, Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use recording_core::PortError;
use std::io::ErrorKind;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

fn chunk_not_found(e: PortError) -> HttpError {
    match e {
        PortError::NotFound(_) => HttpError::not_found("Video chunk not found"),
        other => other.into(),
    }
}

/// GET /videos - List every recorded chunk
#[utoipa::path(
    get,
    path = "/api/videos",
    responses(
        (status = 200, description = "All recorded chunks", body = ChunkListResponse)
    )
)]
pub async fn list_videos_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ChunkListResponse>, HttpError> {
    let chunks = state.db.list_chunks().await?;
    Ok(Json(ChunkListResponse::new(None, chunks)))
}

/// GET /videos/{username} - List one user's chunks
#[utoipa::path(
    get,
    path = "/api/videos/{username}",
    params(("username" = String, Path, description = "The user's unique name.")),
    responses(
        (status = 200, description = "The user's recorded chunks", body = ChunkListResponse)
    )
)]
pub async fn list_user_videos_handler(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Json<ChunkListResponse>, HttpError> {
    let chunks = state.db.list_chunks_for_user(&username).await?;
    Ok(Json(ChunkListResponse::new(Some(username), chunks)))
}

/// GET /video/{id} - Details of a single chunk
#[utoipa::path(
    get,
    path = "/api/video/{id}",
    params(("id" = i64, Path, description = "The chunk's row id.")),
    responses(
        (status = 200, description = "The chunk", body = ChunkResponse),
        (status = 404, description = "Video chunk not found", body = ErrorResponse)
    )
)]
pub async fn get_video_handler(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<ChunkResponse>, HttpError> {
    let Path(chunk_id) = path?;
    let chunk = state.db.get_chunk(chunk_id).await.map_err(chunk_not_found)?;
    Ok(Json(chunk.into()))
}

/// GET /video/{id}/download - Stream a chunk's MP4 file as an attachment
#[utoipa::path(
    get,
    path = "/api/video/{id}/download",
    params(("id" = i64, Path, description = "The chunk's row id.")),
    responses(
        (status = 200, description = "The MP4 file", content_type = "video/mp4"),
        (status = 404, description = "Chunk or file not found", body = ErrorResponse)
    )
)]
pub async fn download_video_handler(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, HttpError> {
    let Path(chunk_id) = path?;
    let chunk = state.db.get_chunk(chunk_id).await.map_err(chunk_not_found)?;

    let file = tokio::fs::File::open(&chunk.file_path)
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => HttpError::not_found("Video file not found on disk"),
            _ => HttpError::internal(format!("Cannot open {}: {}", chunk.file_path, e)),
        })?;

    let headers = [
        (header::CONTENT_TYPE, "video/mp4".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", chunk.file_name),
        ),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))))
}

/// DELETE /video/{id} - Remove a chunk's file and its database row
///
/// A file that cannot be removed (or is already gone) is logged and does not
/// prevent the row from being deleted.
#[utoipa::path(
    delete,
    path = "/api/video/{id}",
    params(("id" = i64, Path, description = "The chunk's row id.")),
    responses(
        (status = 200, description = "Video chunk deleted", body = MessageResponse),
        (status = 404, description = "Video chunk not found", body = ErrorResponse)
    )
)]
pub async fn delete_video_handler(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageResponse>, HttpError> {
    let Path(chunk_id) = path?;
    let chunk = state.db.get_chunk(chunk_id).await.map_err(chunk_not_found)?;

    match tokio::fs::remove_file(&chunk.file_path).await {
        Ok(()) => info!("Deleted file {}", chunk.file_path),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("File {} was already missing on disk", chunk.file_path)
        }
        Err(e) => warn!("Could not delete file {}: {}", chunk.file_path, e),
    }

    state
        .db
        .delete_chunk(chunk_id)
        .await
        .map_err(chunk_not_found)?;

    Ok(Json(MessageResponse {
        message: "Video chunk deleted successfully".to_string(),
    }))
}
