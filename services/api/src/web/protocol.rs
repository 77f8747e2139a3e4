//! services/api/src/web/protocol.rs
//!
//! Defines the JSON payloads exchanged between clients and the REST API.

use chrono::{DateTime, Utc};
use recording_core::domain::{ChunkCompleted, ChunkRecord, SessionStatus, User};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

//=========================================================================================
// Request Payloads
//=========================================================================================
// Every field is optional on the wire so a missing username becomes a 400 with a
// readable message instead of a deserialization failure.
//=========================================================================================

#[derive(Deserialize, ToSchema, Default, Debug)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
}

#[derive(Deserialize, ToSchema, Default, Debug)]
#[serde(default)]
pub struct UsernameRequest {
    pub username: Option<String>,
}

#[derive(Deserialize, ToSchema, Default, Debug)]
#[serde(default)]
pub struct StartRecordingRequest {
    pub username: Option<String>,
    /// Defaults to 900 seconds.
    pub total_duration_seconds: Option<u64>,
    /// Defaults to 180 seconds.
    pub chunk_duration_seconds: Option<u64>,
}

//=========================================================================================
// Response Payloads
//=========================================================================================

#[derive(Serialize, ToSchema, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct UserEnvelope {
    pub message: String,
    pub user: UserResponse,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct UserListResponse {
    pub total_users: usize,
    pub users: Vec<UserResponse>,
}

/// A persisted chunk, flattened.
#[derive(Serialize, ToSchema, Debug)]
pub struct ChunkResponse {
    pub id: i64,
    pub clip_id: u32,
    pub user_id: i64,
    pub user_name: String,
    pub recording_date: DateTime<Utc>,
    pub file_name: String,
    pub file_path: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub chunk_duration_seconds: u64,
    pub created_at: DateTime<Utc>,
}

impl From<ChunkRecord> for ChunkResponse {
    fn from(chunk: ChunkRecord) -> Self {
        Self {
            id: chunk.id,
            clip_id: chunk.clip_id,
            user_id: chunk.user_id,
            user_name: chunk.user_name,
            recording_date: chunk.recording_date,
            file_name: chunk.file_name,
            file_path: chunk.file_path,
            start_time: chunk.start_time,
            end_time: chunk.end_time,
            duration_seconds: chunk.duration_seconds,
            chunk_duration_seconds: chunk.chunk_duration_seconds,
            created_at: chunk.created_at,
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ChunkListResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub total_chunks: usize,
    pub chunks: Vec<ChunkResponse>,
}

impl ChunkListResponse {
    pub fn new(username: Option<String>, chunks: Vec<ChunkRecord>) -> Self {
        Self {
            username,
            total_chunks: chunks.len(),
            chunks: chunks.into_iter().map(ChunkResponse::from).collect(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct StartRecordingResponse {
    pub message: String,
    pub username: String,
    pub total_duration_seconds: u64,
    pub chunk_duration_seconds: u64,
    pub expected_chunks: u64,
}

/// A chunk as the session saw it, before (or regardless of) persistence.
#[derive(Serialize, ToSchema, Debug)]
pub struct RecordedChunkResponse {
    pub chunk_number: u32,
    pub user_name: String,
    pub file_name: String,
    pub file_path: String,
    pub record_start_time: DateTime<Utc>,
    pub record_end_time: DateTime<Utc>,
    pub duration: f64,
}

impl From<ChunkCompleted> for RecordedChunkResponse {
    fn from(chunk: ChunkCompleted) -> Self {
        Self {
            chunk_number: chunk.sequence_number,
            user_name: chunk.user_name,
            file_name: chunk.file_name,
            file_path: chunk.file_path.to_string_lossy().into_owned(),
            record_start_time: chunk.started_at,
            record_end_time: chunk.ended_at,
            duration: chunk.duration.as_secs_f64(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct StopRecordingResponse {
    pub message: String,
    pub username: String,
    pub total_chunks: usize,
    pub chunks: Vec<RecordedChunkResponse>,
}

/// Only `username` and `is_recording` are present for a user with no session.
#[derive(Serialize, ToSchema, Debug)]
pub struct RecordingStatusResponse {
    pub username: String,
    pub is_recording: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_duration_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks_so_far: Option<usize>,
}

impl From<SessionStatus> for RecordingStatusResponse {
    fn from(status: SessionStatus) -> Self {
        let progress = status.progress;
        Self {
            username: status.user_name,
            is_recording: status.is_recording,
            elapsed_seconds: progress.as_ref().map(|p| p.elapsed_seconds),
            total_duration_seconds: progress.as_ref().map(|p| p.total_duration_seconds),
            chunk_duration_seconds: progress.as_ref().map(|p| p.chunk_duration_seconds),
            total_chunks_so_far: progress.as_ref().map(|p| p.chunks_so_far),
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct HealthResponse {
    pub status: String,
}
