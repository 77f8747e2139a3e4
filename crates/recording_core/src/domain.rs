//! crates/recording_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;

/// Shortest chunk a session may be sliced into.
pub const MIN_CHUNK_DURATION_SECONDS: u64 = 30;
/// Shortest total recording a session may request.
pub const MIN_TOTAL_DURATION_SECONDS: u64 = 60;

pub const DEFAULT_TOTAL_DURATION_SECONDS: u64 = 900;
pub const DEFAULT_CHUNK_DURATION_SECONDS: u64 = 180;

// Represents a registered user - immutable once created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A recording request that failed its preconditions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("total_duration_seconds must be at least {MIN_TOTAL_DURATION_SECONDS} seconds")]
    TotalTooShort,
    #[error("chunk_duration_seconds must be at least {MIN_CHUNK_DURATION_SECONDS} seconds")]
    ChunkTooShort,
    #[error("chunk_duration_seconds cannot exceed total_duration_seconds")]
    ChunkExceedsTotal,
}

/// The parameters of one user's chunked recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingConfig {
    pub user_name: String,
    pub chunk_duration_seconds: u64,
    pub total_duration_seconds: u64,
}

impl RecordingConfig {
    pub fn new(
        user_name: impl Into<String>,
        chunk_duration_seconds: u64,
        total_duration_seconds: u64,
    ) -> Self {
        Self {
            user_name: user_name.into(),
            chunk_duration_seconds,
            total_duration_seconds,
        }
    }

    /// Checks the duration constraints. Callers must do this before a recorder is built.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.total_duration_seconds < MIN_TOTAL_DURATION_SECONDS {
            return Err(ValidationError::TotalTooShort);
        }
        if self.chunk_duration_seconds < MIN_CHUNK_DURATION_SECONDS {
            return Err(ValidationError::ChunkTooShort);
        }
        if self.chunk_duration_seconds > self.total_duration_seconds {
            return Err(ValidationError::ChunkExceedsTotal);
        }
        Ok(())
    }

    /// `ceil(total / chunk)`. Only meaningful for a validated config.
    pub fn expected_chunks(&self) -> u64 {
        self.total_duration_seconds.div_ceil(self.chunk_duration_seconds.max(1))
    }

    pub fn chunk_duration(&self) -> Duration {
        Duration::from_secs(self.chunk_duration_seconds)
    }

    pub fn total_duration(&self) -> Duration {
        Duration::from_secs(self.total_duration_seconds)
    }
}

/// Frame geometry and rate shared by the camera input and every chunk written from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            frame_rate: 30.0,
        }
    }
}

impl FrameSettings {
    /// Number of frames that make up a full chunk of the given length.
    pub fn frames_per_chunk(&self, chunk_duration_seconds: u64) -> u64 {
        (chunk_duration_seconds as f64 * self.frame_rate).round() as u64
    }
}

/// Emitted by the recorder once a chunk's file has been written and closed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkCompleted {
    pub sequence_number: u32,
    pub user_name: String,
    pub file_name: String,
    pub file_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Wall-clock time between opening and closing the chunk, not derived from frame count.
    pub duration: Duration,
    pub frames_written: u64,
}

/// A chunk ready to be persisted; the storage layer assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunkRecord {
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
}

impl NewChunkRecord {
    pub fn from_event(
        clip_id: u32,
        user_id: i64,
        chunk: &ChunkCompleted,
        chunk_duration_seconds: u64,
    ) -> Self {
        Self {
            clip_id,
            user_id,
            user_name: chunk.user_name.clone(),
            recording_date: Utc::now(),
            file_name: chunk.file_name.clone(),
            file_path: chunk.file_path.to_string_lossy().into_owned(),
            start_time: chunk.started_at,
            end_time: chunk.ended_at,
            duration_seconds: chunk.duration.as_secs_f64(),
            chunk_duration_seconds,
        }
    }
}

/// A persisted chunk row.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
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

/// Snapshot of a user's recording as reported by the session registry.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub user_name: String,
    pub is_recording: bool,
    /// `None` when the user has never had a session in this process.
    pub progress: Option<SessionProgress>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionProgress {
    pub elapsed_seconds: f64,
    pub total_duration_seconds: u64,
    pub chunk_duration_seconds: u64,
    pub chunks_so_far: usize,
}

/// What `stop_session` hands back: everything the session recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub user_name: String,
    pub chunks: Vec<ChunkCompleted>,
}
