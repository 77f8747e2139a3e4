//! crates/recording_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete database and camera implementations.

use crate::domain::{ChunkRecord, FrameSettings, NewChunkRecord, User};
use async_trait::async_trait;
use std::path::Path;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, devices).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Item already exists: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    /// Fails with `PortError::Conflict` when the username is taken.
    async fn create_user(&self, username: &str, email: Option<&str>) -> PortResult<User>;

    async fn get_user_by_username(&self, username: &str) -> PortResult<User>;

    async fn list_users(&self) -> PortResult<Vec<User>>;

    // --- Chunk Management ---
    async fn save_chunk(&self, chunk: NewChunkRecord) -> PortResult<ChunkRecord>;

    async fn list_chunks(&self) -> PortResult<Vec<ChunkRecord>>;

    async fn list_chunks_for_user(&self, username: &str) -> PortResult<Vec<ChunkRecord>>;

    async fn get_chunk(&self, chunk_id: i64) -> PortResult<ChunkRecord>;

    async fn delete_chunk(&self, chunk_id: i64) -> PortResult<()>;
}

/// The camera: one input stream per session, one encoded output per chunk.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Opens the live input. Called once per recording session; `user_name` labels
    /// the frames it delivers.
    async fn open_source(
        &self,
        user_name: &str,
        settings: &FrameSettings,
    ) -> PortResult<Box<dyn FrameSource>>;

    /// Opens a new encoded output file at `path`.
    async fn open_sink(
        &self,
        path: &Path,
        settings: &FrameSettings,
    ) -> PortResult<Box<dyn FrameSink>>;
}

#[async_trait]
pub trait FrameSource: Send {
    /// Reads the next raw frame, waiting for the device if needed.
    async fn read_frame(&mut self) -> PortResult<Vec<u8>>;

    /// Releases the device.
    async fn close(self: Box<Self>);
}

#[async_trait]
pub trait FrameSink: Send {
    async fn write_frame(&mut self, frame: &[u8]) -> PortResult<()>;

    /// Flushes and closes the output. The file is complete only once this returns `Ok`.
    async fn finish(self: Box<Self>) -> PortResult<()>;

    /// Closes the output and removes whatever was written.
    async fn discard(self: Box<Self>);
}
