//! crates/recording_core/src/recorder.rs
//!
//! The chunk recorder: drives one session's capture loop, slicing the total
//! recording budget into bounded chunks and reporting each finished chunk.
//!
//! Cancellation is cooperative. The stop token is checked at the top of every
//! frame iteration and at every chunk boundary; a frame write already in flight
//! is allowed to complete.

use crate::domain::{ChunkCompleted, FrameSettings, RecordingConfig};
use crate::ports::{CaptureDevice, FrameSink, FrameSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Failures that end a recording loop. They never reach request handlers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecorderError {
    #[error("Cannot open capture device: {0}")]
    DeviceUnavailable(String),
    #[error("Cannot create output for chunk {sequence_number}: {reason}")]
    SinkCreationFailed { sequence_number: u32, reason: String },
    #[error("Error reading frame from capture device: {0}")]
    CaptureReadFailed(String),
    #[error("Error writing frame to chunk {sequence_number}: {reason}")]
    SinkWriteFailed { sequence_number: u32, reason: String },
}

/// How a recording loop ended when nothing went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderOutcome {
    /// The total duration budget was used up.
    Completed { chunks: u32 },
    /// The stop token was observed.
    Stopped { chunks: u32 },
}

/// Receives every chunk the recorder finishes, in order, before the next chunk starts.
#[async_trait]
pub trait ChunkHandler: Send + Sync {
    async fn on_chunk(&self, chunk: ChunkCompleted);
}

/// Where and how chunks get written. Shared by every session of a process.
#[derive(Debug, Clone)]
pub struct RecorderSettings {
    pub output_dir: PathBuf,
    pub frame: FrameSettings,
}

/// `{user}_{YYYYMMDD_HHMMSS}_chunk_{n}.mp4`, stamped with the chunk's capture start.
pub fn chunk_file_name(user_name: &str, started_at: DateTime<Utc>, sequence_number: u32) -> String {
    format!(
        "{}_{}_chunk_{}.mp4",
        user_name,
        started_at.format("%Y%m%d_%H%M%S"),
        sequence_number
    )
}

pub struct ChunkRecorder {
    config: RecordingConfig,
    settings: RecorderSettings,
    device: Arc<dyn CaptureDevice>,
    stop: CancellationToken,
}

/// Why the frame loop of a single chunk ended.
enum ChunkEnd {
    FrameBudget,
    TotalReached,
    StopRequested,
    Failed(RecorderError),
}

impl ChunkRecorder {
    /// The config must already have passed `RecordingConfig::validate`.
    pub fn new(
        config: RecordingConfig,
        settings: RecorderSettings,
        device: Arc<dyn CaptureDevice>,
    ) -> Self {
        Self {
            config,
            settings,
            device,
            stop: CancellationToken::new(),
        }
    }

    /// A token that, once cancelled, stops the recorder at its next checkpoint.
    pub fn stop_handle(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn request_stop(&self) {
        self.stop.cancel();
    }

    /// Runs the capture loop to completion, invoking `handler` once per finished chunk.
    pub async fn run(&self, handler: &dyn ChunkHandler) -> Result<RecorderOutcome, RecorderError> {
        let mut source = self
            .device
            .open_source(&self.config.user_name, &self.settings.frame)
            .await
            .map_err(|e| {
                error!("Cannot open capture device for {}: {}", self.config.user_name, e);
                RecorderError::DeviceUnavailable(e.to_string())
            })?;

        let result = self.record_chunks(source.as_mut(), handler).await;
        source.close().await;

        match &result {
            Ok(outcome) => info!("Recording for {} finished: {:?}", self.config.user_name, outcome),
            Err(e) => error!("Recording for {} failed: {}", self.config.user_name, e),
        }
        result
    }

    async fn record_chunks(
        &self,
        source: &mut dyn FrameSource,
        handler: &dyn ChunkHandler,
    ) -> Result<RecorderOutcome, RecorderError> {
        let recording_started = Instant::now();
        let total = self.config.total_duration();
        let expected_chunks = self.config.expected_chunks();
        let mut sequence_number: u32 = 0;
        let mut emitted: u32 = 0;

        loop {
            if self.stop.is_cancelled() {
                return Ok(RecorderOutcome::Stopped { chunks: emitted });
            }

            sequence_number += 1;
            let started_at = Utc::now();
            let chunk_clock = Instant::now();
            let file_name = chunk_file_name(&self.config.user_name, started_at, sequence_number);
            let file_path = self.settings.output_dir.join(&file_name);

            let mut sink = self
                .device
                .open_sink(&file_path, &self.settings.frame)
                .await
                .map_err(|e| RecorderError::SinkCreationFailed {
                    sequence_number,
                    reason: e.to_string(),
                })?;

            let (frames_written, end) = self
                .record_frames(source, sink.as_mut(), sequence_number, recording_started)
                .await;

            let closed = if frames_written == 0 {
                sink.discard().await;
                warn!("Chunk {} captured no frames; discarded {}", sequence_number, file_name);
                false
            } else {
                match sink.finish().await {
                    Ok(()) => true,
                    Err(e) => {
                        error!("Failed to close chunk {} ({}): {}", sequence_number, file_name, e);
                        false
                    }
                }
            };

            if closed {
                let ended_at = Utc::now();
                let chunk = ChunkCompleted {
                    sequence_number,
                    user_name: self.config.user_name.clone(),
                    file_name,
                    file_path,
                    started_at,
                    ended_at,
                    duration: chunk_clock.elapsed(),
                    frames_written,
                };
                info!("Chunk {} saved: {}", sequence_number, chunk.file_name);
                handler.on_chunk(chunk).await;
                emitted += 1;
            }

            match end {
                ChunkEnd::Failed(e) => return Err(e),
                ChunkEnd::StopRequested => return Ok(RecorderOutcome::Stopped { chunks: emitted }),
                ChunkEnd::TotalReached => return Ok(RecorderOutcome::Completed { chunks: emitted }),
                ChunkEnd::FrameBudget => {}
            }

            if recording_started.elapsed() >= total || u64::from(sequence_number) >= expected_chunks {
                return Ok(RecorderOutcome::Completed { chunks: emitted });
            }
        }
    }

    /// Copies frames from `source` to `sink` until one of the chunk's exit conditions holds.
    async fn record_frames(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        sequence_number: u32,
        recording_started: Instant,
    ) -> (u64, ChunkEnd) {
        let target_frames = self
            .settings
            .frame
            .frames_per_chunk(self.config.chunk_duration_seconds);
        let total = self.config.total_duration();
        let mut frames_written: u64 = 0;

        while frames_written < target_frames {
            if self.stop.is_cancelled() {
                return (frames_written, ChunkEnd::StopRequested);
            }

            let frame = match source.read_frame().await {
                Ok(frame) => frame,
                Err(e) => {
                    return (
                        frames_written,
                        ChunkEnd::Failed(RecorderError::CaptureReadFailed(e.to_string())),
                    )
                }
            };

            if let Err(e) = sink.write_frame(&frame).await {
                return (
                    frames_written,
                    ChunkEnd::Failed(RecorderError::SinkWriteFailed {
                        sequence_number,
                        reason: e.to_string(),
                    }),
                );
            }
            frames_written += 1;

            if recording_started.elapsed() >= total {
                return (frames_written, ChunkEnd::TotalReached);
            }
        }

        (frames_written, ChunkEnd::FrameBudget)
    }
}
