//! crates/recording_core/src/sessions.rs
//!
//! The session registry: tracks at most one recording session per user, runs each
//! session's recorder on its own task, and answers start/stop/status requests.

use crate::domain::{
    ChunkCompleted, NewChunkRecord, RecordingConfig, SessionProgress, SessionStatus,
    SessionSummary, ValidationError,
};
use crate::ports::{CaptureDevice, DatabaseService};
use crate::recorder::{ChunkHandler, ChunkRecorder, RecorderSettings};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long `stop_session` waits for a recorder to wind down.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Recording already in progress for user {0}")]
    Conflict(String),
    #[error("No active recording for user {0}")]
    NotFound(String),
}

/// Returned by a successful `start_session`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionHandle {
    pub user_name: String,
    pub total_duration_seconds: u64,
    pub chunk_duration_seconds: u64,
    pub expected_chunks: u64,
    pub created_at: DateTime<Utc>,
}

/// The in-memory state of one user's recording. Never persisted.
pub struct RecordingSession {
    pub user_id: i64,
    pub user_name: String,
    pub config: RecordingConfig,
    pub created_at: DateTime<Utc>,
    started: Instant,
    /// Set the first time the session goes inactive; freezes the reported elapsed time.
    finished: OnceLock<Instant>,
    active: AtomicBool,
    chunk_counter: AtomicU32,
    chunks: Mutex<Vec<ChunkCompleted>>,
    stop: CancellationToken,
}

impl RecordingSession {
    fn new(user_id: i64, config: RecordingConfig, stop: CancellationToken) -> Self {
        Self {
            user_id,
            user_name: config.user_name.clone(),
            config,
            created_at: Utc::now(),
            started: Instant::now(),
            finished: OnceLock::new(),
            active: AtomicBool::new(true),
            chunk_counter: AtomicU32::new(0),
            chunks: Mutex::new(Vec::new()),
            stop,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn mark_inactive(&self) {
        self.active.store(false, Ordering::SeqCst);
        let _ = self.finished.set(Instant::now());
    }

    fn elapsed(&self) -> Duration {
        match self.finished.get() {
            Some(finished) => finished.duration_since(self.started),
            None => self.started.elapsed(),
        }
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunk_counter.load(Ordering::SeqCst)
    }

    async fn status(&self) -> SessionStatus {
        let chunks_so_far = self.chunks.lock().await.len();
        SessionStatus {
            user_name: self.user_name.clone(),
            is_recording: self.is_active(),
            progress: Some(SessionProgress {
                elapsed_seconds: self.elapsed().as_secs_f64(),
                total_duration_seconds: self.config.total_duration_seconds,
                chunk_duration_seconds: self.config.chunk_duration_seconds,
                chunks_so_far,
            }),
        }
    }

    async fn summary(&self) -> SessionSummary {
        SessionSummary {
            user_name: self.user_name.clone(),
            chunks: self.chunks.lock().await.clone(),
        }
    }
}

/// Forwards each finished chunk to the database and into the session's own list.
struct SessionChunkHandler {
    session: Arc<RecordingSession>,
    db: Arc<dyn DatabaseService>,
}

#[async_trait]
impl ChunkHandler for SessionChunkHandler {
    async fn on_chunk(&self, chunk: ChunkCompleted) {
        let clip_id = self.session.chunk_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let record = NewChunkRecord::from_event(
            clip_id,
            self.session.user_id,
            &chunk,
            self.session.config.chunk_duration_seconds,
        );

        // A failed write only loses the durable copy; the session keeps the chunk.
        match self.db.save_chunk(record).await {
            Ok(saved) => info!(
                "Chunk {} saved to database as row {}: {}",
                clip_id, saved.id, saved.file_name
            ),
            Err(e) => error!("Error saving chunk {} to database: {}", chunk.file_name, e),
        }

        self.session.chunks.lock().await.push(chunk);
    }
}

struct SessionSlot {
    session: Arc<RecordingSession>,
    task: Option<JoinHandle<()>>,
}

/// Process-wide registry of recording sessions, keyed by user name.
///
/// Created once at startup and shared with the request handlers through the
/// application state.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionSlot>>,
    device: Arc<dyn CaptureDevice>,
    db: Arc<dyn DatabaseService>,
    settings: RecorderSettings,
    stop_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        db: Arc<dyn DatabaseService>,
        settings: RecorderSettings,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            device,
            db,
            settings,
            stop_timeout,
        }
    }

    /// Starts recording for `user_name` on a new task.
    ///
    /// The conflict check and the insert happen under a single lock acquisition, so
    /// concurrent starts for the same user can never both succeed.
    pub async fn start_session(
        &self,
        user_name: &str,
        total_duration_seconds: u64,
        chunk_duration_seconds: u64,
        user_id: i64,
    ) -> Result<SessionHandle, SessionError> {
        let config = RecordingConfig::new(user_name, chunk_duration_seconds, total_duration_seconds);
        config.validate()?;

        let mut sessions = self.sessions.lock().await;
        if sessions
            .get(user_name)
            .is_some_and(|slot| slot.session.is_active())
        {
            return Err(SessionError::Conflict(user_name.to_string()));
        }

        let recorder = ChunkRecorder::new(config.clone(), self.settings.clone(), self.device.clone());
        let session = Arc::new(RecordingSession::new(user_id, config.clone(), recorder.stop_handle()));
        let handler = SessionChunkHandler {
            session: session.clone(),
            db: self.db.clone(),
        };

        let task = {
            let session = session.clone();
            tokio::spawn(async move {
                if let Err(e) = recorder.run(&handler).await {
                    warn!("Recording session for {} ended early: {}", session.user_name, e);
                }
                session.mark_inactive();
                info!(
                    "Recording completed for {}. Total chunks: {}",
                    session.user_name,
                    session.chunk_count()
                );
            })
        };

        info!(
            "Recording started for {} ({}s in {}s chunks)",
            user_name, total_duration_seconds, chunk_duration_seconds
        );
        let handle = SessionHandle {
            user_name: user_name.to_string(),
            total_duration_seconds,
            chunk_duration_seconds,
            expected_chunks: config.expected_chunks(),
            created_at: session.created_at,
        };
        sessions.insert(
            user_name.to_string(),
            SessionSlot {
                session,
                task: Some(task),
            },
        );
        Ok(handle)
    }

    /// Signals the user's recorder to stop and returns every chunk it produced.
    ///
    /// Waits up to the stop timeout for the recorder task; a task still running after
    /// that finishes its current chunk in the background. The session is marked
    /// inactive either way.
    pub async fn stop_session(&self, user_name: &str) -> Result<SessionSummary, SessionError> {
        let (session, task) = {
            let mut sessions = self.sessions.lock().await;
            let slot = sessions
                .get_mut(user_name)
                .ok_or_else(|| SessionError::NotFound(user_name.to_string()))?;
            (slot.session.clone(), slot.task.take())
        };

        info!("Recording stop requested for {}", user_name);
        session.stop.cancel();

        if let Some(mut task) = task {
            match tokio::time::timeout(self.stop_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Recording task for {} panicked: {}", user_name, e),
                Err(_) => warn!(
                    "Recording task for {} did not finish within {:?}; leaving it to complete in the background",
                    user_name, self.stop_timeout
                ),
            }
        }
        session.mark_inactive();

        Ok(session.summary().await)
    }

    /// Reports the user's recording state. An unknown user is simply not recording.
    pub async fn status(&self, user_name: &str) -> SessionStatus {
        let session = {
            let sessions = self.sessions.lock().await;
            sessions.get(user_name).map(|slot| slot.session.clone())
        };

        match session {
            Some(session) => session.status().await,
            None => SessionStatus {
                user_name: user_name.to_string(),
                is_recording: false,
                progress: None,
            },
        }
    }

    pub async fn active_sessions(&self) -> usize {
        let sessions = self.sessions.lock().await;
        sessions.values().filter(|slot| slot.session.is_active()).count()
    }

    /// Stops every live session, giving each the usual stop timeout to close its chunk.
    pub async fn shutdown(&self) {
        let tasks: Vec<(String, JoinHandle<()>)> = {
            let mut sessions = self.sessions.lock().await;
            sessions
                .iter_mut()
                .filter_map(|(name, slot)| {
                    slot.session.stop.cancel();
                    slot.task.take().map(|task| (name.clone(), task))
                })
                .collect()
        };

        for (user_name, task) in tasks {
            if tokio::time::timeout(self.stop_timeout, task).await.is_err() {
                warn!("Recording for {} was still running at shutdown", user_name);
            }
        }
    }
}
