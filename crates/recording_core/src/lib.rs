pub mod domain;
pub mod ports;
pub mod recorder;
pub mod sessions;

pub use domain::{
    ChunkCompleted, ChunkRecord, FrameSettings, NewChunkRecord, RecordingConfig, SessionProgress,
    SessionStatus, SessionSummary, User, ValidationError,
};
pub use ports::{
    CaptureDevice, DatabaseService, FrameSink, FrameSource, PortError, PortResult,
};
pub use recorder::{ChunkHandler, ChunkRecorder, RecorderError, RecorderOutcome, RecorderSettings};
pub use sessions::{SessionError, SessionHandle, SessionRegistry, DEFAULT_STOP_TIMEOUT};
