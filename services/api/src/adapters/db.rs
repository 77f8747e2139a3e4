//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recording_core::domain::{ChunkRecord, NewChunkRecord, User};
use recording_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
///
/// Every call checks a connection out of the pool and returns it when done, so the
/// adapter is safe to use from the recorder tasks as well as request handlers.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

const USER_COLUMNS: &str = "id, username, email, created_at";

const CHUNK_COLUMNS: &str = "id, clip_id, user_id, user_name, recording_date, file_name, \
     file_path, start_time, end_time, duration_seconds, chunk_duration_seconds, created_at";

/// Maps a failed lookup to `NotFound` and everything else to `Unexpected`.
fn lookup_error(e: sqlx::Error, what: String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        _ => PortError::Unexpected(e.to_string()),
    }
}

/// Converts an unsigned domain value into a `BIGINT` column value.
fn to_column(value: u64, column: &str) -> PortResult<i64> {
    i64::try_from(value)
        .map_err(|_| PortError::Unexpected(format!("{} {} does not fit in a BIGINT", column, value)))
}

/// Converts a `BIGINT` column value back into an unsigned domain value.
fn from_column<T: TryFrom<i64>>(value: i64, column: &str) -> PortResult<T> {
    T::try_from(value)
        .map_err(|_| PortError::Unexpected(format!("Stored {} {} is out of range", column, value)))
}

/// Maps a unique-constraint violation to `Conflict`.
fn insert_error(e: sqlx::Error, what: String) -> PortError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => PortError::Conflict(what),
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: i64,
    username: String,
    email: Option<String>,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct ChunkRow {
    id: i64,
    clip_id: i64,
    user_id: i64,
    user_name: String,
    recording_date: DateTime<Utc>,
    file_name: String,
    file_path: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    duration_seconds: f64,
    chunk_duration_seconds: i64,
    created_at: DateTime<Utc>,
}
impl ChunkRow {
    fn to_domain(self) -> PortResult<ChunkRecord> {
        Ok(ChunkRecord {
            id: self.id,
            clip_id: from_column(self.clip_id, "clip_id")?,
            user_id: self.user_id,
            user_name: self.user_name,
            recording_date: self.recording_date,
            file_name: self.file_name,
            file_path: self.file_path,
            start_time: self.start_time,
            end_time: self.end_time,
            duration_seconds: self.duration_seconds,
            chunk_duration_seconds: from_column(
                self.chunk_duration_seconds,
                "chunk_duration_seconds",
            )?,
            created_at: self.created_at,
        })
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, username: &str, email: Option<&str>) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (username, email) VALUES ($1, $2) RETURNING {USER_COLUMNS}"
        ))
        .bind(username)
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| insert_error(e, format!("User {} already exists", username)))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_username(&self, username: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| lookup_error(e, format!("User {} not found", username)))?;
        Ok(record.to_domain())
    }

    async fn list_users(&self) -> PortResult<Vec<User>> {
        let records = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn save_chunk(&self, chunk: NewChunkRecord) -> PortResult<ChunkRecord> {
        let chunk_duration = to_column(chunk.chunk_duration_seconds, "chunk_duration_seconds")?;
        let record = sqlx::query_as::<_, ChunkRow>(&format!(
            "INSERT INTO video_chunks (clip_id, user_id, user_name, recording_date, file_name, \
             file_path, start_time, end_time, duration_seconds, chunk_duration_seconds) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {CHUNK_COLUMNS}"
        ))
        .bind(i64::from(chunk.clip_id))
        .bind(chunk.user_id)
        .bind(&chunk.user_name)
        .bind(chunk.recording_date)
        .bind(&chunk.file_name)
        .bind(&chunk.file_path)
        .bind(chunk.start_time)
        .bind(chunk.end_time)
        .bind(chunk.duration_seconds)
        .bind(chunk_duration)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| insert_error(e, format!("Chunk file {} already recorded", chunk.file_name)))?;
        record.to_domain()
    }

    async fn list_chunks(&self) -> PortResult<Vec<ChunkRecord>> {
        let records = sqlx::query_as::<_, ChunkRow>(&format!(
            "SELECT {CHUNK_COLUMNS} FROM video_chunks ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        records.into_iter().map(ChunkRow::to_domain).collect()
    }

    async fn list_chunks_for_user(&self, username: &str) -> PortResult<Vec<ChunkRecord>> {
        let records = sqlx::query_as::<_, ChunkRow>(&format!(
            "SELECT {CHUNK_COLUMNS} FROM video_chunks WHERE user_name = $1 ORDER BY id ASC"
        ))
        .bind(username)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        records.into_iter().map(ChunkRow::to_domain).collect()
    }

    async fn get_chunk(&self, chunk_id: i64) -> PortResult<ChunkRecord> {
        let record = sqlx::query_as::<_, ChunkRow>(&format!(
            "SELECT {CHUNK_COLUMNS} FROM video_chunks WHERE id = $1"
        ))
        .bind(chunk_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| lookup_error(e, format!("Video chunk {} not found", chunk_id)))?;
        record.to_domain()
    }

    async fn delete_chunk(&self, chunk_id: i64) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM video_chunks WHERE id = $1")
            .bind(chunk_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Video chunk {} not found", chunk_id)));
        }
        Ok(())
    }
}
