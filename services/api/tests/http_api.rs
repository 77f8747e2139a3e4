use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_lib::web::{self, AppState};
use async_trait::async_trait;
use chrono::Utc;
use recording_core::{
    CaptureDevice, ChunkRecord, DatabaseService, FrameSettings, FrameSink, FrameSource,
    NewChunkRecord, PortError, PortResult, RecorderSettings, SessionRegistry, User,
    DEFAULT_STOP_TIMEOUT,
};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tempfile::tempdir;
use tokio::net::TcpListener;

//=========================================================================================
// In-memory adapters
//=========================================================================================

#[derive(Default)]
struct MemoryDb {
    users: Mutex<Vec<User>>,
    chunks: Mutex<HashMap<i64, ChunkRecord>>,
    next_chunk_id: Mutex<i64>,
    /// Makes `list_chunks` panic, standing in for a bug deep inside a handler.
    panic_on_list: AtomicBool,
}

#[async_trait]
impl DatabaseService for MemoryDb {
    async fn create_user(&self, username: &str, email: Option<&str>) -> PortResult<User> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.username == username) {
            return Err(PortError::Conflict(username.to_string()));
        }
        let user = User {
            id: users.len() as i64 + 1,
            username: username.to_string(),
            email: email.map(str::to_string),
            created_at: Utc::now(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> PortResult<User> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.username == username)
            .cloned()
            .ok_or_else(|| PortError::NotFound(username.to_string()))
    }

    async fn list_users(&self) -> PortResult<Vec<User>> {
        Ok(self.users.lock().unwrap().clone())
    }

    async fn save_chunk(&self, chunk: NewChunkRecord) -> PortResult<ChunkRecord> {
        let id = {
            let mut next = self.next_chunk_id.lock().unwrap();
            *next += 1;
            *next
        };
        let record = ChunkRecord {
            id,
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
            created_at: Utc::now(),
        };
        self.chunks.lock().unwrap().insert(id, record.clone());
        Ok(record)
    }

    async fn list_chunks(&self) -> PortResult<Vec<ChunkRecord>> {
        if self.panic_on_list.load(Ordering::SeqCst) {
            panic!("chunk index corrupted");
        }
        let mut chunks: Vec<_> = self.chunks.lock().unwrap().values().cloned().collect();
        chunks.sort_by_key(|c| c.id);
        Ok(chunks)
    }

    async fn list_chunks_for_user(&self, username: &str) -> PortResult<Vec<ChunkRecord>> {
        let mut chunks = self.list_chunks().await?;
        chunks.retain(|c| c.user_name == username);
        Ok(chunks)
    }

    async fn get_chunk(&self, chunk_id: i64) -> PortResult<ChunkRecord> {
        self.chunks
            .lock()
            .unwrap()
            .get(&chunk_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(chunk_id.to_string()))
    }

    async fn delete_chunk(&self, chunk_id: i64) -> PortResult<()> {
        self.chunks
            .lock()
            .unwrap()
            .remove(&chunk_id)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound(chunk_id.to_string()))
    }
}

/// Delivers a blank frame every 10 ms and swallows everything written to it.
struct BlankCamera;

struct BlankSource;

struct NullSink;

#[async_trait]
impl CaptureDevice for BlankCamera {
    async fn open_source(
        &self,
        _user_name: &str,
        _settings: &FrameSettings,
    ) -> PortResult<Box<dyn FrameSource>> {
        Ok(Box::new(BlankSource))
    }

    async fn open_sink(
        &self,
        _path: &Path,
        _settings: &FrameSettings,
    ) -> PortResult<Box<dyn FrameSink>> {
        Ok(Box::new(NullSink))
    }
}

#[async_trait]
impl FrameSource for BlankSource {
    async fn read_frame(&mut self) -> PortResult<Vec<u8>> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(vec![0u8; 16])
    }

    async fn close(self: Box<Self>) {}
}

#[async_trait]
impl FrameSink for NullSink {
    async fn write_frame(&mut self, _frame: &[u8]) -> PortResult<()> {
        Ok(())
    }

    async fn finish(self: Box<Self>) -> PortResult<()> {
        Ok(())
    }

    async fn discard(self: Box<Self>) {}
}

//=========================================================================================
// Harness
//=========================================================================================

struct ServerGuard(tokio::task::JoinHandle<()>);

impl Drop for ServerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    db: Arc<MemoryDb>,
    _guard: ServerGuard,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self.client.get(self.url(path)).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }

    async fn delete(&self, path: &str) -> (StatusCode, Value) {
        let res = self.client.delete(self.url(path)).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }
}

async fn spawn_server(output_dir: PathBuf) -> TestServer {
    let db = Arc::new(MemoryDb::default());
    let settings = RecorderSettings {
        output_dir,
        frame: FrameSettings::default(),
    };
    let sessions = Arc::new(SessionRegistry::new(
        Arc::new(BlankCamera),
        db.clone(),
        settings,
        DEFAULT_STOP_TIMEOUT,
    ));
    let state = Arc::new(AppState {
        db: db.clone(),
        sessions,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = web::router(state);
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        client: reqwest::Client::new(),
        db,
        _guard: ServerGuard(handle),
    }
}

fn stored_chunk(user_id: i64, file_name: &str, file_path: &Path) -> NewChunkRecord {
    let now = Utc::now();
    NewChunkRecord {
        clip_id: 1,
        user_id,
        user_name: "alice".to_string(),
        recording_date: now,
        file_name: file_name.to_string(),
        file_path: file_path.to_string_lossy().into_owned(),
        start_time: now,
        end_time: now,
        duration_seconds: 60.0,
        chunk_duration_seconds: 60,
    }
}

//=========================================================================================
// Tests
//=========================================================================================

#[tokio::test]
async fn health_reports_healthy() {
    let dir = tempdir().unwrap();
    let server = spawn_server(dir.path().to_path_buf()).await;

    let (status, body) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn users_register_once_and_log_in() {
    let dir = tempdir().unwrap();
    let server = spawn_server(dir.path().to_path_buf()).await;

    let (status, body) = server
        .post("/users/register", json!({ "username": "alice", "email": "a@example.com" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["username"], "alice");

    let (status, body) = server
        .post("/users/register", json!({ "username": "alice" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "User already exists");

    let (status, _) = server.post("/users/login", json!({ "username": "alice" })).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server.post("/users/login", json!({ "username": "bob" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");

    let (status, body) = server.get("/users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_users"], 1);
}

#[tokio::test]
async fn register_rejects_a_missing_username() {
    let dir = tempdir().unwrap();
    let server = spawn_server(dir.path().to_path_buf()).await;

    let (status, body) = server.post("/users/register", json!({ "email": "x@y.z" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn start_recording_validates_before_looking_up_the_user() {
    let dir = tempdir().unwrap();
    let server = spawn_server(dir.path().to_path_buf()).await;

    let (status, body) = server
        .post(
            "/start-recording",
            json!({ "username": "ghost", "total_duration_seconds": 120, "chunk_duration_seconds": 20 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "chunk_duration_seconds must be at least 30 seconds");

    let (status, body) = server
        .post("/start-recording", json!({ "username": "ghost" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found. Please register first.");
}

#[tokio::test]
async fn recording_lifecycle_start_conflict_stop_status() {
    let dir = tempdir().unwrap();
    let server = spawn_server(dir.path().to_path_buf()).await;
    server
        .post("/users/register", json!({ "username": "alice" }))
        .await;

    let start = json!({
        "username": "alice",
        "total_duration_seconds": 120,
        "chunk_duration_seconds": 60
    });
    let (status, body) = server.post("/start-recording", start.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expected_chunks"], 2);
    assert_eq!(body["total_duration_seconds"], 120);

    let (status, body) = server.get("/recording-status/alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_recording"], true);
    assert_eq!(body["chunk_duration_seconds"], 60);

    let (status, _) = server.post("/start-recording", start).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // A 60 s chunk at 30 fps needs 1800 frames (18 s of 10 ms frames), so the stop
    // always lands inside the first chunk after a few dozen frames.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let (status, body) = server
        .post("/stop-recording", json!({ "username": "alice" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["total_chunks"], 1);
    let chunks = body["chunks"].as_array().unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0]["chunk_number"], 1);
    assert_eq!(chunks[0]["user_name"], "alice");
    let file_name = chunks[0]["file_name"].as_str().unwrap().to_string();
    assert!(file_name.starts_with("alice_") && file_name.ends_with("_chunk_1.mp4"));

    let (status, body) = server.get("/recording-status/alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_recording"], false);
    assert_eq!(body["total_chunks_so_far"], 1);

    let (status, body) = server.get("/videos/alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["total_chunks"], 1);
    let row = &body["chunks"][0];
    assert_eq!(row["clip_id"], 1);
    assert_eq!(row["user_id"], 1);
    assert_eq!(row["file_name"], file_name.as_str());
    assert_eq!(row["chunk_duration_seconds"], 60);
}

#[tokio::test]
async fn malformed_ids_and_unknown_routes_answer_with_json_not_found() {
    let dir = tempdir().unwrap();
    let server = spawn_server(dir.path().to_path_buf()).await;

    let (status, body) = server.get("/video/abc").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");

    let (status, body) = server.get("/video/abc/download").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");

    let (status, body) = server.delete("/delete-video/abc").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");

    let (status, body) = server.get("/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");

    let res = server
        .client
        .get(format!("{}/elsewhere", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Not found");
}

#[tokio::test]
async fn a_panicking_handler_returns_a_json_server_error() {
    let dir = tempdir().unwrap();
    let server = spawn_server(dir.path().to_path_buf()).await;
    server.db.panic_on_list.store(true, Ordering::SeqCst);

    let (status, body) = server.get("/videos").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");

    // The server keeps serving after the panic.
    server.db.panic_on_list.store(false, Ordering::SeqCst);
    let (status, _) = server.get("/videos").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn stop_without_a_session_is_not_found() {
    let dir = tempdir().unwrap();
    let server = spawn_server(dir.path().to_path_buf()).await;

    let (status, _) = server
        .post("/stop-recording", json!({ "username": "nobody" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = server.get("/recording-status/nobody").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_recording"], false);
}

#[tokio::test]
async fn download_streams_the_file_as_an_attachment() {
    let dir = tempdir().unwrap();
    let server = spawn_server(dir.path().to_path_buf()).await;

    let path = dir.path().join("alice_20250101_120000_chunk_1.mp4");
    std::fs::write(&path, b"not really an mp4").unwrap();
    let saved = server
        .db
        .save_chunk(stored_chunk(1, "alice_20250101_120000_chunk_1.mp4", &path))
        .await
        .unwrap();

    let res = server
        .client
        .get(server.url(&format!("/video/{}/download", saved.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("video/mp4")
    );
    assert_eq!(
        res.headers()
            .get("content-disposition")
            .and_then(|v| v.to_str().ok()),
        Some("attachment; filename=\"alice_20250101_120000_chunk_1.mp4\"")
    );
    assert_eq!(res.bytes().await.unwrap().as_ref(), b"not really an mp4");
}

#[tokio::test]
async fn download_of_a_missing_file_is_not_found() {
    let dir = tempdir().unwrap();
    let server = spawn_server(dir.path().to_path_buf()).await;

    let saved = server
        .db
        .save_chunk(stored_chunk(1, "gone.mp4", &dir.path().join("gone.mp4")))
        .await
        .unwrap();

    let (status, body) = server.get(&format!("/video/{}/download", saved.id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Video file not found on disk");
}

#[tokio::test]
async fn delete_removes_the_row_even_when_the_file_is_gone() {
    let dir = tempdir().unwrap();
    let server = spawn_server(dir.path().to_path_buf()).await;

    let saved = server
        .db
        .save_chunk(stored_chunk(1, "gone.mp4", &dir.path().join("gone.mp4")))
        .await
        .unwrap();

    let (status, body) = server.delete(&format!("/video/{}", saved.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Video chunk deleted successfully");

    let (status, _) = server.get(&format!("/video/{}", saved.id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server.delete(&format!("/delete-video/{}", saved.id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_also_removes_the_file() {
    let dir = tempdir().unwrap();
    let server = spawn_server(dir.path().to_path_buf()).await;

    let path = dir.path().join("alice_chunk.mp4");
    std::fs::write(&path, b"frames").unwrap();
    let saved = server
        .db
        .save_chunk(stored_chunk(1, "alice_chunk.mp4", &path))
        .await
        .unwrap();

    let (status, _) = server.delete(&format!("/delete-video/{}", saved.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!path.exists());
}
