pub mod http_error;
pub mod protocol;
pub mod recording;
pub mod rest;
pub mod state;
pub mod users;
pub mod videos;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

pub use recording::{recording_status_handler, start_recording_handler, stop_recording_handler};
pub use rest::{health_handler, ApiDoc};
pub use state::AppState;

/// Builds the REST router. Every route lives under `/api`.
pub fn router(app_state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_handler))
        // Users
        .route("/users/register", post(users::register_handler))
        .route("/users/login", post(users::login_handler))
        .route("/users", get(users::list_users_handler))
        .route("/users/{username}", get(users::get_user_handler))
        // Recording sessions
        .route("/start-recording", post(start_recording_handler))
        .route("/stop-recording", post(stop_recording_handler))
        .route("/recording-status/{username}", get(recording_status_handler))
        // Recorded chunks
        .route("/videos", get(videos::list_videos_handler))
        .route("/videos/{username}", get(videos::list_user_videos_handler))
        .route(
            "/video/{id}",
            get(videos::get_video_handler).delete(videos::delete_video_handler),
        )
        .route("/video/{id}/download", get(videos::download_video_handler))
        // Kept for older dashboards that delete through this path.
        .route("/delete-video/{id}", axum::routing::delete(videos::delete_video_handler));

    // Every error, including unmatched routes and panics, answers with `{ "error": ... }`.
    Router::new()
        .nest("/api", api_routes)
        .fallback(http_error::route_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(http_error::panic_response))
        .with_state(app_state)
}
