//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{camera::FfmpegCameraAdapter, db::DbAdapter},
    config::Config,
    error::ApiError,
    web::{self, rest::ApiDoc, state::AppState},
};
use axum::http::{header::CONTENT_TYPE, HeaderValue, Method};
use axum::Router;
use recording_core::SessionRegistry;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Prepare Storage & the Capture Device ---
    tokio::fs::create_dir_all(&config.recordings_dir).await?;
    info!("Recordings will be written to {}", config.recordings_dir.display());

    let camera = Arc::new(
        FfmpegCameraAdapter::new(
            config.ffmpeg_path.clone(),
            config.camera_input_format.clone(),
            config.camera_device.clone(),
        )
        .with_overlay(config.frame_overlay),
    );

    // --- 4. Build the Shared AppState ---
    let sessions = Arc::new(SessionRegistry::new(
        camera,
        db_adapter.clone(),
        config.recorder_settings(),
        config.stop_timeout,
    ));
    let app_state = Arc::new(AppState {
        db: db_adapter,
        sessions: sessions.clone(),
    });

    // --- 5. Create the Web Router ---
    let mut api_router = web::router(app_state);
    if let Some(origin) = &config.cors_origin {
        let origin = origin
            .parse::<HeaderValue>()
            .map_err(|e| ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", origin, e)))?;
        let cors = CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([CONTENT_TYPE]);
        api_router = api_router.layer(cors);
    }

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- 7. Stop Any Recordings Still Running ---
    let active = sessions.active_sessions().await;
    if active > 0 {
        info!("Stopping {} active recording session(s)...", active);
    }
    sessions.shutdown().await;
    info!("Server stopped.");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for the shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}
