//! services/api/src/web/users.rs
//!
//! User registration and lookup endpoints.

use crate::web::{
    http_error::{required_username, HttpError},
    protocol::{
        ErrorResponse, RegisterRequest, UserEnvelope, UserListResponse, UserResponse,
        UsernameRequest,
    },
    state::AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use recording_core::PortError;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::info;

const MIN_USERNAME_LEN: usize = 3;

/// Usernames end up in chunk file names, so only path-safe characters are allowed.
fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]{1,64}$").expect("static regex"))
}

fn validate_new_username(username: &str) -> Result<(), HttpError> {
    if username.chars().count() < MIN_USERNAME_LEN {
        return Err(HttpError::bad_request(format!(
            "username must be at least {} characters",
            MIN_USERNAME_LEN
        )));
    }
    if !username_pattern().is_match(username) || username.starts_with('.') {
        return Err(HttpError::bad_request(
            "username may contain at most 64 letters, digits, '_', '.' or '-' and must not start with '.'",
        ));
    }
    Ok(())
}

/// POST /users/register - Create a new user
#[utoipa::path(
    post,
    path = "/api/users/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully", body = UserEnvelope),
        (status = 400, description = "Missing or invalid username", body = ErrorResponse),
        (status = 409, description = "User already exists", body = ErrorResponse)
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, HttpError> {
    let Json(req) = payload?;
    let username = required_username(req.username)?;
    validate_new_username(&username)?;
    let email = req
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());

    let user = state
        .db
        .create_user(&username, email.as_deref())
        .await
        .map_err(|e| match e {
            PortError::Conflict(_) => HttpError::conflict("User already exists"),
            other => other.into(),
        })?;
    info!("Registered user {} (id {})", user.username, user.id);

    Ok((
        StatusCode::CREATED,
        Json(UserEnvelope {
            message: "User registered successfully".to_string(),
            user: user.into(),
        }),
    ))
}

/// POST /users/login - Verify that a user exists
#[utoipa::path(
    post,
    path = "/api/users/login",
    request_body = UsernameRequest,
    responses(
        (status = 200, description = "Login successful", body = UserEnvelope),
        (status = 400, description = "Missing username", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UsernameRequest>, JsonRejection>,
) -> Result<Json<UserEnvelope>, HttpError> {
    let Json(req) = payload?;
    let username = required_username(req.username)?;

    let user = state
        .db
        .get_user_by_username(&username)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => HttpError::not_found("User not found"),
            other => other.into(),
        })?;

    Ok(Json(UserEnvelope {
        message: format!("Welcome {}!", user.username),
        user: user.into(),
    }))
}

/// GET /users - List every registered user
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "All registered users", body = UserListResponse)
    )
)]
pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<UserListResponse>, HttpError> {
    let users = state.db.list_users().await?;
    Ok(Json(UserListResponse {
        total_users: users.len(),
        users: users.into_iter().map(UserResponse::from).collect(),
    }))
}

/// GET /users/{username} - Look up a single user
#[utoipa::path(
    get,
    path = "/api/users/{username}",
    params(("username" = String, Path, description = "The user's unique name.")),
    responses(
        (status = 200, description = "The user", body = UserResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
pub async fn get_user_handler(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Json<UserResponse>, HttpError> {
    let user = state
        .db
        .get_user_by_username(&username)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => HttpError::not_found("User not found"),
            other => other.into(),
        })?;
    Ok(Json(user.into()))
}
