// handlers/public/auth/login.rs - POST /api/auth/simple-login handler

use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use crate::auth::{generate_jwt, Claims};
use crate::error::ApiError;
use crate::middleware::auth::{create_session_cookie, session_cookie};
use crate::middleware::ApiResponse;
use crate::server::AppState;
use crate::session::UserProfile;

#[derive(Debug, Deserialize)]
pub struct SimpleLoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SimpleLoginResponse {
    pub token: String,
    pub user: UserProfile,
    /// Token lifetime in seconds.
    pub expires_in: u64,
}

/// POST /api/auth/simple-login - Authenticate and open a cookie session
///
/// Expected Input:
/// ```json
/// { "username": "string", "password": "string" }
/// ```
///
/// Expected Output (Success), plus `Set-Cookie: iso_hub.sid=...`:
/// ```json
/// {
///   "success": true,
///   "data": {
///     "token": "eyJhbGciOiJIUzI1NiI...",
///     "user": { "id": 1, "firstName": "demo", "username": "demo" },
///     "expires_in": 604800
///   }
/// }
/// ```
///
/// A session cookie sent with the request is closed first, so one login
/// never inherits another.
pub async fn simple_login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<SimpleLoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let username = payload.username.trim();
    if username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Username and password are required"));
    }

    let users = state.users.clone();
    let (name, password) = (username.to_string(), payload.password);
    let verified = tokio::task::spawn_blocking(move || users.verify(&name, &password).cloned())
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Password check failed: {}", e)))?;
    let user = verified.ok_or_else(|| {
        tracing::warn!("Failed login for '{}'", username);
        ApiError::unauthorized("Invalid username or password")
    })?;

    if let Some(previous) = session_cookie(&jar) {
        state.sessions.remove(&previous);
    }

    let token = generate_jwt(&Claims::new(&user, state.jwt_expiry_hours), &state.jwt_secret)?;
    let sid = state.sessions.create(user.id);
    tracing::info!("User '{}' logged in", user.username);

    let body = SimpleLoginResponse {
        token,
        user: user.profile(),
        expires_in: state.jwt_expiry_hours * 3600,
    };
    Ok((
        jar.add(create_session_cookie(sid, state.secure_cookies)),
        ApiResponse::success(body),
    ))
}
