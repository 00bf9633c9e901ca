// handlers/public/auth/logout.rs - POST /api/logout handler

use axum::{extract::State, response::IntoResponse};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;

use crate::middleware::auth::clear_session_cookie;
use crate::middleware::{ApiResponse, AuthUser};
use crate::server::AppState;

/// POST /api/logout - Close the cookie session, if any
///
/// Always succeeds and always expires the cookie, so a client can call it
/// without knowing whether its session is still alive.
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    user: Option<AuthUser>,
) -> impl IntoResponse {
    let closed = match user.as_ref().and_then(|u| u.session_id.as_deref()) {
        Some(sid) => state.sessions.remove(sid),
        None => false,
    };
    if let Some(user) = &user {
        tracing::info!("User '{}' logged out", user.user.username);
    }

    (
        jar.add(clear_session_cookie(state.secure_cookies)),
        ApiResponse::success(json!({ "logged_out": closed })),
    )
}
