use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::auth::{validate_jwt, UserRecord};
use crate::error::ApiError;
use crate::server::AppState;

pub const SESSION_COOKIE: &str = "iso_hub.sid";

/// Authenticated user, from the session cookie or a bearer token
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user: UserRecord,
    /// Set when the request carried a live session cookie.
    pub session_id: Option<String>,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(sid) = session_cookie(&CookieJar::from_headers(&parts.headers)) {
            let user = state
                .sessions
                .get(&sid)
                .and_then(|entry| state.users.by_id(entry.user_id));
            if let Some(user) = user {
                return Ok(AuthUser {
                    user: user.clone(),
                    session_id: Some(sid),
                });
            }
            tracing::debug!("Unknown or expired session cookie");
        }

        let token = match extract_jwt_from_headers(&parts.headers) {
            Ok(Some(token)) => token,
            Ok(None) => return Err(ApiError::unauthorized("Not authenticated")),
            Err(msg) => return Err(ApiError::unauthorized(msg)),
        };
        let claims = validate_jwt(&token, &state.jwt_secret)?;
        let user = claims
            .sub
            .parse::<u64>()
            .ok()
            .and_then(|id| state.users.by_id(id))
            .ok_or_else(|| ApiError::unauthorized("Unknown user"))?;

        Ok(AuthUser {
            user: user.clone(),
            session_id: None,
        })
    }
}

/// Extract JWT token from Authorization header
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<Option<String>, String> {
    let Some(auth_header) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty JWT token".to_string());
        }
        Ok(Some(token.trim().to_string()))
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}

/// Live session id from the request cookies, if any.
pub fn session_cookie(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

pub fn create_session_cookie(sid: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, sid))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

pub fn clear_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::ZERO)
        .expires(time::OffsetDateTime::UNIX_EPOCH)
        .build()
}
