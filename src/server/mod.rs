//! Host Shell identity server.
//!
//! | Route                          | Handler                               |
//! |--------------------------------|---------------------------------------|
//! | `GET /health`                  | liveness                              |
//! | `POST /api/auth/simple-login`  | credentials -> token, user, cookie    |
//! | `GET /api/user`                | current user (cookie or bearer)       |
//! | `POST /api/logout`             | drop the cookie session               |

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{PasswordError, SessionRegistry, UserDirectory};
use crate::config::AppConfig;
use crate::handlers;
use crate::middleware::ApiResponse;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserDirectory>,
    pub sessions: Arc<SessionRegistry>,
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub secure_cookies: bool,
    pub cors_origins: Vec<String>,
}

impl AppState {
    /// Hashes every configured password, so this is slow with many users.
    pub fn from_config(config: &AppConfig) -> Result<Self, PasswordError> {
        let session_ttl = chrono::Duration::hours(config.security.jwt_expiry_hours as i64);
        Ok(Self {
            users: Arc::new(UserDirectory::from_pairs(&config.server.users)?),
            sessions: Arc::new(SessionRegistry::new(session_ttl)),
            jwt_secret: config.security.jwt_secret.clone(),
            jwt_expiry_hours: config.security.jwt_expiry_hours,
            secure_cookies: config.security.secure_cookies,
            cors_origins: config.security.cors_origins.clone(),
        })
    }
}

pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origins);

    Router::new()
        .route("/health", get(health))
        .route("/api/auth/simple-login", post(handlers::public::auth::simple_login))
        .route("/api/logout", post(handlers::public::auth::logout))
        .route("/api/user", get(handlers::protected::auth::current_user))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

/// Credentialed CORS for the configured origins only.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

async fn health(State(state): State<AppState>) -> ApiResponse<Value> {
    ApiResponse::success(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
        "users": state.users.len(),
        "sessions": state.sessions.len(),
    }))
}

/// Bind `0.0.0.0:port` and serve until the process is stopped.
pub async fn serve(config: &AppConfig, port: u16) -> anyhow::Result<()> {
    if config.jwt_secret_is_missing() {
        anyhow::bail!("JWT_SECRET must be set outside development");
    }

    let state = AppState::from_config(config).context("failed to load users")?;
    if state.users.is_empty() {
        tracing::warn!("No users configured; set ISO_HUB_USERS=name:password,...");
    }

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("ISO-Hub identity server listening on http://{}", bind_addr);
    axum::serve(listener, app(state)).await.context("server error")?;
    Ok(())
}
