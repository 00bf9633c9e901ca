//! HTTP clients for the Host Shell identity API and the Assistant API.
//!
//! The controllers depend on the [`HostApi`] and [`AssistantApi`] traits;
//! [`HostClient`] and [`AssistantClient`] are the reqwest-backed
//! implementations.
//!
//! ## Error handling
//!
//! Non-2xx responses are parsed for a `message` (or `error`) field in the
//! JSON body. If parsing fails, the raw response body is used as the message.

pub mod assistant;
pub mod cache;
pub mod cookies;
pub mod host;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::session::{SessionCredential, UserProfile};

pub use assistant::AssistantClient;
pub use cache::RequestCache;
pub use cookies::SessionCookieJar;
pub use host::HostClient;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport failure (connection refused, timeout, DNS, ...).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("Server error (HTTP {status}): {message}")]
    Status { status: u16, message: String },

    /// The response body was not what the contract promises.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Status { status: 401 | 403, .. })
    }

    /// Message suitable for showing next to a login form.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Status { message, .. } if !message.is_empty() => message.clone(),
            ClientError::Status { status, .. } => format!("Login failed (HTTP {})", status),
            ClientError::Request(_) => {
                "Unable to reach the server. Check your connection and try again.".to_string()
            }
            ClientError::Protocol(_) => "Unexpected response from the server".to_string(),
        }
    }
}

/// Body of a successful simple-login. Either field may be missing when the
/// server only establishes a cookie session.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LoginSession {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

impl LoginSession {
    pub fn credential(&self) -> Option<SessionCredential> {
        Some(SessionCredential {
            token: self.token.clone()?,
            user: self.user.clone()?,
        })
    }
}

/// Host Shell identity endpoints plus the client-side state the login
/// controller resets around a login.
#[async_trait]
pub trait HostApi: Send + Sync {
    /// `GET /api/user` with credentials. `true` iff the server answers 2xx.
    async fn probe_session(&self) -> Result<bool, ClientError>;

    /// `POST /api/auth/simple-login`.
    async fn login(&self, username: &str, password: &str) -> Result<LoginSession, ClientError>;

    fn clear_session_cookies(&self);

    fn clear_request_cache(&self);
}

#[async_trait]
pub trait AssistantApi: Send + Sync {
    /// `GET {assistant}/api/logout` with credentials.
    async fn logout(&self) -> Result<(), ClientError>;

    /// Download endpoint for a document held by the assistant.
    fn download_url(&self, document_id: &str) -> String;
}

/// Parse an HTTP response: JSON body on success, [`ClientError::Status`]
/// carrying the server's message otherwise.
pub(crate) async fn handle_response(resp: reqwest::Response) -> Result<Value, ClientError> {
    let status = resp.status();
    let body = resp.text().await?;

    if status.is_success() {
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| ClientError::Protocol(format!("Invalid JSON from server: {}", e)))
    } else {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .or_else(|| v.get("error"))
                    .and_then(Value::as_str)
                    .map(String::from)
            })
            .unwrap_or(body);
        Err(ClientError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

/// Responses may arrive wrapped as `{ success, data }`; return the payload.
pub(crate) fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") && map.contains_key("success") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}
