use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{handle_response, unwrap_envelope, ClientError, HostApi, LoginSession, RequestCache, SessionCookieJar};
use crate::session::UserProfile;

const USER_PATH: &str = "/api/user";
const LOGIN_PATH: &str = "/api/auth/simple-login";
const LOGOUT_PATH: &str = "/api/logout";

/// HTTP client for the Host Shell identity endpoints.
pub struct HostClient {
    http: reqwest::Client,
    base_url: String,
    cookies: Arc<SessionCookieJar>,
    cache: RequestCache,
    bearer: Option<String>,
}

impl HostClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let cookies = Arc::new(SessionCookieJar::new());
        let mut default_headers = reqwest::header::HeaderMap::new();
        default_headers.insert(
            reqwest::header::HeaderName::from_static("x-iso-hub-client"),
            reqwest::header::HeaderValue::from_static("bridge"),
        );
        let http = reqwest::Client::builder()
            .default_headers(default_headers)
            .cookie_provider(cookies.clone())
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        // Strip trailing slash for consistent URL construction
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            cookies,
            cache: RequestCache::new(),
            bearer: None,
        })
    }

    /// Authenticate with a stored token instead of the cookie session.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn cookies(&self) -> &SessionCookieJar {
        &self.cookies
    }

    pub fn cache(&self) -> &RequestCache {
        &self.cache
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let req = self.http.get(format!("{}{}", self.base_url, path));
        match &self.bearer {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// `GET /api/user` — profile of the current session, served from the
    /// request cache when present.
    pub async fn current_user(&self) -> Result<UserProfile, ClientError> {
        let body = match self.cache.get(USER_PATH) {
            Some(cached) => cached,
            None => {
                let resp = self.get(USER_PATH).send().await?;
                let body = unwrap_envelope(handle_response(resp).await?);
                self.cache.insert(USER_PATH, body.clone());
                body
            }
        };
        serde_json::from_value(body)
            .map_err(|e| ClientError::Protocol(format!("Invalid user profile: {}", e)))
    }

    /// `POST /api/logout` — end the Host Shell session server-side.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let mut req = self.http.post(format!("{}{}", self.base_url, LOGOUT_PATH));
        if let Some(token) = &self.bearer {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        handle_response(resp).await?;
        self.cache.clear();
        Ok(())
    }
}

#[async_trait]
impl HostApi for HostClient {
    async fn probe_session(&self) -> Result<bool, ClientError> {
        let resp = self.get(USER_PATH).send().await?;
        Ok(resp.status().is_success())
    }

    async fn login(&self, username: &str, password: &str) -> Result<LoginSession, ClientError> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, LOGIN_PATH))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        let body = unwrap_envelope(handle_response(resp).await?);
        // A body we cannot read as a session still means the cookie is set.
        Ok(serde_json::from_value(body).unwrap_or_default())
    }

    fn clear_session_cookies(&self) {
        self.cookies.clear();
    }

    fn clear_request_cache(&self) {
        self.cache.clear();
    }
}
