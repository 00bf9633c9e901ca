use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use super::{handle_response, AssistantApi, ClientError, SessionCookieJar};

/// HTTP client for the embedded assistant, plus the URL builders the host
/// needs to embed it.
pub struct AssistantClient {
    http: reqwest::Client,
    base_url: Url,
    cookies: Arc<SessionCookieJar>,
}

impl AssistantClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::Protocol(format!("Invalid assistant URL '{}': {}", base_url, e)))?;
        let cookies = Arc::new(SessionCookieJar::new());
        let http = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url,
            cookies,
        })
    }

    /// `scheme://host[:port]` of the assistant; the only origin AUTH messages
    /// are posted to.
    pub fn origin(&self) -> String {
        self.base_url.origin().ascii_serialization()
    }

    pub fn cookies(&self) -> &SessionCookieJar {
        &self.cookies
    }

    /// Absolute URL under the assistant for `segments`, each percent-encoded.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// iframe `src` for a route inside the assistant.
    pub fn frame_src(&self, route: &str) -> String {
        let segments: Vec<&str> = route.split('/').filter(|s| !s.is_empty()).collect();
        let mut url = self.endpoint(segments);
        if route.is_empty() || route == "/" {
            url.set_path(self.base_url.path());
        }
        url.to_string()
    }
}

#[async_trait]
impl AssistantApi for AssistantClient {
    async fn logout(&self) -> Result<(), ClientError> {
        let resp = self.http.get(self.endpoint(["api", "logout"])).send().await?;
        handle_response(resp).await?;
        Ok(())
    }

    fn download_url(&self, document_id: &str) -> String {
        self.endpoint(["api", "documents", document_id, "download"]).to_string()
    }
}
