use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::bridge::{AssistantFrame, FrameError};
use crate::client::{AssistantApi, ClientError, HostApi, LoginSession};
use crate::protocol::EmbedMessage;
use crate::window::{DownloadRequest, HostWindow};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Shared, ordered log of side effects across several fakes, for asserting
/// cross-component ordering.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        lock(&self.entries).push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.entries).clone()
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

/// Frame that records what was posted to it
pub struct RecordingFrame {
    posted: Mutex<Vec<(EmbedMessage, String)>>,
    attached: AtomicBool,
    failing: AtomicBool,
}

impl RecordingFrame {
    pub fn new() -> Self {
        Self {
            posted: Mutex::new(Vec::new()),
            attached: AtomicBool::new(true),
            failing: AtomicBool::new(false),
        }
    }

    pub fn posted(&self) -> Vec<(EmbedMessage, String)> {
        lock(&self.posted).clone()
    }

    pub fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }

    pub fn attach(&self) {
        self.attached.store(true, Ordering::SeqCst);
    }

    /// Make `post_message` fail without recording.
    pub fn fail_posts(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Default for RecordingFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl AssistantFrame for RecordingFrame {
    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    fn post_message(&self, message: &EmbedMessage, target_origin: &str) -> Result<(), FrameError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FrameError::Closed);
        }
        lock(&self.posted).push((message.clone(), target_origin.to_string()));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEvent {
    NavigateTop(String),
    ReloadTo(String),
    Download(DownloadRequest),
}

#[derive(Default)]
pub struct RecordingWindow {
    events: Mutex<Vec<WindowEvent>>,
    journal: Option<Journal>,
}

impl RecordingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            journal: Some(journal),
        }
    }

    pub fn events(&self) -> Vec<WindowEvent> {
        lock(&self.events).clone()
    }

    fn record(&self, event: WindowEvent, entry: String) {
        if let Some(journal) = &self.journal {
            journal.push(entry);
        }
        lock(&self.events).push(event);
    }
}

impl HostWindow for RecordingWindow {
    fn navigate_top(&self, url: &str) {
        self.record(WindowEvent::NavigateTop(url.to_string()), format!("navigate:{}", url));
    }

    fn reload_to(&self, url: &str) {
        self.record(WindowEvent::ReloadTo(url.to_string()), format!("reload:{}", url));
    }

    fn download(&self, request: DownloadRequest) {
        let entry = format!("download:{}", request.filename);
        self.record(WindowEvent::Download(request), entry);
    }
}

/// Assistant API that counts logout calls
pub struct FakeAssistant {
    base_url: String,
    logout_calls: AtomicUsize,
    fail_logout: bool,
    logout_delay: Option<Duration>,
}

impl FakeAssistant {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            logout_calls: AtomicUsize::new(0),
            fail_logout: false,
            logout_delay: None,
        }
    }

    pub fn failing(base_url: &str) -> Self {
        Self {
            fail_logout: true,
            ..Self::new(base_url)
        }
    }

    /// Logout answers only after `delay`.
    pub fn with_logout_delay(mut self, delay: Duration) -> Self {
        self.logout_delay = Some(delay);
        self
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssistantApi for FakeAssistant {
    async fn logout(&self) -> Result<(), ClientError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.logout_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_logout {
            return Err(ClientError::Status {
                status: 502,
                message: "assistant unavailable".into(),
            });
        }
        Ok(())
    }

    fn download_url(&self, document_id: &str) -> String {
        format!("{}/api/documents/{}/download", self.base_url, document_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Authenticated,
    Unauthenticated,
    /// Transport error.
    Fail,
    /// Never answers.
    Hang,
}

/// Host API with a scripted probe and login result
pub struct ScriptedHost {
    probe: ProbeOutcome,
    login: Mutex<Result<LoginSession, ClientError>>,
    login_calls: AtomicUsize,
    last_password: Mutex<Option<String>>,
    journal: Journal,
}

impl ScriptedHost {
    pub fn new(probe: ProbeOutcome) -> Self {
        Self {
            probe,
            login: Mutex::new(Err(ClientError::Status {
                status: 401,
                message: "Invalid username or password".into(),
            })),
            login_calls: AtomicUsize::new(0),
            last_password: Mutex::new(None),
            journal: Journal::new(),
        }
    }

    pub fn with_login(self, result: Result<LoginSession, ClientError>) -> Self {
        self.set_login(result);
        self
    }

    pub fn set_login(&self, result: Result<LoginSession, ClientError>) {
        *lock(&self.login) = result;
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn last_password(&self) -> Option<String> {
        lock(&self.last_password).clone()
    }
}

// reqwest errors cannot be built by hand, so a scripted error is replayed
// as an equivalent variant.
fn replay(error: &ClientError) -> ClientError {
    match error {
        ClientError::Status { status, message } => ClientError::Status {
            status: *status,
            message: message.clone(),
        },
        other => ClientError::Protocol(other.to_string()),
    }
}

#[async_trait]
impl HostApi for ScriptedHost {
    async fn probe_session(&self) -> Result<bool, ClientError> {
        self.journal.push("probe");
        match self.probe {
            ProbeOutcome::Authenticated => Ok(true),
            ProbeOutcome::Unauthenticated => Ok(false),
            ProbeOutcome::Fail => Err(ClientError::Protocol("connection reset".into())),
            ProbeOutcome::Hang => std::future::pending().await,
        }
    }

    async fn login(&self, username: &str, password: &str) -> Result<LoginSession, ClientError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.journal.push(format!("login:{}", username));
        *lock(&self.last_password) = Some(password.to_string());
        match &*lock(&self.login) {
            Ok(session) => Ok(session.clone()),
            Err(e) => Err(replay(e)),
        }
    }

    fn clear_session_cookies(&self) {
        self.journal.push("clear_cookies");
    }

    fn clear_request_cache(&self) {
        self.journal.push("clear_cache");
    }
}
