//! Host Shell login controller.
//!
//! ```text
//! CheckingExistingSession ──authenticated──────────────▶ Success (navigate home)
//!         │
//!         ├── embedded in a frame ─────────────────────▶ IframeRedirect (top-level home)
//!         │
//!         ├── ?username=&password= ─▶ AutoLoginFromUrl ─▶ Authenticating ─▶ Success | ShowForm{error}
//!         │
//!         └────────────────────────▶ ShowForm ─submit──▶ Authenticating ─▶ Success | ShowForm{error}
//! ```
//!
//! Every login clears session cookies before the POST; every success
//! clears the request cache and reloads the home route, in that order.

mod page;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::client::HostApi;
use crate::session::Session;
use crate::window::HostWindow;

pub use page::PageContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoginSource {
    Form,
    UrlParams,
}

/// A login in flight. Dropped on success or failure.
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub username: String,
    pub password: String,
    pub in_progress: bool,
    pub source: LoginSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    CheckingExistingSession,
    IframeRedirect,
    ShowForm { error: Option<String> },
    AutoLoginFromUrl,
    Authenticating { source: LoginSource },
    Success,
    Failure { message: String },
}

impl LoginState {
    pub fn renders_form(&self) -> bool {
        matches!(self, LoginState::ShowForm { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            LoginState::ShowForm { error } => error.as_deref(),
            LoginState::Failure { message } => Some(message),
            _ => None,
        }
    }
}

pub struct LoginController {
    host: Arc<dyn HostApi>,
    session: Session,
    window: Arc<dyn HostWindow>,
    home_url: String,
    probe_timeout: Duration,
    state: LoginState,
    attempt: Option<LoginAttempt>,
}

impl LoginController {
    pub fn new(
        host: Arc<dyn HostApi>,
        session: Session,
        window: Arc<dyn HostWindow>,
        home_url: impl Into<String>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            host,
            session,
            window,
            home_url: home_url.into(),
            probe_timeout,
            state: LoginState::CheckingExistingSession,
            attempt: None,
        }
    }

    pub fn state(&self) -> &LoginState {
        &self.state
    }

    pub fn attempt(&self) -> Option<&LoginAttempt> {
        self.attempt.as_ref()
    }

    fn transition(&mut self, next: LoginState) {
        tracing::debug!("Login state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run the mount sequence for the login page.
    pub async fn start(&mut self, page: &PageContext) -> LoginState {
        self.transition(LoginState::CheckingExistingSession);

        // The probe is abandoned (its request dropped) once the timeout fires.
        match tokio::time::timeout(self.probe_timeout, self.host.probe_session()).await {
            Ok(Ok(true)) => {
                tracing::info!("Existing host session found, skipping login");
                self.transition(LoginState::Success);
                self.window.navigate_top(&self.home_url);
                return self.state.clone();
            }
            Ok(Ok(false)) => tracing::debug!("No existing host session"),
            Ok(Err(e)) => tracing::warn!("Session probe failed: {}", e),
            Err(_) => tracing::warn!(
                "Session probe timed out after {:?}, continuing to login",
                self.probe_timeout
            ),
        }

        if page.is_embedded {
            // A login page inside someone else's frame would nest logins.
            tracing::info!("Login page loaded inside a frame, redirecting top-level window");
            self.transition(LoginState::IframeRedirect);
            self.window.navigate_top(&self.home_url);
            return self.state.clone();
        }

        if let Some((username, password)) = page.url_credentials() {
            self.transition(LoginState::AutoLoginFromUrl);
            return self.authenticate(username, password, LoginSource::UrlParams).await;
        }

        self.transition(LoginState::ShowForm { error: None });
        self.state.clone()
    }

    /// Form submission. Ignored unless the form is showing.
    pub async fn submit(&mut self, username: &str, password: &str) -> LoginState {
        if !self.state.renders_form() {
            tracing::warn!("Login submit ignored in state {:?}", self.state);
            return self.state.clone();
        }

        if username.trim().is_empty() || password.is_empty() {
            self.transition(LoginState::ShowForm {
                error: Some("Username and password are required".to_string()),
            });
            return self.state.clone();
        }

        self.authenticate(username.trim().to_string(), password.to_string(), LoginSource::Form)
            .await
    }

    async fn authenticate(&mut self, username: String, password: String, source: LoginSource) -> LoginState {
        self.attempt = Some(LoginAttempt {
            username: username.clone(),
            password: password.clone(),
            in_progress: true,
            source,
        });
        self.transition(LoginState::Authenticating { source });

        // Stale cookies must be gone before the POST so the server cannot
        // merge the new login into an old session.
        self.host.clear_session_cookies();

        let result = self.host.login(&username, &password).await;
        self.attempt = None;

        match result {
            Ok(login) => {
                let stored = match login.credential() {
                    Some(credential) => self.session.set(&credential),
                    // Cookie-only session: no token to relay, drop the old one.
                    None => self.session.clear(),
                };
                if let Err(e) = stored {
                    tracing::warn!("Failed to persist host session: {}", e);
                }

                self.host.clear_request_cache();
                tracing::info!("Login succeeded for {} via {:?}", username, source);
                self.transition(LoginState::Success);
                self.window.reload_to(&self.home_url);
            }
            Err(e) => {
                tracing::warn!("Login failed via {:?}: {}", source, e);
                let message = e.user_message();
                self.transition(LoginState::Failure {
                    message: message.clone(),
                });
                self.transition(LoginState::ShowForm {
                    error: Some(message),
                });
            }
        }

        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::config::StorageConfig;
    use crate::session::{MemorySessionStore, SessionCredential, UserProfile};
    use crate::testing::{Journal, ProbeOutcome, RecordingWindow, ScriptedHost, WindowEvent};

    const HOME: &str = "http://hub.local/";

    struct Harness {
        controller: LoginController,
        host: Arc<ScriptedHost>,
        window: Arc<RecordingWindow>,
        session: Session,
        journal: Journal,
    }

    fn harness(host: ScriptedHost) -> Harness {
        let journal = host.journal();
        let host = Arc::new(host);
        let window = Arc::new(RecordingWindow::with_journal(journal.clone()));
        let session = Session::new(Arc::new(MemorySessionStore::new()), StorageConfig::default());
        let controller = LoginController::new(
            host.clone(),
            session.clone(),
            window.clone(),
            HOME,
            Duration::from_millis(200),
        );
        Harness {
            controller,
            host,
            window,
            session,
            journal,
        }
    }

    fn top_level() -> PageContext {
        PageContext::from_url("http://hub.local/login", false).unwrap()
    }

    #[tokio::test]
    async fn test_existing_session_short_circuits() {
        let mut h = harness(ScriptedHost::new(ProbeOutcome::Authenticated));
        let state = h.controller.start(&top_level()).await;

        assert_eq!(state, LoginState::Success);
        assert_eq!(h.window.events(), vec![WindowEvent::NavigateTop(HOME.into())]);
        assert_eq!(h.host.login_calls(), 0);
    }

    #[tokio::test]
    async fn test_unauthenticated_top_level_page_shows_form() {
        let mut h = harness(ScriptedHost::new(ProbeOutcome::Unauthenticated));
        let state = h.controller.start(&top_level()).await;

        assert_eq!(state, LoginState::ShowForm { error: None });
        assert!(h.window.events().is_empty());
        assert_eq!(h.host.login_calls(), 0);
    }

    #[tokio::test]
    async fn test_embedded_page_never_renders_form() {
        for probe in [ProbeOutcome::Unauthenticated, ProbeOutcome::Fail, ProbeOutcome::Hang] {
            let mut h = harness(ScriptedHost::new(probe));
            let page = PageContext::from_url("http://hub.local/login?username=a&password=b", true).unwrap();
            let state = h.controller.start(&page).await;

            assert_eq!(state, LoginState::IframeRedirect);
            assert!(!state.renders_form());
            assert_eq!(h.window.events(), vec![WindowEvent::NavigateTop(HOME.into())]);
            // URL credentials are not used from inside a frame.
            assert_eq!(h.host.login_calls(), 0);
        }
    }

    #[tokio::test]
    async fn test_probe_timeout_falls_through_to_form() {
        let mut h = harness(ScriptedHost::new(ProbeOutcome::Hang));
        let started = std::time::Instant::now();
        let state = h.controller.start(&top_level()).await;

        assert_eq!(state, LoginState::ShowForm { error: None });
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_form_login_success_order() {
        let mut h = harness(
            ScriptedHost::new(ProbeOutcome::Unauthenticated).with_login(Ok(credential("abc"))),
        );
        h.controller.start(&top_level()).await;
        h.journal.clear();

        let state = h.controller.submit("ada", "secret").await;

        assert_eq!(state, LoginState::Success);
        assert_eq!(
            h.journal.entries(),
            vec![
                "clear_cookies".to_string(),
                "login:ada".to_string(),
                "clear_cache".to_string(),
                format!("reload:{}", HOME),
            ]
        );
        assert_eq!(h.session.token().as_deref(), Some("abc"));
        assert!(h.controller.attempt().is_none());
    }

    #[tokio::test]
    async fn test_url_params_login_matches_form_path() {
        let mut h = harness(
            ScriptedHost::new(ProbeOutcome::Unauthenticated).with_login(Ok(credential("url-token"))),
        );
        let page = PageContext::from_url("http://hub.local/login?username=ada&password=s%26cret", false).unwrap();
        let state = h.controller.start(&page).await;

        assert_eq!(state, LoginState::Success);
        assert_eq!(
            h.journal.entries(),
            vec![
                "probe".to_string(),
                "clear_cookies".to_string(),
                "login:ada".to_string(),
                "clear_cache".to_string(),
                format!("reload:{}", HOME),
            ]
        );
        assert_eq!(h.host.last_password().as_deref(), Some("s&cret"));
        assert_eq!(h.session.token().as_deref(), Some("url-token"));
    }

    #[tokio::test]
    async fn test_url_params_failure_falls_back_to_form() {
        let mut h = harness(ScriptedHost::new(ProbeOutcome::Unauthenticated).with_login(Err(
            ClientError::Status {
                status: 401,
                message: "Invalid username or password".into(),
            },
        )));
        let page = PageContext::from_url("http://hub.local/login?username=ada&password=bad", false).unwrap();
        let state = h.controller.start(&page).await;

        assert_eq!(
            state,
            LoginState::ShowForm {
                error: Some("Invalid username or password".into())
            }
        );
        assert!(h.window.events().is_empty());
        assert!(!h.journal.entries().contains(&"clear_cache".to_string()));
    }

    #[tokio::test]
    async fn test_form_failure_allows_retry() {
        let mut h = harness(ScriptedHost::new(ProbeOutcome::Unauthenticated).with_login(Err(
            ClientError::Protocol("boom".into()),
        )));
        h.controller.start(&top_level()).await;

        let failed = h.controller.submit("ada", "secret").await;
        assert!(failed.renders_form());
        assert_eq!(failed.error(), Some("Unexpected response from the server"));

        h.host.set_login(Ok(credential("second")));
        let state = h.controller.submit("ada", "secret").await;
        assert_eq!(state, LoginState::Success);
        assert_eq!(h.host.login_calls(), 2);
    }

    #[tokio::test]
    async fn test_submit_requires_credentials() {
        let mut h = harness(ScriptedHost::new(ProbeOutcome::Unauthenticated));
        h.controller.start(&top_level()).await;

        let state = h.controller.submit("  ", "").await;
        assert_eq!(state.error(), Some("Username and password are required"));
        assert_eq!(h.host.login_calls(), 0);
    }

    #[tokio::test]
    async fn test_submit_ignored_outside_form() {
        let mut h = harness(ScriptedHost::new(ProbeOutcome::Authenticated));
        h.controller.start(&top_level()).await;

        let state = h.controller.submit("ada", "secret").await;
        assert_eq!(state, LoginState::Success);
        assert_eq!(h.host.login_calls(), 0);
    }

    #[tokio::test]
    async fn test_cookie_only_login_invalidates_previous_credential() {
        let mut h = harness(
            ScriptedHost::new(ProbeOutcome::Unauthenticated)
                .with_login(Ok(crate::client::LoginSession::default())),
        );
        h.session.set(&credential("old").credential().unwrap()).unwrap();
        h.controller.start(&top_level()).await;

        let state = h.controller.submit("ada", "secret").await;
        assert_eq!(state, LoginState::Success);
        assert!(h.session.token().is_none());
    }

    fn credential(token: &str) -> crate::client::LoginSession {
        let credential = SessionCredential {
            token: token.to_string(),
            user: UserProfile::new(1),
        };
        crate::client::LoginSession {
            token: Some(credential.token),
            user: Some(credential.user),
        }
    }
}
