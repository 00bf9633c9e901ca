//! Auth bridge between the Host Shell and the embedded Assistant Frame.
//!
//! One [`AuthBridge`] per mounted frame. Every input (frame load, inbound
//! message, session signal, retry timer, teardown) is a [`BridgeEvent`] on a
//! single channel, so state is only ever touched from one place.
//!
//! ## Relay cycles
//!
//! A frame load or a `READY` starts a relay cycle: one `AUTH` right away and
//! one per remaining [`RetryPolicy`] offset. Starting a cycle cancels the
//! previous cycle's timers; a timer from an older cycle that already fired
//! is dropped on arrival. Each attempt reads the credential at send time.
//!
//! ## Logout propagation
//!
//! A token removal, or a recheck that finds no token, calls the Assistant's
//! logout endpoint once, from a spawned task so a slow Assistant never holds
//! up relays or teardown. Further rechecks stay quiet until a new token is
//! stored.

pub mod frame;
pub mod retry;
pub mod stdio;

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

use crate::client::AssistantApi;
use crate::config::AppConfig;
use crate::protocol::EmbedMessage;
use crate::session::{Session, SessionSignal, SessionWatcher, WatchHandle};
use crate::window::{DownloadRequest, HostWindow};

pub use frame::{AssistantFrame, FrameError, FrameReadiness};
pub use retry::{ManualScheduler, RetryPolicy, Scheduler, TaskHandle, TokioScheduler};

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Origin every outbound message is addressed to.
    pub target_origin: String,
    /// Base for resolving relative `NAVIGATE` targets.
    pub host_base_url: Option<Url>,
    pub retry: RetryPolicy,
    /// Stop retrying a cycle once `AUTH_RECEIVED` arrives.
    pub cancel_on_ack: bool,
    /// Ignore inbound messages not sent by `target_origin`.
    pub enforce_inbound_origin: bool,
}

impl BridgeSettings {
    pub fn new(target_origin: impl Into<String>) -> Self {
        Self {
            target_origin: target_origin.into(),
            host_base_url: None,
            retry: RetryPolicy::default(),
            cancel_on_ack: false,
            enforce_inbound_origin: false,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, url::ParseError> {
        let assistant = Url::parse(&config.assistant.base_url)?;
        let host_base_url = match Url::parse(&config.host.base_url) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!("Invalid host base URL '{}': {}", config.host.base_url, e);
                None
            }
        };
        Ok(Self {
            target_origin: assistant.origin().ascii_serialization(),
            host_base_url,
            retry: RetryPolicy::from_offsets(config.relay.retry_offsets()),
            cancel_on_ack: config.relay.cancel_on_ack,
            enforce_inbound_origin: config.relay.enforce_inbound_origin,
        })
    }
}

#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// Native load event of the frame element.
    FrameLoaded,
    /// A `message` event on the host window.
    Message { origin: String, data: Value },
    Session(SessionSignal),
    /// A scheduled retry fired.
    RelayAttempt { cycle: u64, attempt: usize },
    /// User asked to retry the handshake.
    RetryRelay,
    /// Frame unmounted or host navigated away.
    TearDown,
    /// Stop [`AuthBridge::run`].
    Shutdown,
}

/// Cloneable sender side of a bridge.
#[derive(Clone)]
pub struct BridgeHandle {
    tx: mpsc::UnboundedSender<BridgeEvent>,
}

impl BridgeHandle {
    pub fn send(&self, event: BridgeEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Auth bridge is gone, event dropped");
        }
    }

    pub fn frame_loaded(&self) {
        self.send(BridgeEvent::FrameLoaded);
    }

    pub fn message(&self, origin: impl Into<String>, data: Value) {
        self.send(BridgeEvent::Message {
            origin: origin.into(),
            data,
        });
    }

    pub fn retry_relay(&self) {
        self.send(BridgeEvent::RetryRelay);
    }

    pub fn tear_down(&self) {
        self.send(BridgeEvent::TearDown);
    }

    pub fn shutdown(&self) {
        self.send(BridgeEvent::Shutdown);
    }
}

pub struct AuthBridge {
    session: Session,
    frame: Arc<dyn AssistantFrame>,
    window: Arc<dyn HostWindow>,
    assistant: Arc<dyn AssistantApi>,
    scheduler: Arc<dyn Scheduler>,
    settings: BridgeSettings,

    readiness: FrameReadiness,
    cycle: u64,
    retries: Vec<TaskHandle>,
    acknowledged: bool,
    logout_propagated: bool,
    logouts: Vec<JoinHandle<()>>,
    watches: Vec<WatchHandle>,

    tx: mpsc::UnboundedSender<BridgeEvent>,
    rx: mpsc::UnboundedReceiver<BridgeEvent>,
}

impl AuthBridge {
    pub fn new(
        session: Session,
        frame: Arc<dyn AssistantFrame>,
        window: Arc<dyn HostWindow>,
        assistant: Arc<dyn AssistantApi>,
        scheduler: Arc<dyn Scheduler>,
        settings: BridgeSettings,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            session,
            frame,
            window,
            assistant,
            scheduler,
            settings,
            readiness: FrameReadiness::NotLoaded,
            cycle: 0,
            retries: Vec::new(),
            acknowledged: false,
            logout_propagated: false,
            logouts: Vec::new(),
            watches: Vec::new(),
            tx,
            rx,
        }
    }

    pub fn handle(&self) -> BridgeHandle {
        BridgeHandle {
            tx: self.tx.clone(),
        }
    }

    /// Route a watcher's signals into this bridge for as long as it lives.
    pub fn watch(&mut self, watcher: &dyn SessionWatcher) {
        let tx = self.tx.clone();
        let handle = watcher.subscribe(Arc::new(move |signal| {
            let _ = tx.send(BridgeEvent::Session(signal));
        }));
        self.watches.push(handle);
    }

    pub fn readiness(&self) -> FrameReadiness {
        self.readiness
    }

    /// Retry timers armed for the current cycle and not cancelled. Timers
    /// that already fired still count.
    pub fn pending_retries(&self) -> usize {
        self.retries.iter().filter(|h| !h.is_cancelled()).count()
    }

    /// Drive the bridge until [`BridgeEvent::Shutdown`].
    pub async fn run(mut self) {
        tracing::info!("Auth bridge started for {}", self.settings.target_origin);
        while let Some(event) = self.rx.recv().await {
            if matches!(event, BridgeEvent::Shutdown) {
                break;
            }
            self.handle_event(event).await;
        }
        self.cancel_retries();
        tracing::info!("Auth bridge stopped");
    }

    /// Handle everything already queued, returning how many events ran.
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.handle_event(event).await;
            handled += 1;
        }
        handled
    }

    pub async fn handle_event(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::FrameLoaded => {
                self.readiness = self.readiness.on_load();
                self.start_relay_cycle("frame load");
            }
            BridgeEvent::Message { origin, data } => self.on_message(&origin, &data),
            BridgeEvent::Session(signal) => self.on_session_signal(signal),
            BridgeEvent::RelayAttempt { cycle, attempt } => self.relay_attempt(cycle, attempt),
            BridgeEvent::RetryRelay => self.retry_relay(),
            BridgeEvent::TearDown => self.tear_down(),
            BridgeEvent::Shutdown => self.cancel_retries(),
        }
    }

    /// Restart the handshake with a fresh relay cycle.
    pub fn retry_relay(&mut self) {
        if self.readiness == FrameReadiness::TornDown {
            tracing::debug!("Relay retry ignored, frame torn down");
            return;
        }
        self.start_relay_cycle("manual retry");
    }

    pub fn tear_down(&mut self) {
        if self.readiness != FrameReadiness::TornDown {
            tracing::info!("Assistant frame torn down");
        }
        self.readiness = FrameReadiness::TornDown;
        self.cancel_retries();
    }

    fn cancel_retries(&mut self) {
        for handle in self.retries.drain(..) {
            handle.cancel();
        }
    }

    fn start_relay_cycle(&mut self, reason: &str) {
        if self.readiness == FrameReadiness::TornDown {
            return;
        }
        self.cancel_retries();
        self.cycle += 1;
        self.acknowledged = false;
        let cycle = self.cycle;
        tracing::debug!("Relay cycle {} started by {}", cycle, reason);

        let offsets = self.settings.retry.offsets().to_vec();
        for (attempt, offset) in offsets.into_iter().enumerate() {
            if offset.is_zero() {
                self.relay_attempt(cycle, attempt);
                continue;
            }
            let tx = self.tx.clone();
            let handle = self.scheduler.schedule(
                offset,
                Box::new(move || {
                    let _ = tx.send(BridgeEvent::RelayAttempt { cycle, attempt });
                }),
            );
            self.retries.push(handle);
        }
    }

    fn relay_attempt(&mut self, cycle: u64, attempt: usize) {
        if cycle != self.cycle {
            tracing::debug!("Dropping relay attempt from stale cycle {}", cycle);
            return;
        }
        if attempt > 0 && self.acknowledged && self.settings.cancel_on_ack {
            return;
        }

        let message = match self.session.token() {
            Some(token) => EmbedMessage::auth(Some(token), self.session.user()),
            None => EmbedMessage::auth(None, None),
        };
        tracing::debug!("Relaying credentials (cycle {}, attempt {})", cycle, attempt + 1);
        self.post(&message);
    }

    fn post(&self, message: &EmbedMessage) {
        if self.readiness == FrameReadiness::TornDown || !self.frame.is_attached() {
            tracing::debug!("Frame not attached, {} not sent", message.kind());
            return;
        }
        if let Err(e) = self.frame.post_message(message, &self.settings.target_origin) {
            tracing::warn!("Failed to post {} to assistant frame: {}", message.kind(), e);
        }
    }

    fn on_message(&mut self, origin: &str, data: &Value) {
        if self.settings.enforce_inbound_origin && origin != self.settings.target_origin {
            tracing::debug!("Ignoring message from unexpected origin {}", origin);
            return;
        }
        if self.readiness == FrameReadiness::TornDown {
            tracing::debug!("Ignoring message after teardown");
            return;
        }
        let Some(message) = EmbedMessage::from_value(data) else {
            return;
        };

        match message {
            EmbedMessage::Ready => {
                tracing::info!("Assistant frame ready");
                self.readiness = self.readiness.on_ready();
                self.start_relay_cycle("READY");
            }
            EmbedMessage::AuthReceived { .. } => {
                tracing::info!("Assistant acknowledged credentials");
                self.acknowledged = true;
                if self.settings.cancel_on_ack {
                    self.cancel_retries();
                }
            }
            EmbedMessage::Navigate { url } => self.navigate(&url),
            EmbedMessage::Download {
                document_id,
                document_name,
            } => {
                let url = self.assistant.download_url(&document_id);
                tracing::info!("Downloading document {} as {}", document_id, document_name);
                self.window.download(DownloadRequest {
                    url,
                    filename: document_name,
                });
            }
            EmbedMessage::Auth { .. } => {
                tracing::debug!("Ignoring AUTH sent by the frame");
            }
        }
    }

    fn navigate(&self, target: &str) {
        let resolved = match &self.settings.host_base_url {
            Some(base) => base.join(target),
            None => Url::parse(target),
        };
        match resolved {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                tracing::info!("Frame requested navigation to {}", url);
                self.window.navigate_top(url.as_str());
            }
            Ok(url) => tracing::warn!("Refusing navigation to {} URL", url.scheme()),
            Err(e) => tracing::warn!("Invalid navigation target '{}': {}", target, e),
        }
    }

    fn on_session_signal(&mut self, signal: SessionSignal) {
        match signal {
            SessionSignal::TokenSet => {
                self.logout_propagated = false;
                if self.readiness.is_live() {
                    self.start_relay_cycle("new credential");
                }
            }
            SessionSignal::TokenRemoved | SessionSignal::Recheck => {
                if self.session.is_authenticated() {
                    self.logout_propagated = false;
                    return;
                }
                if self.logout_propagated {
                    return;
                }
                self.propagate_logout();
            }
        }
    }

    /// Best effort and off the event loop: a failure is logged and
    /// otherwise ignored.
    fn propagate_logout(&mut self) {
        self.logout_propagated = true;
        tracing::info!("Host session ended, logging out of the assistant");
        let assistant = self.assistant.clone();
        self.logouts.retain(|task| !task.is_finished());
        self.logouts.push(tokio::spawn(async move {
            if let Err(e) = assistant.logout().await {
                tracing::warn!("Assistant logout failed: {}", e);
            }
        }));
    }
}
