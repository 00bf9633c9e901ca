#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::{extract::Path, routing::get, Json, Router};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use iso_hub_bridge::bridge::{AssistantFrame, FrameError};
use iso_hub_bridge::config::AppConfig;
use iso_hub_bridge::protocol::EmbedMessage;
use iso_hub_bridge::server::{app, AppState};
use iso_hub_bridge::window::{DownloadRequest, HostWindow};

async fn bind() -> Result<(tokio::net::TcpListener, String)> {
    // Pick an unused port for isolation
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("failed to bind port {}", port))?;
    Ok((listener, format!("http://127.0.0.1:{}", port)))
}

/// Identity server running on the current test's runtime.
pub struct TestServer {
    pub base_url: String,
    pub state: AppState,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        let mut config = AppConfig::development();
        config.server.users = vec![
            ("demo".to_string(), "demo".to_string()),
            ("ada".to_string(), "lovelace".to_string()),
        ];
        let state = AppState::from_config(&config)?;

        let (listener, base_url) = bind().await?;
        let router = app(state.clone());
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        let server = Self { base_url, state, task };
        server.wait_ready(Duration::from_secs(5)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = client.get(format!("{}/health", self.base_url)).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Minimal assistant: a logout endpoint that counts calls and a document
/// download endpoint.
pub struct StubAssistant {
    pub base_url: String,
    logout_calls: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl StubAssistant {
    pub async fn start() -> Result<Self> {
        let logout_calls = Arc::new(AtomicUsize::new(0));
        let counter = logout_calls.clone();
        let router = Router::new()
            .route(
                "/api/logout",
                get(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Json(json!({ "success": true }))
                    }
                }),
            )
            .route(
                "/api/documents/:id/download",
                get(|Path(id): Path<String>| async move { format!("document {}", id) }),
            );

        let (listener, base_url) = bind().await?;
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Ok(Self {
            base_url,
            logout_calls,
            task,
        })
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

impl Drop for StubAssistant {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Default)]
pub struct RecordingWindow {
    pub actions: Mutex<Vec<String>>,
}

impl RecordingWindow {
    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }
}

impl HostWindow for RecordingWindow {
    fn navigate_top(&self, url: &str) {
        self.actions.lock().unwrap().push(format!("navigate:{}", url));
    }

    fn reload_to(&self, url: &str) {
        self.actions.lock().unwrap().push(format!("reload:{}", url));
    }

    fn download(&self, request: DownloadRequest) {
        self.actions
            .lock()
            .unwrap()
            .push(format!("download:{}:{}", request.filename, request.url));
    }
}

#[derive(Default)]
pub struct RecordingFrame {
    pub posted: Mutex<Vec<Value>>,
}

impl RecordingFrame {
    pub fn posted(&self) -> Vec<Value> {
        self.posted.lock().unwrap().clone()
    }
}

impl AssistantFrame for RecordingFrame {
    fn is_attached(&self) -> bool {
        true
    }

    fn post_message(&self, message: &EmbedMessage, _target_origin: &str) -> Result<(), FrameError> {
        self.posted.lock().unwrap().push(serde_json::to_value(message)?);
        Ok(())
    }
}
