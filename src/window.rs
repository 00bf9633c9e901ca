//! The Host Shell's top-level window, as far as the login controller and the
//! auth bridge need it.

use serde::Serialize;

/// A download the host performs on the frame's behalf: an anchor pointing at
/// `url` with a `download` attribute of `filename`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRequest {
    pub url: String,
    pub filename: String,
}

pub trait HostWindow: Send + Sync {
    /// Replace the top-level location (breaks out of any enclosing frame).
    fn navigate_top(&self, url: &str);

    /// Full page load of `url`, discarding in-memory state so cookies resync.
    fn reload_to(&self, url: &str);

    fn download(&self, request: DownloadRequest);
}

/// Window for headless use: actions are logged and printed.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleWindow;

impl HostWindow for ConsoleWindow {
    fn navigate_top(&self, url: &str) {
        tracing::info!("Navigate top-level window to {}", url);
        eprintln!("→ {}", url);
    }

    fn reload_to(&self, url: &str) {
        tracing::info!("Reload host at {}", url);
        eprintln!("↻ {}", url);
    }

    fn download(&self, request: DownloadRequest) {
        tracing::info!("Download {} as {}", request.url, request.filename);
        eprintln!("⇩ {} ({})", request.filename, request.url);
    }
}
