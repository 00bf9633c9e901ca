//! Auth bridge over stdio.
//!
//! A frame host (webview shell, browser extension, test harness) drives the
//! bridge with one JSON object per line on stdin and receives the host's
//! side effects as JSON lines on stdout.
//!
//! | stdin `kind` | Meaning                                   |
//! |--------------|-------------------------------------------|
//! | `load`       | frame load event                          |
//! | `message`    | `{ origin, data }` posted by the frame    |
//! | `focus`      | host window regained focus                |
//! | `retry`      | user pressed retry                        |
//! | `unload`     | frame unmounted                           |
//!
//! stdout `kind` is one of `post_message`, `navigate`, `reload` or
//! `download`. The bridge stops on EOF.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use super::{AssistantFrame, AuthBridge, BridgeHandle, FrameError};
use crate::protocol::EmbedMessage;
use crate::session::{FocusWatcher, Session, StorageWatcher};
use crate::window::{DownloadRequest, HostWindow};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Inbound {
    Load,
    Message {
        #[serde(default)]
        origin: String,
        data: Value,
    },
    Focus,
    Retry,
    Unload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outbound {
    PostMessage {
        #[serde(rename = "targetOrigin")]
        target_origin: String,
        message: EmbedMessage,
    },
    Navigate {
        url: String,
    },
    Reload {
        url: String,
    },
    Download {
        url: String,
        filename: String,
    },
}

/// Frame whose messages go to stdout. Detached between `unload` and the
/// next `load`.
pub struct StdioFrame {
    out: mpsc::UnboundedSender<Outbound>,
    attached: AtomicBool,
}

impl StdioFrame {
    pub fn new(out: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            out,
            attached: AtomicBool::new(false),
        }
    }

    pub fn set_attached(&self, attached: bool) {
        self.attached.store(attached, Ordering::SeqCst);
    }
}

impl AssistantFrame for StdioFrame {
    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    fn post_message(&self, message: &EmbedMessage, target_origin: &str) -> Result<(), FrameError> {
        self.out
            .send(Outbound::PostMessage {
                target_origin: target_origin.to_string(),
                message: message.clone(),
            })
            .map_err(|_| FrameError::Closed)
    }
}

pub struct StdioWindow {
    out: mpsc::UnboundedSender<Outbound>,
}

impl StdioWindow {
    pub fn new(out: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { out }
    }

    fn emit(&self, line: Outbound) {
        if self.out.send(line).is_err() {
            tracing::warn!("stdout writer closed, window action dropped");
        }
    }
}

impl HostWindow for StdioWindow {
    fn navigate_top(&self, url: &str) {
        self.emit(Outbound::Navigate { url: url.to_string() });
    }

    fn reload_to(&self, url: &str) {
        self.emit(Outbound::Reload { url: url.to_string() });
    }

    fn download(&self, request: DownloadRequest) {
        self.emit(Outbound::Download {
            url: request.url,
            filename: request.filename,
        });
    }
}

/// Run `bridge` against line-delimited JSON on `reader` / `writer` until EOF.
///
/// `frame` must be the frame the bridge was built with and `outbound` the
/// receiver paired with its sender.
pub async fn run<R, W>(
    mut bridge: AuthBridge,
    session: Session,
    frame: Arc<StdioFrame>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    reader: R,
    writer: W,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let focus = FocusWatcher::new();
    bridge.watch(&StorageWatcher::new(session));
    bridge.watch(&focus);

    let handle = bridge.handle();
    let bridge_task = tokio::spawn(bridge.run());
    let writer_task = tokio::spawn(write_lines(outbound, writer));

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                tracing::error!("stdin read error: {}", e);
                break;
            }
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<Inbound>(trimmed) {
            Ok(inbound) => dispatch(&handle, &frame, &focus, inbound),
            Err(e) => tracing::warn!("Ignoring malformed bridge input: {}", e),
        }
    }

    handle.shutdown();
    if let Err(e) = bridge_task.await {
        tracing::error!("Auth bridge task failed: {}", e);
    }
    // The bridge owned the last senders; the writer drains and exits.
    drop(frame);
    match writer_task.await {
        Ok(result) => result,
        Err(e) => Err(std::io::Error::new(std::io::ErrorKind::Other, e)),
    }
}

fn dispatch(handle: &BridgeHandle, frame: &StdioFrame, focus: &FocusWatcher, inbound: Inbound) {
    match inbound {
        Inbound::Load => {
            frame.set_attached(true);
            handle.frame_loaded();
        }
        Inbound::Message { origin, data } => handle.message(origin, data),
        Inbound::Focus => focus.notify_focus(),
        Inbound::Retry => handle.retry_relay(),
        Inbound::Unload => {
            frame.set_attached(false);
            handle.tear_down();
        }
    }
}

async fn write_lines<W>(mut outbound: mpsc::UnboundedReceiver<Outbound>, mut writer: W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = outbound.recv().await {
        let mut output = serde_json::to_string(&line)?;
        output.push('\n');
        writer.write_all(output.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
