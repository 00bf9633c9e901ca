use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;
use tokio::sync::mpsc;

use crate::bridge::stdio::{self, StdioFrame, StdioWindow};
use crate::bridge::{AuthBridge, BridgeSettings, TokioScheduler};
use crate::cli::config::{assistant_client, open_session};
use crate::cli::OutputFormat;
use crate::config::config;

#[derive(Subcommand)]
pub enum BridgeCommands {
    #[command(about = "Drive the bridge with JSON lines on stdin/stdout")]
    Stdio,
}

pub async fn handle(cmd: BridgeCommands, _output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        BridgeCommands::Stdio => run_stdio().await,
    }
}

async fn run_stdio() -> anyhow::Result<()> {
    let settings = BridgeSettings::from_config(config()).context("invalid ASSISTANT_BASE_URL")?;
    let session = open_session()?;

    let (tx, rx) = mpsc::unbounded_channel();
    let frame = Arc::new(StdioFrame::new(tx.clone()));
    let bridge = AuthBridge::new(
        session.clone(),
        frame.clone(),
        Arc::new(StdioWindow::new(tx)),
        Arc::new(assistant_client()?),
        Arc::new(TokioScheduler),
        settings,
    );

    stdio::run(bridge, session, frame, rx, tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("stdio bridge failed")
}
