use crate::cli::OutputFormat;
use crate::config::config;
use crate::server;

pub async fn handle(port: Option<u16>, _output_format: OutputFormat) -> anyhow::Result<()> {
    let cfg = config();
    tracing::info!("Starting ISO-Hub identity server in {:?} mode", cfg.environment);
    server::serve(cfg, port.unwrap_or(cfg.server.port)).await
}
