use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rolecall_core::{TemplateProvider, TemplateTable};
use rolecall_telemetry::{LogFormat, TelemetryConfig};

/// Role-addressed WebSocket message router.
#[derive(Debug, Parser)]
#[command(name = "rolecall", version)]
struct Cli {
    /// Host to bind.
    #[arg(long, env = "ROLECALL_HOST", default_value = "localhost")]
    host: String,

    /// Port to bind.
    #[arg(long, env = "ROLECALL_PORT", default_value_t = 8765)]
    port: u16,

    /// JSON file with role opening messages, merged over the built-ins.
    #[arg(long, env = "ROLECALL_TEMPLATES")]
    templates: Option<PathBuf>,

    /// Default log level (RUST_LOG takes precedence).
    #[arg(long, env = "ROLECALL_LOG_LEVEL", default_value = "info")]
    log_level: tracing::Level,

    /// Log output format: json or pretty.
    #[arg(long, env = "ROLECALL_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,

    /// Evict connections silent for this many seconds (0 disables).
    #[arg(long, env = "ROLECALL_IDLE_TIMEOUT_SECS")]
    idle_timeout_secs: Option<u64>,

    /// Outbound queue depth per connection.
    #[arg(long, env = "ROLECALL_MAX_SEND_QUEUE", default_value_t = 256)]
    max_send_queue: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    rolecall_telemetry::init_telemetry(&TelemetryConfig {
        log_level: cli.log_level,
        format: cli.log_format,
        ..Default::default()
    })
    .context("failed to initialize logging")?;

    tracing::info!("Starting role router");

    let templates: Arc<dyn TemplateProvider> = match &cli.templates {
        Some(path) => {
            let table = TemplateTable::from_path(path)?;
            tracing::info!(path = %path.display(), roles = table.known_roles().len(), "Templates loaded");
            Arc::new(table)
        }
        None => Arc::new(TemplateTable::default()),
    };

    let config = rolecall_server::ServerConfig {
        host: cli.host,
        port: cli.port,
        max_send_queue: cli.max_send_queue,
        idle_timeout_secs: cli.idle_timeout_secs,
        ..Default::default()
    };
    let bind_addr = config.bind_addr();
    let handle = rolecall_server::start(config, templates)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!(url = %handle.ws_url(), "Role router ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("Shutting down");
    Ok(())
}
