//! Email tool server.

mod mailer;
mod tools;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tool_config::{ToolMeshConfig, loader};
use tool_server::ToolServer;
use tool_telemetry::{LogFormat, TelemetryConfig, init_tracing};
use tracing::info;

use crate::mailer::OutboxMailer;

#[derive(Debug, Parser)]
#[command(about = "Serve send_email over HTTP, spooling messages to an outbox")]
struct Args {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Interface to bind, overriding `[server].host`.
    #[arg(long)]
    host: Option<String>,
    /// Port to bind, overriding `[mail].port`.
    #[arg(long, short)]
    port: Option<u16>,
    /// Outbox directory, overriding `[mail].outbox_dir`.
    #[arg(long)]
    outbox: Option<PathBuf>,
    /// Log line layout.
    #[arg(long, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

/// Loads the configuration and applies the command-line overrides. The
/// email server listens on `[mail].port`; host and path come from `[server]`.
fn load_config(args: &Args) -> Result<ToolMeshConfig> {
    let mut config = loader::load_or_default(args.config.as_deref())?;
    config.server.port = args.port.unwrap_or(config.mail.port);
    if let Some(host) = &args.host {
        config.server.host.clone_from(host);
    }
    if let Some(outbox) = &args.outbox {
        config.mail.outbox_dir.clone_from(outbox);
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&TelemetryConfig::default().with_format(args.log_format))?;

    let config = load_config(&args)?;

    let mailer = Arc::new(OutboxMailer::new(
        config.mail.sender.clone(),
        config.mail.outbox_dir.clone(),
    ));
    let registry = tools::registry(mailer.clone())?;
    let addr = config.server.socket_addr()?;
    let bound = ToolServer::new(Arc::new(registry))
        .with_base_path(&config.server.path)
        .bind(addr)
        .with_context(|| format!("failed to bind email server on {addr}"))?;

    info!(
        addr = %bound.local_addr(),
        path = %config.server.path,
        outbox = %mailer.dir().display(),
        "email server ready; press Ctrl-C to stop"
    );
    bound
        .serve_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    info!("email server stopped");
    Ok(())
}
