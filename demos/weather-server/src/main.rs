//! Weather and currency tool server.

mod tools;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tool_adapters::http_client::build_https_client;
use tool_config::loader;
use tool_server::ToolServer;
use tool_telemetry::{LogFormat, TelemetryConfig, init_tracing};
use tracing::info;

use crate::tools::WeatherService;

#[derive(Debug, Parser)]
#[command(about = "Serve get_weather and get_currency_value over HTTP")]
struct Args {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Interface to bind, overriding `[server].host`.
    #[arg(long)]
    host: Option<String>,
    /// Port to bind, overriding `[server].port`.
    #[arg(long, short)]
    port: Option<u16>,
    /// Base path, overriding `[server].path`.
    #[arg(long)]
    path: Option<String>,
    /// Log line layout.
    #[arg(long, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&TelemetryConfig::default().with_format(args.log_format))?;

    let mut config = loader::load_or_default(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(path) = args.path {
        config.server.path = path;
    }
    config.validate()?;

    let registry = tools::registry(WeatherService::new(build_https_client()))?;
    let addr = config.server.socket_addr()?;
    let bound = ToolServer::new(Arc::new(registry))
        .with_base_path(&config.server.path)
        .bind(addr)
        .with_context(|| format!("failed to bind weather server on {addr}"))?;

    info!(
        addr = %bound.local_addr(),
        path = %config.server.path,
        "weather server ready; press Ctrl-C to stop"
    );
    bound
        .serve_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    info!("weather server stopped");
    Ok(())
}
