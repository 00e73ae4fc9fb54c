//! Agent controller: discovers the tool servers, then answers instructions.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tool_adapters::openai::{OpenAiAdapter, OpenAiConfig};
use tool_config::{EnvSecrets, ToolMeshConfig, loader};
use tool_dispatch::{DispatchConfig, DispatchController};
use tool_telemetry::{LogFormat, TelemetryConfig, init_tracing};
use tracing::{error, info};

/// Instructions run when none are given on the command line.
const DEFAULT_INSTRUCTIONS: [(&str, &str); 4] = [
    ("Weather response", "what is the current weather in Hyderabad?"),
    ("Who is the pm of indian", "Who is the pm of indian in one line?"),
    ("USD Value", "What is the value of USD?"),
    ("INR Value", "What is the value of INR"),
];

#[derive(Debug, Parser)]
#[command(about = "Answer instructions using tools discovered from remote servers")]
struct Args {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Tool server as `NAME=URL`; replaces `[client].servers` when given.
    #[arg(long = "server", value_parser = parse_server)]
    servers: Vec<(String, String)>,
    /// Model identifier, overriding `[model].name`.
    #[arg(long)]
    model: Option<String>,
    /// Model rounds per instruction, overriding `[client].max_iterations`.
    #[arg(long)]
    max_iterations: Option<NonZeroUsize>,
    /// Log line layout.
    #[arg(long, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
    /// Instructions to answer; the built-in demo set runs when empty.
    instructions: Vec<String>,
}

fn parse_server(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((name, url)) if !name.trim().is_empty() && !url.trim().is_empty() => {
            Ok((name.trim().to_owned(), url.trim().to_owned()))
        }
        _ => Err(format!("expected NAME=URL, got `{input}`")),
    }
}

fn load_config(args: &Args) -> Result<ToolMeshConfig> {
    let mut config = loader::load_or_default(args.config.as_deref())?;
    if !args.servers.is_empty() {
        config.client.servers = args.servers.iter().cloned().collect();
    }
    if let Some(model) = &args.model {
        config.model.name.clone_from(model);
    }
    if let Some(limit) = args.max_iterations {
        config.client.max_iterations = limit.get();
    }
    config.validate()?;
    Ok(config)
}

fn build_adapter(config: &ToolMeshConfig) -> Result<OpenAiAdapter> {
    let api_key = config.model.api_key(&EnvSecrets)?;
    let adapter_config = OpenAiConfig::new(config.model.name.clone())
        .with_base_url(&config.model.base_url)?
        .with_default_temperature(config.model.temperature)
        .with_timeout(config.client.model_timeout())
        .with_api_key(api_key);
    Ok(OpenAiAdapter::new(adapter_config)?)
}

fn dispatch_config(config: &ToolMeshConfig) -> Result<DispatchConfig> {
    let limit = config
        .client
        .max_iterations()
        .context("max_iterations must be greater than zero")?;
    Ok(DispatchConfig::default()
        .with_max_iterations(limit)
        .with_model_timeout(config.client.model_timeout())
        .with_tool_timeout(config.client.tool_timeout())
        .with_temperature(Some(config.model.temperature)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&TelemetryConfig::default().with_format(args.log_format))?;

    let config = load_config(&args)?;
    let adapter = build_adapter(&config)?;
    let controller = DispatchController::connect(
        Arc::new(adapter),
        config.client.servers.clone(),
        dispatch_config(&config)?,
    )
    .await
    .context("tool discovery failed")?;
    info!(tools = controller.catalog().len(), "controller ready");

    let instructions: Vec<(String, String)> = if args.instructions.is_empty() {
        DEFAULT_INSTRUCTIONS
            .iter()
            .map(|(label, text)| ((*label).to_owned(), (*text).to_owned()))
            .collect()
    } else {
        args.instructions
            .into_iter()
            .map(|text| ("Answer".to_owned(), text))
            .collect()
    };

    let total = instructions.len();
    let mut failed = 0_usize;
    for (label, instruction) in instructions {
        // Each instruction starts from an empty transcript.
        let mut session = controller.session();
        match session.submit(instruction.as_str()).await {
            Ok(answer) => println!("{label}: {answer}"),
            Err(err) => {
                failed += 1;
                error!(instruction = %instruction, error = %err, "instruction failed");
            }
        }
        session.end();
    }

    if failed > 0 {
        bail!("{failed} of {total} instructions failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_pairs() {
        assert_eq!(
            parse_server("weather=http://127.0.0.1:8000/mcp").unwrap(),
            ("weather".to_owned(), "http://127.0.0.1:8000/mcp".to_owned())
        );
        assert!(parse_server("weather").is_err());
        assert!(parse_server("=http://x").is_err());
    }

    #[test]
    fn cli_overrides_config() {
        let args = Args::parse_from([
            "agent-controller",
            "--server",
            "weather=http://127.0.0.1:9000/mcp",
            "--max-iterations",
            "3",
            "--model",
            "gpt-4o-mini",
            "What is the value of EUR?",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.client.servers.len(), 1);
        assert_eq!(config.client.max_iterations, 3);
        assert_eq!(config.model.name, "gpt-4o-mini");
        assert_eq!(args.instructions, ["What is the value of EUR?"]);

        let dispatch = dispatch_config(&config).unwrap();
        assert_eq!(dispatch.max_iterations().get(), 3);
    }
}
