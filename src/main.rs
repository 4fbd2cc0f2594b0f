mod application;
mod config;
mod domain;
mod infrastructure;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt};

use application::agent::{Agent, AgentOptions, ToolRegistry};
use application::repl::{self, ReplError};
use application::tooling::{McpSession, ToolInvokeError, ToolSession};
use config::{AppConfig, ConfigError, ToolHostConfig};
use domain::types::ChatMessage;
use infrastructure::model::OllamaClient;

#[derive(Parser, Debug)]
#[command(
    name = "funtools-agent",
    version,
    about = "Interactive MCP tool-calling agent powered by Ollama"
)]
struct Cli {
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    model_url: Option<String>,
    /// Tool-host program to launch (defaults to server.py)
    server: Option<String>,
}

#[derive(Debug, Error)]
enum FatalError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to bootstrap tool host session: {0}")]
    Bootstrap(#[from] ToolInvokeError),
    #[error(transparent)]
    Repl(#[from] ReplError),
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    info!("Starting funtools-agent");
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => {
            info!("Session finished");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(%err, "Session terminated with a fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), FatalError> {
    let config_path = cli.config.as_deref().map(Path::new);
    let file_config = AppConfig::load(config_path)?;
    if let Some(path) = config_path {
        info!(path = %path.display(), "Loaded configuration from file");
    } else {
        info!("Loaded configuration using default path or defaults");
    }

    let model_url = cli.model_url.unwrap_or_else(|| file_config.model_url.clone());
    debug!(model_url = %model_url, model = %file_config.model, "Creating model provider");
    let provider = Arc::new(OllamaClient::new(model_url));

    let host = cli
        .server
        .as_deref()
        .map(ToolHostConfig::for_program)
        .or_else(|| file_config.tool_host.clone())
        .unwrap_or_else(ToolHostConfig::default_host);
    info!(host = %host.label(), "Connecting to tool host");
    let session = McpSession::connect(host).await?;

    let registry = ToolRegistry::new(session.list_tools().await);
    println!("Connected tools: {}", registry.names().join(", "));

    let history = vec![ChatMessage::system(
        registry.system_prompt(file_config.system_prompt.as_deref()),
    )];
    let agent = Agent::new(
        provider,
        Arc::new(session.clone()),
        registry,
        AgentOptions {
            model: file_config.model.clone(),
            temperature: file_config.temperature,
            max_tool_steps: file_config.max_tool_steps,
        },
    );

    // The session is released on every exit path, including fatal turn
    // errors, before the result is surfaced.
    let result = repl::run(&agent, history).await;
    session.shutdown().await;
    result.map_err(FatalError::from)
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .init();
    });
}
