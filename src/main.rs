use anyhow::{Context, Result};
use clap::Parser;
use lint_cli::config::{Config, EnvSettings, Overrides, Settings, STATE_DIR};
use lint_cli::gateway::OllamaGateway;
use lint_cli::repl::{print_banner, TerminalOperator};
use lint_cli::session::Session;
use std::io;
use tracing_subscriber::EnvFilter;

/// Log filter, e.g. `LINT_CLI_LOG=debug`
const LOG_ENV: &str = "LINT_CLI_LOG";

#[derive(Parser, Debug)]
#[command(
    name = "lint-cli",
    about = "A local AI assistant for working on the project in the current directory",
    version
)]
struct Args {
    /// Model to chat with (default: $OLLAMA_MODEL, then config, then qwen3:8b)
    #[arg(short, long)]
    model: Option<String>,

    /// API base or full chat URL
    #[arg(long = "api", visible_alias = "base-url")]
    api: Option<String>,

    /// Load and save conversation memory
    #[arg(long, conflicts_with = "no_memory")]
    memory: bool,

    /// Start without memory and do not save the conversation
    #[arg(long)]
    no_memory: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        let memory = match (self.memory, self.no_memory) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        Overrides {
            model: self.model.clone(),
            api_url: self.api.clone(),
            memory,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let root = std::env::current_dir().context("Failed to read current directory")?;
    let state_dir = root.join(STATE_DIR);
    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("Failed to create {}", state_dir.display()))?;

    let config = Config::load(&state_dir);
    let settings = Settings::resolve(&config, &EnvSettings::from_process(), &args.overrides());

    let gateway = OllamaGateway::from_env()?;
    let operator = TerminalOperator::new()?;

    print_banner(&settings);
    let mut session = Session::open(gateway, operator, settings, config, &root).await;
    session.run().await
}
