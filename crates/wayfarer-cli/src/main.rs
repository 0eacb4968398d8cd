mod render;
mod session;

use anyhow::{bail, Result};
use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wayfarer::orchestrator::{AgentConfig, Orchestrator, MAX_TURNS};
use wayfarer::providers::configs::ProviderConfig;
use wayfarer::providers::factory::ProviderType;
use wayfarer::providers::get_provider;
use wayfarer::tools::ToolRegistry;
use wayfarer::travel::{self, FlightSearch};

use crate::session::session_file::read_log;
use crate::session::Session;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Provider option (openai, anthropic or google)
    #[arg(short, long, default_value = "openai")]
    provider: ProviderType,

    /// API key (can also be set via OPENAI_API_KEY, ANTHROPIC_API_KEY or GOOGLE_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Model to use instead of the provider default
    #[arg(short, long)]
    model: Option<String>,

    /// JSONL file the conversation is loaded from and recorded to
    #[arg(short, long)]
    session: Option<PathBuf>,

    /// Upper bound on model turns per message (1 to 10)
    #[arg(long, default_value_t = MAX_TURNS, value_parser = parse_max_turns)]
    max_turns: usize,

    /// Send one message, print the reply and exit
    #[arg(long)]
    message: Option<String>,

    /// File to attach to the --message
    #[arg(long, requires = "message")]
    attach: Option<PathBuf>,
}

fn parse_max_turns(value: &str) -> Result<usize, String> {
    let turns: usize = value
        .parse()
        .map_err(|_| format!("`{}` is not a number", value))?;
    if (1..=MAX_TURNS).contains(&turns) {
        Ok(turns)
    } else {
        Err(format!("must be between 1 and {}", MAX_TURNS))
    }
}

fn api_key_var(provider: ProviderType) -> &'static str {
    match provider {
        ProviderType::OpenAi => "OPENAI_API_KEY",
        ProviderType::Anthropic => "ANTHROPIC_API_KEY",
        ProviderType::Google => "GOOGLE_API_KEY",
    }
}

fn provider_config(cli: &Cli) -> Result<ProviderConfig> {
    let api_key_var = api_key_var(cli.provider);
    let api_key = match cli.api_key.clone().or_else(|| env::var(api_key_var).ok()) {
        Some(key) if !key.is_empty() => key,
        _ => bail!(
            "No API key for {}. Pass --api-key or set {}",
            cli.provider,
            api_key_var
        ),
    };

    let mut config = cli.provider.default_config(api_key);
    if let Some(model) = cli.model.clone() {
        match &mut config {
            ProviderConfig::OpenAi(c) => c.model = model,
            ProviderConfig::Anthropic(c) => c.model = model,
            ProviderConfig::Google(c) => c.model = model,
        }
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Quiet by default so logs do not interleave with the conversation
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let provider = get_provider(provider_config(&cli)?)?;
    let tools = ToolRegistry::new();
    travel::register_all(&tools, Arc::new(FlightSearch::from_env()));

    let log = match &cli.session {
        Some(path) => read_log(path)?,
        None => Default::default(),
    };
    let config = AgentConfig {
        max_turns: cli.max_turns,
        ..AgentConfig::default()
    };
    let orchestrator = Orchestrator::new(provider, Arc::new(tools))
        .with_log(log)
        .with_config(config);

    let mut session = Session::new(orchestrator, cli.session.clone());
    match cli.message {
        Some(message) => session.headless_start(message, cli.attach.as_deref()).await,
        None => session.start().await,
    }
}
