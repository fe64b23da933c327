//! multiask - ask several LLM providers at once
//!
//! Streams one NDJSON record per provider as answers arrive, followed by a
//! summary record. Logs go to stderr so stdout stays machine-readable.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use multiask::dispatch::error_line;
use multiask::{Config, Dispatcher, ProviderId, ProviderRegistry, Question};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Question to ask (read from stdin when omitted)
    #[arg(short, long)]
    question: Option<String>,

    /// Providers to ask, comma separated (e.g. "openai,gemini")
    #[arg(short, long, value_delimiter = ',')]
    providers: Vec<String>,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Per-provider timeout in seconds for this run, 0 waits indefinitely
    #[arg(long)]
    timeout: Option<u64>,

    /// Only print the final summary record
    #[arg(long, default_value_t = false)]
    summary_only: bool,

    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    dotenvy::dotenv().ok();

    // Initialize logging
    let filter = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let mut config = Config::load(args.config.as_deref()).context("failed to load config")?;
    if let Some(secs) = args.timeout {
        config.dispatch.timeout_secs = secs;
        for provider in config.providers.values_mut() {
            provider.timeout_secs = None;
        }
    }

    let question = match args.question {
        Some(q) => q,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };
    let question = Question::new(question)?;

    let dispatcher = Dispatcher::new(ProviderRegistry::from_config(&config));
    let selected = select_providers(&args.providers, &config, dispatcher.registry())?;
    let mut stream = dispatcher.dispatch_all(question, &selected)?;

    let mut stdout = tokio::io::stdout();
    while let Some(item) = stream.next_event().await {
        let line = match item {
            Ok(event) if args.summary_only && !event.is_summary() => continue,
            Ok(event) => event.to_json_line()?,
            Err(err) => {
                stdout.write_all(error_line(&err).as_bytes()).await?;
                stdout.flush().await?;
                return Err(err.into());
            }
        };
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await?;
    }

    Ok(())
}

/// Command line choice wins, then `dispatch.providers`, then everything registered
fn select_providers(
    requested: &[String],
    config: &Config,
    registry: &ProviderRegistry,
) -> multiask::Result<Vec<ProviderId>> {
    let names = if requested.is_empty() {
        config.dispatch.providers.as_slice()
    } else {
        requested
    };

    if names.is_empty() {
        return Ok(registry.ids());
    }

    names
        .iter()
        .filter(|name| !name.trim().is_empty())
        .map(|name| name.parse())
        .collect()
}
