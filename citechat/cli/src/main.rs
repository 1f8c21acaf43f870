//! Citechat - Terminal Chat with Cited Sources
//!
//! A line-oriented chat client for a retrieval-augmented chat backend. Answers
//! stream in live; the sources behind them are one command away.
//!
//! # Usage
//!
//! ```bash
//! # Chat against a dataset
//! citechat --dataset 6b4f1c3e-...
//!
//! # With config file
//! citechat --config ~/.config/citechat/config.toml
//!
//! # Continue an earlier topic
//! citechat --topic 0f0b7a8e-...
//!
//! # Verbose logging (to stderr)
//! citechat -vv
//! RUST_LOG=citechat_core=debug citechat
//! ```
//!
//! # Signals
//!
//! - `SIGINT` during an answer: cancel that answer, keep the partial text
//! - `SIGINT` at the prompt: exit

mod repl;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use citechat_core::{
    load_config, load_config_from_path, ChatBackend, ChatSession, CitechatConfig,
    ConfigOverrides, TimelineDriver, TopicId, TrieveBackend,
};

/// Citechat - chat with a dataset and see where the answers come from
#[derive(Parser, Debug)]
#[command(name = "citechat")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "CITECHAT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Chat API root URL
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Dataset to chat against
    #[arg(short = 'd', long, value_name = "ID")]
    dataset: Option<String>,

    /// Owner id recorded on new topics
    #[arg(long, value_name = "ID")]
    owner: Option<String>,

    /// Resume an existing topic
    #[arg(short = 't', long, value_name = "UUID")]
    topic: Option<TopicId>,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Initialize logging to stderr
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("citechat={level},citechat_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve configuration: file, environment, then command line
fn resolve_config(args: &Args) -> Result<CitechatConfig> {
    let mut config = match args.config {
        Some(ref path) => load_config_from_path(Some(path.clone())),
        None => load_config(),
    }
    .context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(ref url) = args.api_url {
        overrides = overrides.with_api_url(url.clone());
    }
    if let Some(ref dataset) = args.dataset {
        overrides = overrides.with_dataset_id(dataset.clone());
    }
    if let Some(ref owner) = args.owner {
        overrides = overrides.with_owner_id(owner.clone());
    }
    overrides.apply(&mut config);

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = resolve_config(&args)?;
    info!(
        api_url = %config.backend.api_url,
        dataset_id = %config.backend.dataset_id,
        source = %config.source(),
        "Configuration loaded"
    );

    let backend = TrieveBackend::from_settings(&config.backend);
    let driver = TimelineDriver::from_config(backend, &config);
    info!(backend = driver.backend().name(), "Backend ready");

    let session = match args.topic {
        Some(topic_id) => driver
            .resume(topic_id)
            .await
            .with_context(|| format!("Failed to resume topic {topic_id}"))?,
        None => ChatSession::new(),
    };

    repl::run(&driver, session).await
}
