mod chat;
mod typeset;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mathchat_core::config::{Config, ModelKind};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mathchat")]
#[command(version)]
#[command(about = "Streaming chat client for math-environment model backends")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the config file (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the model from config
    #[arg(short, long)]
    model: Option<String>,

    /// Override the backend endpoint from config
    #[arg(long)]
    endpoint: Option<String>,

    /// Probe for an external math typesetter before chatting
    #[arg(long)]
    typeset: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat,
    /// List the configured models
    Models,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e:#}"); // pretty anyhow chain
        std::process::exit(1);
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint.clone_from(endpoint);
    }

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Models => {
            list_models(&config);
            Ok(())
        }
        Commands::Chat => chat::run(config, cli.model, cli.typeset).await,
    }
}

fn list_models(config: &Config) {
    for model in &config.models {
        let kind = match model.kind {
            ModelKind::Local => "local",
            ModelKind::Cloud => "cloud",
        };
        let marker = if model.id == config.default_model {
            "*"
        } else {
            " "
        };
        println!("{marker} {:<28} {kind:<6} {}", model.id, model.description);
    }
}
