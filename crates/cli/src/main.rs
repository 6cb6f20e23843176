mod cli;
mod commands;
mod terminal;
mod web;

use anyhow::Result;
use clap::Parser;

use cli::{CliArgs, Command};
use distill_core::config::{load_dotenv, Config};
use terminal::Terminal;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only results
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Before parsing, so `.env` can supply DISTILL_PROFILE
    load_dotenv();
    let args = CliArgs::parse();

    let mut config = match &args.profile {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    if let Some(provider) = &args.provider {
        config.llm.provider = provider.to_lowercase();
    }
    if let Some(model) = &args.model {
        config.llm.set_model(model.clone());
    }
    config.log_summary();

    let terminal = Terminal::new();
    match args.command {
        Command::Summarize(summarize) => commands::summarize(&config, summarize, &terminal).await,
        Command::Chat(chat) => commands::chat(&config, chat, &terminal).await,
        Command::Ask(ask) => commands::ask(&config, ask).await,
        Command::Config => commands::show_config(&config),
    }
}
