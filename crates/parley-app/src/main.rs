//! Parley application binary - composition root.
//!
//! 1. Parse CLI args and load configuration from TOML
//! 2. Initialise tracing
//! 3. Build the HTTP deployment client and the session orchestrator
//! 4. Run the terminal chat loop until `/quit` or end of input

mod cli;
mod command;
mod repl;

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use parley_chat::SessionOrchestrator;
use parley_core::config::ParleyConfig;
use parley_remote::HttpDeploymentClient;
use tokio::io::AsyncBufReadExt;

use crate::cli::{CliArgs, ConfigSource};
use crate::command::Command;
use crate::repl::{Flow, Repl};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config. Read before tracing so its log level can apply.
    let config_file = args.resolve_config_path();
    let source = ConfigSource::read(&config_file);

    // Tracing.
    let level = args.resolve_log_level(source.log_level());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Parley v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match source {
        ConfigSource::File(config) => {
            tracing::info!(path = %config_file.display(), "Configuration loaded");
            config
        }
        ConfigSource::Invalid(e) => {
            tracing::warn!(path = %config_file.display(), error = %e, "Invalid config, using defaults");
            ParleyConfig::default()
        }
        ConfigSource::Missing => {
            tracing::info!(path = %config_file.display(), "No config file, using defaults");
            ParleyConfig::default()
        }
    };
    if let Some(ref base_url) = args.base_url {
        config.remote.base_url = base_url.clone();
    }

    let initial = match args.deployment {
        Some(ref name) => config.deployment(name)?.clone(),
        None => config
            .deployments
            .first()
            .cloned()
            .ok_or("no deployments configured")?,
    };

    // Remote client + orchestrator.
    let client = HttpDeploymentClient::new(&config.remote)?;
    tracing::info!(base_url = %client.base_url(), "Deployment client ready");
    let orchestrator = SessionOrchestrator::new(Arc::new(client), config.chat.clone());

    let stdout = std::io::stdout();
    {
        let mut out = stdout.lock();
        writeln!(out, "{}", config.general.app_title)?;
        writeln!(out, "Chatting with {}. Type /help for commands.", initial.name)?;
    }

    let mut repl = Repl::new(orchestrator, config.deployments.clone(), initial, stdout);

    if let Some(token) = args.resolve_token() {
        repl.handle(Command::Token(token)).await?;
    }

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.is_empty() {
            continue;
        }

        match command::parse(&line) {
            Ok(cmd) => {
                if repl.handle(cmd).await? == Flow::Quit {
                    break;
                }
            }
            Err(e) => println!("{e}"),
        }
    }

    tracing::info!(session_id = %repl.session().id, "Session closed");
    Ok(())
}
