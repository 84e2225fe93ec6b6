//! CLI argument definitions for the Parley chat client.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use parley_core::config::ParleyConfig;
use parley_core::error::ParleyError;
use std::path::{Path, PathBuf};

/// Parley, a terminal chat client for hosted LLM deployments.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Name of the deployment to open, as listed in the config.
    #[arg(short = 'd', long = "deployment")]
    pub deployment: Option<String>,

    /// API token for the deployment workspace.
    #[arg(short = 't', long = "token")]
    pub token: Option<String>,

    /// Override the remote API base URL.
    #[arg(long = "base-url")]
    pub base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > PARLEY_CONFIG env var > ~/.parley/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("PARLEY_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the API token.
    ///
    /// Priority: --token flag > PARLEY_TOKEN env var. Blank values count as
    /// absent.
    pub fn resolve_token(&self) -> Option<String> {
        self.resolve_token_with(std::env::var("PARLEY_TOKEN").ok())
    }

    fn resolve_token_with(&self, env_token: Option<String>) -> Option<String> {
        self.token
            .clone()
            .or(env_token)
            .filter(|t| !t.trim().is_empty())
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Outcome of reading the config file, reported once tracing is up.
#[derive(Debug)]
pub enum ConfigSource {
    File(ParleyConfig),
    Invalid(ParleyError),
    Missing,
}

impl ConfigSource {
    pub fn read(path: &Path) -> Self {
        if !path.exists() {
            return ConfigSource::Missing;
        }
        match ParleyConfig::load(path) {
            Ok(config) => ConfigSource::File(config),
            Err(e) => ConfigSource::Invalid(e),
        }
    }

    pub fn log_level(&self) -> &str {
        match self {
            ConfigSource::File(config) => &config.general.log_level,
            _ => "info",
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".parley").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".parley").join("config.toml");
    }
    PathBuf::from("config.toml")
}
