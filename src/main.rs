mod cli;
mod commands;
mod config;
mod error;
mod matching;
mod model;
mod overlay;
mod util;

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;

fn main() {
    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref());
    let log_file = config
        .as_ref()
        .ok()
        .and_then(|config| config.log_filename.clone());
    init_tracing(log_file.as_deref());

    let result = config.and_then(|config| run(cli.command, &config));
    if let Err(err) = result {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run(command: Commands, config: &AppConfig) -> Result<()> {
    match command {
        Commands::Extract(args) => commands::extract::run(args, config),
        Commands::Reconcile(args) => commands::reconcile::run(args, config),
    }
}

fn init_tracing(log_file: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file_layer, file_error) = match log_file {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => (
                Some(
                    fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                ),
                None,
            ),
            Err(err) => (None, Some(err)),
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    if let (Some(path), Some(err)) = (log_file, file_error) {
        warn!(path = %path.display(), error = %err, "failed to open log file, logging to stderr only");
    }
}
