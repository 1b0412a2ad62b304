mod cli;
mod commands;
mod error;
mod logging;
mod output;

use clap::Parser;
use std::process::ExitCode;
use tickwise_core::config::AppConfig;
use tracing::debug;

use crate::cli::Cli;
use crate::error::{status_exit_code, CliError};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();

    let (config, path) = AppConfig::load(cli.config.as_deref())?;
    logging::init(&config.logging);
    match &path {
        Some(path) => debug!(path = %path.display(), "loaded config"),
        None => debug!("no config file found, using defaults"),
    }
    config.validate()?;

    let output = commands::run(&cli, config).await?;
    output::render(&output, cli.format, cli.pretty)?;

    Ok(ExitCode::from(status_exit_code(output.status)))
}
