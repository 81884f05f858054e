//! tvtv2xmltv - TVTV listings to XMLTV converter and server.

/// Application configuration (environment variables).
mod config;
/// Conversion pipeline.
mod convert;
/// HTTP serving layer.
mod server;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::instrument;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;

use crate::config::AppConfig;
use crate::convert::Converter;
use tvtv2xmltv_api::tvtv::{FixtureClient, TvtvClient};

/// CLI argument parser.
#[derive(Parser)]
#[command(about, version)]
struct Cli {
    /// Subcommand to run (default: `serve`).
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run one conversion, write the file(s), and exit.
    Convert(ConvertArgs),
    /// Serve XMLTV documents over HTTP with periodic refresh.
    Serve,
}

/// Arguments for the `convert` subcommand.
#[derive(clap::Args)]
struct ConvertArgs {
    /// Output filename (single-lineup configuration only).
    #[arg(long)]
    output: Option<PathBuf>,
}

/// Builds the network-backed API client with the default pacing policy.
///
/// # Errors
///
/// Returns an error if the client fails to build.
#[instrument(skip_all)]
fn build_client() -> Result<TvtvClient> {
    TvtvClient::builder()
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ))
        .build()
        .context("failed to build TVTV API client")
}

/// Runs the `convert` subcommand.
///
/// # Errors
///
/// Returns an error if the conversion or any file write fails; `main` turns
/// this into a non-zero exit status.
#[instrument(skip_all)]
async fn run_convert(config: AppConfig, args: &ConvertArgs) -> Result<()> {
    tracing::info!(
        lineups = ?config.lineups,
        timezone = %config.timezone,
        days = config.days,
        "Converting TVTV data to XMLTV"
    );

    let converter = Converter::new(config.clone());
    let saved = if config.mock_mode {
        tracing::info!(dir = %config.fixtures_dir.display(), "Mock mode: using fixture data");
        let client = FixtureClient::new(&config.fixtures_dir);
        converter
            .save_to_file(&client, args.output.as_deref())
            .await
    } else {
        let client = build_client()?;
        converter
            .save_to_file(&client, args.output.as_deref())
            .await
    }
    .context("conversion failed")?;

    for path in &saved {
        tracing::info!(path = %path.display(), "XMLTV file saved");
    }
    Ok(())
}

/// Runs the `serve` subcommand.
///
/// # Errors
///
/// Returns an error if the server cannot start.
#[instrument(skip_all)]
async fn run_serve(config: AppConfig) -> Result<()> {
    tracing::info!(
        host = %config.host,
        port = config.port,
        lineups = ?config.lineups,
        timezone = %config.timezone,
        days = config.days,
        interval_secs = config.update_interval,
        "Starting XMLTV server"
    );

    if config.mock_mode {
        tracing::warn!("Mock mode enabled; serving fixture-backed data");
        let client = FixtureClient::new(&config.fixtures_dir);
        server::run_server(config, client).await
    } else {
        let client = build_client()?;
        server::run_server(config, client).await
    }
}

/// Entry point.
///
/// # Errors
///
/// Returns an error if configuration loading or subcommand execution fails.
#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Convert(args) => run_convert(config, &args).await,
        Commands::Serve => run_serve(config).await,
    }
}
