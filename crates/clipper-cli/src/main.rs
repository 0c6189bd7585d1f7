//! `clipper` binary: reframe, probe and environment checks.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Shown in `--help`. Default builds carry no face detector.
const DETECTOR_NOTE: &str = "Face tracking needs a build with `--features opencv` \
(and a Haar cascade XML). Without it, `reframe` fails unless `--center` is given.";

#[derive(Parser)]
#[command(name = "clipper", about = "Face-tracking landscape to portrait reframer")]
#[command(after_help = DETECTOR_NOTE)]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reframe a landscape video to 9:16 portrait
    #[command(after_help = DETECTOR_NOTE)]
    Reframe(commands::reframe::ReframeArgs),
    /// Show stream metadata as JSON
    Probe(commands::probe::ProbeArgs),
    /// Check that FFmpeg and the face detector are usable
    Doctor(commands::doctor::DoctorArgs),
}

fn init_tracing(verbose: bool) -> Result<()> {
    // Colored output for terminals, JSON for log collectors
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::from_default_env()
        .add_directive(format!("clipper_media={}", level).parse()?)
        .add_directive(format!("clipper_cli={}", level).parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(verbose)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    match &cli.command {
        Commands::Reframe(args) => commands::reframe::run(args).await,
        Commands::Probe(args) => commands::probe::run(args).await,
        Commands::Doctor(args) => commands::doctor::run(args),
    }
}
