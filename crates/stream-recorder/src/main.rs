//! Stream-Recorder: persist live MJPEG streams into playable AVI or MP4 files.
//!
//! Subcommands:
//! - `stream-recorder serve` - accept publish/stop requests over HTTP
//! - `stream-recorder record <source>` - record a stream into rotating segments

mod config;
mod error;
mod negotiator;
mod record;
mod server;

pub(crate) use {
    error::{AppError, Result as AppResult},
    negotiator::PullNegotiator,
};

use crate::config::Config;

use stream_recorder_core::SessionController;

use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "stream_recorder=debug,stream_recorder_core=debug";

#[derive(Parser)]
#[command(name = "stream-recorder")]
#[command(about = "Record live video streams into independently playable files")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the publish/stop HTTP endpoints
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Record a stream into rotating segments until it ends or Ctrl-C
    Record {
        /// MJPEG stream URL or path to a captured multipart body
        source: String,
    },
}

/// Application entry point.
#[tokio::main]
async fn main() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(Cli::parse()).await {
        error!(error = %e, "Fatal error");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    let config = Config::load(cli.config.as_deref())?;
    config.validate()?;

    let controller = Arc::new(SessionController::new(
        config.session_settings()?,
        config.writer_factory(),
        Arc::new(PullNegotiator),
    ));

    match cli.command {
        Command::Serve { port } => {
            server::serve(port.unwrap_or(config.server.port), controller).await
        }
        Command::Record { source } => {
            let outcome = record::record(&controller, &source, config.rotating_policy()?).await?;

            info!(
                frames = outcome.frames_written,
                finalized = outcome.finalized,
                "Recording finished"
            );
            for segment in &outcome.segments {
                println!("{}", segment.display());
            }
            if let Some(e) = &outcome.error {
                error!(error = %e, "Recording ended with an error");
            }

            Ok(())
        }
    }
}
