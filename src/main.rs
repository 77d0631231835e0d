//! iq-fetcher - fetch raw scan reports from a Sonatype IQ Server

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use iq_fetcher::config::{self, DEFAULT_ENV_FILE};
use iq_fetcher::{Config, ConfigOverrides, Error, RunOutcome, fetch_all_reports, shutdown_signal};

/// Exit status for a run with failed targets
const EXIT_FAILURES: u8 = 1;
/// Exit status when the run could not start or was aborted by the server
const EXIT_ABORTED: u8 = 2;
/// Exit status for an operator interrupt (128 + SIGINT)
const EXIT_INTERRUPTED: u8 = 130;

/// Fetch raw scan reports for every application of an IQ Server
#[derive(Parser)]
#[command(name = "iq-fetcher", version)]
#[command(about = "Fetch raw scan reports from Sonatype IQ Server", long_about = None)]
struct Cli {
    /// Environment file with IQ_* settings
    #[arg(long, default_value = DEFAULT_ENV_FILE)]
    env_file: PathBuf,

    /// IQ Server base URL (overrides IQ_SERVER_URL)
    #[arg(long)]
    server_url: Option<String>,

    /// Only fetch this organization (overrides ORGANIZATION_ID)
    #[arg(long)]
    organization_id: Option<String>,

    /// Directory reports are written to (overrides OUTPUT_DIR)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Number of concurrent workers (overrides NUM_WORKERS)
    #[arg(short, long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // LOG_LEVEL may come from the env file, so seed the environment first
    let env_file = config::load_env_file(&cli.env_file);

    tracing_subscriber::registry()
        .with(log_filter(config::env_var("LOG_LEVEL").as_deref()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match env_file {
        Ok(true) => tracing::debug!(path = %cli.env_file.display(), "Loaded environment file"),
        Ok(false) => tracing::debug!(path = %cli.env_file.display(), "No environment file found"),
        Err(e) => tracing::warn!(error = %e, "Skipping environment file"),
    }
    tracing::info!("Starting fetch process");

    let overrides = ConfigOverrides {
        server_url: cli.server_url,
        organization_id: cli.organization_id,
        output_dir: cli.output_dir,
        num_workers: cli.workers,
    };
    let config = match Config::from_env_with(&overrides) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::from(EXIT_ABORTED);
        }
    };
    tracing::debug!(?config, "Loaded configuration");

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::warn!("Cancelled by user, finishing in-flight requests");
        signal_token.cancel();
    });

    match fetch_all_reports(&config, shutdown).await {
        Ok(summary) => match summary.outcome() {
            RunOutcome::Clean => {
                tracing::info!("Fetch process completed successfully");
                ExitCode::SUCCESS
            }
            RunOutcome::PartialFailure => {
                tracing::error!(failed = summary.failed, "Fetch process completed with failures");
                ExitCode::from(EXIT_FAILURES)
            }
            RunOutcome::AuthenticationAborted => {
                tracing::error!("Fetch process aborted: check IQ_USERNAME and IQ_PASSWORD");
                ExitCode::from(EXIT_ABORTED)
            }
            RunOutcome::Interrupted => ExitCode::from(EXIT_INTERRUPTED),
        },
        Err(e @ Error::Authentication { .. }) => {
            tracing::error!(error = %e, "Fetch process aborted: check IQ_USERNAME and IQ_PASSWORD");
            ExitCode::from(EXIT_ABORTED)
        }
        Err(e @ Error::Config { .. }) => {
            tracing::error!(error = %e, "Invalid configuration");
            ExitCode::from(EXIT_ABORTED)
        }
        Err(e) => {
            tracing::error!(error = %e, "Could not resolve fetch targets");
            ExitCode::from(EXIT_ABORTED)
        }
    }
}

/// Filter from a `LOG_LEVEL` value; unset or unparseable values mean `info`
fn log_filter(level: Option<&str>) -> EnvFilter {
    level
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .and_then(|level| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
