//! # iq-fetcher
//!
//! Fetches raw scan reports from a Sonatype IQ Server for every application
//! of one or all organizations and stores each one as a local JSON file.
//!
//! ## Pipeline
//!
//! - [`resolver`] turns the configuration into an ordered, deduplicated list of targets
//! - [`fetcher`] distributes the targets across a bounded pool of workers
//! - [`client`] performs the authenticated, retried HTTP calls
//! - [`writer`] persists every payload atomically under the output directory
//!
//! Per-target failures never abort the run; an authentication failure stops
//! dispatch of the remaining targets.
//!
//! ## Quick Start
//!
//! ```no_run
//! use iq_fetcher::{Config, ConfigOverrides, fetch_all_reports};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(
//!         std::path::Path::new("config/.env"),
//!         &ConfigOverrides::default(),
//!     )?;
//!
//!     let summary = fetch_all_reports(&config, CancellationToken::new()).await?;
//!     println!(
//!         "{} succeeded, {} skipped, {} failed",
//!         summary.succeeded, summary.skipped, summary.failed
//!     );
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// IQ Server REST client
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Parallel fetch orchestration
pub mod fetcher;
/// Target resolution
pub mod resolver;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types
pub mod types;
/// Atomic report persistence
pub mod writer;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

// Re-export commonly used types
pub use client::{IqApi, IqClient};
pub use config::{Config, ConfigOverrides, RetryConfig};
pub use error::{Error, Result};
pub use fetcher::ReportFetcher;
pub use resolver::resolve_targets;
pub use types::{
    AbortReason, Application, FailedTarget, FetchOutcome, FetchResult, FetchTarget, Organization,
    RawReport, RunOutcome, RunSummary,
};
pub use writer::ReportWriter;

/// Run one complete batch: resolve targets, then fetch and store every report.
///
/// Configuration and authentication errors raised while resolving targets are
/// returned as errors; everything that happens per target is reported in the
/// [`RunSummary`]. Cancelling `shutdown` stops dispatching new targets.
pub async fn fetch_all_reports(config: &Config, shutdown: CancellationToken) -> Result<RunSummary> {
    let client: Arc<dyn IqApi> = Arc::new(IqClient::new(config)?);

    tracing::info!(
        server = %config.server_url,
        organization_id = config.organization_id.as_deref().unwrap_or("<all>"),
        "Resolving fetch targets"
    );
    let targets = tokio::select! {
        resolved = resolve_targets(client.as_ref(), config.organization_id.as_deref()) => resolved?,
        _ = shutdown.cancelled() => {
            tracing::warn!("Interrupted while resolving targets");
            return Ok(RunSummary {
                aborted: Some(AbortReason::Interrupted),
                ..Default::default()
            });
        }
    };

    let fetcher = ReportFetcher::new(
        client,
        ReportWriter::new(&config.output_dir),
        config.num_workers,
    )
    .with_shutdown(shutdown);

    Ok(fetcher.run(targets).await)
}

/// Wait for an operator interrupt (Ctrl+C, or SIGTERM on unix)
///
/// A signal that cannot be registered is logged and never fires.
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        tracing::info!("Received interrupt signal");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
}
