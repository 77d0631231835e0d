//! Fetch orchestration: bounded parallel fetch-then-write of every target
//!
//! Targets are fed through a buffered unordered stream so that at most
//! `worker_count` targets are in flight. A target's future is only created
//! when a slot frees up, and it checks the dispatch token first: once an
//! authentication failure (or an operator interrupt) cancels dispatch,
//! every target not yet started resolves to [`FetchOutcome::NotAttempted`]
//! while targets already in flight run to completion.

use std::sync::{Arc, Mutex};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::client::IqApi;
use crate::error::Error;
use crate::types::{AbortReason, FetchOutcome, FetchResult, FetchTarget, RunSummary};
use crate::writer::ReportWriter;

/// Runs one batch of targets against the IQ Server
pub struct ReportFetcher {
    api: Arc<dyn IqApi>,
    writer: ReportWriter,
    worker_count: usize,
    shutdown: CancellationToken,
}

/// State shared by every in-flight target of one run
struct RunContext {
    api: Arc<dyn IqApi>,
    writer: ReportWriter,
    /// Cancelled on auth failure or shutdown; gates new dispatch
    dispatch: CancellationToken,
    /// Operator interrupt; additionally suppresses writes
    shutdown: CancellationToken,
    /// First auth failure observed, if any
    auth_abort: Mutex<Option<u16>>,
}

impl ReportFetcher {
    /// Create an orchestrator with `worker_count` concurrent workers (at least one)
    pub fn new(api: Arc<dyn IqApi>, writer: ReportWriter, worker_count: usize) -> Self {
        Self {
            api,
            writer,
            worker_count: worker_count.max(1),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop the run when `token` is cancelled (operator interrupt)
    ///
    /// In-flight fetches finish but their reports are not written.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Process every target, returning once each one has a result
    pub async fn run(&self, targets: Vec<FetchTarget>) -> RunSummary {
        let total = targets.len();
        let ctx = Arc::new(RunContext {
            api: Arc::clone(&self.api),
            writer: self.writer.clone(),
            dispatch: self.shutdown.child_token(),
            shutdown: self.shutdown.clone(),
            auth_abort: Mutex::new(None),
        });

        tracing::info!(
            targets = total,
            workers = self.worker_count,
            output_dir = %self.writer.output_dir().display(),
            "Starting report fetch"
        );

        let mut results = stream::iter(targets)
            .map(|target| {
                let ctx = Arc::clone(&ctx);
                async move { process_target(&ctx, target).await }
            })
            .buffer_unordered(self.worker_count);

        // Completion order is arbitrary; the summary only folds counts
        let mut summary = RunSummary::default();
        while let Some(result) = results.next().await {
            tracing::debug!(
                application = %result.target,
                outcome = ?result.outcome,
                completed = summary.total() + 1,
                total,
                "Target finished"
            );
            summary.record(result);
        }

        let auth_status = ctx.auth_abort.lock().ok().and_then(|guard| *guard);
        summary.aborted = match auth_status {
            Some(status) => Some(AbortReason::Authentication { status }),
            None if self.shutdown.is_cancelled() => Some(AbortReason::Interrupted),
            None => None,
        };

        summary.log();
        summary
    }
}

/// Fetch then write one target; never fails, every error becomes a result
async fn process_target(ctx: &RunContext, target: FetchTarget) -> FetchResult {
    if ctx.dispatch.is_cancelled() {
        return FetchResult::new(target, FetchOutcome::NotAttempted, "run aborted before dispatch");
    }

    tracing::debug!(
        organization_id = %target.organization_id,
        application = %target.application_public_id,
        "Fetching report"
    );

    let report = match ctx.api.fetch_raw_report(&target).await {
        Ok(report) => report,
        Err(e) if e.is_not_found() => {
            tracing::info!(
                organization_id = %target.organization_id,
                application = %target.application_public_id,
                "No report available, skipping"
            );
            return FetchResult::new(target, FetchOutcome::Skipped, e.to_string());
        }
        Err(e) => {
            if let Error::Authentication { status, .. } = &e {
                abort_for_authentication(ctx, *status);
            }
            tracing::error!(
                organization_id = %target.organization_id,
                application = %target.application_public_id,
                error = %e,
                "Failed to fetch report"
            );
            return FetchResult::new(target, FetchOutcome::Failed, e.to_string());
        }
    };

    if ctx.shutdown.is_cancelled() {
        return FetchResult::new(
            target,
            FetchOutcome::NotAttempted,
            "interrupted before write",
        );
    }

    match ctx.writer.write(&target, report.body).await {
        Ok(path) => {
            tracing::info!(
                organization_id = %target.organization_id,
                application = %target.application_public_id,
                stage = %report.stage,
                path = %path.display(),
                "Saved report"
            );
            FetchResult::new(target, FetchOutcome::Success, path.display().to_string())
        }
        Err(e) => {
            tracing::error!(
                organization_id = %target.organization_id,
                application = %target.application_public_id,
                path = %ctx.writer.report_path(&target).display(),
                error = %e,
                "Failed to write report"
            );
            FetchResult::new(target, FetchOutcome::Failed, e.to_string())
        }
    }
}

fn abort_for_authentication(ctx: &RunContext, status: u16) {
    if let Ok(mut guard) = ctx.auth_abort.lock()
        && guard.is_none()
    {
        *guard = Some(status);
        tracing::error!(
            status,
            "Authentication rejected by IQ Server, no further targets will be dispatched"
        );
    }
    ctx.dispatch.cancel();
}
