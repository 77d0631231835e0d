//! Core types: IQ Server resources, fetch targets and run results

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::fmt;

/// An organization as returned by `GET api/v2/organizations`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Organization {
    /// Internal organization identifier
    pub id: String,
    /// Display name
    pub name: String,
}

/// Envelope of the organization listing
#[derive(Debug, Deserialize)]
pub(crate) struct OrganizationList {
    #[serde(default)]
    pub organizations: Vec<Organization>,
}

/// An application as returned by the application listing
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Internal application identifier
    pub id: String,
    /// Public identifier used by the report endpoints (may be missing)
    #[serde(default)]
    pub public_id: Option<String>,
    /// Display name
    pub name: String,
    /// Owning organization
    #[serde(default)]
    pub organization_id: Option<String>,
}

/// Envelope of the application listing
#[derive(Debug, Deserialize)]
pub(crate) struct ApplicationList {
    #[serde(default)]
    pub applications: Vec<Application>,
}

/// One entry of `GET api/v2/reports/applications/{id}`
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReportInfo {
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub evaluation_date: Option<String>,
    pub report_data_url: String,
}

impl ReportInfo {
    /// Scan identifier, the last path segment of `reportDataUrl`
    pub fn scan_id(&self) -> Option<&str> {
        self.report_data_url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.trim_end_matches('/').rsplit('/').next())
            .filter(|segment| !segment.is_empty())
    }

    /// Parsed `evaluationDate`, or `None` when absent or unreadable
    ///
    /// IQ writes `2024-05-01T12:00:00.000+0000`; RFC 3339 is accepted too.
    pub fn evaluated_at(&self) -> Option<DateTime<FixedOffset>> {
        let raw = self.evaluation_date.as_deref()?.trim();
        DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z")
            .or_else(|_| DateTime::parse_from_rfc3339(raw))
            .ok()
    }
}

/// One (organization, application) pair scheduled for fetching
///
/// Identity is `(organization_id, application_id)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FetchTarget {
    /// Owning organization identifier
    pub organization_id: String,
    /// Internal application identifier
    pub application_id: String,
    /// Public application identifier used for report retrieval
    pub application_public_id: String,
}

impl fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.organization_id, self.application_public_id)
    }
}

/// A raw report payload, exactly as the server returned it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawReport {
    /// Scan the report belongs to
    pub scan_id: String,
    /// Stage the scan was evaluated at (e.g. "build", "release")
    pub stage: String,
    /// Unmodified response body
    pub body: Vec<u8>,
}

/// Terminal state of one target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Report fetched and written
    Success,
    /// The application has no report yet
    Skipped,
    /// Fetching or writing failed
    Failed,
    /// Never dispatched (or not written) because the run was aborted
    NotAttempted,
}

/// Result of attempting one target
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchResult {
    /// The target this result is for
    pub target: FetchTarget,
    /// What happened
    pub outcome: FetchOutcome,
    /// Written path on success, reason otherwise
    pub detail: Option<String>,
}

impl FetchResult {
    /// Create a result with a detail message
    pub fn new(target: FetchTarget, outcome: FetchOutcome, detail: impl Into<String>) -> Self {
        Self {
            target,
            outcome,
            detail: Some(detail.into()),
        }
    }
}

/// A failed target together with the reason
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedTarget {
    /// The target that failed
    pub target: FetchTarget,
    /// Why it failed
    pub reason: String,
}

/// Why a run stopped dispatching before all targets were attempted
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbortReason {
    /// The server rejected the credentials
    Authentication {
        /// HTTP status that triggered the abort (401 or 403)
        status: u16,
    },
    /// The operator interrupted the run
    Interrupted,
}

/// How a run ended, as the entry point sees it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every target succeeded or was skipped
    Clean,
    /// The run completed but at least one target failed
    PartialFailure,
    /// Dispatch was halted by an authentication failure
    AuthenticationAborted,
    /// Dispatch was halted by the operator
    Interrupted,
}

/// Aggregate result of a run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Targets fetched and written
    pub succeeded: usize,
    /// Targets that failed
    pub failed: usize,
    /// Targets without a report
    pub skipped: usize,
    /// Targets never attempted because the run was aborted
    pub not_attempted: usize,
    /// Failed targets with reasons, in completion order
    pub failures: Vec<FailedTarget>,
    /// Set when dispatch stopped early
    pub aborted: Option<AbortReason>,
}

impl RunSummary {
    /// Fold one result into the counts
    pub fn record(&mut self, result: FetchResult) {
        match result.outcome {
            FetchOutcome::Success => self.succeeded += 1,
            FetchOutcome::Skipped => self.skipped += 1,
            FetchOutcome::NotAttempted => self.not_attempted += 1,
            FetchOutcome::Failed => {
                self.failed += 1;
                self.failures.push(FailedTarget {
                    target: result.target,
                    reason: result.detail.unwrap_or_else(|| "unknown error".to_string()),
                });
            }
        }
    }

    /// Number of results recorded so far
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped + self.not_attempted
    }

    /// Classify the run for exit status purposes
    pub fn outcome(&self) -> RunOutcome {
        match self.aborted {
            Some(AbortReason::Authentication { .. }) => RunOutcome::AuthenticationAborted,
            Some(AbortReason::Interrupted) => RunOutcome::Interrupted,
            None if self.failed > 0 => RunOutcome::PartialFailure,
            None => RunOutcome::Clean,
        }
    }

    /// Emit the final summary line
    pub fn log(&self) {
        if self.failed == 0 && self.aborted.is_none() {
            tracing::info!(
                succeeded = self.succeeded,
                failed = self.failed,
                skipped = self.skipped,
                "Fetch run completed"
            );
            return;
        }

        for failure in &self.failures {
            tracing::error!(application = %failure.target, reason = %failure.reason, "Failed target");
        }
        tracing::warn!(
            succeeded = self.succeeded,
            failed = self.failed,
            skipped = self.skipped,
            not_attempted = self.not_attempted,
            aborted = ?self.aborted,
            "Fetch run finished with problems"
        );
    }
}
