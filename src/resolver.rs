//! Target resolution: configuration → ordered, deduplicated fetch targets
//!
//! Ordering is stable by organization name, then application name (ids break
//! ties), so repeated runs against an unchanged server dispatch in the same
//! order. Any listing failure is terminal: no partial target list is returned.

use crate::client::IqApi;
use crate::error::{Error, Result};
use crate::types::FetchTarget;
use std::collections::HashSet;

/// Enumerate the targets of a run
///
/// With `organization_filter` set only that organization is resolved; an id
/// the server does not know is a configuration error.
pub async fn resolve_targets(
    api: &dyn IqApi,
    organization_filter: Option<&str>,
) -> Result<Vec<FetchTarget>> {
    let mut organizations = api.list_organizations().await?;

    if let Some(filter) = organization_filter {
        organizations.retain(|org| org.id == filter);
        if organizations.is_empty() {
            return Err(Error::config(
                format!("organization {filter} does not exist on the server"),
                "ORGANIZATION_ID",
            ));
        }
    }

    organizations.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for org in &organizations {
        let mut applications = api.list_applications(&org.id).await?;
        applications.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        tracing::debug!(
            organization_id = %org.id,
            organization = %org.name,
            applications = applications.len(),
            "Listed applications"
        );

        for app in applications {
            let Some(public_id) = app
                .public_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
            else {
                tracing::warn!(
                    organization_id = %org.id,
                    application_id = %app.id,
                    application = %app.name,
                    "Application has no public id, skipping"
                );
                continue;
            };

            if !seen.insert((org.id.clone(), app.id.clone())) {
                tracing::debug!(
                    organization_id = %org.id,
                    application_id = %app.id,
                    "Duplicate application listing ignored"
                );
                continue;
            }

            targets.push(FetchTarget {
                organization_id: org.id.clone(),
                application_id: app.id,
                application_public_id: public_id.to_string(),
            });
        }
    }

    tracing::info!(
        organizations = organizations.len(),
        targets = targets.len(),
        "Resolved fetch targets"
    );
    Ok(targets)
}
