//! Common test utilities: a mock IQ Server and configuration helpers

use std::path::Path;
use std::time::Duration;

use iq_fetcher::{Config, RetryConfig};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Configuration pointing at `server` with fast, deterministic retries
pub fn test_config(server: &MockServer, output_dir: &Path) -> Config {
    Config {
        server_url: server.uri(),
        username: "admin".to_string(),
        password: "admin123".to_string(),
        organization_id: None,
        output_dir: output_dir.to_path_buf(),
        num_workers: 4,
        request_timeout: Duration::from_secs(5),
        retry: RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            jitter: false,
        },
    }
}

/// Mount the organization listing
pub async fn mount_organizations(server: &MockServer, orgs: &[(&str, &str)]) {
    let organizations: Vec<_> = orgs
        .iter()
        .map(|(id, name)| json!({"id": id, "name": name, "tags": []}))
        .collect();
    Mock::given(method("GET"))
        .and(path("/api/v2/organizations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "organizations": organizations
        })))
        .mount(server)
        .await;
}

/// Mount the application listing of one organization as (id, publicId, name)
pub async fn mount_applications(server: &MockServer, org_id: &str, apps: &[(&str, &str, &str)]) {
    let applications: Vec<_> = apps
        .iter()
        .map(|(id, public_id, name)| {
            json!({"id": id, "publicId": public_id, "name": name, "organizationId": org_id})
        })
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/api/v2/applications/organization/{org_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "applications": applications
        })))
        .mount(server)
        .await;
}

/// Mount one evaluation for `app_id` and its raw report body
pub async fn mount_report(server: &MockServer, app_id: &str, public_id: &str, body: &[u8]) {
    let scan_id = format!("scan-{app_id}");
    Mock::given(method("GET"))
        .and(path(format!("/api/v2/reports/applications/{app_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "stage": "build",
            "applicationId": app_id,
            "evaluationDate": "2024-05-01T12:00:00.000+0000",
            "reportDataUrl": format!("api/v2/applications/{public_id}/reports/{scan_id}")
        }])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!(
            "/api/v2/applications/{public_id}/reports/{scan_id}/raw"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Mount a 404 for the report listing of `app_id`
pub async fn mount_missing_report(server: &MockServer, app_id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v2/reports/applications/{app_id}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

/// Every regular file under `dir`, relative and sorted
pub fn files_under(dir: &Path) -> Vec<String> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(root, &path, out);
            } else if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }

    let mut out = Vec::new();
    walk(dir, dir, &mut out);
    out.sort();
    out
}
