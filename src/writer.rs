//! Report persistence
//!
//! Reports land at `{output_dir}/{organization_id}/{application_public_id}.json`.
//! Each payload is written to a temporary file in the destination directory,
//! flushed to disk, then renamed over the destination, so the final path only
//! ever holds a complete report.

use crate::error::{Error, Result};
use crate::types::FetchTarget;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes raw reports under a fixed output directory
#[derive(Clone, Debug)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    /// Create a writer rooted at `output_dir` (created on first write)
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Root directory of all reports
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Destination of the report for `target`
    pub fn report_path(&self, target: &FetchTarget) -> PathBuf {
        self.output_dir
            .join(path_segment(&target.organization_id))
            .join(format!(
                "{}.json",
                path_segment(&target.application_public_id)
            ))
    }

    /// Atomically write `payload` as the report of `target`, returning the final path
    pub async fn write(&self, target: &FetchTarget, payload: Vec<u8>) -> Result<PathBuf> {
        let path = self.report_path(target);
        let dest = path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&dest, &payload))
            .await
            .map_err(|e| Error::Other(format!("report write task failed: {e}")))??;

        Ok(path)
    }
}

fn write_atomic(path: &Path, payload: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Other(format!("{} has no parent directory", path.display())))?;

    // create_dir_all succeeds when the directory already exists
    std::fs::create_dir_all(dir).map_err(|e| Error::filesystem(dir, e))?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    // Dropping the temp file on any early return removes it
    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| Error::filesystem(dir, e))?;

    temp.write_all(payload)
        .map_err(|e| Error::filesystem(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::filesystem(temp.path(), e))?;

    temp.persist(path)
        .map_err(|e| Error::filesystem(path, e.error))?;

    Ok(())
}

/// Encode an identifier as a single path component
///
/// Percent-encoding is reversible, so two ids never map to the same file.
fn path_segment(id: &str) -> String {
    match id {
        // `%` never appears unescaped in an encoded id
        "" => "%".to_string(),
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => urlencoding::encode(id).into_owned(),
    }
}
