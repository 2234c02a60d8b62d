//! Persists raw responses (or their absence) from failed pagination-discovery
//! attempts, keyed by resource and attempt number, for offline diagnosis.

use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use serde_json::{json, Value};

use crate::domain::Resource;

pub struct FailureArchiver {
    root: PathBuf,
}

impl FailureArchiver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write one timestamped JSON file for a failed attempt. Archiving is
    /// diagnostic only; errors are logged and swallowed so they can never
    /// take down the run.
    pub fn archive(
        &self,
        resource: &Resource,
        attempt: u32,
        error_type: &str,
        response_data: Value,
    ) -> Option<PathBuf> {
        match self.try_archive(resource, attempt, error_type, response_data) {
            Ok(path) => {
                tracing::debug!("archived failed response to {}", path.display());
                Some(path)
            }
            Err(e) => {
                tracing::warn!(
                    "failed to archive response for {}: {}",
                    resource.value,
                    e
                );
                None
            }
        }
    }

    fn try_archive(
        &self,
        resource: &Resource,
        attempt: u32,
        error_type: &str,
        response_data: Value,
    ) -> std::io::Result<PathBuf> {
        let dir = self.root.join(sanitize(&resource.value));
        std::fs::create_dir_all(&dir)?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("retry_{}_{}_{}.json", attempt, error_type, timestamp));

        let document = json!({
            "metadata": {
                "resource_type": resource.kind.as_str(),
                "resource_value": resource.value,
                "attempt": attempt,
                "timestamp": Utc::now().to_rfc3339(),
                "error_type": error_type,
            },
            "response_data": response_data,
        });

        std::fs::write(&path, serde_json::to_string_pretty(&document)?)?;
        Ok(path)
    }
}

/// Directory-safe resource name: alphanumerics, `-`, `.` and `_` only.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '.' | '_'))
        .collect()
}
