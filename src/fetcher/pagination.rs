//! Pagination discovery: fetch page 1, infer the total page count from the
//! response metadata, and decide whether a count at the provider's reporting
//! ceiling is real or a detection failure.
//!
//! The provider's own page-count field is unreliable at its ceiling value:
//! it can mean "there truly are this many pages" or "the API failed to
//! report a count and defaulted". Treating both as equivalent would either
//! waste thousands of requests on pages that do not exist or silently drop
//! legitimate data, hence the legitimacy check.

use std::sync::Arc;

use serde_json::json;

use crate::archive::FailureArchiver;
use crate::config::HarvestConfig;
use crate::domain::Task;
use crate::fetcher::Fetch;

/// Outcome of a successful discovery.
#[derive(Debug)]
pub struct Discovery {
    /// Records already extracted from page 1.
    pub first_page: Vec<String>,
    pub total_pages: u32,
    /// False when the provider reported no count and the ceiling was assumed.
    pub confirmed: bool,
}

/// All attempts exhausted. Carries the conventional fallback count so
/// callers are never left without one.
#[derive(Debug, thiserror::Error)]
#[error("pagination discovery failed after {attempts} attempt(s)")]
pub struct DiscoveryFailure {
    pub attempts: u32,
    pub fallback_total: u32,
}

pub struct PaginationDiscoverer {
    fetcher: Arc<dyn Fetch>,
    archiver: Arc<FailureArchiver>,
    config: Arc<HarvestConfig>,
}

impl PaginationDiscoverer {
    pub fn new(
        fetcher: Arc<dyn Fetch>,
        archiver: Arc<FailureArchiver>,
        config: Arc<HarvestConfig>,
    ) -> Self {
        Self {
            fetcher,
            archiver,
            config,
        }
    }

    /// Resolve page 1 and the total page count for a task, retrying the
    /// whole sequence with linear backoff and archiving every failed
    /// attempt.
    pub async fn discover(&self, task: &Task) -> Result<Discovery, DiscoveryFailure> {
        let attempts = self.config.discovery_attempts;

        for attempt in 1..=attempts {
            tracing::debug!(
                "discovery attempt {}/{} for {} {}",
                attempt,
                attempts,
                task.resource.kind,
                task.resource.value
            );

            // Never proceed on a known-bad session.
            if !self.fetcher.ensure_session().await {
                tracing::warn!("no valid session for discovery, retrying");
                self.backoff(attempt).await;
                continue;
            }

            match self.fetcher.fetch_page(task, 1).await {
                Ok(page) => {
                    let hint = page.payload.total_pages();
                    let total = hint.unwrap_or(self.config.page_ceiling);

                    if total != self.config.page_ceiling {
                        return Ok(Discovery {
                            first_page: page.payload.hostnames(),
                            total_pages: total,
                            confirmed: true,
                        });
                    }

                    // At the ceiling: accept only with an explicit limit
                    // signal, or with at least one record under well-formed
                    // metadata.
                    let legitimate = page.payload.has_meta()
                        && (page.payload.limit_reached() || !page.payload.hostnames().is_empty());

                    if legitimate {
                        if page.payload.limit_reached() {
                            tracing::info!(
                                "{}: {} pages (provider limit reached)",
                                task.resource.value,
                                total
                            );
                        }
                        return Ok(Discovery {
                            first_page: page.payload.hostnames(),
                            total_pages: total,
                            confirmed: hint.is_some(),
                        });
                    }

                    tracing::warn!(
                        "{}: got ceiling page count without supporting data, retrying",
                        task.resource.value
                    );
                    self.archiver.archive(
                        &task.resource,
                        attempt,
                        "total_pages_detection_failed",
                        page.raw,
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "{}: first page fetch failed: {}",
                        task.resource.value,
                        e
                    );
                    self.archiver.archive(
                        &task.resource,
                        attempt,
                        "no_data_received",
                        json!({ "error": e.to_string() }),
                    );
                }
            }

            self.backoff(attempt).await;
        }

        Err(DiscoveryFailure {
            attempts,
            fallback_total: self.config.page_ceiling,
        })
    }

    /// Linear backoff: `base * attempt` seconds between attempts.
    async fn backoff(&self, attempt: u32) {
        if attempt < self.config.discovery_attempts {
            let delay = self.config.discovery_backoff_base_secs * u64::from(attempt);
            tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
        }
    }
}
