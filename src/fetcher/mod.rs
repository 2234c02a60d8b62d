pub mod pagination;
pub mod wire;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde_json::Value;
use url::Url;

use crate::config::HarvestConfig;
use crate::domain::Task;
use crate::session::identity::IdentityPool;
use crate::session::SessionStore;

/// Classified outcome of a single page fetch.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Connection/timeout failures that exhausted the retry budget.
    #[error("transport failure after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        source: reqwest::Error,
    },

    /// The session expired and could not be recovered by reloading the
    /// credential. Callers must abandon the task rather than spin.
    #[error("session expired and credential reload failed")]
    SessionExpired,

    /// The body did not parse as the expected structure. Never retried.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// A non-401 HTTP error status. Never retried.
    #[error("unexpected HTTP status {0}")]
    Status(StatusCode),
}

/// One successfully fetched and parsed page. The raw document is kept for
/// the failure archive.
#[derive(Debug)]
pub struct FetchedPage {
    pub raw: Value,
    pub payload: wire::Payload,
}

/// Seam between the scheduler/discoverer and the HTTP layer.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch_page(&self, task: &Task, page: u32) -> Result<FetchedPage, FetchError>;

    /// Make sure a valid session is installed, reloading the credential if
    /// the current one no longer validates. Returns false when no valid
    /// session can be obtained.
    async fn ensure_session(&self) -> bool;
}

/// URL of the provider's data API for one resource.
pub(crate) fn data_url(
    config: &HarvestConfig,
    segment: &str,
    value: &str,
) -> Result<Url, url::ParseError> {
    let base = Url::parse(&config.base_url)?;
    base.join(&format!(
        "/_next/data/{}/list/{}/{}.json",
        config.build_id, segment, value
    ))
}

/// Issues one API call per (resource, page) pair with bounded retry and
/// session-expiry recovery.
pub struct PageFetcher {
    client: reqwest::Client,
    config: Arc<HarvestConfig>,
    session: Arc<SessionStore>,
    identity: Arc<IdentityPool>,
}

impl PageFetcher {
    pub fn new(
        client: reqwest::Client,
        config: Arc<HarvestConfig>,
        session: Arc<SessionStore>,
        identity: Arc<IdentityPool>,
    ) -> Self {
        Self {
            client,
            config,
            session,
            identity,
        }
    }

    fn referer(&self, task: &Task, page: u32) -> String {
        // The site links subdomain listings under /list/apex_domain/ but the
        // other kinds under their plain kind name.
        let segment = match task.resource.kind {
            crate::domain::ResourceKind::Subdomain => "apex_domain",
            other => other.as_str(),
        };
        format!(
            "{}/list/{}/{}?page={}",
            self.config.base_url.trim_end_matches('/'),
            segment,
            task.resource.value,
            page
        )
    }

    fn build_request(&self, task: &Task, page: u32, url: Url) -> reqwest::RequestBuilder {
        let mut query: Vec<(&str, String)> = vec![
            ("page", page.to_string()),
            (
                task.resource.kind.query_param(),
                task.resource.value.clone(),
            ),
        ];
        if let Some(term) = &task.search_term {
            query.push(("search", term.clone()));
        }

        self.client
            .get(url)
            .query(&query)
            .header(header::USER_AGENT, self.identity.user_agent())
            .header(header::ACCEPT, "application/json, text/plain, */*")
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(header::ORIGIN, self.config.base_url.trim_end_matches('/'))
            .header(header::REFERER, self.referer(task, page))
            .header("Sec-Fetch-Dest", "empty")
            .header("Sec-Fetch-Mode", "cors")
            .header("Sec-Fetch-Site", "same-origin")
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::PRAGMA, "no-cache")
            .timeout(self.config.request_timeout())
    }

    /// Reload and revalidate the credential after an expiry signal.
    async fn recover_session(&self) -> bool {
        let user_agent = self.identity.user_agent();
        match self
            .session
            .reload_and_validate(&self.client, &self.config, &user_agent)
            .await
        {
            Ok(_) => {
                tracing::info!("session recovered after expiry");
                true
            }
            Err(e) => {
                tracing::warn!("session recovery failed: {}", e);
                false
            }
        }
    }
}

fn transport_retryable(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect()
}

#[async_trait]
impl Fetch for PageFetcher {
    async fn fetch_page(&self, task: &Task, page: u32) -> Result<FetchedPage, FetchError> {
        let url = data_url(
            &self.config,
            task.resource.kind.path_segment(),
            &task.resource.value,
        )
        .map_err(|e| FetchError::Malformed(format!("invalid request URL: {}", e)))?;

        let mut transport_attempts: u32 = 0;
        // Expiry recovery retries the same page with the new credential and
        // does not count against the transport budget.
        let mut auth_retries: u32 = 0;

        loop {
            let cookie = self
                .session
                .cookie_header()
                .ok_or(FetchError::SessionExpired)?;

            let response = self
                .build_request(task, page, url.clone())
                .header(header::COOKIE, cookie)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    transport_attempts += 1;
                    if transport_retryable(&e) && transport_attempts < self.config.transport_retries
                    {
                        tracing::debug!(
                            "page {} of {}: transport error (attempt {}/{}): {}",
                            page,
                            task.resource.value,
                            transport_attempts,
                            self.config.transport_retries,
                            e
                        );
                        tokio::time::sleep(self.config.transport_retry_delay()).await;
                        continue;
                    }
                    return Err(FetchError::Transport {
                        attempts: transport_attempts,
                        source: e,
                    });
                }
            };

            if response.status() == StatusCode::UNAUTHORIZED {
                if auth_retries >= self.config.auth_retry_limit || !self.recover_session().await {
                    return Err(FetchError::SessionExpired);
                }
                auth_retries += 1;
                continue;
            }

            if !response.status().is_success() {
                return Err(FetchError::Status(response.status()));
            }

            let raw: Value = response
                .json()
                .await
                .map_err(|e| FetchError::Malformed(format!("body is not JSON: {}", e)))?;

            let envelope = wire::Envelope::from_value(&raw)
                .map_err(|e| FetchError::Malformed(format!("unexpected document shape: {}", e)))?;

            // Expiry can also arrive embedded in a 200 body.
            if envelope.session_expired() {
                if auth_retries >= self.config.auth_retry_limit || !self.recover_session().await {
                    return Err(FetchError::SessionExpired);
                }
                auth_retries += 1;
                continue;
            }

            let payload = envelope.into_payload().ok_or_else(|| {
                FetchError::Malformed("response carries neither known branch".to_string())
            })?;

            return Ok(FetchedPage { raw, payload });
        }
    }

    async fn ensure_session(&self) -> bool {
        let user_agent = self.identity.user_agent();
        if self
            .session
            .validate(&self.client, &self.config, &user_agent)
            .await
        {
            return true;
        }

        tracing::info!("session validation failed, reloading credential");
        self.session
            .reload_and_validate(&self.client, &self.config, &user_agent)
            .await
            .is_ok()
    }
}
