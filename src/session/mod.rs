//! Session lifecycle: loading the credential cookie from a browser export,
//! validating it against the live service, and replacing it mid-run when the
//! provider expires it.

pub mod identity;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use reqwest::header;
use serde::Deserialize;

use crate::app::{HarvestError, Result};
use crate::config::HarvestConfig;
use crate::fetcher::{data_url, wire};

/// One record of a browser cookie export (`cookies.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

/// The authentication credential currently in use.
#[derive(Debug, Clone)]
pub struct Session {
    pub credential: String,
    pub loaded_at: DateTime<Utc>,
    pub valid: bool,
}

/// Owns the process-wide session. All mutation goes through one lock;
/// readers observe either the old or the new session, never a partial one.
/// Workers may race to replace an expired session; last writer wins, and a
/// session is only ever installed after it passed validation.
pub struct SessionStore {
    path: PathBuf,
    cookie_name: String,
    current: Mutex<Option<Session>>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>, cookie_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            cookie_name: cookie_name.into(),
            current: Mutex::new(None),
        }
    }

    /// Read the cookie export and extract the named credential. Does not
    /// install anything.
    pub fn load(&self) -> Result<Session> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            HarvestError::Credential(format!(
                "cookie file '{}' not readable: {}",
                self.path.display(),
                e
            ))
        })?;

        let records: Vec<CookieRecord> = serde_json::from_str(&content).map_err(|e| {
            HarvestError::Credential(format!(
                "cookie file '{}' is not valid JSON: {}",
                self.path.display(),
                e
            ))
        })?;

        let record = records
            .into_iter()
            .find(|r| r.name == self.cookie_name)
            .ok_or_else(|| {
                HarvestError::Credential(format!(
                    "cookie '{}' not found in '{}'",
                    self.cookie_name,
                    self.path.display()
                ))
            })?;

        Ok(Session {
            credential: record.value,
            loaded_at: Utc::now(),
            valid: false,
        })
    }

    /// The credential readers attach to requests, if a session is installed.
    pub fn credential(&self) -> Option<String> {
        self.current
            .lock()
            .expect("session lock poisoned")
            .as_ref()
            .map(|s| s.credential.clone())
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Cookie header value for outgoing requests.
    pub fn cookie_header(&self) -> Option<String> {
        self.credential()
            .map(|v| format!("{}={}", self.cookie_name, v))
    }

    fn install(&self, mut session: Session) {
        session.valid = true;
        *self.current.lock().expect("session lock poisoned") = Some(session);
    }

    /// Probe the live service with the installed credential. Checks both the
    /// transport status and embedded expiry markers in the body.
    pub async fn validate(
        &self,
        client: &reqwest::Client,
        config: &HarvestConfig,
        user_agent: &str,
    ) -> bool {
        let Some(credential) = self.credential() else {
            return false;
        };
        probe_credential(client, config, user_agent, &self.cookie_name, &credential).await
    }

    /// Load a fresh credential and validate it before trusting it. On
    /// validation failure the reload is considered failed and the prior
    /// session is retained; a session known to be invalid is never installed.
    pub async fn reload_and_validate(
        &self,
        client: &reqwest::Client,
        config: &HarvestConfig,
        user_agent: &str,
    ) -> Result<Session> {
        let fresh = self.load()?;

        let ok = probe_credential(
            client,
            config,
            user_agent,
            &self.cookie_name,
            &fresh.credential,
        )
        .await;

        if !ok {
            return Err(HarvestError::Credential(
                "reloaded credential failed validation; keeping previous session".to_string(),
            ));
        }

        let installed = Session {
            valid: true,
            ..fresh
        };
        self.install(installed.clone());
        Ok(installed)
    }

    /// Startup path: load and validate, or fail the run. This is the only
    /// process-fatal error in the system.
    pub async fn initialize(
        &self,
        client: &reqwest::Client,
        config: &HarvestConfig,
        user_agent: &str,
    ) -> Result<()> {
        let fresh = self.load()?;

        let ok = probe_credential(
            client,
            config,
            user_agent,
            &self.cookie_name,
            &fresh.credential,
        )
        .await;

        if !ok {
            return Err(HarvestError::Credential(
                "initial session validation failed; refresh the cookie export".to_string(),
            ));
        }

        self.install(fresh);
        Ok(())
    }

    pub fn cookie_file(&self) -> &Path {
        &self.path
    }
}

/// One cheap known-good API call (page 1 of the probe domain) with the given
/// credential. Expiry is reported both as a 401 and as markers embedded in a
/// 200 body, so both paths are checked.
async fn probe_credential(
    client: &reqwest::Client,
    config: &HarvestConfig,
    user_agent: &str,
    cookie_name: &str,
    credential: &str,
) -> bool {
    let url = match data_url(config, "apex_domain", &config.probe_domain) {
        Ok(u) => u,
        Err(e) => {
            tracing::warn!("invalid probe URL: {}", e);
            return false;
        }
    };

    let response = client
        .get(url)
        .query(&[
            ("page", "1"),
            ("domain", config.probe_domain.as_str()),
        ])
        .header(header::USER_AGENT, user_agent)
        .header(header::ACCEPT, "application/json, text/plain, */*")
        .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
        .header(header::COOKIE, format!("{}={}", cookie_name, credential))
        .timeout(config.validate_timeout())
        .send()
        .await;

    let response = match response {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!("session probe failed to send: {}", e);
            return false;
        }
    };

    if response.status() == reqwest::StatusCode::UNAUTHORIZED {
        return false;
    }
    let status_ok = response.status().is_success();

    if let Ok(body) = response.json::<serde_json::Value>().await {
        if let Ok(envelope) = wire::Envelope::from_value(&body) {
            if envelope.session_expired() {
                return false;
            }
        }
    }

    status_ok
}
