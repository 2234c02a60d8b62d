//! Wire model for the provider's paginated JSON responses.
//!
//! Responses carry a `pageProps` root with one of two branches,
//! `apexDomainData` (subdomain listings) or `serverResponse` (everything
//! else). Both carry the same logical fields, so they are parsed once into a
//! tagged [`Payload`] and every consumer matches on the tag instead of
//! probing for keys. Session expiry is reported *inside* an otherwise-200
//! body (`status: 401` or `error: "session_expired"`), so expiry checks look
//! at both branches on every response.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(rename = "pageProps", default)]
    page_props: Option<PageProps>,
}

#[derive(Debug, Deserialize, Default)]
struct PageProps {
    #[serde(rename = "apexDomainData")]
    apex_domain_data: Option<Branch>,
    #[serde(rename = "serverResponse")]
    server_response: Option<Branch>,
}

#[derive(Debug, Deserialize)]
pub struct Branch {
    #[serde(default)]
    status: Option<i64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<BranchData>,
}

#[derive(Debug, Deserialize)]
struct BranchData {
    #[serde(default)]
    records: Option<Vec<RecordEntry>>,
    #[serde(default)]
    meta: Option<Meta>,
}

#[derive(Debug, Deserialize)]
struct RecordEntry {
    #[serde(default)]
    hostname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    #[serde(default)]
    total_pages: Option<u32>,
    #[serde(default)]
    limit_reached: Option<bool>,
}

/// The response branch the provider used, carrying the same logical fields
/// either way.
#[derive(Debug)]
pub enum Payload {
    Apex(Branch),
    Server(Branch),
}

impl Envelope {
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Envelope::deserialize(value)
    }

    /// True when either branch carries an embedded session-expiry marker.
    pub fn session_expired(&self) -> bool {
        let Some(props) = &self.page_props else {
            return false;
        };
        props
            .apex_domain_data
            .as_ref()
            .map(Branch::expired)
            .unwrap_or(false)
            || props
                .server_response
                .as_ref()
                .map(Branch::expired)
                .unwrap_or(false)
    }

    /// Take whichever branch is present, preferring `apexDomainData`.
    pub fn into_payload(self) -> Option<Payload> {
        let props = self.page_props?;
        if let Some(branch) = props.apex_domain_data {
            return Some(Payload::Apex(branch));
        }
        props.server_response.map(Payload::Server)
    }
}

impl Branch {
    fn expired(&self) -> bool {
        self.status == Some(401) || self.error.as_deref() == Some("session_expired")
    }
}

impl Payload {
    fn branch(&self) -> &Branch {
        match self {
            Payload::Apex(b) | Payload::Server(b) => b,
        }
    }

    /// Extracted hostname records, trimmed, empties dropped. Identity is the
    /// exact trimmed string; no case or trailing-dot normalization.
    pub fn hostnames(&self) -> Vec<String> {
        let Some(records) = self
            .branch()
            .data
            .as_ref()
            .and_then(|d| d.records.as_ref())
        else {
            return Vec::new();
        };

        records
            .iter()
            .filter_map(|r| r.hostname.as_deref())
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn total_pages(&self) -> Option<u32> {
        self.branch()
            .data
            .as_ref()
            .and_then(|d| d.meta.as_ref())
            .and_then(|m| m.total_pages)
    }

    pub fn limit_reached(&self) -> bool {
        self.branch()
            .data
            .as_ref()
            .and_then(|d| d.meta.as_ref())
            .and_then(|m| m.limit_reached)
            .unwrap_or(false)
    }

    pub fn has_meta(&self) -> bool {
        self.branch()
            .data
            .as_ref()
            .map(|d| d.meta.is_some())
            .unwrap_or(false)
    }

    pub fn session_expired(&self) -> bool {
        self.branch().expired()
    }
}
