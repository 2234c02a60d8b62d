use serde::{Deserialize, Serialize};

/// The kind of entity a query targets. Each kind maps to its own API path
/// segment and identifying query parameter on the provider side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Subdomain,
    ReverseIp,
    ReverseMx,
    ReverseEmail,
    ReverseNs,
    Keyword,
}

impl ResourceKind {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "subdomain" => Ok(Self::Subdomain),
            "reverse_ip" => Ok(Self::ReverseIp),
            "reverse_mx" => Ok(Self::ReverseMx),
            "reverse_email" => Ok(Self::ReverseEmail),
            "reverse_ns" => Ok(Self::ReverseNs),
            "keyword" => Ok(Self::Keyword),
            other => Err(format!(
                "invalid resource kind '{}' (expected one of: subdomain, reverse_ip, \
                 reverse_mx, reverse_email, reverse_ns, keyword)",
                other
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subdomain => "subdomain",
            Self::ReverseIp => "reverse_ip",
            Self::ReverseMx => "reverse_mx",
            Self::ReverseEmail => "reverse_email",
            Self::ReverseNs => "reverse_ns",
            Self::Keyword => "keyword",
        }
    }

    /// Path segment in the provider's `/list/{segment}/{value}.json` API.
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Subdomain => "apex_domain",
            Self::ReverseIp => "ip",
            Self::ReverseMx => "mx",
            Self::ReverseEmail => "email",
            Self::ReverseNs => "ns",
            Self::Keyword => "keyword",
        }
    }

    /// Name of the query parameter that carries the resource value.
    pub fn query_param(&self) -> &'static str {
        match self {
            Self::Subdomain => "domain",
            Self::ReverseIp => "ip",
            Self::ReverseMx => "mx",
            Self::ReverseEmail => "email",
            Self::ReverseNs => "ns",
            Self::Keyword => "keyword",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entity being queried: a domain, IP, mail server, name server, email
/// address, or keyword. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,
    pub value: String,
}

impl Resource {
    pub fn new(kind: ResourceKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// One unit of scheduled work: a resource plus an optional search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub resource: Resource,
    pub search_term: Option<String>,
}

impl Task {
    pub fn describe(&self) -> String {
        match &self.search_term {
            Some(term) => format!("{} (search: {})", self.resource.value, term),
            None => self.resource.value.clone(),
        }
    }
}

/// Records extracted from a single page fetch, consumed once by the
/// aggregator.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub page: u32,
    pub records: Vec<String>,
    pub success: bool,
}

/// Expand resources and search terms into the full task list: the cross
/// product when search terms exist, otherwise one task per resource.
pub fn build_tasks(kind: ResourceKind, resources: &[String], search_terms: &[String]) -> Vec<Task> {
    let mut tasks = Vec::new();

    for value in resources {
        if search_terms.is_empty() {
            tasks.push(Task {
                resource: Resource::new(kind, value.clone()),
                search_term: None,
            });
        } else {
            for term in search_terms {
                tasks.push(Task {
                    resource: Resource::new(kind, value.clone()),
                    search_term: Some(term.clone()),
                });
            }
        }
    }

    tasks
}
