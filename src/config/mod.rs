//! Configuration management for trailhound.
//!
//! Configuration is read from `~/.config/trailhound/config.toml` at startup
//! (or an explicit `--config` path). If the default file doesn't exist, one
//! with commented defaults is created. Missing fields use default values.

use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tunables for the provider endpoint, retry policy, and maintenance cadence.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Provider base URL.
    pub base_url: String,
    /// Next.js build id embedded in the data API path. The provider rotates
    /// this on deploys, so it has to be editable without a rebuild.
    pub build_id: String,
    /// Name of the credential cookie extracted from the cookie export file.
    pub cookie_name: String,
    /// Domain used for the lightweight session-validation probe.
    pub probe_domain: String,

    /// Per-request timeout for page fetches, in seconds.
    pub request_timeout_secs: u64,
    /// Per-request timeout for the validation probe, in seconds.
    pub validate_timeout_secs: u64,

    /// Attempts for a single page fetch on connection/timeout failures.
    pub transport_retries: u32,
    /// Fixed delay between transport retries, in seconds.
    pub transport_retry_delay_secs: u64,
    /// Successful credential reloads allowed within one page fetch before the
    /// fetch gives up as session-expired.
    pub auth_retry_limit: u32,

    /// Attempts for the whole pagination-discovery sequence.
    pub discovery_attempts: u32,
    /// Base for the linear discovery backoff (`base * attempt` seconds).
    pub discovery_backoff_base_secs: u64,
    /// The provider's page-count reporting ceiling. A total equal to this
    /// value is ambiguous and goes through the legitimacy check.
    pub page_ceiling: u32,

    /// Seconds between periodic flushes of collected records to disk.
    pub flush_interval_secs: u64,
    /// Seconds between forced credential reloads.
    pub session_reload_interval_secs: u64,
    /// Seconds between User-Agent rotations.
    pub identity_rotation_interval_secs: u64,
    /// Seconds between memory-hygiene passes.
    pub hygiene_interval_secs: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: "https://securitytrails.com".to_string(),
            build_id: "0afcffcf".to_string(),
            cookie_name: "SecurityTrails".to_string(),
            probe_domain: "example.com".to_string(),
            request_timeout_secs: 30,
            validate_timeout_secs: 10,
            transport_retries: 5,
            transport_retry_delay_secs: 2,
            auth_retry_limit: 3,
            discovery_attempts: 10,
            discovery_backoff_base_secs: 2,
            page_ceiling: 100,
            flush_interval_secs: 30,
            session_reload_interval_secs: 600,
            identity_rotation_interval_secs: 600,
            hygiene_interval_secs: 600,
        }
    }
}

impl HarvestConfig {
    /// Load configuration from an explicit path, or from the default path.
    ///
    /// An explicit path must exist and parse. For the default path, a file
    /// with commented defaults is created on first run.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let p = Self::default_config_path()?;
                if !p.exists() {
                    Self::create_default_config(&p)?;
                    return Ok(Self::default());
                }
                p
            }
        };

        let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::Io {
            path: config_path.clone(),
            source: e,
        })?;

        let config: HarvestConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path,
            source: e,
        })?;

        Ok(config)
    }

    /// Get the default config file path: `~/.config/trailhound/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("trailhound").join("config.toml"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate_timeout(&self) -> Duration {
        Duration::from_secs(self.validate_timeout_secs)
    }

    pub fn transport_retry_delay(&self) -> Duration {
        Duration::from_secs(self.transport_retry_delay_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let default_config = Self::default_config_content();

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            source: e,
        })?;

        file.write_all(default_config.as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# trailhound configuration
#
# All values are optional; missing fields fall back to the defaults below.

# Provider endpoint. The build id is part of the Next.js data API path and
# changes when the provider redeploys; update it here when requests start
# returning 404s.
base_url = "https://securitytrails.com"
build_id = "0afcffcf"

# Name of the authentication cookie to extract from the cookie export file,
# and the domain used for the cheap session-validation probe request.
cookie_name = "SecurityTrails"
probe_domain = "example.com"

# Request timeouts (seconds).
request_timeout_secs = 30
validate_timeout_secs = 10

# Transport retry policy for a single page fetch.
transport_retries = 5
transport_retry_delay_secs = 2

# How many successful credential reloads a single page fetch may consume
# before giving up as session-expired.
auth_retry_limit = 3

# Pagination discovery: attempts and linear backoff base (delay is
# base * attempt seconds). page_ceiling is the provider's reporting maximum;
# a reported total equal to it is ambiguous and gets the legitimacy check.
discovery_attempts = 10
discovery_backoff_base_secs = 2
page_ceiling = 100

# Maintenance cadence (seconds).
flush_interval_secs = 30
session_reload_interval_secs = 600
identity_rotation_interval_secs = 600
hygiene_interval_secs = 600
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
