pub mod commands;

use std::path::PathBuf;

use clap::Parser;

use crate::domain::ResourceKind;

const PARALLELISM_LIMIT: usize = 50;

/// Bulk DNS-intelligence harvester for paginated list endpoints.
#[derive(Parser, Debug)]
#[command(name = "trailhound", version, about)]
pub struct Cli {
    /// Kind of lookup to run: subdomain, reverse_ip, reverse_mx,
    /// reverse_email, reverse_ns or keyword
    #[arg(long, default_value = "subdomain", value_parser = ResourceKind::parse)]
    pub kind: ResourceKind,

    /// Resources to query (comma separated, repeatable)
    #[arg(long, value_delimiter = ',')]
    pub resources: Vec<String>,

    /// File with one resource per line ('#' lines are comments)
    #[arg(long)]
    pub resources_file: Option<PathBuf>,

    /// Search terms to combine with each resource (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub search_terms: Vec<String>,

    /// File with one search term per line
    #[arg(long)]
    pub search_terms_file: Option<PathBuf>,

    /// Number of concurrent workers (1-50)
    #[arg(short, long, default_value_t = 10, value_parser = parse_parallelism)]
    pub workers: usize,

    /// Concurrent page fetches per worker (1-50)
    #[arg(short, long, default_value_t = 5, value_parser = parse_parallelism)]
    pub threads: usize,

    /// Output file for collected records (appended, deduplicated)
    #[arg(short, long, default_value = "results.txt")]
    pub output: PathBuf,

    /// Browser cookie export (JSON array) holding the credential
    #[arg(long, default_value = "cookies.json")]
    pub cookies: PathBuf,

    /// Directory for archived failed responses
    #[arg(long, default_value = "failed_requests")]
    pub archive_dir: PathBuf,

    /// Path to config file (default: ~/.config/trailhound/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

fn parse_parallelism(s: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|_| format!("'{}' is not a number", s))?;
    if (1..=PARALLELISM_LIMIT).contains(&n) {
        Ok(n)
    } else {
        Err(format!("must be between 1 and {}", PARALLELISM_LIMIT))
    }
}
