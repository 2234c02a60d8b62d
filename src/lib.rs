//! # Trailhound
//!
//! A concurrent harvester for paginated DNS-intelligence list endpoints.
//!
//! ## Architecture
//!
//! ```text
//! CLI → Scheduler → Workers → Fetcher → Aggregator → Output file
//!                      │          │
//!                      │          └─ Session / Identity
//!                      └─ Pagination discovery ─ Failure archive
//! ```
//!
//! Tasks (one per resource, or per resource/search-term pair) are split
//! round-robin across workers. Each worker resolves its task's page count
//! first, then fans the remaining pages out to a bounded number of
//! concurrent fetches. Records flow into a deduplicated aggregator that is
//! flushed to an append-only output file on an interval, so a run killed
//! hours in still keeps everything collected so far.
//!
//! ## Modules
//!
//! - [`app`]: Application context and error types
//! - [`cli`]: Command-line interface definitions
//! - [`config`]: TOML configuration with generated defaults
//! - [`domain`]: Core domain models (ResourceKind, Resource, Task)
//! - [`fetcher`]: Page fetching, wire format, pagination discovery
//! - [`session`]: Credential lifecycle and client identity rotation
//! - [`scheduler`]: Two-level worker/page concurrency
//! - [`store`]: Deduplicating aggregator with incremental persistence
//! - [`archive`]: Failed-response archive for offline diagnosis
//! - [`maintenance`]: Periodic upkeep intervals

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components:
/// session, fetcher, discoverer, aggregator, archiver.
pub mod app;

/// Failed-response archive.
///
/// Persists raw responses from failed pagination-discovery attempts as
/// timestamped JSON files, grouped per resource.
pub mod archive;

/// Command-line interface using clap.
pub mod cli;

/// Configuration management.
///
/// Loads from `~/.config/trailhound/config.toml` (created with commented
/// defaults on first run) or an explicit `--config` path.
pub mod config;

/// Core domain models.
///
/// - [`ResourceKind`](domain::ResourceKind): What a query targets
/// - [`Resource`](domain::Resource): One queried entity
/// - [`Task`](domain::Task): A resource plus an optional search term
pub mod domain;

/// Page fetching and pagination discovery.
///
/// - [`Fetch`](fetcher::Fetch): Async trait for page fetching
/// - [`PageFetcher`](fetcher::PageFetcher): reqwest-based implementation
/// - [`PaginationDiscoverer`](fetcher::pagination::PaginationDiscoverer):
///   page-count resolution with the ceiling legitimacy check
pub mod fetcher;

/// Periodic upkeep bookkeeping (session reload, identity rotation,
/// memory hygiene).
pub mod maintenance;

/// Two-level work scheduling: round-robin task partitioning across workers,
/// semaphore-bounded page concurrency within each worker.
pub mod scheduler;

/// Session lifecycle and client identity.
///
/// - [`SessionStore`](session::SessionStore): Credential loading/validation
/// - [`IdentityPool`](session::identity::IdentityPool): User-Agent rotation
pub mod session;

/// Deduplicating result aggregator with incremental append-only
/// persistence.
pub mod store;
