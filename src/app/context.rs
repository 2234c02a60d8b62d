//! Shared application state wired together at startup and handed to every
//! worker as one `Arc`.

use std::path::PathBuf;
use std::sync::Arc;

use crate::app::Result;
use crate::archive::FailureArchiver;
use crate::config::HarvestConfig;
use crate::fetcher::pagination::PaginationDiscoverer;
use crate::fetcher::{Fetch, PageFetcher};
use crate::maintenance::MaintenanceClock;
use crate::session::identity::IdentityPool;
use crate::session::SessionStore;
use crate::store::ResultAggregator;

pub struct AppContext {
    pub config: Arc<HarvestConfig>,
    pub client: reqwest::Client,
    pub session: Arc<SessionStore>,
    pub identity: Arc<IdentityPool>,
    pub aggregator: Arc<ResultAggregator>,
    pub archiver: Arc<FailureArchiver>,
    pub fetcher: Arc<dyn Fetch>,
    pub discoverer: Arc<PaginationDiscoverer>,
    pub maintenance: Arc<MaintenanceClock>,
}

impl AppContext {
    pub fn new(
        config: HarvestConfig,
        cookie_file: PathBuf,
        output_file: PathBuf,
        archive_dir: PathBuf,
    ) -> Result<Self> {
        let config = Arc::new(config);

        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.request_timeout())
            .build()?;

        let session = Arc::new(SessionStore::new(cookie_file, &config.cookie_name));
        let identity = Arc::new(IdentityPool::new());
        let aggregator = Arc::new(ResultAggregator::open(output_file)?);
        let archiver = Arc::new(FailureArchiver::new(archive_dir));

        let fetcher: Arc<dyn Fetch> = Arc::new(PageFetcher::new(
            client.clone(),
            Arc::clone(&config),
            Arc::clone(&session),
            Arc::clone(&identity),
        ));

        let discoverer = Arc::new(PaginationDiscoverer::new(
            Arc::clone(&fetcher),
            Arc::clone(&archiver),
            Arc::clone(&config),
        ));

        let maintenance = Arc::new(MaintenanceClock::new(&config));

        Ok(Self {
            config,
            client,
            session,
            identity,
            aggregator,
            archiver,
            fetcher,
            discoverer,
            maintenance,
        })
    }
}
