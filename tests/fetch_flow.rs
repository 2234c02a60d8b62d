//! End-to-end fetch flow against a mock provider: session validation,
//! page fetching, expiry recovery, and a small full-run scenario.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::{NamedTempFile, TempDir};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trailhound::app::AppContext;
use trailhound::config::HarvestConfig;
use trailhound::domain::{build_tasks, Resource, ResourceKind, Task};
use trailhound::fetcher::{Fetch, FetchError, PageFetcher};
use trailhound::scheduler::TaskScheduler;
use trailhound::session::identity::IdentityPool;
use trailhound::session::SessionStore;

const BUILD_ID: &str = "testbuild";
const PROBE_DOMAIN: &str = "probe.example.com";

fn test_config(base_url: &str) -> HarvestConfig {
    HarvestConfig {
        base_url: base_url.to_string(),
        build_id: BUILD_ID.to_string(),
        probe_domain: PROBE_DOMAIN.to_string(),
        request_timeout_secs: 5,
        validate_timeout_secs: 5,
        transport_retries: 2,
        transport_retry_delay_secs: 0,
        discovery_attempts: 2,
        discovery_backoff_base_secs: 0,
        ..HarvestConfig::default()
    }
}

fn cookie_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(
        br#"[{"name": "SecurityTrails", "value": "tok-abc", "domain": ".securitytrails.com", "path": "/"}]"#,
    )
    .unwrap();
    file
}

fn page_body(hosts: &[&str], total_pages: u32) -> serde_json::Value {
    let records: Vec<_> = hosts.iter().map(|h| json!({"hostname": h})).collect();
    json!({
        "pageProps": {
            "apexDomainData": {
                "data": {
                    "records": records,
                    "meta": {"total_pages": total_pages}
                }
            }
        }
    })
}

fn api_path(value: &str) -> String {
    format!("/_next/data/{}/list/apex_domain/{}.json", BUILD_ID, value)
}

async fn mount_probe_ok(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(api_path(PROBE_DOMAIN)))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&["ok.example.com"], 1)))
        .mount(server)
        .await;
}

struct Harness {
    fetcher: PageFetcher,
    session: Arc<SessionStore>,
    client: reqwest::Client,
    config: Arc<HarvestConfig>,
    identity: Arc<IdentityPool>,
    _cookies: NamedTempFile,
}

async fn harness(server: &MockServer) -> Harness {
    let cookies = cookie_file();
    let config = Arc::new(test_config(&server.uri()));
    let client = reqwest::Client::new();
    let session = Arc::new(SessionStore::new(cookies.path(), "SecurityTrails"));
    let identity = Arc::new(IdentityPool::new());

    let fetcher = PageFetcher::new(
        client.clone(),
        Arc::clone(&config),
        Arc::clone(&session),
        Arc::clone(&identity),
    );

    Harness {
        fetcher,
        session,
        client,
        config,
        identity,
        _cookies: cookies,
    }
}

fn subdomain_task(value: &str) -> Task {
    Task {
        resource: Resource::new(ResourceKind::Subdomain, value),
        search_term: None,
    }
}

#[tokio::test]
async fn fetch_page_returns_parsed_records() {
    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    Mock::given(method("GET"))
        .and(path(api_path("example.com")))
        .and(query_param("page", "2"))
        .and(query_param("domain", "example.com"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_body(&["a.example.com", "b.example.com"], 3)),
        )
        .mount(&server)
        .await;

    let h = harness(&server).await;
    let ua = h.identity.user_agent();
    h.session
        .initialize(&h.client, &h.config, &ua)
        .await
        .unwrap();

    let page = h
        .fetcher
        .fetch_page(&subdomain_task("example.com"), 2)
        .await
        .unwrap();
    assert_eq!(
        page.payload.hostnames(),
        vec!["a.example.com", "b.example.com"]
    );
    assert_eq!(page.payload.total_pages(), Some(3));
}

#[tokio::test]
async fn http_401_triggers_reload_and_retry() {
    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    // First request to the page gets a 401; the fetcher reloads the
    // credential, revalidates, and retries the same page.
    Mock::given(method("GET"))
        .and(path(api_path("example.com")))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api_path("example.com")))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&["a.example.com"], 1)))
        .mount(&server)
        .await;

    let h = harness(&server).await;
    let ua = h.identity.user_agent();
    h.session
        .initialize(&h.client, &h.config, &ua)
        .await
        .unwrap();

    let page = h
        .fetcher
        .fetch_page(&subdomain_task("example.com"), 1)
        .await
        .unwrap();
    assert_eq!(page.payload.hostnames(), vec!["a.example.com"]);
}

#[tokio::test]
async fn embedded_expiry_marker_triggers_reload_and_retry() {
    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    // Expiry arrives inside an otherwise-200 body.
    Mock::given(method("GET"))
        .and(path(api_path("example.com")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pageProps": {"apexDomainData": {"status": 401, "error": "session_expired"}}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api_path("example.com")))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&["a.example.com"], 1)))
        .mount(&server)
        .await;

    let h = harness(&server).await;
    let ua = h.identity.user_agent();
    h.session
        .initialize(&h.client, &h.config, &ua)
        .await
        .unwrap();

    let page = h
        .fetcher
        .fetch_page(&subdomain_task("example.com"), 1)
        .await
        .unwrap();
    assert_eq!(page.payload.hostnames(), vec!["a.example.com"]);
}

#[tokio::test]
async fn initialize_fails_on_rejected_probe() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(api_path(PROBE_DOMAIN)))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let h = harness(&server).await;
    let ua = h.identity.user_agent();
    assert!(h
        .session
        .initialize(&h.client, &h.config, &ua)
        .await
        .is_err());
}

#[tokio::test]
async fn transport_failure_exhausts_retry_budget() {
    // A port with nothing listening: connections are refused.
    let dead_port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    let h = harness(&server).await;
    let ua = h.identity.user_agent();
    h.session
        .initialize(&h.client, &h.config, &ua)
        .await
        .unwrap();

    // Same session, but the page fetcher points at the dead endpoint.
    let dead_config = Arc::new(HarvestConfig {
        base_url: format!("http://127.0.0.1:{}", dead_port),
        ..test_config(&server.uri())
    });
    let fetcher = PageFetcher::new(
        h.client.clone(),
        dead_config,
        Arc::clone(&h.session),
        Arc::clone(&h.identity),
    );

    let err = fetcher
        .fetch_page(&subdomain_task("example.com"), 1)
        .await
        .unwrap_err();
    match err {
        FetchError::Transport { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("expected transport failure, got {:?}", other),
    }
}

#[tokio::test]
async fn full_run_collects_unique_records_across_pages() {
    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    // Two pages with one overlapping hostname.
    Mock::given(method("GET"))
        .and(path(api_path("example.com")))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_body(&["a.example.com", "b.example.com"], 2)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api_path("example.com")))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_body(&["b.example.com", "c.example.com"], 2)),
        )
        .mount(&server)
        .await;

    let cookies = cookie_file();
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("results.txt");
    let archive = dir.path().join("failed");
    std::fs::create_dir_all(&archive).unwrap();

    let ctx = Arc::new(
        AppContext::new(
            test_config(&server.uri()),
            cookies.path().to_path_buf(),
            output.clone(),
            archive.clone(),
        )
        .unwrap(),
    );

    let ua = ctx.identity.user_agent();
    ctx.session
        .initialize(&ctx.client, &ctx.config, &ua)
        .await
        .unwrap();

    let tasks = build_tasks(ResourceKind::Subdomain, &["example.com".to_string()], &[]);
    let scheduler = TaskScheduler::new(
        Arc::clone(&ctx),
        1,
        3,
        Arc::new(AtomicBool::new(false)),
    );
    let summary = scheduler.run(tasks).await;

    assert_eq!(summary.successful_tasks, 1);
    assert_eq!(summary.failed_tasks, 0);

    let mut lines: Vec<String> = std::fs::read_to_string(&output)
        .unwrap()
        .lines()
        .map(String::from)
        .collect();
    let total = lines.len();
    lines.sort();
    lines.dedup();
    assert_eq!(lines.len(), total, "output contains no duplicates");
    assert_eq!(lines, vec!["a.example.com", "b.example.com", "c.example.com"]);

    // Nothing failed, nothing archived.
    assert!(std::fs::read_dir(&archive).unwrap().next().is_none());
}

async fn run_context(
    server: &MockServer,
    dir: &TempDir,
    cookies: &NamedTempFile,
) -> Arc<AppContext> {
    let ctx = Arc::new(
        AppContext::new(
            test_config(&server.uri()),
            cookies.path().to_path_buf(),
            dir.path().join("results.txt"),
            dir.path().join("failed"),
        )
        .unwrap(),
    );
    let ua = ctx.identity.user_agent();
    ctx.session
        .initialize(&ctx.client, &ctx.config, &ua)
        .await
        .unwrap();
    ctx
}

#[tokio::test]
async fn unrecoverable_unauthorized_fails_task_and_worker_continues() {
    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    // One resource is rejected on every request even though the credential
    // still validates; the reload/retry path runs out and the task fails.
    Mock::given(method("GET"))
        .and(path(api_path("bad.example.com")))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api_path("good.example.com")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page_body(&["x.good.example.com"], 1)),
        )
        .mount(&server)
        .await;

    let cookies = cookie_file();
    let dir = TempDir::new().unwrap();
    let ctx = run_context(&server, &dir, &cookies).await;

    let tasks = build_tasks(
        ResourceKind::Subdomain,
        &["bad.example.com".to_string(), "good.example.com".to_string()],
        &[],
    );
    let scheduler = TaskScheduler::new(
        Arc::clone(&ctx),
        1,
        2,
        Arc::new(AtomicBool::new(false)),
    );
    let summary = scheduler.run(tasks).await;

    // Failure stays local to the bad task; the same worker finishes the
    // healthy one.
    assert_eq!(summary.failed_tasks, 1);
    assert_eq!(summary.successful_tasks, 1);

    let lines: Vec<String> = std::fs::read_to_string(dir.path().join("results.txt"))
        .unwrap()
        .lines()
        .map(String::from)
        .collect();
    assert_eq!(lines, vec!["x.good.example.com"]);
}

#[tokio::test]
async fn shutdown_before_run_fetches_nothing() {
    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    let cookies = cookie_file();
    let dir = TempDir::new().unwrap();
    let ctx = run_context(&server, &dir, &cookies).await;

    let tasks = build_tasks(ResourceKind::Subdomain, &["example.com".to_string()], &[]);
    let scheduler = TaskScheduler::new(
        Arc::clone(&ctx),
        1,
        2,
        Arc::new(AtomicBool::new(true)),
    );
    let summary = scheduler.run(tasks).await;

    assert_eq!(summary.successful_tasks, 0);
    assert_eq!(summary.failed_tasks, 0);

    // Only the startup validation probe ever reached the provider.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn shutdown_during_fan_out_skips_remaining_pages() {
    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    Mock::given(method("GET"))
        .and(path(api_path("example.com")))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&["a.example.com"], 4)))
        .mount(&server)
        .await;
    // Page 2 is slow; the interrupt arrives while it is in flight.
    Mock::given(method("GET"))
        .and(path(api_path("example.com")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_body(&["b.example.com"], 4))
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;

    let cookies = cookie_file();
    let dir = TempDir::new().unwrap();
    let ctx = run_context(&server, &dir, &cookies).await;

    let tasks = build_tasks(ResourceKind::Subdomain, &["example.com".to_string()], &[]);
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        flag.store(true, Ordering::Relaxed);
    });

    // One page permit: pages 3 and 4 only get their turn after the flag is
    // set, and must not hit the network.
    let scheduler = TaskScheduler::new(Arc::clone(&ctx), 1, 1, shutdown);
    let summary = scheduler.run(tasks).await;
    assert_eq!(summary.successful_tasks, 1);

    let requests = server.received_requests().await.unwrap();
    let late_pages = requests
        .iter()
        .filter(|r| {
            r.url
                .query_pairs()
                .any(|(k, v)| k == "page" && (v == "3" || v == "4"))
        })
        .count();
    assert_eq!(late_pages, 0, "pages after the interrupt were still fetched");
}
