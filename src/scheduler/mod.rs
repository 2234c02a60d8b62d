//! Two-level work scheduling: tasks are partitioned round-robin across
//! long-lived workers, and each worker fans the pages of its current task
//! out to a bounded set of concurrent page fetches.
//!
//! A worker handles one task at a time, so task-level failures stay
//! isolated, while page-level parallelism keeps the connection busy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use crate::app::AppContext;
use crate::domain::{PageResult, Task};

/// Round-robin partition: task `i` goes to worker `i % workers`. Workers
/// receive near-equal shares and the mapping is stable for a given input
/// order.
pub fn partition_tasks(tasks: Vec<Task>, workers: usize) -> Vec<Vec<Task>> {
    assert!(workers > 0, "at least one worker is required");
    let mut partitions: Vec<Vec<Task>> = (0..workers).map(|_| Vec::new()).collect();
    for (i, task) in tasks.into_iter().enumerate() {
        partitions[i % workers].push(task);
    }
    partitions
}

#[derive(Debug)]
pub struct WorkerSummary {
    pub worker_id: usize,
    pub successful_tasks: usize,
    pub failed_tasks: usize,
    pub elapsed: Duration,
}

/// Totals across all workers for the end-of-run report.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub successful_tasks: usize,
    pub failed_tasks: usize,
}

pub struct TaskScheduler {
    ctx: Arc<AppContext>,
    workers: usize,
    threads_per_worker: usize,
    shutdown: Arc<AtomicBool>,
}

impl TaskScheduler {
    pub fn new(
        ctx: Arc<AppContext>,
        workers: usize,
        threads_per_worker: usize,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            ctx,
            workers,
            threads_per_worker,
            shutdown,
        }
    }

    /// Run the full task list to completion (or until shutdown), flushing
    /// collected records on an interval in the background and once more at
    /// the end.
    pub async fn run(&self, tasks: Vec<Task>) -> RunSummary {
        let partitions = partition_tasks(tasks, self.workers);

        let flush_loop = {
            let ctx = Arc::clone(&self.ctx);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(ctx.config.flush_interval());
                // The first tick fires immediately; nothing to flush yet.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    match ctx.aggregator.flush() {
                        Ok(0) => {}
                        Ok(n) => tracing::info!("flushed {} new record(s)", n),
                        Err(e) => tracing::warn!("periodic flush failed: {}", e),
                    }
                }
            })
        };

        let mut handles = Vec::with_capacity(self.workers);
        for (worker_id, partition) in partitions.into_iter().enumerate() {
            if partition.is_empty() {
                continue;
            }
            let ctx = Arc::clone(&self.ctx);
            let shutdown = Arc::clone(&self.shutdown);
            let threads = self.threads_per_worker;
            handles.push(tokio::spawn(async move {
                run_worker(ctx, worker_id, partition, threads, shutdown).await
            }));
        }

        let mut summary = RunSummary::default();
        for handle in handles {
            match handle.await {
                Ok(worker) => {
                    tracing::info!(
                        "worker {} finished: {} ok, {} failed in {:.1}s",
                        worker.worker_id,
                        worker.successful_tasks,
                        worker.failed_tasks,
                        worker.elapsed.as_secs_f64()
                    );
                    summary.successful_tasks += worker.successful_tasks;
                    summary.failed_tasks += worker.failed_tasks;
                }
                Err(e) => {
                    tracing::error!("worker task panicked: {}", e);
                }
            }
        }

        flush_loop.abort();

        match self.ctx.aggregator.flush() {
            Ok(n) if n > 0 => tracing::info!("final flush wrote {} record(s)", n),
            Ok(_) => {}
            Err(e) => tracing::error!("final flush failed: {}", e),
        }

        summary
    }
}

async fn run_worker(
    ctx: Arc<AppContext>,
    worker_id: usize,
    tasks: Vec<Task>,
    threads: usize,
    shutdown: Arc<AtomicBool>,
) -> WorkerSummary {
    let started = Instant::now();
    let total = tasks.len();
    let mut successful_tasks = 0;
    let mut failed_tasks = 0;

    for (index, task) in tasks.into_iter().enumerate() {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!(
                "worker {}: shutdown requested, {} task(s) left undone",
                worker_id,
                total - index
            );
            break;
        }

        run_maintenance(&ctx).await;

        tracing::info!(
            "worker {}: task {}/{}: {}",
            worker_id,
            index + 1,
            total,
            task.describe()
        );

        if !ctx.fetcher.ensure_session().await {
            tracing::warn!(
                "worker {}: no valid session, skipping {}",
                worker_id,
                task.describe()
            );
            failed_tasks += 1;
            continue;
        }

        if run_task(&ctx, &task, threads, &shutdown).await {
            successful_tasks += 1;
        } else {
            failed_tasks += 1;
        }
    }

    WorkerSummary {
        worker_id,
        successful_tasks,
        failed_tasks,
        elapsed: started.elapsed(),
    }
}

/// Discover pagination, then fetch the remaining pages concurrently under
/// the per-worker permit budget. Returns false when the task produced
/// nothing usable.
async fn run_task(
    ctx: &Arc<AppContext>,
    task: &Task,
    threads: usize,
    shutdown: &Arc<AtomicBool>,
) -> bool {
    let discovery = match ctx.discoverer.discover(task).await {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!("{}: {}", task.describe(), e);
            return false;
        }
    };

    let first_page_count = discovery.first_page.len();
    let added = ctx.aggregator.absorb(discovery.first_page);
    tracing::debug!(
        "{}: page 1 of {} yielded {} record(s), {} new",
        task.describe(),
        discovery.total_pages,
        first_page_count,
        added
    );

    if discovery.total_pages <= 1 {
        return true;
    }

    let semaphore = Arc::new(Semaphore::new(threads));
    let mut handles = Vec::with_capacity(discovery.total_pages as usize - 1);

    // Shutdown is observed between page iterations too, so an interrupt
    // during a wide fan-out does not wait on every remaining page.
    for page in 2..=discovery.total_pages {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!(
                "{}: shutdown requested, pages {}..={} left unfetched",
                task.describe(),
                page,
                discovery.total_pages
            );
            break;
        }
        let semaphore = Arc::clone(&semaphore);
        let ctx = Arc::clone(ctx);
        let task = task.clone();
        let shutdown = Arc::clone(shutdown);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire()
                .await
                .expect("Semaphore closed unexpectedly");
            if shutdown.load(Ordering::Relaxed) {
                return PageResult {
                    page,
                    records: Vec::new(),
                    success: false,
                };
            }
            match ctx.fetcher.fetch_page(&task, page).await {
                Ok(fetched) => PageResult {
                    page,
                    records: fetched.payload.hostnames(),
                    success: true,
                },
                Err(e) => {
                    tracing::debug!("{}: page {} failed: {}", task.describe(), page, e);
                    PageResult {
                        page,
                        records: Vec::new(),
                        success: false,
                    }
                }
            }
        }));
    }

    let mut pages_ok = 0;
    let mut pages_failed = 0;
    for joined in futures::future::join_all(handles).await {
        match joined {
            Ok(result) => {
                if result.success {
                    pages_ok += 1;
                    ctx.aggregator.absorb(result.records);
                } else {
                    pages_failed += 1;
                }
            }
            Err(e) => {
                tracing::error!("page task panicked: {}", e);
                pages_failed += 1;
            }
        }
    }

    if pages_failed > 0 {
        tracing::warn!(
            "{}: {} of {} follow-up page(s) failed",
            task.describe(),
            pages_failed,
            discovery.total_pages - 1
        );
    }

    // The task counts as failed only when it produced nothing at all: no
    // first-page records and no surviving follow-up page.
    pages_ok > 0 || first_page_count > 0
}

/// Run any due periodic upkeep at a task boundary.
async fn run_maintenance(ctx: &Arc<AppContext>) {
    let due = ctx.maintenance.due();
    if !due.any() {
        return;
    }

    if due.reload_session {
        tracing::info!("maintenance: reloading session credential");
        let user_agent = ctx.identity.user_agent();
        if let Err(e) = ctx
            .session
            .reload_and_validate(&ctx.client, &ctx.config, &user_agent)
            .await
        {
            tracing::warn!("maintenance: session reload failed: {}", e);
        }
    }

    if due.rotate_identity && ctx.identity.rotate() {
        tracing::info!("maintenance: rotated client identity");
    }

    if due.run_hygiene {
        ctx.aggregator.shrink();
        tracing::debug!("maintenance: memory hygiene pass complete");
    }
}
