use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;

use crate::app::AppContext;
use crate::cli::Cli;
use crate::config::HarvestConfig;
use crate::domain::build_tasks;
use crate::scheduler::{partition_tasks, TaskScheduler};

/// Read one entry per line, skipping blanks and '#' comments.
fn load_list_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read list file '{}'", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}

fn gather(inline: &[String], file: Option<&Path>) -> anyhow::Result<Vec<String>> {
    let mut values: Vec<String> = inline.to_vec();
    if let Some(path) = file {
        values.extend(load_list_file(path)?);
    }
    let mut seen = std::collections::HashSet::new();
    values.retain(|v| seen.insert(v.clone()));
    Ok(values)
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = HarvestConfig::load(cli.config.as_deref())?;

    let resources = gather(&cli.resources, cli.resources_file.as_deref())?;
    if resources.is_empty() {
        anyhow::bail!("no resources given; use --resources or --resources-file");
    }
    let search_terms = gather(&cli.search_terms, cli.search_terms_file.as_deref())?;

    let tasks = build_tasks(cli.kind, &resources, &search_terms);
    tracing::info!(
        "{} task(s) from {} resource(s) and {} search term(s)",
        tasks.len(),
        resources.len(),
        search_terms.len()
    );

    let ctx = Arc::new(AppContext::new(
        config,
        cli.cookies.clone(),
        cli.output.clone(),
        cli.archive_dir.clone(),
    )?);

    // The only process-fatal error: without a working credential there is
    // nothing to do.
    let user_agent = ctx.identity.user_agent();
    ctx.session
        .initialize(&ctx.client, &ctx.config, &user_agent)
        .await
        .context("session initialization failed")?;
    tracing::info!("session validated against {}", ctx.config.base_url);

    print_distribution(tasks.len(), cli.workers, cli.threads);
    for (worker_id, partition) in partition_tasks(tasks.clone(), cli.workers)
        .iter()
        .enumerate()
    {
        if partition.is_empty() {
            continue;
        }
        let preview: Vec<String> = partition.iter().take(3).map(|t| t.describe()).collect();
        let suffix = if partition.len() > 3 { ", ..." } else { "" };
        println!(
            "  worker {:>2}: {} task(s) [{}{}]",
            worker_id,
            partition.len(),
            preview.join(", "),
            suffix
        );
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_handler(Arc::clone(&shutdown));

    let scheduler = TaskScheduler::new(
        Arc::clone(&ctx),
        cli.workers,
        cli.threads,
        Arc::clone(&shutdown),
    );
    let started = std::time::Instant::now();
    let summary = scheduler.run(tasks).await;

    println!();
    println!("Run complete in {:.1}s:", started.elapsed().as_secs_f64());
    println!("  tasks ok:      {}", summary.successful_tasks);
    println!("  tasks failed:  {}", summary.failed_tasks);
    println!("  new records:   {}", ctx.aggregator.new_this_run());
    println!(
        "  output:        {} ({} total records)",
        ctx.aggregator.output_path().display(),
        ctx.aggregator.persisted_len()
    );
    if shutdown.load(Ordering::Relaxed) {
        println!("  (interrupted; collected records were flushed)");
    }

    Ok(())
}

fn print_distribution(task_count: usize, workers: usize, threads: usize) {
    println!(
        "Distributing {} task(s) across {} worker(s), {} page fetch(es) each:",
        task_count, workers, threads
    );
}

/// First signal requests a graceful stop at the next task boundary; the
/// in-flight pages finish and everything collected gets flushed.
fn spawn_signal_handler(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!("failed to install SIGTERM handler: {}", e);
                    return;
                }
            };
            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!("failed to install SIGINT handler: {}", e);
                    return;
                }
            };
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM, finishing current tasks"),
                _ = sigint.recv() => tracing::info!("received SIGINT, finishing current tasks"),
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to wait for ctrl-c: {}", e);
                return;
            }
            tracing::info!("received ctrl-c, finishing current tasks");
        }

        shutdown.store(true, Ordering::Relaxed);
    });
}
