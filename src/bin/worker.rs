//! Worker process entrypoint (spec §4.9 C10, §6 `runWorkerContinuously`).
//!
//! Boots the store, registers every handler named in spec §4 (pipeline
//! stages, growth channels, acquisition underwriting, maintenance), and
//! runs the crash-resilient supervisor loop until a termination signal
//! asks it to drain and stop.

use std::sync::Arc;

use anyhow::{Context, Result};
use pipeline_queue::collab::unconfigured::Unconfigured;
use pipeline_queue::config::Config;
use pipeline_queue::executor::{ActiveJobTracker, JobExecutor};
use pipeline_queue::growth::register_growth_handlers;
use pipeline_queue::handlers::register_pipeline_handlers;
use pipeline_queue::maintenance::{register_maintenance_handlers, MaintenanceTick, NoopMaintenanceSweeps};
use pipeline_queue::scheduler::check_content_schedule;
use pipeline_queue::store::postgres::PgStore;
use pipeline_queue::store::Store;
use pipeline_queue::underwriting::register_underwriting_handlers;
use pipeline_queue::worker::{request_stop_and_drain, run_periodic_sweeps_once, run_worker_continuously, WorkerState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pipeline_queue=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    dotenvy::dotenv().ok();
    let config = Arc::new(Config::from_env());

    if config.test_mode || config.disable_queue_worker {
        tracing::info!("worker start skipped: NODE_ENV=test or DISABLE_SERVER_QUEUE_WORKER set");
        return Ok(());
    }

    tracing::info!("connecting to store");
    let store: Arc<dyn Store> = Arc::new(
        PgStore::connect(&config.database_url)
            .await
            .context("failed to connect to the queue store")?
            .with_lease_duration_ms(config.job_lease_duration.as_millis() as i64),
    );

    let tracker = Arc::new(ActiveJobTracker::new());
    let mut executor = JobExecutor::new(store.clone(), tracker.clone())
        .with_timeout(config.job_default_timeout);

    // Every collaborator defaults to `Unconfigured`: the worker boots and
    // drains maintenance/queue-admin jobs without a panic, but any job
    // that actually reaches an AI/channel/evaluator call fails with a
    // clear "not configured" error until a real integration is injected
    // in its place (spec §1: those integrations are out of scope here).
    let unconfigured: Arc<Unconfigured> = Arc::new(Unconfigured);

    register_pipeline_handlers(
        &mut executor,
        unconfigured.clone(),
        unconfigured.clone(),
        unconfigured.clone(),
        config.ai_review_fallback_enabled,
    );
    register_growth_handlers(
        &mut executor,
        unconfigured.clone(),
        unconfigured.clone(),
        unconfigured.clone(),
        unconfigured.clone(),
        unconfigured.clone(),
        unconfigured.clone(),
        config.clone(),
    );
    register_underwriting_handlers(&mut executor, unconfigured.clone(), unconfigured.clone());
    register_maintenance_handlers(&mut executor, unconfigured.clone());

    let executor = Arc::new(executor);
    let state = Arc::new(WorkerState::new());
    state.handlers_registered.store(true, std::sync::atomic::Ordering::SeqCst);

    let maintenance = MaintenanceTick::new(store.clone(), Arc::new(NoopMaintenanceSweeps), config.clone());
    run_periodic_sweeps_once(store.as_ref(), &maintenance).await;

    let hourly_store = store.clone();
    let hourly_maintenance_store = store.clone();
    let hourly_config = config.clone();
    tokio::spawn(async move {
        let maintenance = MaintenanceTick::new(hourly_maintenance_store, Arc::new(NoopMaintenanceSweeps), hourly_config);
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3600));
        ticker.tick().await; // first tick fires immediately; already ran above
        loop {
            ticker.tick().await;
            if let Err(e) = check_content_schedule(hourly_store.as_ref()).await {
                tracing::error!(error = %e, "content scheduler tick failed");
            }
            maintenance.run_once().await;
        }
    });

    let run_handle = tokio::spawn(run_worker_continuously(
        store.clone(),
        executor.clone(),
        config.clone(),
        state.clone(),
    ));

    wait_for_termination_signal().await;
    tracing::info!("termination signal received, draining in-flight jobs");
    request_stop_and_drain(&state, &tracker, &config).await;
    let _ = run_handle.await;

    tracing::info!("worker stopped cleanly");
    Ok(())
}

/// Wait for the first SIGTERM/SIGINT (spec §4.9 signal handling).
#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
