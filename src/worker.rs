//! Worker bootstrap and crash-loop supervisor (spec §4.9, C10), grounded on
//! the teacher's `JobRunner` (`kernel/jobs/runner.rs`): poll, claim, execute,
//! repeat, with a shutdown flag the process can flip and a drain wait that
//! lets in-flight handlers finish.
//!
//! Unlike the teacher's single-shot `JobRunner`, this crate's worker must
//! also survive and restart its own poll loop across panics/crashes (spec
//! §4.9 "if the poll loop itself throws, ... the worker restarts itself
//! with backoff, up to 5 times within a 5 minute window").

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::executor::{recover_stale_locks, ActiveJobTracker, JobExecutor};
use crate::maintenance::MaintenanceTick;
use crate::scheduler::check_content_schedule;
use crate::store::Store;

const CRASH_WINDOW: chrono::Duration = chrono::Duration::minutes(5);
const MAX_CRASHES_IN_WINDOW: u32 = 5;
const CRASH_BACKOFF_BASE_SECS: u64 = 2;
const CRASH_BACKOFF_CAP_SECS: u64 = 60;

/// Runtime state the worker exposes to health checks and the admin CLI
/// (spec §6 `getWorkerHealth`, `restartWorkerIfDead`).
pub struct WorkerState {
    pub started: AtomicBool,
    pub shutting_down: AtomicBool,
    pub handlers_registered: AtomicBool,
    last_heartbeat: Mutex<Option<DateTime<Utc>>>,
    started_at: Mutex<Option<DateTime<Utc>>>,
    crash_count: AtomicI64,
    last_crash_at: Mutex<Option<DateTime<Utc>>>,
    stop_requested: AtomicBool,
}

impl Default for WorkerState {
    fn default() -> Self {
        Self {
            started: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            handlers_registered: AtomicBool::new(false),
            last_heartbeat: Mutex::new(None),
            started_at: Mutex::new(None),
            crash_count: AtomicI64::new(0),
            last_crash_at: Mutex::new(None),
            stop_requested: AtomicBool::new(false),
        }
    }
}

impl WorkerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    fn should_stop(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn is_alive(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.shutting_down.load(Ordering::SeqCst)
    }

    pub async fn heartbeat_age(&self) -> Option<chrono::Duration> {
        self.last_heartbeat.lock().await.map(|t| Utc::now() - t)
    }

    async fn touch_heartbeat(&self) {
        *self.last_heartbeat.lock().await = Some(Utc::now());
    }
}

/// A snapshot of `getWorkerHealth()` (spec §6).
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkerHealth {
    pub started: bool,
    pub shutting_down: bool,
    pub crash_count: i64,
    pub heartbeat_age_secs: Option<i64>,
}

pub async fn worker_health(state: &WorkerState) -> WorkerHealth {
    WorkerHealth {
        started: state.started.load(Ordering::SeqCst),
        shutting_down: state.shutting_down.load(Ordering::SeqCst),
        crash_count: state.crash_count.load(Ordering::SeqCst),
        heartbeat_age_secs: state.heartbeat_age().await.map(|d| d.num_seconds()),
    }
}

/// One poll/claim/execute cycle (spec §4.9 step inside the loop): recover
/// stale locks, run the content scheduler and maintenance tick opportunistically,
/// claim a batch, and hand each job to the executor.
async fn run_worker_once(
    store: &dyn Store,
    executor: &JobExecutor,
    config: &Config,
    state: &WorkerState,
) -> anyhow::Result<()> {
    recover_stale_locks(store).await?;

    let jobs = store.acquire(config.queue_batch_size, None).await?;
    if jobs.is_empty() {
        tokio::time::sleep(config.queue_poll_interval).await;
        return Ok(());
    }

    info!(count = jobs.len(), "claimed jobs");
    for job in jobs {
        if state.should_stop() {
            break;
        }
        executor.process(job).await;
    }

    Ok(())
}

/// Run the poll loop until `state.request_stop()` is called, restarting
/// itself on panic with the crash-loop backoff in spec §4.9.
pub async fn run_worker_continuously(
    store: Arc<dyn Store>,
    executor: Arc<JobExecutor>,
    config: Arc<Config>,
    state: Arc<WorkerState>,
) {
    if config.test_mode || config.disable_queue_worker {
        info!("worker start skipped: test_mode or disable_queue_worker set");
        return;
    }

    state.started.store(true, Ordering::SeqCst);
    *state.started_at.lock().await = Some(Utc::now());
    info!("worker starting");

    loop {
        if state.should_stop() {
            break;
        }

        let loop_store = store.clone();
        let loop_executor = executor.clone();
        let loop_config = config.clone();
        let loop_state = state.clone();

        let result = tokio::spawn(async move {
            loop {
                if loop_state.should_stop() {
                    return Ok::<(), anyhow::Error>(());
                }
                loop_state.touch_heartbeat().await;
                run_worker_once(loop_store.as_ref(), &loop_executor, &loop_config, &loop_state).await?;
            }
        })
        .await;

        match result {
            Ok(Ok(())) => break,
            Ok(Err(e)) => {
                error!(error = %e, "worker poll loop returned an error");
            }
            Err(join_err) => {
                error!(error = %join_err, "worker poll loop panicked");
            }
        }

        if state.should_stop() {
            break;
        }

        if !record_crash_and_check_giveup(&state).await {
            error!("worker crash-looped 5 times within 5 minutes, giving up");
            state.shutting_down.store(true, Ordering::SeqCst);
            break;
        }

        let crash_count = state.crash_count.load(Ordering::SeqCst).max(1) as u32;
        let backoff = crash_backoff(crash_count);
        warn!(crash_count, backoff_secs = backoff.as_secs(), "restarting worker after crash");
        tokio::time::sleep(backoff).await;
    }

    state.started.store(false, Ordering::SeqCst);
    info!("worker stopped");
}

/// Reset the crash counter if the last crash fell outside the 5-minute
/// window, then increment it; returns `false` once the count exceeds the
/// allowed restarts within the window (spec §4.9).
async fn record_crash_and_check_giveup(state: &WorkerState) -> bool {
    let now = Utc::now();
    let mut last_crash_at = state.last_crash_at.lock().await;

    let reset = match *last_crash_at {
        Some(prev) => now - prev > CRASH_WINDOW,
        None => true,
    };
    if reset {
        state.crash_count.store(0, Ordering::SeqCst);
    }

    *last_crash_at = Some(now);
    let count = state.crash_count.fetch_add(1, Ordering::SeqCst) + 1;
    count <= MAX_CRASHES_IN_WINDOW as i64
}

fn crash_backoff(crash_count: u32) -> StdDuration {
    let secs = CRASH_BACKOFF_BASE_SECS.saturating_mul(2u64.saturating_pow(crash_count.saturating_sub(1)));
    StdDuration::from_secs(secs.min(CRASH_BACKOFF_CAP_SECS))
}

/// `restartWorkerIfDead()` (spec §6): if the worker isn't running and hasn't
/// given up permanently, clear its stop flag and relaunch it.
pub fn restart_worker_if_dead(
    store: Arc<dyn Store>,
    executor: Arc<JobExecutor>,
    config: Arc<Config>,
    state: Arc<WorkerState>,
) -> bool {
    if state.is_alive() {
        return false;
    }
    state.stop_requested.store(false, Ordering::SeqCst);
    state.shutting_down.store(false, Ordering::SeqCst);
    tokio::spawn(run_worker_continuously(store, executor, config, state));
    true
}

/// Request a graceful stop and wait up to `config.worker_shutdown_grace`
/// for in-flight handlers to finish draining (spec §4.9 SIGTERM handling).
pub async fn request_stop_and_drain(state: &WorkerState, tracker: &ActiveJobTracker, config: &Config) {
    state.shutting_down.store(true, Ordering::SeqCst);
    state.request_stop();
    tracker.wait_for_idle(config.worker_shutdown_grace).await;
}

/// Run the content scheduler and maintenance tick once, suitable for
/// invoking at worker startup and then on their own periodic timers (spec
/// §4.7, §4.8: "At worker startup and then hourly").
pub async fn run_periodic_sweeps_once(store: &dyn Store, maintenance: &MaintenanceTick) {
    if let Err(e) = check_content_schedule(store).await {
        error!(error = %e, "content scheduler tick failed");
    }
    maintenance.run_once().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crash_backoff_grows_and_caps() {
        assert_eq!(crash_backoff(1), StdDuration::from_secs(2));
        assert_eq!(crash_backoff(2), StdDuration::from_secs(4));
        assert_eq!(crash_backoff(6), StdDuration::from_secs(60));
    }

    #[tokio::test]
    async fn crash_count_resets_outside_window() {
        let state = WorkerState::new();
        *state.last_crash_at.lock().await = Some(Utc::now() - chrono::Duration::minutes(10));
        state.crash_count.store(4, Ordering::SeqCst);

        let ok = record_crash_and_check_giveup(&state).await;
        assert!(ok);
        assert_eq!(state.crash_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn giveup_after_five_crashes_in_window() {
        let state = WorkerState::new();
        for _ in 0..5 {
            assert!(record_crash_and_check_giveup(&state).await);
        }
        assert!(!record_crash_and_check_giveup(&state).await);
    }
}
