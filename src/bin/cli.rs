//! Admin CLI surface (spec §6): `retryFailedJobs`, `cancelJob`,
//! `purgeOldJobs`, `getQueueStats`, `getQueueHealth`. Mirrors the teacher's
//! `migrate_cli` shape (clap subcommands, JSON responses on stdout) so the
//! output can be parsed by whatever drives this binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pipeline_queue::config::Config;
use pipeline_queue::store::postgres::PgStore;
use pipeline_queue::store::{RetryMode, Store};
use serde::Serialize;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pipeline-cli")]
#[command(about = "Admin surface for the queue + worker runtime")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cancel a pending job (no-op if it is already running or terminal).
    CancelJob { id: Uuid },

    /// Delete completed/cancelled jobs older than `days`.
    PurgeOldJobs {
        #[arg(default_value_t = 30)]
        days: i64,
    },

    /// Requeue failed jobs matching the given retry mode.
    RetryFailedJobs {
        #[arg(long, default_value_t = 100)]
        limit: i64,
        #[arg(long, value_enum, default_value_t = RetryModeArg::All)]
        mode: RetryModeArg,
        #[arg(long)]
        min_failed_age_ms: Option<i64>,
    },

    /// Requeue only failures that look transient (rate limit, timeout, ...).
    RetryTransientFailedJobs {
        #[arg(default_value_t = 100)]
        limit: i64,
    },

    /// Print queue status counts.
    QueueStats,

    /// Print the extended queue health snapshot.
    QueueHealth,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum RetryModeArg {
    All,
    Transient,
}

impl From<RetryModeArg> for RetryMode {
    fn from(value: RetryModeArg) -> Self {
        match value {
            RetryModeArg::All => RetryMode::All,
            RetryModeArg::Transient => RetryMode::Transient,
        }
    }
}

#[derive(Serialize)]
struct Response {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cancelled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<pipeline_queue::store::QueueStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    health: Option<QueueHealthResponse>,
}

#[derive(Serialize)]
struct QueueHealthResponse {
    pending: i64,
    processing: i64,
    completed: i64,
    failed: i64,
    cancelled: i64,
    oldest_pending_age_ms: Option<i64>,
    avg_processing_time_ms: Option<f64>,
    throughput_per_hour: f64,
    error_rate_24h: f64,
    latest_started_at: Option<chrono::DateTime<chrono::Utc>>,
    latest_completed_at: Option<chrono::DateTime<chrono::Utc>>,
    latest_queued_at: Option<chrono::DateTime<chrono::Utc>>,
    latest_worker_activity_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn print_response(response: Response) {
    println!("{}", serde_json::to_string_pretty(&response).expect("Response is always serializable"));
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env();

    let store = PgStore::connect(&config.database_url)
        .await
        .context("failed to connect to the queue store")?;

    match cli.command {
        Commands::CancelJob { id } => {
            let cancelled = store.cancel_job(id).await?;
            print_response(Response {
                success: true,
                message: None,
                count: None,
                cancelled: Some(cancelled),
                stats: None,
                health: None,
            });
        }
        Commands::PurgeOldJobs { days } => {
            let count = store.purge_old_jobs(days).await?;
            print_response(Response {
                success: true,
                message: Some(format!("purged jobs older than {days} days")),
                count: Some(count),
                cancelled: None,
                stats: None,
                health: None,
            });
        }
        Commands::RetryFailedJobs { limit, mode, min_failed_age_ms } => {
            let min_age = Config::clamp_min_failed_age_ms(min_failed_age_ms);
            let count = store.retry_failed_jobs(limit, mode.into(), min_age).await?;
            print_response(Response {
                success: true,
                message: None,
                count: Some(count),
                cancelled: None,
                stats: None,
                health: None,
            });
        }
        Commands::RetryTransientFailedJobs { limit } => {
            let min_age = Config::clamp_min_failed_age_ms(None);
            let count = store.retry_failed_jobs(limit, RetryMode::Transient, min_age).await?;
            print_response(Response {
                success: true,
                message: None,
                count: Some(count),
                cancelled: None,
                stats: None,
                health: None,
            });
        }
        Commands::QueueStats => {
            let stats = store.queue_stats().await?;
            print_response(Response {
                success: true,
                message: None,
                count: None,
                cancelled: None,
                stats: Some(stats),
                health: None,
            });
        }
        Commands::QueueHealth => {
            let health = store.queue_health().await?;
            print_response(Response {
                success: true,
                message: None,
                count: None,
                cancelled: None,
                stats: None,
                health: Some(QueueHealthResponse {
                    pending: health.stats.pending,
                    processing: health.stats.processing,
                    completed: health.stats.completed,
                    failed: health.stats.failed,
                    cancelled: health.stats.cancelled,
                    oldest_pending_age_ms: health.oldest_pending_age_ms,
                    avg_processing_time_ms: health.avg_processing_time_ms,
                    throughput_per_hour: health.throughput_per_hour,
                    error_rate_24h: health.error_rate_24h,
                    latest_started_at: health.latest_started_at,
                    latest_completed_at: health.latest_completed_at,
                    latest_queued_at: health.latest_queued_at,
                    latest_worker_activity_at: health.latest_worker_activity_at,
                }),
            });
        }
    }

    Ok(())
}
