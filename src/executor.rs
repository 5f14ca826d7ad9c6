//! Job executor (spec §4.3 C4): routes a claimed job by `jobType` to a
//! handler, enforces a timeout, classifies failures, and retries or
//! dead-letters.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{Job, JobStatus};
use crate::retry::{backoff_duration, classify, FailureClass};
use crate::store::Store;

/// A registered handler for one `jobType` (spec §4.4 "Every handler follows
/// the same shape"). Handlers return the successor job type they enqueued,
/// if any, purely for logging -- the enqueue itself already happened by the
/// time `execute` returns (spec §8: "each handler enqueues its successor
/// before its own completed write is externally observed").
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job, store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>>;
}

/// Tracks in-flight handler executions so graceful shutdown can wait for
/// drain (spec §4.3 step 7, §4.9).
#[derive(Default)]
pub struct ActiveJobTracker {
    count: AtomicI64,
    idle: Notify,
}

impl ActiveJobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_count(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }

    fn increment(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Wait until the active count reaches zero, or `timeout` elapses.
    pub async fn wait_for_idle(&self, timeout: Duration) {
        if self.active_count() == 0 {
            return;
        }
        let _ = tokio::time::timeout(timeout, self.idle.notified()).await;
    }
}

pub struct JobExecutor {
    store: Arc<dyn Store>,
    handlers: std::collections::HashMap<String, Arc<dyn JobHandler>>,
    tracker: Arc<ActiveJobTracker>,
    handler_timeout: Duration,
}

impl JobExecutor {
    pub fn new(store: Arc<dyn Store>, tracker: Arc<ActiveJobTracker>) -> Self {
        Self {
            store,
            handlers: std::collections::HashMap::new(),
            tracker,
            handler_timeout: Duration::from_secs(600),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn register(&mut self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type.into(), handler);
    }

    /// Process one claimed job to completion (spec §4.3).
    pub async fn process(&self, job: Job) {
        self.tracker.increment();
        let outcome = self.process_inner(&job).await;
        if let Err(e) = outcome {
            error!(job_id = %job.id, error = %e, "unexpected error while finalizing job outcome");
        }
        self.tracker.decrement();
    }

    async fn process_inner(&self, job: &Job) -> anyhow::Result<()> {
        let Some(handler) = self.handlers.get(&job.job_type).cloned() else {
            warn!(job_id = %job.id, job_type = %job.job_type, "no handler registered for job type");
            let failure = FailureClass {
                category: crate::retry::FailureCategory::MissingEntity,
                confidence: 1.0,
                retryable: false,
                human_readable: format!("no handler registered for job type '{}'", job.job_type),
                suggested_action: "register a handler or cancel the job".to_string(),
                extracted_details: None,
            };
            self.finalize_failure(job, &failure).await?;
            return Ok(());
        };

        self.store
            .update_promotion_job_status(job.id, crate::models::PromotionJobStatus::Running)
            .await?;

        let store = self.store.clone();
        let job_clone = job.clone();
        let handler_fut = async move { handler.handle(&job_clone, store.as_ref()).await };

        let result = tokio::time::timeout(self.handler_timeout, handler_fut).await;

        match result {
            Ok(Ok(result_payload)) => {
                info!(job_id = %job.id, job_type = %job.job_type, "job succeeded");
                self.store.mark_completed(job.id, result_payload).await?;
                self.store
                    .update_promotion_job_status(job.id, crate::models::PromotionJobStatus::Completed)
                    .await?;
            }
            Ok(Err(e)) => {
                warn!(job_id = %job.id, job_type = %job.job_type, error = %e, "job failed");
                let failure = classify(&e);
                self.finalize_failure(job, &failure).await?;
            }
            Err(_elapsed) => {
                warn!(job_id = %job.id, job_type = %job.job_type, "job timed out");
                let failure = FailureClass {
                    category: crate::retry::FailureCategory::Timeout,
                    confidence: 1.0,
                    retryable: true,
                    human_readable: "handler execution exceeded the configured timeout".to_string(),
                    suggested_action: "retry; consider raising the timeout".to_string(),
                    extracted_details: None,
                };
                self.finalize_failure(job, &failure).await?;
            }
        }

        Ok(())
    }

    async fn finalize_failure(&self, job: &Job, failure: &FailureClass) -> anyhow::Result<()> {
        let attempts = job.attempts + 1;
        let result_payload = serde_json::json!({ "failure": failure });

        if !failure.retryable || attempts >= job.max_attempts {
            self.store
                .mark_failed_terminal(job.id, &failure.human_readable, result_payload)
                .await?;
            self.store
                .update_promotion_job_status(job.id, crate::models::PromotionJobStatus::Failed)
                .await?;
            if let Some(article_id) = job.article_id {
                self.store.reset_article_to_draft(article_id).await?;
            }
            return Ok(());
        }

        let scheduled_for = Utc::now()
            + chrono::Duration::from_std(backoff_duration(attempts)).unwrap_or_default();
        self.store
            .mark_retry(job.id, attempts, scheduled_for, &failure.human_readable, result_payload)
            .await?;
        self.store
            .update_promotion_job_status(job.id, crate::models::PromotionJobStatus::Pending)
            .await?;
        Ok(())
    }
}

/// Stale-lock recoverer (spec §4.2, C3): reset every job whose lease has
/// expired back to pending.
pub async fn recover_stale_locks(store: &dyn Store) -> anyhow::Result<i64> {
    store.recover_stale_locks().await
}

/// Admin operation: cancel a pending job (spec §5, §6).
pub async fn cancel_job(store: &dyn Store, id: Uuid) -> anyhow::Result<bool> {
    store.cancel_job(id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fake::FakeStore;
    use crate::store::NewJob;

    struct AlwaysFails;

    #[async_trait::async_trait]
    impl JobHandler for AlwaysFails {
        async fn handle(&self, _job: &Job, _store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>> {
            anyhow::bail!("rate limit exceeded")
        }
    }

    struct AlwaysSucceeds;

    #[async_trait::async_trait]
    impl JobHandler for AlwaysSucceeds {
        async fn handle(&self, _job: &Job, _store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>> {
            Ok(Some(serde_json::json!({ "ok": true })))
        }
    }

    #[tokio::test]
    async fn retries_then_dead_letters_on_rate_limit() {
        let store: Arc<dyn Store> = Arc::new(FakeStore::new());
        let tracker = Arc::new(ActiveJobTracker::new());
        let mut executor = JobExecutor::new(store.clone(), tracker);
        executor.register("generate_draft", Arc::new(AlwaysFails));

        let outcome = store
            .enqueue(NewJob {
                max_attempts: 3,
                ..NewJob::new("generate_draft")
            })
            .await
            .unwrap();
        let job_id = outcome.job_id();

        for expected_attempts in 1..=3 {
            let job = store.get_job(job_id).await.unwrap().unwrap();
            executor.process(job).await;
            let job = store.get_job(job_id).await.unwrap().unwrap();
            if expected_attempts < 3 {
                assert_eq!(job.status, JobStatus::Pending);
                assert_eq!(job.attempts, expected_attempts);
                assert!(job.scheduled_for.is_some());
            } else {
                assert_eq!(job.status, JobStatus::Failed);
            }
        }
    }

    #[tokio::test]
    async fn success_marks_completed() {
        let store: Arc<dyn Store> = Arc::new(FakeStore::new());
        let tracker = Arc::new(ActiveJobTracker::new());
        let mut executor = JobExecutor::new(store.clone(), tracker);
        executor.register("generate_draft", Arc::new(AlwaysSucceeds));

        let outcome = store.enqueue(NewJob::new("generate_draft")).await.unwrap();
        let job = store.get_job(outcome.job_id()).await.unwrap().unwrap();
        executor.process(job).await;

        let job = store.get_job(outcome.job_id()).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }
}
