//! Maintenance tick (spec §4.8, C9): hourly sweeps, each independently
//! error-contained so one misbehaving sweep never blocks the others.
//!
//! The handful of sweeps this crate can ground in the store (queue purge,
//! preview-build expiry, deleted-media purge, media-review escalation) are
//! fully implemented below. The remaining sweeps named in spec §4.8 are
//! external collaborators (content freshness, renewal checks, compliance
//! snapshot, revenue reconciliation, ...) -- out of scope per spec §1, but
//! still invoked through `MaintenanceSweeps` so the tick's error-containment
//! and logging shape covers them uniformly, mirroring how `collab::AiClient`
//! and friends are consumed elsewhere in this crate.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collab::Notifications;
use crate::config::Config;
use crate::executor::JobHandler;
use crate::models::{Job, JobType};
use crate::store::{NewJob, Store};

/// The external, fire-and-forget collaborators a maintenance tick invokes
/// (spec §4.8). Each method is independent; a default no-op implementation
/// is provided so a caller only needs to wire the sweeps it actually cares
/// about (mirrors `Evaluator`/`PolicyEvaluator` being injected piecemeal
/// elsewhere in this crate).
#[async_trait]
pub trait MaintenanceSweeps: Send + Sync {
    async fn content_freshness_check(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn renewal_checks(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn compliance_snapshot(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn stale_dataset_detection(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn session_purge(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn growth_credential_refresh_audit(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn integration_sync_scheduler(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn revenue_reconciliation(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn data_contract_sweep(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn capital_allocation(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn lifecycle_monitor(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn competitor_refresh(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn strategy_propagation(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn integration_health(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn campaign_launch_review_escalation(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn growth_launch_freeze_audit_and_postmortem_sla(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn general_monitoring_checks(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A `MaintenanceSweeps` that performs none of the external sweeps -- the
/// default for deployments that only need the store-grounded sweeps below.
pub struct NoopMaintenanceSweeps;

impl MaintenanceSweeps for NoopMaintenanceSweeps {}

/// How many days of terminal jobs to retain before `purge_old_jobs` removes
/// them (spec §3 lifecycle: "purged after N days (default 30)").
pub const DEFAULT_JOB_RETENTION_DAYS: i64 = 30;

/// How long a soft-deleted media asset survives before the sweep removes
/// it. The spec names "deleted growth-media purge" without a retention
/// window; 7 days gives operators a recovery grace period and mirrors the
/// queue's own 30-day retention being the "slow" end of this crate's purge
/// windows (Open Question decision, recorded in DESIGN.md).
pub const DEFAULT_DELETED_MEDIA_RETENTION_DAYS: i64 = 7;

/// Idempotently queue one `media_review_escalation` job per user with a
/// pending moderation task (spec §4.8), capped at
/// `MEDIA_REVIEW_ESCALATION_SWEEP_USER_LIMIT`.
async fn media_review_escalation_sweep(store: &dyn Store, user_limit: i32) -> anyhow::Result<i64> {
    let users = store.users_with_pending_moderation_tasks(user_limit as i64).await?;
    let mut queued = 0i64;
    for user_id in users {
        let outcome = store
            .enqueue(NewJob {
                priority: 1,
                idempotency_key: Some(user_id.to_string()),
                payload: Some(serde_json::json!({ "user_id": user_id })),
                ..NewJob::new(JobType::MediaReviewEscalation.as_str())
            })
            .await?;
        if outcome.is_created() {
            queued += 1;
        }
    }
    Ok(queued)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MediaReviewEscalationPayload {
    user_id: Uuid,
}

/// Handler for the `media_review_escalation` jobs the sweep above queues:
/// notifies the user they have media pending moderation review (spec §4.8).
pub struct MediaReviewEscalationHandler {
    notifications: Arc<dyn Notifications>,
}

impl MediaReviewEscalationHandler {
    pub fn new(notifications: Arc<dyn Notifications>) -> Self {
        Self { notifications }
    }
}

#[async_trait]
impl JobHandler for MediaReviewEscalationHandler {
    async fn handle(&self, job: &Job, _store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>> {
        let payload: MediaReviewEscalationPayload = job.deserialize_payload()?;
        self.notifications
            .create(payload.user_id, "media_review_escalation", serde_json::json!({}))
            .await?;
        Ok(Some(serde_json::json!({ "notified": payload.user_id })))
    }
}

/// Register the maintenance-tick handlers that run through the regular job
/// executor rather than being invoked directly by `run_maintenance_tick`.
pub fn register_maintenance_handlers(executor: &mut crate::executor::JobExecutor, notifications: Arc<dyn Notifications>) {
    executor.register(
        JobType::MediaReviewEscalation.as_str(),
        Arc::new(MediaReviewEscalationHandler::new(notifications)),
    );
}

/// Run every sweep named in spec §4.8, each independently error-contained:
/// a sweep that returns `Err` is logged and the tick moves on (spec §7:
/// "the worker never throws out of the job loop").
pub async fn run_maintenance_tick(store: &dyn Store, sweeps: &dyn MaintenanceSweeps, config: &Config) {
    run_contained("purge_old_jobs", || store.purge_old_jobs(DEFAULT_JOB_RETENTION_DAYS)).await;
    run_contained("purge_expired_preview_builds", || store.purge_expired_preview_builds(Utc::now())).await;
    run_contained("purge_deleted_media_assets", || {
        store.purge_deleted_media_assets(Utc::now() - chrono::Duration::days(DEFAULT_DELETED_MEDIA_RETENTION_DAYS))
    })
    .await;
    run_contained("media_review_escalation_sweep", || {
        media_review_escalation_sweep(store, config.media_review_escalation_sweep_user_limit)
    })
    .await;

    run_contained_unit("content_freshness_check", || sweeps.content_freshness_check()).await;
    run_contained_unit("renewal_checks", || sweeps.renewal_checks()).await;
    run_contained_unit("compliance_snapshot", || sweeps.compliance_snapshot()).await;
    run_contained_unit("stale_dataset_detection", || sweeps.stale_dataset_detection()).await;
    run_contained_unit("session_purge", || sweeps.session_purge()).await;
    run_contained_unit("growth_credential_refresh_audit", || sweeps.growth_credential_refresh_audit()).await;
    run_contained_unit("integration_sync_scheduler", || sweeps.integration_sync_scheduler()).await;
    run_contained_unit("revenue_reconciliation", || sweeps.revenue_reconciliation()).await;
    run_contained_unit("data_contract_sweep", || sweeps.data_contract_sweep()).await;
    run_contained_unit("capital_allocation", || sweeps.capital_allocation()).await;
    run_contained_unit("lifecycle_monitor", || sweeps.lifecycle_monitor()).await;
    run_contained_unit("competitor_refresh", || sweeps.competitor_refresh()).await;
    run_contained_unit("strategy_propagation", || sweeps.strategy_propagation()).await;
    run_contained_unit("integration_health", || sweeps.integration_health()).await;
    run_contained_unit("campaign_launch_review_escalation", || sweeps.campaign_launch_review_escalation()).await;
    run_contained_unit("growth_launch_freeze_audit_and_postmortem_sla", || {
        sweeps.growth_launch_freeze_audit_and_postmortem_sla()
    })
    .await;
    run_contained_unit("general_monitoring_checks", || sweeps.general_monitoring_checks()).await;

    info!("maintenance tick complete");
}

async fn run_contained<F, Fut>(name: &str, f: F)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<i64>>,
{
    match f().await {
        Ok(count) if count > 0 => info!(sweep = name, count, "maintenance sweep removed/queued rows"),
        Ok(_) => {}
        Err(e) => error!(sweep = name, error = %e, "maintenance sweep failed"),
    }
}

async fn run_contained_unit<F, Fut>(name: &str, f: F)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    if let Err(e) = f().await {
        warn!(sweep = name, error = %e, "maintenance sweep failed");
    }
}

/// `Arc`-wrapped pair handed to the worker bootstrap so it can run the tick
/// at startup and then hourly (spec §4.8: "At worker startup and then
/// hourly").
pub struct MaintenanceTick {
    pub store: Arc<dyn Store>,
    pub sweeps: Arc<dyn MaintenanceSweeps>,
    pub config: Arc<Config>,
}

impl MaintenanceTick {
    pub fn new(store: Arc<dyn Store>, sweeps: Arc<dyn MaintenanceSweeps>, config: Arc<Config>) -> Self {
        Self { store, sweeps, config }
    }

    pub async fn run_once(&self) {
        run_maintenance_tick(self.store.as_ref(), self.sweeps.as_ref(), &self.config).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModerationTask, ModerationTaskStatus};
    use crate::store::fake::FakeStore;

    #[tokio::test]
    async fn media_review_escalation_is_idempotent_per_user() {
        let store = FakeStore::new();
        let user_id = Uuid::new_v4();
        store.seed_moderation_task(
            ModerationTask::builder()
                .user_id(user_id)
                .media_asset_id(Uuid::new_v4())
                .status(ModerationTaskStatus::Pending)
                .build(),
        );

        let first = media_review_escalation_sweep(&store, 100).await.unwrap();
        let second = media_review_escalation_sweep(&store, 100).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0, "an in-flight job for the same user must not be duplicated");
    }

    #[tokio::test]
    async fn tick_runs_even_when_a_sweep_errors() {
        struct Flaky;
        #[async_trait]
        impl MaintenanceSweeps for Flaky {
            async fn content_freshness_check(&self) -> anyhow::Result<()> {
                anyhow::bail!("collaborator unavailable")
            }
        }

        let store = FakeStore::new();
        let config = Config::default();
        // Must not panic despite the flaky sweep failing.
        run_maintenance_tick(&store, &Flaky, &config).await;
    }
}
