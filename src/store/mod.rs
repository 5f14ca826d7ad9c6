//! The persistent relational store (spec §3 C1, §4.1-§4.3).
//!
//! `Store` is the single trait every component in this crate depends on.
//! `postgres::PgStore` is the production implementation (row-level locks,
//! `FOR UPDATE SKIP LOCKED`); `fake::FakeStore` is an in-memory
//! implementation of the same trait used in tests, mirroring the teacher's
//! `TestJobManager` (`kernel/jobs/manager.rs`).

pub mod fake;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::*;

/// A newly enqueued job's outcome, distinguishing a fresh insert from an
/// idempotency hit (spec §4.5 "Idempotent enqueue", §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Created(Uuid),
    Duplicate(Uuid),
}

impl EnqueueOutcome {
    pub fn job_id(&self) -> Uuid {
        match self {
            EnqueueOutcome::Created(id) | EnqueueOutcome::Duplicate(id) => *id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, EnqueueOutcome::Created(_))
    }
}

/// Parameters for enqueuing a new job (spec §3 Job fields).
#[derive(Debug, Clone, Default)]
pub struct NewJob {
    pub job_type: String,
    pub priority: i32,
    pub payload: Option<serde_json::Value>,
    pub max_attempts: i32,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub article_id: Option<Uuid>,
    pub domain_id: Option<Uuid>,
    pub channel: Option<String>,
    /// When set, refuse to insert if an in-flight (pending/processing) job
    /// of the same `job_type` already matches this key (spec §4.5, §4.6).
    pub idempotency_key: Option<String>,
}

impl NewJob {
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            max_attempts: 3,
            ..Default::default()
        }
    }

    /// The payload to actually persist: `idempotency_key`, when set, is
    /// merged in under `idempotencyKey` so `find_in_flight_by_key`'s
    /// `payload ->> 'idempotencyKey'` lookup (spec §4.5 "matched via
    /// payload") has something to match against. Without this the key is
    /// never written anywhere and every enqueue call creates a fresh row.
    pub fn payload_with_idempotency_key(&self) -> Option<serde_json::Value> {
        let Some(key) = &self.idempotency_key else {
            return self.payload.clone();
        };

        let mut value = self.payload.clone().unwrap_or_else(|| serde_json::json!({}));
        match value.as_object_mut() {
            Some(map) => {
                map.insert("idempotencyKey".to_string(), serde_json::Value::String(key.clone()));
            }
            None => {
                value = serde_json::json!({ "idempotencyKey": key, "value": value });
            }
        }
        Some(value)
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

#[derive(Debug, Clone, Default)]
pub struct QueueHealth {
    pub stats: QueueStats,
    pub oldest_pending_age_ms: Option<i64>,
    pub avg_processing_time_ms: Option<f64>,
    pub throughput_per_hour: f64,
    pub error_rate_24h: f64,
    pub latest_started_at: Option<DateTime<Utc>>,
    pub latest_completed_at: Option<DateTime<Utc>>,
    pub latest_queued_at: Option<DateTime<Utc>>,
    pub latest_worker_activity_at: Option<DateTime<Utc>>,
}

/// Mode for `retryFailedJobs` (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMode {
    All,
    Transient,
}

#[async_trait]
pub trait Store: Send + Sync {
    // ---- C2: job acquirer ----

    /// Atomically claim up to `limit` ready jobs (spec §4.1).
    async fn acquire(&self, limit: i64, allowed_types: Option<&[String]>) -> anyhow::Result<Vec<Job>>;

    /// Same as `acquire`, restricted to a candidate id set (spec §4.1
    /// `acquireByIds`).
    async fn acquire_by_ids(
        &self,
        ids: &[Uuid],
        limit: i64,
        allowed_types: Option<&[String]>,
    ) -> anyhow::Result<Vec<Job>>;

    // ---- C3: stale-lock recoverer ----

    /// Reset every job whose lease has expired back to pending (spec §4.2).
    async fn recover_stale_locks(&self) -> anyhow::Result<i64>;

    // ---- Queue mutation (used by the executor, C4) ----

    async fn enqueue(&self, new_job: NewJob) -> anyhow::Result<EnqueueOutcome>;

    async fn find_in_flight_by_key(
        &self,
        job_type: &str,
        idempotency_key: &str,
    ) -> anyhow::Result<Option<Job>>;

    async fn get_job(&self, id: Uuid) -> anyhow::Result<Option<Job>>;

    async fn mark_completed(&self, id: Uuid, result: Option<serde_json::Value>) -> anyhow::Result<()>;

    async fn mark_failed_terminal(
        &self,
        id: Uuid,
        error_message: &str,
        result: serde_json::Value,
    ) -> anyhow::Result<()>;

    async fn mark_retry(
        &self,
        id: Uuid,
        attempts: i32,
        scheduled_for: DateTime<Utc>,
        error_message: &str,
        result: serde_json::Value,
    ) -> anyhow::Result<()>;

    // ---- Admin surface (spec §6) ----

    async fn cancel_job(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn purge_old_jobs(&self, days: i64) -> anyhow::Result<i64>;

    async fn retry_failed_jobs(
        &self,
        limit: i64,
        mode: RetryMode,
        min_failed_age_ms: i64,
    ) -> anyhow::Result<i64>;

    async fn queue_stats(&self) -> anyhow::Result<QueueStats>;

    async fn queue_health(&self) -> anyhow::Result<QueueHealth>;

    // ---- Keyword opportunities ----

    async fn insert_keyword_opportunities(&self, opportunities: &[KeywordOpportunity]) -> anyhow::Result<()>;

    // ---- API-call accounting (spec §4.4 "record API-call accounting") ----

    async fn insert_api_call_log(&self, log: crate::collab::ApiCallLog) -> anyhow::Result<()>;

    // ---- Articles ----

    async fn get_article(&self, id: Uuid) -> anyhow::Result<Option<Article>>;
    async fn upsert_article(&self, article: Article) -> anyhow::Result<Article>;
    async fn reset_article_to_draft(&self, id: Uuid) -> anyhow::Result<()>;
    async fn published_siblings(&self, domain_id: Uuid, limit: i64) -> anyhow::Result<Vec<Article>>;
    async fn latest_article_created_at(&self, domain_id: Uuid) -> anyhow::Result<Option<DateTime<Utc>>>;

    // ---- Domains ----

    async fn get_domain(&self, id: Uuid) -> anyhow::Result<Option<Domain>>;
    async fn active_domains(&self) -> anyhow::Result<Vec<Domain>>;
    async fn domains_with_recent_activity(
        &self,
        since: DateTime<Utc>,
    ) -> anyhow::Result<std::collections::HashSet<Uuid>>;
    async fn domain_channel_profile(
        &self,
        domain_id: Uuid,
        channel: &str,
    ) -> anyhow::Result<Option<DomainChannelProfile>>;

    // ---- Promotion campaigns/jobs/events ----

    async fn get_campaign(&self, id: Uuid) -> anyhow::Result<Option<Campaign>>;
    async fn upsert_campaign(&self, campaign: Campaign) -> anyhow::Result<Campaign>;
    async fn insert_promotion_job(&self, job: PromotionJob) -> anyhow::Result<()>;
    /// Update the growth side-record mirroring `queue_job_id`'s lifecycle
    /// (spec §4.3 steps 2 and 6: running on dispatch, completed/pending/
    /// failed on outcome). A no-op if no promotion job is linked.
    async fn update_promotion_job_status(
        &self,
        queue_job_id: Uuid,
        status: PromotionJobStatus,
    ) -> anyhow::Result<()>;
    async fn append_event(&self, event: PromotionEvent) -> anyhow::Result<()>;
    async fn events_for_campaign(&self, campaign_id: Uuid) -> anyhow::Result<Vec<PromotionEvent>>;
    async fn events_for_campaign_since(
        &self,
        campaign_id: Uuid,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<PromotionEvent>>;
    async fn events_for_domain_research_since(
        &self,
        domain_research_id: Uuid,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<PromotionEvent>>;

    /// Count of `published` events for a campaign since `since`, optionally
    /// restricted to one channel (spec §9 REDESIGN FLAGS: "a single
    /// aggregate query", used for daily-cap enforcement).
    async fn count_published_events(
        &self,
        campaign_id: Uuid,
        channel: Option<&str>,
        since: DateTime<Utc>,
    ) -> anyhow::Result<i64>;

    /// Whether a `published` event with this `(campaign, channel,
    /// creativeHash)` exists since `since` (spec §4.5 duplicate suppression).
    async fn duplicate_creative_published(
        &self,
        campaign_id: Uuid,
        channel: &str,
        creative_hash: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<bool>;

    /// Whether any campaign under this `domainResearchId` published on
    /// `channel` since `since` (spec §4.5 domain cooldown).
    async fn domain_cooldown_published(
        &self,
        domain_research_id: Uuid,
        channel: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<bool>;

    // ---- Media ----

    async fn least_used_media_asset(
        &self,
        domain_id: Uuid,
        asset_type: MediaAssetType,
    ) -> anyhow::Result<Option<MediaAsset>>;
    async fn record_media_usage(&self, asset_id: Uuid, campaign_id: Uuid, channel: &str) -> anyhow::Result<()>;

    // ---- Underwriting ----

    async fn upsert_domain_research(&self, research: DomainResearch) -> anyhow::Result<DomainResearch>;
    async fn get_domain_research(&self, id: Uuid) -> anyhow::Result<Option<DomainResearch>>;
    async fn append_acquisition_event(&self, event: AcquisitionEvent) -> anyhow::Result<()>;
    async fn upsert_review_task(&self, task: ReviewTask) -> anyhow::Result<()>;
    async fn cancel_pending_review_tasks(&self, domain_research_id: Uuid) -> anyhow::Result<()>;
    async fn upsert_preview_build(&self, build: PreviewBuild) -> anyhow::Result<()>;

    // ---- Maintenance (spec §4.8 C9) ----

    /// Distinct user ids with at least one `pending` moderation task, up to
    /// `limit` (spec §4.8 "media-review escalation sweep").
    async fn users_with_pending_moderation_tasks(&self, limit: i64) -> anyhow::Result<Vec<Uuid>>;

    /// Delete preview builds whose `expires_at` has passed; returns the
    /// count removed (spec §4.8 "expired preview-build purge").
    async fn purge_expired_preview_builds(&self, now: DateTime<Utc>) -> anyhow::Result<i64>;

    /// Delete media assets soft-deleted before `older_than`; returns the
    /// count removed (spec §4.8 "deleted growth-media purge").
    async fn purge_deleted_media_assets(&self, older_than: DateTime<Utc>) -> anyhow::Result<i64>;
}
