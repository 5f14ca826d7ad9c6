//! In-memory `Store` for deterministic tests, mirroring the teacher's
//! `TestJobManager` (`kernel/jobs/manager.rs`): the same trait, a second
//! implementation backed by plain collections instead of SQL.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::*;
use crate::store::{EnqueueOutcome, NewJob, QueueHealth, QueueStats, RetryMode, Store};

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, Job>,
    articles: HashMap<Uuid, Article>,
    keyword_opportunities: Vec<KeywordOpportunity>,
    domains: HashMap<Uuid, Domain>,
    channel_profiles: HashMap<(Uuid, String), DomainChannelProfile>,
    campaigns: HashMap<Uuid, Campaign>,
    promotion_jobs: Vec<PromotionJob>,
    events: Vec<PromotionEvent>,
    media_assets: HashMap<Uuid, MediaAsset>,
    media_usage: Vec<MediaUsage>,
    domain_research: HashMap<Uuid, DomainResearch>,
    acquisition_events: Vec<AcquisitionEvent>,
    review_tasks: HashMap<Uuid, ReviewTask>,
    preview_builds: HashMap<Uuid, PreviewBuild>,
    api_call_logs: Vec<crate::collab::ApiCallLog>,
    moderation_tasks: HashMap<Uuid, ModerationTask>,
}

/// In-memory store. All state lives behind a single mutex; fine for tests,
/// not for production concurrency (the real coordination point is
/// `PgStore`'s row-level locks, per spec §5).
pub struct FakeStore {
    inner: Mutex<Inner>,
    lease_duration_ms: i64,
}

impl Default for FakeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            lease_duration_ms: 660_000,
        }
    }

    pub fn with_lease_duration_ms(mut self, lease_duration_ms: i64) -> Self {
        self.lease_duration_ms = lease_duration_ms;
        self
    }

    pub fn seed_domain(&self, domain: Domain) {
        self.inner.lock().unwrap().domains.insert(domain.id, domain);
    }

    pub fn seed_channel_profile(&self, profile: DomainChannelProfile) {
        self.inner
            .lock()
            .unwrap()
            .channel_profiles
            .insert((profile.domain_id, profile.channel.clone()), profile);
    }

    pub fn seed_campaign(&self, campaign: Campaign) {
        self.inner.lock().unwrap().campaigns.insert(campaign.id, campaign);
    }

    pub fn seed_media_asset(&self, asset: MediaAsset) {
        self.inner.lock().unwrap().media_assets.insert(asset.id, asset);
    }

    /// Directly insert a job bypassing idempotency checks -- used to set up
    /// scenario fixtures (e.g. a stale-locked row, spec §8 scenario 4).
    pub fn insert_job_raw(&self, job: Job) {
        self.inner.lock().unwrap().jobs.insert(job.id, job);
    }

    pub fn get_job_sync(&self, id: Uuid) -> Option<Job> {
        self.inner.lock().unwrap().jobs.get(&id).cloned()
    }

    pub fn all_jobs(&self) -> Vec<Job> {
        self.inner.lock().unwrap().jobs.values().cloned().collect()
    }

    pub fn jobs_of_type(&self, job_type: &str) -> Vec<Job> {
        self.inner
            .lock()
            .unwrap()
            .jobs
            .values()
            .filter(|j| j.job_type == job_type)
            .cloned()
            .collect()
    }

    pub fn keyword_opportunities_for(&self, domain_id: Uuid) -> Vec<KeywordOpportunity> {
        self.inner
            .lock()
            .unwrap()
            .keyword_opportunities
            .iter()
            .filter(|k| k.domain_id == domain_id)
            .cloned()
            .collect()
    }

    pub fn api_call_log_count(&self) -> usize {
        self.inner.lock().unwrap().api_call_logs.len()
    }

    pub fn seed_moderation_task(&self, task: ModerationTask) {
        self.inner.lock().unwrap().moderation_tasks.insert(task.id, task);
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn acquire(&self, limit: i64, allowed_types: Option<&[String]>) -> anyhow::Result<Vec<Job>> {
        self.acquire_by_ids(&[], limit, allowed_types).await
    }

    async fn acquire_by_ids(
        &self,
        ids: &[Uuid],
        limit: i64,
        allowed_types: Option<&[String]>,
    ) -> anyhow::Result<Vec<Job>> {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();

        let restrict: Option<HashSet<Uuid>> = if ids.is_empty() {
            None
        } else {
            Some(ids.iter().copied().collect())
        };

        let mut candidates: Vec<Uuid> = inner
            .jobs
            .values()
            .filter(|j| j.is_ready(now))
            .filter(|j| restrict.as_ref().map(|s| s.contains(&j.id)).unwrap_or(true))
            .filter(|j| {
                allowed_types
                    .map(|types| types.iter().any(|t| t == &j.job_type))
                    .unwrap_or(true)
            })
            .map(|j| j.id)
            .collect();

        candidates.sort_by_key(|id| {
            let j = &inner.jobs[id];
            (std::cmp::Reverse(j.priority), j.created_at)
        });
        candidates.truncate(limit.max(0) as usize);

        let mut claimed = Vec::new();
        for id in candidates {
            let job = inner.jobs.get_mut(&id).unwrap();
            job.status = JobStatus::Processing;
            job.locked_until = Some(now + chrono::Duration::milliseconds(self.lease_duration_ms));
            job.started_at = Some(now);
            claimed.push(job.clone());
        }
        Ok(claimed)
    }

    async fn recover_stale_locks(&self) -> anyhow::Result<i64> {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();
        let mut count = 0;
        for job in inner.jobs.values_mut() {
            if job.status == JobStatus::Processing
                && job.locked_until.map(|t| t <= now).unwrap_or(false)
            {
                job.status = JobStatus::Pending;
                job.locked_until = None;
                job.error_message = Some(
                    job.error_message
                        .clone()
                        .map(|m| format!("{m} | auto-recovered: stale lock expired"))
                        .unwrap_or_else(|| "auto-recovered: stale lock expired".to_string()),
                );
                count += 1;
            }
        }
        Ok(count)
    }

    async fn enqueue(&self, new_job: NewJob) -> anyhow::Result<EnqueueOutcome> {
        if let Some(key) = &new_job.idempotency_key {
            if let Some(existing) = self.find_in_flight_by_key(&new_job.job_type, key).await? {
                return Ok(EnqueueOutcome::Duplicate(existing.id));
            }
        }

        let job = Job::builder()
            .job_type(new_job.job_type.clone())
            .priority(new_job.priority)
            .maybe_payload(new_job.payload_with_idempotency_key())
            .max_attempts(new_job.max_attempts)
            .maybe_scheduled_for(new_job.scheduled_for)
            .maybe_article_id(new_job.article_id)
            .maybe_domain_id(new_job.domain_id)
            .maybe_channel(new_job.channel.clone())
            .build();

        let id = job.id;
        self.inner.lock().unwrap().jobs.insert(id, job);
        Ok(EnqueueOutcome::Created(id))
    }

    async fn find_in_flight_by_key(
        &self,
        job_type: &str,
        idempotency_key: &str,
    ) -> anyhow::Result<Option<Job>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .jobs
            .values()
            .find(|j| {
                j.job_type == job_type
                    && matches!(j.status, JobStatus::Pending | JobStatus::Processing)
                    && j.payload
                        .as_ref()
                        .and_then(|p| p.get("idempotencyKey"))
                        .and_then(|v| v.as_str())
                        == Some(idempotency_key)
            })
            .cloned())
    }

    async fn get_job(&self, id: Uuid) -> anyhow::Result<Option<Job>> {
        Ok(self.inner.lock().unwrap().jobs.get(&id).cloned())
    }

    async fn mark_completed(&self, id: Uuid, result: Option<serde_json::Value>) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(&id) {
            job.status = JobStatus::Completed;
            job.completed_at = Some(Utc::now());
            job.locked_until = None;
            job.result = result;
        }
        Ok(())
    }

    async fn mark_failed_terminal(
        &self,
        id: Uuid,
        error_message: &str,
        result: serde_json::Value,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(&id) {
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
            job.locked_until = None;
            job.error_message = Some(error_message.to_string());
            job.result = Some(result);
        }
        Ok(())
    }

    async fn mark_retry(
        &self,
        id: Uuid,
        attempts: i32,
        scheduled_for: DateTime<Utc>,
        error_message: &str,
        result: serde_json::Value,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(&id) {
            job.status = JobStatus::Pending;
            job.attempts = attempts;
            job.locked_until = None;
            job.scheduled_for = Some(scheduled_for);
            job.error_message = Some(error_message.to_string());
            job.result = Some(result);
        }
        Ok(())
    }

    async fn cancel_job(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(&id) {
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Cancelled;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn purge_old_jobs(&self, days: i64) -> anyhow::Result<i64> {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let mut inner = self.inner.lock().unwrap();
        let before = inner.jobs.len();
        inner.jobs.retain(|_, j| {
            !(matches!(j.status, JobStatus::Completed | JobStatus::Cancelled)
                && j.completed_at.map(|t| t <= cutoff).unwrap_or(false))
        });
        Ok((before - inner.jobs.len()) as i64)
    }

    async fn retry_failed_jobs(
        &self,
        limit: i64,
        mode: RetryMode,
        min_failed_age_ms: i64,
    ) -> anyhow::Result<i64> {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();
        let mut retried = 0i64;

        let mut candidates: Vec<Uuid> = inner
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Failed)
            .filter(|j| {
                j.completed_at
                    .map(|t| now - t >= chrono::Duration::milliseconds(min_failed_age_ms))
                    .unwrap_or(false)
            })
            .map(|j| j.id)
            .collect();
        candidates.sort();

        for id in candidates {
            if retried >= limit {
                break;
            }
            let job = inner.jobs.get_mut(&id).unwrap();
            if mode == RetryMode::Transient {
                let msg = job.error_message.clone().unwrap_or_default();
                if !crate::retry::is_transient_message(&msg) || job.attempts >= job.max_attempts {
                    continue;
                }
                job.status = JobStatus::Pending;
                job.scheduled_for = Some(now + chrono::Duration::from_std(
                    crate::retry::backoff_duration(job.attempts + 1),
                ).unwrap());
                job.locked_until = None;
                job.result = Some(crate::retry::bump_auto_retry_count(job.result.as_ref()));
            } else {
                job.status = JobStatus::Pending;
                job.attempts = 0;
                job.scheduled_for = None;
                job.locked_until = None;
            }
            retried += 1;
        }

        Ok(retried)
    }

    async fn queue_stats(&self) -> anyhow::Result<QueueStats> {
        let inner = self.inner.lock().unwrap();
        let mut stats = QueueStats::default();
        for j in inner.jobs.values() {
            match j.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }

    async fn queue_health(&self) -> anyhow::Result<QueueHealth> {
        let stats = self.queue_stats().await?;
        Ok(QueueHealth {
            stats,
            ..Default::default()
        })
    }

    async fn insert_keyword_opportunities(&self, opportunities: &[KeywordOpportunity]) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .keyword_opportunities
            .extend(opportunities.iter().cloned());
        Ok(())
    }

    async fn insert_api_call_log(&self, log: crate::collab::ApiCallLog) -> anyhow::Result<()> {
        self.inner.lock().unwrap().api_call_logs.push(log);
        Ok(())
    }

    async fn get_article(&self, id: Uuid) -> anyhow::Result<Option<Article>> {
        Ok(self.inner.lock().unwrap().articles.get(&id).cloned())
    }

    async fn upsert_article(&self, article: Article) -> anyhow::Result<Article> {
        let mut inner = self.inner.lock().unwrap();
        inner.articles.insert(article.id, article.clone());
        Ok(article)
    }

    async fn reset_article_to_draft(&self, id: Uuid) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(article) = inner.articles.get_mut(&id) {
            article.status = ArticleStatus::Draft;
        }
        Ok(())
    }

    async fn published_siblings(&self, domain_id: Uuid, limit: i64) -> anyhow::Result<Vec<Article>> {
        let inner = self.inner.lock().unwrap();
        let mut siblings: Vec<Article> = inner
            .articles
            .values()
            .filter(|a| a.domain_id == domain_id && a.status == ArticleStatus::Published)
            .cloned()
            .collect();
        siblings.sort_by_key(|a| std::cmp::Reverse(a.created_at));
        siblings.truncate(limit.min(20).max(0) as usize);
        Ok(siblings)
    }

    async fn latest_article_created_at(&self, domain_id: Uuid) -> anyhow::Result<Option<DateTime<Utc>>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .articles
            .values()
            .filter(|a| a.domain_id == domain_id)
            .map(|a| a.created_at)
            .max())
    }

    async fn get_domain(&self, id: Uuid) -> anyhow::Result<Option<Domain>> {
        Ok(self.inner.lock().unwrap().domains.get(&id).cloned())
    }

    async fn active_domains(&self) -> anyhow::Result<Vec<Domain>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .domains
            .values()
            .filter(|d| d.is_active())
            .cloned()
            .collect())
    }

    async fn domains_with_recent_activity(&self, since: DateTime<Utc>) -> anyhow::Result<HashSet<Uuid>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .jobs
            .values()
            .filter(|j| {
                matches!(j.status, JobStatus::Pending | JobStatus::Processing)
                    || (j.status == JobStatus::Completed
                        && j.completed_at.map(|t| t >= since).unwrap_or(false))
            })
            .filter_map(|j| j.domain_id)
            .collect())
    }

    async fn domain_channel_profile(
        &self,
        domain_id: Uuid,
        channel: &str,
    ) -> anyhow::Result<Option<DomainChannelProfile>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .channel_profiles
            .get(&(domain_id, channel.to_string()))
            .cloned())
    }

    async fn get_campaign(&self, id: Uuid) -> anyhow::Result<Option<Campaign>> {
        Ok(self.inner.lock().unwrap().campaigns.get(&id).cloned())
    }

    async fn upsert_campaign(&self, campaign: Campaign) -> anyhow::Result<Campaign> {
        let mut inner = self.inner.lock().unwrap();
        inner.campaigns.insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    async fn insert_promotion_job(&self, job: PromotionJob) -> anyhow::Result<()> {
        self.inner.lock().unwrap().promotion_jobs.push(job);
        Ok(())
    }

    async fn update_promotion_job_status(
        &self,
        queue_job_id: Uuid,
        status: PromotionJobStatus,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.promotion_jobs.iter_mut().find(|j| j.queue_job_id == queue_job_id) {
            job.status = status;
        }
        Ok(())
    }

    async fn append_event(&self, event: PromotionEvent) -> anyhow::Result<()> {
        self.inner.lock().unwrap().events.push(event);
        Ok(())
    }

    async fn events_for_campaign(&self, campaign_id: Uuid) -> anyhow::Result<Vec<PromotionEvent>> {
        let inner = self.inner.lock().unwrap();
        let mut events: Vec<PromotionEvent> = inner
            .events
            .iter()
            .filter(|e| e.campaign_id == campaign_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.created_at);
        Ok(events)
    }

    async fn events_for_campaign_since(
        &self,
        campaign_id: Uuid,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<PromotionEvent>> {
        Ok(self
            .events_for_campaign(campaign_id)
            .await?
            .into_iter()
            .filter(|e| e.created_at >= since)
            .collect())
    }

    async fn events_for_domain_research_since(
        &self,
        domain_research_id: Uuid,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<PromotionEvent>> {
        let inner = self.inner.lock().unwrap();
        let campaign_ids: HashSet<Uuid> = inner
            .campaigns
            .values()
            .filter(|c| c.domain_research_id == domain_research_id)
            .map(|c| c.id)
            .collect();
        let mut events: Vec<PromotionEvent> = inner
            .events
            .iter()
            .filter(|e| campaign_ids.contains(&e.campaign_id) && e.created_at >= since)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.created_at);
        Ok(events)
    }

    async fn count_published_events(
        &self,
        campaign_id: Uuid,
        channel: Option<&str>,
        since: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .events
            .iter()
            .filter(|e| {
                e.campaign_id == campaign_id
                    && e.event_type == "published"
                    && e.created_at >= since
                    && channel.map(|c| e.channel.as_deref() == Some(c)).unwrap_or(true)
            })
            .count() as i64)
    }

    async fn duplicate_creative_published(
        &self,
        campaign_id: Uuid,
        channel: &str,
        creative_hash: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.events.iter().any(|e| {
            e.campaign_id == campaign_id
                && e.event_type == "published"
                && e.channel.as_deref() == Some(channel)
                && e.creative_hash.as_deref() == Some(creative_hash)
                && e.created_at >= since
        }))
    }

    async fn domain_cooldown_published(
        &self,
        domain_research_id: Uuid,
        channel: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let inner = self.inner.lock().unwrap();
        let campaign_ids: HashSet<Uuid> = inner
            .campaigns
            .values()
            .filter(|c| c.domain_research_id == domain_research_id)
            .map(|c| c.id)
            .collect();
        Ok(inner.events.iter().any(|e| {
            campaign_ids.contains(&e.campaign_id)
                && e.event_type == "published"
                && e.channel.as_deref() == Some(channel)
                && e.created_at >= since
        }))
    }

    async fn least_used_media_asset(
        &self,
        domain_id: Uuid,
        asset_type: MediaAssetType,
    ) -> anyhow::Result<Option<MediaAsset>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .media_assets
            .values()
            .filter(|a| a.domain_id == domain_id && a.asset_type == asset_type && a.deleted_at.is_none())
            .min_by_key(|a| (a.usage_count, a.created_at))
            .cloned())
    }

    async fn record_media_usage(&self, asset_id: Uuid, campaign_id: Uuid, channel: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.media_usage.push(MediaUsage {
            id: Uuid::new_v4(),
            media_asset_id: asset_id,
            campaign_id,
            channel: channel.to_string(),
            created_at: Utc::now(),
        });
        if let Some(asset) = inner.media_assets.get_mut(&asset_id) {
            asset.usage_count += 1;
        }
        Ok(())
    }

    async fn upsert_domain_research(&self, research: DomainResearch) -> anyhow::Result<DomainResearch> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner
            .domain_research
            .values()
            .find(|r| r.domain == research.domain)
            .map(|r| r.id)
        {
            let merged = DomainResearch {
                id: existing,
                ..research
            };
            inner.domain_research.insert(existing, merged.clone());
            return Ok(merged);
        }
        inner.domain_research.insert(research.id, research.clone());
        Ok(research)
    }

    async fn get_domain_research(&self, id: Uuid) -> anyhow::Result<Option<DomainResearch>> {
        Ok(self.inner.lock().unwrap().domain_research.get(&id).cloned())
    }

    async fn append_acquisition_event(&self, event: AcquisitionEvent) -> anyhow::Result<()> {
        self.inner.lock().unwrap().acquisition_events.push(event);
        Ok(())
    }

    async fn upsert_review_task(&self, task: ReviewTask) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing_id) = inner
            .review_tasks
            .values()
            .find(|t| t.domain_research_id == task.domain_research_id)
            .map(|t| t.id)
        {
            inner.review_tasks.insert(existing_id, ReviewTask { id: existing_id, ..task });
        } else {
            inner.review_tasks.insert(task.id, task);
        }
        Ok(())
    }

    async fn cancel_pending_review_tasks(&self, domain_research_id: Uuid) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for task in inner.review_tasks.values_mut() {
            if task.domain_research_id == domain_research_id && task.status == ReviewTaskStatus::Pending {
                task.status = ReviewTaskStatus::Cancelled;
            }
        }
        Ok(())
    }

    async fn upsert_preview_build(&self, build: PreviewBuild) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing_id) = inner
            .preview_builds
            .values()
            .find(|b| b.domain_research_id == build.domain_research_id)
            .map(|b| b.id)
        {
            inner
                .preview_builds
                .insert(existing_id, PreviewBuild { id: existing_id, ..build });
        } else {
            inner.preview_builds.insert(build.id, build);
        }
        Ok(())
    }

    async fn users_with_pending_moderation_tasks(&self, limit: i64) -> anyhow::Result<Vec<Uuid>> {
        let inner = self.inner.lock().unwrap();
        let mut users: Vec<Uuid> = inner
            .moderation_tasks
            .values()
            .filter(|t| t.status == ModerationTaskStatus::Pending)
            .map(|t| t.user_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        users.sort();
        users.truncate(limit.max(0) as usize);
        Ok(users)
    }

    async fn purge_expired_preview_builds(&self, now: DateTime<Utc>) -> anyhow::Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.preview_builds.len();
        inner.preview_builds.retain(|_, b| !b.is_expired(now));
        Ok((before - inner.preview_builds.len()) as i64)
    }

    async fn purge_deleted_media_assets(&self, older_than: DateTime<Utc>) -> anyhow::Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.media_assets.len();
        inner
            .media_assets
            .retain(|_, a| !a.deleted_at.map(|t| t <= older_than).unwrap_or(false));
        Ok((before - inner.media_assets.len()) as i64)
    }
}
