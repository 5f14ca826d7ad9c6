//! Postgres-backed `Store` implementation.
//!
//! Follows the teacher's `kernel/jobs/job.rs::claim_jobs` idiom: a CTE
//! selects candidate ids with `FOR UPDATE SKIP LOCKED`, then a single
//! `UPDATE ... WHERE id IN (...) RETURNING ...` claims them atomically so
//! two concurrent workers never claim the same row (spec §4.1, §5).

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::*;
use crate::store::{
    EnqueueOutcome, NewJob, QueueHealth, QueueStats, RetryMode, Store,
};

pub struct PgStore {
    pool: PgPool,
    /// How long an acquired job's `locked_until` lease runs before
    /// `recover_stale_locks` considers it abandoned (spec §4.1/§4.2, env
    /// `JOB_LEASE_DURATION_MS`). Defaults to the teacher's 11-minute lease.
    lease_duration_ms: i64,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool, lease_duration_ms: 660_000 })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool, lease_duration_ms: 660_000 }
    }

    pub fn with_lease_duration_ms(mut self, lease_duration_ms: i64) -> Self {
        self.lease_duration_ms = lease_duration_ms;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn claim_jobs(
        &self,
        limit: i64,
        allowed_types: Option<&[String]>,
        restrict_ids: Option<&[Uuid]>,
        lease_duration_ms: i64,
    ) -> anyhow::Result<Vec<Job>> {
        // Building the predicate dynamically keeps the single atomic
        // statement shape from the teacher while still supporting the
        // `acquireByIds` / `allowedTypes` variants named in spec §4.1.
        let mut query = String::from(
            r#"
            WITH ready AS (
                SELECT id
                FROM queue
                WHERE status = 'pending'
                  AND (scheduled_for IS NULL OR scheduled_for <= NOW())
                  AND (locked_until IS NULL OR locked_until <= NOW())
            "#,
        );

        if allowed_types.is_some() {
            query.push_str(" AND job_type = ANY($3)");
        }
        if restrict_ids.is_some() {
            query.push_str(" AND id = ANY($4)");
        }

        query.push_str(
            r#"
                ORDER BY priority DESC, created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE queue
            SET status = 'processing',
                locked_until = NOW() + ($2 || ' milliseconds')::interval,
                started_at = NOW(),
                worker_id = current_setting('application_name', true)
            WHERE id IN (SELECT id FROM ready)
            RETURNING id, job_type, status, priority, payload, result, attempts,
                      max_attempts, scheduled_for, locked_until, started_at,
                      completed_at, created_at, error_message, article_id,
                      domain_id, channel, worker_id
            "#,
        );

        let mut q = sqlx::query_as::<_, Job>(&query)
            .bind(limit)
            .bind(lease_duration_ms.to_string());

        if let Some(types) = allowed_types {
            q = q.bind(types);
        }
        if let Some(ids) = restrict_ids {
            q = q.bind(ids);
        }

        let jobs = q.fetch_all(&self.pool).await?;
        Ok(jobs)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn acquire(&self, limit: i64, allowed_types: Option<&[String]>) -> anyhow::Result<Vec<Job>> {
        self.claim_jobs(limit, allowed_types, None, self.lease_duration_ms).await
    }

    async fn acquire_by_ids(
        &self,
        ids: &[Uuid],
        limit: i64,
        allowed_types: Option<&[String]>,
    ) -> anyhow::Result<Vec<Job>> {
        self.claim_jobs(limit, allowed_types, Some(ids), self.lease_duration_ms).await
    }

    async fn recover_stale_locks(&self) -> anyhow::Result<i64> {
        let result = sqlx::query(
            r#"
            UPDATE queue
            SET status = 'pending',
                locked_until = NULL,
                error_message = COALESCE(error_message || ' | ', '') || 'auto-recovered: stale lock expired'
            WHERE status = 'processing' AND locked_until <= NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        let count = result.rows_affected() as i64;
        if count > 0 {
            info!(count, "recovered stale-locked jobs");
        }
        Ok(count)
    }

    async fn enqueue(&self, new_job: NewJob) -> anyhow::Result<EnqueueOutcome> {
        if let Some(key) = &new_job.idempotency_key {
            if let Some(existing) = self
                .find_in_flight_by_key(&new_job.job_type, key)
                .await?
            {
                return Ok(EnqueueOutcome::Duplicate(existing.id));
            }
        }

        let id = Uuid::new_v4();
        let payload = new_job.payload_with_idempotency_key();
        sqlx::query(
            r#"
            INSERT INTO queue (
                id, job_type, status, priority, payload, attempts, max_attempts,
                scheduled_for, article_id, domain_id, channel, created_at
            ) VALUES ($1, $2, 'pending', $3, $4, 0, $5, $6, $7, $8, $9, NOW())
            "#,
        )
        .bind(id)
        .bind(&new_job.job_type)
        .bind(new_job.priority)
        .bind(&payload)
        .bind(new_job.max_attempts)
        .bind(new_job.scheduled_for)
        .bind(new_job.article_id)
        .bind(new_job.domain_id)
        .bind(&new_job.channel)
        .execute(&self.pool)
        .await?;

        debug!(job_id = %id, job_type = %new_job.job_type, "enqueued job");
        Ok(EnqueueOutcome::Created(id))
    }

    async fn find_in_flight_by_key(
        &self,
        job_type: &str,
        idempotency_key: &str,
    ) -> anyhow::Result<Option<Job>> {
        // The idempotency key is matched against the payload (spec §4.5
        // "matched via payload") rather than a dedicated column, since the
        // queue table keeps payload as an opaque JSON blob (spec §9).
        let job = sqlx::query_as::<_, Job>(
            r#"
            SELECT id, job_type, status, priority, payload, result, attempts,
                   max_attempts, scheduled_for, locked_until, started_at,
                   completed_at, created_at, error_message, article_id,
                   domain_id, channel, worker_id
            FROM queue
            WHERE job_type = $1
              AND status IN ('pending', 'processing')
              AND payload ->> 'idempotencyKey' = $2
            LIMIT 1
            "#,
        )
        .bind(job_type)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> anyhow::Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            SELECT id, job_type, status, priority, payload, result, attempts,
                   max_attempts, scheduled_for, locked_until, started_at,
                   completed_at, created_at, error_message, article_id,
                   domain_id, channel, worker_id
            FROM queue WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    async fn mark_completed(&self, id: Uuid, result: Option<serde_json::Value>) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE queue
            SET status = 'completed', completed_at = NOW(), locked_until = NULL, result = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(result)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed_terminal(
        &self,
        id: Uuid,
        error_message: &str,
        result: serde_json::Value,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE queue
            SET status = 'failed', completed_at = NOW(), locked_until = NULL,
                error_message = $2, result = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error_message)
        .bind(result)
        .execute(&self.pool)
        .await?;
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
        sqlx::query(
            r#"
            UPDATE queue
            SET status = 'pending', attempts = $2, locked_until = NULL,
                scheduled_for = $3, error_message = $4, result = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(scheduled_for)
        .bind(error_message)
        .bind(result)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cancel_job(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE queue SET status = 'cancelled' WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_old_jobs(&self, days: i64) -> anyhow::Result<i64> {
        let result = sqlx::query(
            r#"
            DELETE FROM queue
            WHERE status IN ('completed', 'cancelled')
              AND completed_at <= NOW() - ($1 || ' days')::interval
            "#,
        )
        .bind(days.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as i64)
    }

    async fn retry_failed_jobs(
        &self,
        limit: i64,
        mode: RetryMode,
        min_failed_age_ms: i64,
    ) -> anyhow::Result<i64> {
        // Scan up to 8x `limit` candidates to fill `limit` eligible rows
        // (spec §7).
        let scan_limit = limit.saturating_mul(8).max(limit);

        let rows = sqlx::query_as::<_, Job>(
            r#"
            SELECT id, job_type, status, priority, payload, result, attempts,
                   max_attempts, scheduled_for, locked_until, started_at,
                   completed_at, created_at, error_message, article_id,
                   domain_id, channel, worker_id
            FROM queue
            WHERE status = 'failed'
              AND completed_at <= NOW() - ($1 || ' milliseconds')::interval
            ORDER BY completed_at ASC
            LIMIT $2
            "#,
        )
        .bind(min_failed_age_ms.to_string())
        .bind(scan_limit)
        .fetch_all(&self.pool)
        .await?;

        let mut retried = 0i64;
        for job in rows {
            if retried >= limit {
                break;
            }
            if mode == RetryMode::Transient {
                let msg = job.error_message.clone().unwrap_or_default();
                if !crate::retry::is_transient_message(&msg) || job.attempts >= job.max_attempts {
                    continue;
                }
                let attempt_no = job.attempts;
                let backoff = crate::retry::backoff_duration(attempt_no + 1);
                let result = crate::retry::bump_auto_retry_count(job.result.as_ref());
                sqlx::query(
                    r#"
                    UPDATE queue
                    SET status = 'pending', scheduled_for = $2, locked_until = NULL, result = $3
                    WHERE id = $1
                    "#,
                )
                .bind(job.id)
                .bind(Utc::now() + chrono::Duration::from_std(backoff).unwrap())
                .bind(&result)
                .execute(&self.pool)
                .await?;
            } else {
                sqlx::query(
                    r#"
                    UPDATE queue
                    SET status = 'pending', attempts = 0, scheduled_for = NULL, locked_until = NULL
                    WHERE id = $1
                    "#,
                )
                .bind(job.id)
                .execute(&self.pool)
                .await?;
            }
            retried += 1;
        }

        Ok(retried)
    }

    async fn queue_stats(&self) -> anyhow::Result<QueueStats> {
        let row: (i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending'),
                COUNT(*) FILTER (WHERE status = 'processing'),
                COUNT(*) FILTER (WHERE status = 'completed'),
                COUNT(*) FILTER (WHERE status = 'failed'),
                COUNT(*) FILTER (WHERE status = 'cancelled')
            FROM queue
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueStats {
            pending: row.0,
            processing: row.1,
            completed: row.2,
            failed: row.3,
            cancelled: row.4,
        })
    }

    async fn queue_health(&self) -> anyhow::Result<QueueHealth> {
        let stats = self.queue_stats().await?;
        // Aggregate queries only -- never scan rows one by one (spec §9).
        let row: (
            Option<f64>,
            Option<f64>,
            Option<DateTime<Utc>>,
            Option<DateTime<Utc>>,
            Option<DateTime<Utc>>,
        ) = sqlx::query_as(
            r#"
            SELECT
                EXTRACT(EPOCH FROM (NOW() - MIN(scheduled_for))) * 1000 FILTER (WHERE status = 'pending'),
                AVG(EXTRACT(EPOCH FROM (completed_at - started_at)) * 1000) FILTER (WHERE completed_at IS NOT NULL),
                MAX(started_at),
                MAX(completed_at),
                MAX(created_at)
            FROM queue
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let error_rate_24h: f64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(
                COUNT(*) FILTER (WHERE status = 'failed')::float8
                    / NULLIF(COUNT(*) FILTER (WHERE status IN ('completed', 'failed')), 0),
                0.0
            )
            FROM queue WHERE created_at >= NOW() - INTERVAL '24 hours'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let throughput_per_hour: f64 = sqlx::query_scalar(
            "SELECT COUNT(*)::float8 / 24.0 FROM queue WHERE status = 'completed' AND completed_at >= NOW() - INTERVAL '24 hours'",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueHealth {
            stats,
            oldest_pending_age_ms: row.0.map(|v| v as i64),
            avg_processing_time_ms: row.1,
            throughput_per_hour,
            error_rate_24h,
            latest_started_at: row.2,
            latest_completed_at: row.3,
            latest_queued_at: row.4,
            latest_worker_activity_at: row.2,
        })
    }

    async fn insert_keyword_opportunities(&self, opportunities: &[KeywordOpportunity]) -> anyhow::Result<()> {
        for opp in opportunities {
            sqlx::query(
                "INSERT INTO keyword_opportunities (id, domain_id, keyword, volume, difficulty, created_at) VALUES ($1,$2,$3,$4,$5,NOW())",
            )
            .bind(opp.id)
            .bind(opp.domain_id)
            .bind(&opp.keyword)
            .bind(opp.volume)
            .bind(opp.difficulty)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn insert_api_call_log(&self, log: crate::collab::ApiCallLog) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO api_call_logs (
                id, article_id, stage, model_key, resolved_model, prompt_version,
                routing_version, used_fallback, input_tokens, output_tokens,
                cost_usd_micros, duration_ms, created_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
            "#,
        )
        .bind(log.id)
        .bind(log.article_id)
        .bind(&log.stage)
        .bind(&log.model_key)
        .bind(&log.resolved_model)
        .bind(log.prompt_version)
        .bind(log.routing_version)
        .bind(log.used_fallback)
        .bind(log.input_tokens)
        .bind(log.output_tokens)
        .bind(log.cost_usd_micros)
        .bind(log.duration_ms)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_article(&self, id: Uuid) -> anyhow::Result<Option<Article>> {
        let article = sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(article)
    }

    async fn upsert_article(&self, article: Article) -> anyhow::Result<Article> {
        let saved = sqlx::query_as::<_, Article>(
            r#"
            INSERT INTO articles (
                id, domain_id, title, slug, status, content_markdown, meta_description,
                header_structure, research_data, content_type, target_keyword,
                secondary_keywords, calculator_config, comparison_data, generation_passes,
                word_count, ymyl_level, review_requested_at, last_reviewed_at,
                last_refreshed_at, is_seed_article, created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,NOW())
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title, slug = EXCLUDED.slug, status = EXCLUDED.status,
                content_markdown = EXCLUDED.content_markdown, meta_description = EXCLUDED.meta_description,
                header_structure = EXCLUDED.header_structure, research_data = EXCLUDED.research_data,
                content_type = EXCLUDED.content_type, secondary_keywords = EXCLUDED.secondary_keywords,
                calculator_config = EXCLUDED.calculator_config, comparison_data = EXCLUDED.comparison_data,
                generation_passes = EXCLUDED.generation_passes, word_count = EXCLUDED.word_count,
                ymyl_level = EXCLUDED.ymyl_level, review_requested_at = EXCLUDED.review_requested_at,
                last_reviewed_at = EXCLUDED.last_reviewed_at, last_refreshed_at = EXCLUDED.last_refreshed_at,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(article.id)
        .bind(article.domain_id)
        .bind(&article.title)
        .bind(&article.slug)
        .bind(article.status)
        .bind(&article.content_markdown)
        .bind(&article.meta_description)
        .bind(&article.header_structure)
        .bind(&article.research_data)
        .bind(article.content_type)
        .bind(&article.target_keyword)
        .bind(&article.secondary_keywords)
        .bind(&article.calculator_config)
        .bind(&article.comparison_data)
        .bind(article.generation_passes)
        .bind(article.word_count)
        .bind(article.ymyl_level)
        .bind(article.review_requested_at)
        .bind(article.last_reviewed_at)
        .bind(article.last_refreshed_at)
        .bind(article.is_seed_article)
        .fetch_one(&self.pool)
        .await?;

        Ok(saved)
    }

    async fn reset_article_to_draft(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE articles SET status = 'draft', updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn published_siblings(&self, domain_id: Uuid, limit: i64) -> anyhow::Result<Vec<Article>> {
        let articles = sqlx::query_as::<_, Article>(
            "SELECT * FROM articles WHERE domain_id = $1 AND status = 'published' ORDER BY created_at DESC LIMIT $2",
        )
        .bind(domain_id)
        .bind(limit.min(20))
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    async fn latest_article_created_at(&self, domain_id: Uuid) -> anyhow::Result<Option<DateTime<Utc>>> {
        let ts: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT MAX(created_at) FROM articles WHERE domain_id = $1",
        )
        .bind(domain_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(ts)
    }

    async fn get_domain(&self, id: Uuid) -> anyhow::Result<Option<Domain>> {
        let domain = sqlx::query_as::<_, Domain>("SELECT * FROM domains WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(domain)
    }

    async fn active_domains(&self) -> anyhow::Result<Vec<Domain>> {
        let domains = sqlx::query_as::<_, Domain>(
            "SELECT * FROM domains WHERE deleted_at IS NULL AND status = 'active'",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(domains)
    }

    async fn domains_with_recent_activity(
        &self,
        since: DateTime<Utc>,
    ) -> anyhow::Result<HashSet<Uuid>> {
        // A single query for "has an in-flight job or a completed job in
        // the last 24h", per spec §4.7 step 2 and the §9 rule against
        // row-by-row scans.
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT domain_id FROM queue
            WHERE domain_id IS NOT NULL
              AND (status IN ('pending', 'processing')
                   OR (status = 'completed' AND completed_at >= $1))
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().collect())
    }

    async fn domain_channel_profile(
        &self,
        domain_id: Uuid,
        channel: &str,
    ) -> anyhow::Result<Option<DomainChannelProfile>> {
        let profile = sqlx::query_as::<_, DomainChannelProfile>(
            "SELECT * FROM domain_channel_profiles WHERE domain_id = $1 AND channel = $2",
        )
        .bind(domain_id)
        .bind(channel)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn get_campaign(&self, id: Uuid) -> anyhow::Result<Option<Campaign>> {
        let campaign = sqlx::query_as::<_, Campaign>("SELECT * FROM promotion_campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(campaign)
    }

    async fn upsert_campaign(&self, campaign: Campaign) -> anyhow::Result<Campaign> {
        let saved = sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO promotion_campaigns (id, domain_research_id, channels, budget, daily_cap, status, metrics, created_at, updated_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,NOW())
            ON CONFLICT (id) DO UPDATE SET
                channels = EXCLUDED.channels, budget = EXCLUDED.budget, daily_cap = EXCLUDED.daily_cap,
                status = EXCLUDED.status, metrics = EXCLUDED.metrics, updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(campaign.id)
        .bind(campaign.domain_research_id)
        .bind(&campaign.channels)
        .bind(campaign.budget)
        .bind(campaign.daily_cap)
        .bind(campaign.status)
        .bind(&campaign.metrics)
        .bind(campaign.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(saved)
    }

    async fn insert_promotion_job(&self, job: PromotionJob) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO promotion_jobs (id, queue_job_id, campaign_id, job_type, status, created_at) VALUES ($1,$2,$3,$4,$5,NOW())",
        )
        .bind(job.id)
        .bind(job.queue_job_id)
        .bind(job.campaign_id)
        .bind(&job.job_type)
        .bind(job.status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_promotion_job_status(
        &self,
        queue_job_id: Uuid,
        status: PromotionJobStatus,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE promotion_jobs SET status = $2 WHERE queue_job_id = $1")
            .bind(queue_job_id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_event(&self, event: PromotionEvent) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO promotion_events (id, campaign_id, event_type, channel, creative_hash, destination_host, attributes, created_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,NOW())
            "#,
        )
        .bind(event.id)
        .bind(event.campaign_id)
        .bind(&event.event_type)
        .bind(&event.channel)
        .bind(&event.creative_hash)
        .bind(&event.destination_host)
        .bind(&event.attributes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn events_for_campaign(&self, campaign_id: Uuid) -> anyhow::Result<Vec<PromotionEvent>> {
        let events = sqlx::query_as::<_, PromotionEvent>(
            "SELECT * FROM promotion_events WHERE campaign_id = $1 ORDER BY created_at ASC",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn events_for_campaign_since(
        &self,
        campaign_id: Uuid,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<PromotionEvent>> {
        let events = sqlx::query_as::<_, PromotionEvent>(
            "SELECT * FROM promotion_events WHERE campaign_id = $1 AND created_at >= $2 ORDER BY created_at ASC",
        )
        .bind(campaign_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn events_for_domain_research_since(
        &self,
        domain_research_id: Uuid,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<PromotionEvent>> {
        let events = sqlx::query_as::<_, PromotionEvent>(
            r#"
            SELECT pe.* FROM promotion_events pe
            JOIN promotion_campaigns pc ON pc.id = pe.campaign_id
            WHERE pc.domain_research_id = $1 AND pe.created_at >= $2
            ORDER BY pe.created_at ASC
            "#,
        )
        .bind(domain_research_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn count_published_events(
        &self,
        campaign_id: Uuid,
        channel: Option<&str>,
        since: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM promotion_events
            WHERE campaign_id = $1 AND event_type = 'published' AND created_at >= $2
              AND ($3::text IS NULL OR channel = $3)
            "#,
        )
        .bind(campaign_id)
        .bind(since)
        .bind(channel)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn duplicate_creative_published(
        &self,
        campaign_id: Uuid,
        channel: &str,
        creative_hash: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM promotion_events
                WHERE campaign_id = $1 AND event_type = 'published' AND channel = $2
                  AND creative_hash = $3 AND created_at >= $4
            )
            "#,
        )
        .bind(campaign_id)
        .bind(channel)
        .bind(creative_hash)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn domain_cooldown_published(
        &self,
        domain_research_id: Uuid,
        channel: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM promotion_events pe
                JOIN promotion_campaigns pc ON pc.id = pe.campaign_id
                WHERE pc.domain_research_id = $1 AND pe.event_type = 'published'
                  AND pe.channel = $2 AND pe.created_at >= $3
            )
            "#,
        )
        .bind(domain_research_id)
        .bind(channel)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn least_used_media_asset(
        &self,
        domain_id: Uuid,
        asset_type: MediaAssetType,
    ) -> anyhow::Result<Option<MediaAsset>> {
        let asset = sqlx::query_as::<_, MediaAsset>(
            r#"
            SELECT * FROM media_assets
            WHERE domain_id = $1 AND asset_type = $2 AND deleted_at IS NULL
            ORDER BY usage_count ASC, created_at ASC
            LIMIT 1
            "#,
        )
        .bind(domain_id)
        .bind(asset_type)
        .fetch_optional(&self.pool)
        .await?;
        Ok(asset)
    }

    async fn record_media_usage(&self, asset_id: Uuid, campaign_id: Uuid, channel: &str) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO media_usage (id, media_asset_id, campaign_id, channel, created_at) VALUES ($1,$2,$3,$4,NOW())",
        )
        .bind(Uuid::new_v4())
        .bind(asset_id)
        .bind(campaign_id)
        .bind(channel)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE media_assets SET usage_count = usage_count + 1 WHERE id = $1")
            .bind(asset_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_domain_research(&self, research: DomainResearch) -> anyhow::Result<DomainResearch> {
        let saved = sqlx::query_as::<_, DomainResearch>(
            r#"
            INSERT INTO domain_research (
                id, domain, tld, list_price_cents, auction_end_at, evaluation, decision,
                hard_fail_reason, underwriting_version, domain_id, created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,NOW())
            ON CONFLICT (domain) DO UPDATE SET
                list_price_cents = EXCLUDED.list_price_cents,
                auction_end_at = EXCLUDED.auction_end_at,
                evaluation = EXCLUDED.evaluation,
                decision = EXCLUDED.decision,
                hard_fail_reason = EXCLUDED.hard_fail_reason,
                underwriting_version = EXCLUDED.underwriting_version,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(research.id)
        .bind(&research.domain)
        .bind(&research.tld)
        .bind(research.list_price_cents)
        .bind(research.auction_end_at)
        .bind(&research.evaluation)
        .bind(research.decision)
        .bind(&research.hard_fail_reason)
        .bind(research.underwriting_version)
        .bind(research.domain_id)
        .bind(research.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(saved)
    }

    async fn get_domain_research(&self, id: Uuid) -> anyhow::Result<Option<DomainResearch>> {
        let research = sqlx::query_as::<_, DomainResearch>("SELECT * FROM domain_research WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(research)
    }

    async fn append_acquisition_event(&self, event: AcquisitionEvent) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO acquisition_events (id, domain_research_id, event_type, attributes, created_at) VALUES ($1,$2,$3,$4,NOW())",
        )
        .bind(event.id)
        .bind(event.domain_research_id)
        .bind(&event.event_type)
        .bind(&event.attributes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_review_task(&self, task: ReviewTask) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO review_tasks (id, domain_research_id, status, checklist, created_at)
            VALUES ($1,$2,$3,$4,NOW())
            ON CONFLICT (domain_research_id) DO UPDATE SET
                status = EXCLUDED.status, checklist = EXCLUDED.checklist
            "#,
        )
        .bind(task.id)
        .bind(task.domain_research_id)
        .bind(task.status)
        .bind(&task.checklist)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cancel_pending_review_tasks(&self, domain_research_id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE review_tasks SET status = 'cancelled' WHERE domain_research_id = $1 AND status = 'pending'",
        )
        .bind(domain_research_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_preview_build(&self, build: PreviewBuild) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO preview_builds (id, domain_research_id, preview_url, expires_at, created_at)
            VALUES ($1,$2,$3,$4,NOW())
            ON CONFLICT (domain_research_id) DO UPDATE SET
                preview_url = EXCLUDED.preview_url, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(build.id)
        .bind(build.domain_research_id)
        .bind(&build.preview_url)
        .bind(build.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn users_with_pending_moderation_tasks(&self, limit: i64) -> anyhow::Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT user_id FROM moderation_tasks
            WHERE status = 'pending'
            ORDER BY user_id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn purge_expired_preview_builds(&self, now: DateTime<Utc>) -> anyhow::Result<i64> {
        let result = sqlx::query("DELETE FROM preview_builds WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as i64)
    }

    async fn purge_deleted_media_assets(&self, older_than: DateTime<Utc>) -> anyhow::Result<i64> {
        let result = sqlx::query("DELETE FROM media_assets WHERE deleted_at IS NOT NULL AND deleted_at <= $1")
            .bind(older_than)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as i64)
    }
}
