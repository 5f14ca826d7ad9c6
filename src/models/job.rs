//! The `queue` table (spec §3 "Job") — the single coordination point for
//! every worker in the system (spec §5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

/// Every job kind the runtime knows how to dispatch (spec §4.4, §4.5, §4.6,
/// §4.8). Stored as the `jobType` column; parsed back by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    // Pipeline stages (C5)
    KeywordResearch,
    Research,
    GenerateOutline,
    GenerateDraft,
    Humanize,
    SeoOptimize,
    GenerateMeta,

    // Growth publish engine (C6)
    CreatePromotionPlan,
    PublishPinterestPin,
    GenerateShortScript,
    RenderShortVideo,
    PublishYoutubeShort,
    SyncCampaignMetrics,

    // Acquisition underwriting (C7)
    IngestListings,
    EnrichCandidate,
    ScoreCandidate,
    CreateBidPlan,

    // Maintenance (C9)
    MediaReviewEscalation,
    MaintenanceSweep,
}

impl JobType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            JobType::KeywordResearch => "keyword_research",
            JobType::Research => "research",
            JobType::GenerateOutline => "generate_outline",
            JobType::GenerateDraft => "generate_draft",
            JobType::Humanize => "humanize",
            JobType::SeoOptimize => "seo_optimize",
            JobType::GenerateMeta => "generate_meta",
            JobType::CreatePromotionPlan => "create_promotion_plan",
            JobType::PublishPinterestPin => "publish_pinterest_pin",
            JobType::GenerateShortScript => "generate_short_script",
            JobType::RenderShortVideo => "render_short_video",
            JobType::PublishYoutubeShort => "publish_youtube_short",
            JobType::SyncCampaignMetrics => "sync_campaign_metrics",
            JobType::IngestListings => "ingest_listings",
            JobType::EnrichCandidate => "enrich_candidate",
            JobType::ScoreCandidate => "score_candidate",
            JobType::CreateBidPlan => "create_bid_plan",
            JobType::MediaReviewEscalation => "media_review_escalation",
            JobType::MaintenanceSweep => "maintenance_sweep",
        }
    }

    /// The successor stage in the content pipeline chain (spec §4.4), if any.
    pub const fn next_pipeline_stage(&self) -> Option<JobType> {
        match self {
            JobType::KeywordResearch => Some(JobType::Research),
            JobType::Research => Some(JobType::GenerateOutline),
            JobType::GenerateOutline => Some(JobType::GenerateDraft),
            JobType::GenerateDraft => Some(JobType::Humanize),
            JobType::Humanize => Some(JobType::SeoOptimize),
            JobType::SeoOptimize => Some(JobType::GenerateMeta),
            JobType::GenerateMeta => None,
            _ => None,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "keyword_research" => JobType::KeywordResearch,
            "research" => JobType::Research,
            "generate_outline" => JobType::GenerateOutline,
            "generate_draft" => JobType::GenerateDraft,
            "humanize" => JobType::Humanize,
            "seo_optimize" => JobType::SeoOptimize,
            "generate_meta" => JobType::GenerateMeta,
            "create_promotion_plan" => JobType::CreatePromotionPlan,
            "publish_pinterest_pin" => JobType::PublishPinterestPin,
            "generate_short_script" => JobType::GenerateShortScript,
            "render_short_video" => JobType::RenderShortVideo,
            "publish_youtube_short" => JobType::PublishYoutubeShort,
            "sync_campaign_metrics" => JobType::SyncCampaignMetrics,
            "ingest_listings" => JobType::IngestListings,
            "enrich_candidate" => JobType::EnrichCandidate,
            "score_candidate" => JobType::ScoreCandidate,
            "create_bid_plan" => JobType::CreateBidPlan,
            "media_review_escalation" => JobType::MediaReviewEscalation,
            "maintenance_sweep" => JobType::MaintenanceSweep,
            other => anyhow::bail!("unknown job type: {other}"),
        })
    }
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    pub job_type: String,

    #[builder(default)]
    pub status: JobStatus,

    #[builder(default = 0)]
    pub priority: i32,

    #[builder(default, setter(strip_option))]
    pub payload: Option<serde_json::Value>,
    #[builder(default, setter(strip_option))]
    pub result: Option<serde_json::Value>,

    #[builder(default = 0)]
    pub attempts: i32,
    #[builder(default = 3)]
    pub max_attempts: i32,

    #[builder(default, setter(strip_option))]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub locked_until: Option<DateTime<Utc>>,

    #[builder(default, setter(strip_option))]
    pub started_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,

    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,

    #[builder(default, setter(strip_option))]
    pub article_id: Option<Uuid>,
    #[builder(default, setter(strip_option))]
    pub domain_id: Option<Uuid>,
    #[builder(default, setter(strip_option))]
    pub channel: Option<String>,

    #[builder(default, setter(strip_option))]
    pub worker_id: Option<String>,
}

impl Job {
    /// A job is *ready* iff pending, unscheduled-or-due, and unlocked-or-expired
    /// (spec §3).
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending
            && self.scheduled_for.map(|t| t <= now).unwrap_or(true)
            && self.locked_until.map(|t| t <= now).unwrap_or(true)
    }

    /// A job is *leased* iff processing with an unexpired lock (spec §3).
    pub fn is_leased(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Processing
            && self.locked_until.map(|t| t > now).unwrap_or(false)
    }

    pub fn job_type_enum(&self) -> anyhow::Result<JobType> {
        self.job_type.parse()
    }

    pub fn deserialize_payload<T: serde::de::DeserializeOwned>(&self) -> anyhow::Result<T> {
        let payload = self
            .payload
            .clone()
            .ok_or_else(|| anyhow::anyhow!("job {} has no payload", self.id))?;
        Ok(serde_json::from_value(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_requires_pending_unscheduled_unlocked() {
        let now = Utc::now();
        let job = Job::builder().job_type("keyword_research").build();
        assert!(job.is_ready(now));

        let scheduled_later = Job::builder()
            .job_type("keyword_research")
            .scheduled_for(now + chrono::Duration::minutes(5))
            .build();
        assert!(!scheduled_later.is_ready(now));

        let locked = Job::builder()
            .job_type("keyword_research")
            .locked_until(now + chrono::Duration::minutes(5))
            .build();
        assert!(!locked.is_ready(now));
    }

    #[test]
    fn job_type_round_trips_through_str() {
        for jt in [
            JobType::KeywordResearch,
            JobType::GenerateMeta,
            JobType::ScoreCandidate,
            JobType::PublishYoutubeShort,
        ] {
            let s = jt.as_str();
            let parsed: JobType = s.parse().unwrap();
            assert_eq!(parsed, jt);
        }
    }

    #[test]
    fn pipeline_chain_order_matches_spec() {
        assert_eq!(
            JobType::KeywordResearch.next_pipeline_stage(),
            Some(JobType::Research)
        );
        assert_eq!(
            JobType::SeoOptimize.next_pipeline_stage(),
            Some(JobType::GenerateMeta)
        );
        assert_eq!(JobType::GenerateMeta.next_pipeline_stage(), None);
    }
}
