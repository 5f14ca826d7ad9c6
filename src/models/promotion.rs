//! Promotion campaign / job / event rows driving the growth publish engine
//! (spec §3, §4.5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "growth_channel", rename_all = "snake_case")]
pub enum Channel {
    Pinterest,
    YoutubeShorts,
}

impl Channel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Channel::Pinterest => "pinterest",
            Channel::YoutubeShorts => "youtube_shorts",
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pinterest" => Ok(Channel::Pinterest),
            "youtube_shorts" => Ok(Channel::YoutubeShorts),
            other => anyhow::bail!("unknown channel: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "campaign_status", rename_all = "snake_case")]
pub enum CampaignStatus {
    #[default]
    Draft,
    Active,
    Paused,
    Cancelled,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CampaignMetrics {
    pub published: i64,
    pub clicks: i64,
    pub leads: i64,
    pub conversions: i64,
    pub total_events: i64,
    pub latest_publish_at: Option<DateTime<Utc>>,
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Campaign {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub domain_research_id: Uuid,

    /// Stored as a JSON array of channel strings (subset of Channel).
    pub channels: serde_json::Value,

    #[builder(default, setter(strip_option))]
    pub budget: Option<i64>,
    #[builder(default, setter(strip_option))]
    pub daily_cap: Option<i32>,

    #[builder(default)]
    pub status: CampaignStatus,

    #[builder(default, setter(strip_option))]
    pub metrics: Option<serde_json::Value>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn channel_list(&self) -> Vec<Channel> {
        self.channels
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(|s| s.parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn effective_daily_cap(&self, default_cap: i32) -> i32 {
        self.daily_cap.unwrap_or(default_cap).max(default_cap)
    }
}

/// One-per-queue-job growth side record mirroring the job's lifecycle
/// (spec §3 "Promotion job").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "promotion_job_status", rename_all = "snake_case")]
pub enum PromotionJobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct PromotionJob {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub queue_job_id: Uuid,
    pub campaign_id: Uuid,
    pub job_type: String,

    #[builder(default)]
    pub status: PromotionJobStatus,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "promotion_event_type", rename_all = "snake_case")]
pub enum PromotionEventType {
    PlanCreated,
    PlanSkipped,
    ScriptGenerated,
    VideoRendered,
    Published,
    PublishSkipped,
    PublishBlocked,
    MetricsSynced,
    IntegrityAlert,
}

impl PromotionEventType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PromotionEventType::PlanCreated => "plan_created",
            PromotionEventType::PlanSkipped => "plan_skipped",
            PromotionEventType::ScriptGenerated => "script_generated",
            PromotionEventType::VideoRendered => "video_rendered",
            PromotionEventType::Published => "published",
            PromotionEventType::PublishSkipped => "publish_skipped",
            PromotionEventType::PublishBlocked => "publish_blocked",
            PromotionEventType::MetricsSynced => "metrics_synced",
            PromotionEventType::IntegrityAlert => "integrity_alert",
        }
    }
}

/// Append-only event log keyed by campaign (spec §3 "Promotion event").
/// Events are immutable once written.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct PromotionEvent {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub event_type: String,

    #[builder(default, setter(strip_option))]
    pub channel: Option<String>,
    #[builder(default, setter(strip_option))]
    pub creative_hash: Option<String>,
    #[builder(default, setter(strip_option))]
    pub destination_host: Option<String>,

    #[builder(default, setter(strip_option))]
    pub attributes: Option<serde_json::Value>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}
