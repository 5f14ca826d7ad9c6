//! Human review tasks and preview builds (spec §4.6 "synchronize or cancel
//! a human review task", "refresh or expire the preview build record").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "review_task_status", rename_all = "snake_case")]
pub enum ReviewTaskStatus {
    #[default]
    Pending,
    Completed,
    Cancelled,
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct ReviewTask {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub domain_research_id: Uuid,

    #[builder(default)]
    pub status: ReviewTaskStatus,
    #[builder(default, setter(strip_option))]
    pub checklist: Option<serde_json::Value>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

/// Preview builds expire on a 72h TTL (spec §4.6).
pub const PREVIEW_BUILD_TTL_HOURS: i64 = 72;

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct PreviewBuild {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub domain_research_id: Uuid,
    pub preview_url: String,

    #[builder(default = Utc::now() + chrono::Duration::hours(PREVIEW_BUILD_TTL_HOURS))]
    pub expires_at: DateTime<Utc>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

impl PreviewBuild {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
