//! Media assets and their usage ledger (spec §4.5 "resolve media asset",
//! §6 persisted-state layout: `media_assets`, `media_usage`,
//! `moderation_tasks`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "media_asset_type", rename_all = "snake_case")]
pub enum MediaAssetType {
    Image,
    ShortVideo,
    PinterestCreative,
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct MediaAsset {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub domain_id: Uuid,
    pub asset_type: MediaAssetType,
    pub storage_url: String,

    #[builder(default = 0)]
    pub usage_count: i64,

    #[builder(default, setter(strip_option))]
    pub deleted_at: Option<DateTime<Utc>>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct MediaUsage {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub media_asset_id: Uuid,
    pub campaign_id: Uuid,
    pub channel: String,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "moderation_task_status", rename_all = "snake_case")]
pub enum ModerationTaskStatus {
    #[default]
    Pending,
    Resolved,
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct ModerationTask {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub user_id: Uuid,
    pub media_asset_id: Uuid,

    #[builder(default)]
    pub status: ModerationTaskStatus,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}
