//! Domain rows and domain-channel profiles (spec §3 "Domain",
//! "Domain-channel profile").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default, Hash)]
#[sqlx(type_name = "domain_bucket", rename_all = "snake_case")]
pub enum DomainBucket {
    #[default]
    Build,
    Redirect,
    Park,
    Defensive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSchedule {
    pub frequency: Option<String>,
    pub time_of_day: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContentConfig {
    pub schedule: Option<ContentSchedule>,
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Domain {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub domain: String,
    pub tld: String,

    #[builder(default = "active".to_string())]
    pub status: String,
    #[builder(default, setter(strip_option))]
    pub niche: Option<String>,
    #[builder(default, setter(strip_option))]
    pub sub_niche: Option<String>,
    #[builder(default)]
    pub bucket: DomainBucket,

    #[builder(default, setter(strip_option))]
    pub content_config: Option<serde_json::Value>,

    #[builder(default, setter(strip_option))]
    pub deleted_at: Option<DateTime<Utc>>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

impl Domain {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none() && self.status == "active"
    }

    pub fn content_schedule(&self) -> Option<ContentSchedule> {
        self.content_config
            .as_ref()
            .and_then(|v| v.get("schedule"))
            .and_then(|s| serde_json::from_value(s.clone()).ok())
    }
}

/// Per (domain, channel) publish policy (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "channel_compatibility", rename_all = "snake_case")]
pub enum ChannelCompatibility {
    #[default]
    Supported,
    Limited,
    Blocked,
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct DomainChannelProfile {
    pub domain_id: Uuid,
    pub channel: String,

    #[builder(default = true)]
    pub enabled: bool,
    #[builder(default)]
    pub compatibility: ChannelCompatibility,

    #[builder(default, setter(strip_option))]
    pub daily_cap: Option<i32>,
    #[builder(default, setter(strip_option))]
    pub quiet_hours_start: Option<i32>,
    #[builder(default, setter(strip_option))]
    pub quiet_hours_end: Option<i32>,

    #[builder(default, setter(strip_option))]
    pub min_jitter_minutes: Option<i32>,
    #[builder(default, setter(strip_option))]
    pub max_jitter_minutes: Option<i32>,
}

impl DomainChannelProfile {
    pub fn is_publishable(&self) -> bool {
        self.enabled && self.compatibility != ChannelCompatibility::Blocked
    }
}
