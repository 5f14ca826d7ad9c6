//! Article rows mutated by the pipeline stage handlers (spec §3 "Article").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "article_status", rename_all = "snake_case")]
pub enum ArticleStatus {
    #[default]
    Draft,
    Generating,
    Review,
    Approved,
    Published,
}

/// Content type detected from the target keyword (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "content_type", rename_all = "snake_case")]
pub enum ContentType {
    Comparison,
    Calculator,
    CostGuide,
    Wizard,
    LeadCapture,
    HealthDecision,
    Faq,
    Checklist,
    Review,
    #[default]
    Article,
}

/// YMYL ("Your Money or Your Life") content-risk classification (spec §4.4,
/// glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "ymyl_level", rename_all = "snake_case")]
pub enum YmylLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Article {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub domain_id: Uuid,
    pub title: String,

    #[builder(default, setter(strip_option))]
    pub slug: Option<String>,
    #[builder(default)]
    pub status: ArticleStatus,

    #[builder(default, setter(strip_option))]
    pub content_markdown: Option<String>,
    #[builder(default, setter(strip_option))]
    pub meta_description: Option<String>,
    #[builder(default, setter(strip_option))]
    pub header_structure: Option<serde_json::Value>,
    #[builder(default, setter(strip_option))]
    pub research_data: Option<serde_json::Value>,

    #[builder(default)]
    pub content_type: ContentType,
    pub target_keyword: String,
    #[builder(default, setter(strip_option))]
    pub secondary_keywords: Option<Vec<String>>,

    #[builder(default, setter(strip_option))]
    pub calculator_config: Option<serde_json::Value>,
    #[builder(default, setter(strip_option))]
    pub comparison_data: Option<serde_json::Value>,

    #[builder(default = 0)]
    pub generation_passes: i32,
    #[builder(default = 0)]
    pub word_count: i32,
    #[builder(default)]
    pub ymyl_level: YmylLevel,

    #[builder(default, setter(strip_option))]
    pub review_requested_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub last_reviewed_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub last_refreshed_at: Option<DateTime<Utc>>,

    #[builder(default = false)]
    pub is_seed_article: bool,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}
