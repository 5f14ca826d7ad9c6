//! Stage 3: `generate_outline` (spec §4.4).
//!
//! Ask the AI for title/meta/outline/FAQs; detect `contentType` from the
//! target keyword; optionally include a calculator/comparison sub-schema
//! (validated, dropped on failure without failing the stage); write a
//! revision; enqueue **generate_draft**.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::collab::{AiClient, ApiCallLog, Revisions};
use crate::executor::JobHandler;
use crate::handlers::content_type::detect_content_type;
use crate::models::{ArticleStatus, ContentType, Job, JobType};
use crate::store::{NewJob, Store};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineStagePayload {
    pub article_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct OutlineResponse {
    title: String,
    meta_description: String,
    outline: serde_json::Value,
    faqs: Vec<String>,
    #[serde(default)]
    calculator_config: Option<serde_json::Value>,
    #[serde(default)]
    comparison_data: Option<serde_json::Value>,
}

/// Minimal structural validation for the opaque calculator sub-schema: it
/// must be an object naming at least one input and a result field. The
/// queue does not interpret the formula itself (spec §1 non-goals).
fn validate_calculator_config(value: &serde_json::Value) -> bool {
    value
        .as_object()
        .map(|obj| obj.contains_key("inputs") && obj.contains_key("result"))
        .unwrap_or(false)
}

fn validate_comparison_data(value: &serde_json::Value) -> bool {
    value
        .as_object()
        .map(|obj| obj.get("items").and_then(|v| v.as_array()).map(|a| a.len() >= 2).unwrap_or(false))
        .unwrap_or(false)
}

pub struct GenerateOutlineHandler {
    ai: Arc<dyn AiClient>,
    revisions: Arc<dyn Revisions>,
}

impl GenerateOutlineHandler {
    pub fn new(ai: Arc<dyn AiClient>, revisions: Arc<dyn Revisions>) -> Self {
        Self { ai, revisions }
    }
}

#[async_trait::async_trait]
impl JobHandler for GenerateOutlineHandler {
    async fn handle(&self, job: &Job, store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>> {
        let payload: OutlineStagePayload = job.deserialize_payload()?;

        let mut article = store
            .get_article(payload.article_id)
            .await?
            .ok_or(crate::error::AppError::ArticleNotFound(payload.article_id))?;
        let domain = store
            .get_domain(article.domain_id)
            .await?
            .ok_or(crate::error::AppError::DomainNotFound(article.domain_id))?;

        let content_type = detect_content_type(&article.target_keyword);

        let prompt = format!(
            "Write a title, meta description, section outline, and FAQs for an article \
             targeting \"{}\" on domain \"{}\" (content type: {:?}).",
            article.target_keyword, domain.domain, content_type,
        );
        let (value, generation) = self.ai.generate_json("generate_outline", &prompt).await?;
        let response: OutlineResponse = serde_json::from_value(value)?;

        let calculator_config = match (content_type, response.calculator_config) {
            (ContentType::Calculator, Some(cfg)) if validate_calculator_config(&cfg) => Some(cfg),
            (ContentType::Calculator, Some(_)) => {
                warn!(article_id = %article.id, "calculator_config failed schema validation; dropping blob, keeping outline");
                None
            }
            _ => None,
        };
        let comparison_data = match (content_type, response.comparison_data) {
            (ContentType::Comparison, Some(data)) if validate_comparison_data(&data) => Some(data),
            (ContentType::Comparison, Some(_)) => {
                warn!(article_id = %article.id, "comparison_data failed schema validation; dropping blob, keeping outline");
                None
            }
            _ => None,
        };

        article.title = response.title;
        article.meta_description = Some(response.meta_description);
        article.header_structure = Some(serde_json::json!({
            "outline": response.outline,
            "faqs": response.faqs,
        }));
        article.content_type = content_type;
        article.calculator_config = calculator_config;
        article.comparison_data = comparison_data;
        article.status = ArticleStatus::Generating;

        let article = store.upsert_article(article).await?;

        store
            .insert_api_call_log(ApiCallLog::from_generation(Some(article.id), "generate_outline", &generation))
            .await?;
        self.revisions
            .create(article.id, "generate_outline", article.header_structure.clone().unwrap_or_default())
            .await?;

        store
            .enqueue(NewJob {
                article_id: Some(article.id),
                domain_id: Some(article.domain_id),
                priority: job.priority,
                ..NewJob::new(JobType::GenerateDraft.as_str())
            })
            .await?;

        Ok(Some(serde_json::json!({ "article_id": article.id, "content_type": content_type })))
    }
}
