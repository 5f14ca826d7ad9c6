//! Stage 7: `generate_meta` (spec §4.4). Terminal stage; no successor.
//!
//! Generate title/meta/OG/schema/slug; slugify with fallback; classify YMYL
//! level; optionally run an AI reviewer gate.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collab::{AiClient, ApiCallLog, Revisions};
use crate::executor::JobHandler;
use crate::handlers::slug::slugify_with_fallback;
use crate::models::{ArticleStatus, ContentType, Job, YmylLevel};
use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaStagePayload {
    pub article_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct MetaResponse {
    title: String,
    meta_description: String,
    #[serde(default)]
    og: serde_json::Value,
    #[serde(default)]
    schema: serde_json::Value,
    #[serde(default)]
    slug: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReviewResponse {
    approved: bool,
    #[serde(default)]
    failures: Vec<String>,
    #[serde(default)]
    human_review_flag: bool,
}

/// Post-generation risk classification (spec §4.4, glossary "YMYL"). The
/// queue does not compute financial/medical risk itself -- this maps the
/// content type to the risk tier an evaluator would otherwise assign.
fn classify_ymyl(content_type: ContentType) -> YmylLevel {
    match content_type {
        ContentType::HealthDecision | ContentType::LeadCapture => YmylLevel::High,
        ContentType::CostGuide | ContentType::Wizard | ContentType::Calculator => YmylLevel::Medium,
        ContentType::Comparison | ContentType::Review => YmylLevel::Low,
        ContentType::Faq | ContentType::Checklist | ContentType::Article => YmylLevel::None,
    }
}

pub struct GenerateMetaHandler {
    ai: Arc<dyn AiClient>,
    revisions: Arc<dyn Revisions>,
    run_reviewer: bool,
}

impl GenerateMetaHandler {
    pub fn new(ai: Arc<dyn AiClient>, revisions: Arc<dyn Revisions>, run_reviewer: bool) -> Self {
        Self {
            ai,
            revisions,
            run_reviewer,
        }
    }
}

#[async_trait::async_trait]
impl JobHandler for GenerateMetaHandler {
    async fn handle(&self, job: &Job, store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>> {
        let payload: MetaStagePayload = job.deserialize_payload()?;

        let mut article = store
            .get_article(payload.article_id)
            .await?
            .ok_or(crate::error::AppError::ArticleNotFound(payload.article_id))?;

        let prompt = format!(
            "Generate an SEO title, meta description, Open Graph tags, JSON-LD schema, and \
             slug for the article \"{}\" targeting \"{}\".",
            article.title, article.target_keyword,
        );
        let (value, generation) = self.ai.generate_json("generate_meta", &prompt).await?;
        let response: MetaResponse = serde_json::from_value(value)?;

        let slug = slugify_with_fallback(response.slug.as_deref().unwrap_or(""), &response.title);

        article.title = response.title;
        article.meta_description = Some(response.meta_description);
        article.slug = Some(slug);
        article.header_structure = article.header_structure.take().map(|mut h| {
            if let Some(obj) = h.as_object_mut() {
                obj.insert("og".to_string(), response.og.clone());
                obj.insert("schema".to_string(), response.schema.clone());
            }
            h
        });
        article.ymyl_level = classify_ymyl(article.content_type);

        store
            .insert_api_call_log(ApiCallLog::from_generation(Some(article.id), "generate_meta", &generation))
            .await?;

        if self.run_reviewer {
            let review_prompt = format!(
                "Review this article for factual and policy issues before publication:\n\n{}",
                article.content_markdown.clone().unwrap_or_default(),
            );
            let (review_value, review_generation) = self.ai.generate_json("ai_review", &review_prompt).await?;
            let review: ReviewResponse = serde_json::from_value(review_value)?;

            store
                .insert_api_call_log(ApiCallLog::from_generation(Some(article.id), "ai_review", &review_generation))
                .await?;

            if review.approved && review.failures.is_empty() && !review.human_review_flag {
                article.status = ArticleStatus::Approved;
            } else {
                article.status = ArticleStatus::Review;
                article.review_requested_at = Some(chrono::Utc::now());
            }
            // generationPasses counts 5 only when the reviewer actually ran
            // (spec §9 open question -- preserve the explicit rule, do not infer).
            article.generation_passes = 5;
        } else {
            article.status = ArticleStatus::Review;
            article.review_requested_at = Some(chrono::Utc::now());
            article.generation_passes = 4;
        }

        let article = store.upsert_article(article).await?;

        self.revisions
            .create(
                article.id,
                "generate_meta",
                serde_json::json!({ "status": article.status, "ymyl_level": article.ymyl_level }),
            )
            .await?;

        Ok(Some(serde_json::json!({
            "article_id": article.id,
            "status": article.status,
            "generation_passes": article.generation_passes,
            "slug": article.slug,
        })))
    }
}
