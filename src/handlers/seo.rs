//! Stage 6: `seo_optimize` (spec §4.4).
//!
//! Ask the AI to add internal links using up to 20 published siblings;
//! strip em-dashes; `generationPasses=3`; enqueue **generate_meta**.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collab::{AiClient, ApiCallLog, Revisions};
use crate::executor::JobHandler;
use crate::handlers::support::{strip_em_dashes, word_count};
use crate::models::{Job, JobType};
use crate::store::{NewJob, Store};

const MAX_INTERNAL_LINK_CANDIDATES: i64 = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeoStagePayload {
    pub article_id: Uuid,
}

pub struct SeoOptimizeHandler {
    ai: Arc<dyn AiClient>,
    revisions: Arc<dyn Revisions>,
}

impl SeoOptimizeHandler {
    pub fn new(ai: Arc<dyn AiClient>, revisions: Arc<dyn Revisions>) -> Self {
        Self { ai, revisions }
    }
}

#[async_trait::async_trait]
impl JobHandler for SeoOptimizeHandler {
    async fn handle(&self, job: &Job, store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>> {
        let payload: SeoStagePayload = job.deserialize_payload()?;

        let mut article = store
            .get_article(payload.article_id)
            .await?
            .ok_or(crate::error::AppError::ArticleNotFound(payload.article_id))?;

        let siblings = store
            .published_siblings(article.domain_id, MAX_INTERNAL_LINK_CANDIDATES)
            .await?;
        let link_candidates: Vec<String> = siblings
            .iter()
            .filter_map(|a| a.slug.as_ref().map(|s| format!("{} -> /{s}", a.title)))
            .collect();

        let draft = article.content_markdown.clone().unwrap_or_default();
        let prompt = format!(
            "Add natural internal links to the following article, choosing from these \
             published siblings where relevant:\n{}\n\nArticle:\n{draft}",
            link_candidates.join("\n"),
        );
        let generation = self.ai.generate("seo_optimize", &prompt).await?;
        let content = strip_em_dashes(&generation.content);
        let count = word_count(&content);

        article.content_markdown = Some(content);
        article.word_count = count;
        article.generation_passes = 3;

        let article = store.upsert_article(article).await?;

        store
            .insert_api_call_log(ApiCallLog::from_generation(Some(article.id), "seo_optimize", &generation))
            .await?;
        self.revisions
            .create(
                article.id,
                "seo_optimize",
                serde_json::json!({ "internal_link_candidates": link_candidates.len() }),
            )
            .await?;

        store
            .enqueue(NewJob {
                article_id: Some(article.id),
                domain_id: Some(article.domain_id),
                priority: job.priority,
                ..NewJob::new(JobType::GenerateMeta.as_str())
            })
            .await?;

        Ok(Some(serde_json::json!({ "article_id": article.id, "word_count": article.word_count })))
    }
}
