//! Stage 5: `humanize` (spec §4.4).
//!
//! Rewrite with a per-domain voice seed, strip em-dashes, update word
//! count, `generationPasses=2`; enqueue **seo_optimize**.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collab::{AiClient, ApiCallLog, Revisions};
use crate::executor::JobHandler;
use crate::handlers::support::{strip_em_dashes, word_count};
use crate::models::{Job, JobType};
use crate::store::{NewJob, Store};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanizeStagePayload {
    pub article_id: Uuid,
}

/// A stable per-domain style fingerprint (spec glossary "Voice seed").
fn voice_seed(domain: &str, niche: Option<&str>) -> String {
    format!("{domain}:{}", niche.unwrap_or("general"))
}

pub struct HumanizeHandler {
    ai: Arc<dyn AiClient>,
    revisions: Arc<dyn Revisions>,
}

impl HumanizeHandler {
    pub fn new(ai: Arc<dyn AiClient>, revisions: Arc<dyn Revisions>) -> Self {
        Self { ai, revisions }
    }
}

#[async_trait::async_trait]
impl JobHandler for HumanizeHandler {
    async fn handle(&self, job: &Job, store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>> {
        let payload: HumanizeStagePayload = job.deserialize_payload()?;

        let mut article = store
            .get_article(payload.article_id)
            .await?
            .ok_or(crate::error::AppError::ArticleNotFound(payload.article_id))?;
        let domain = store
            .get_domain(article.domain_id)
            .await?
            .ok_or(crate::error::AppError::DomainNotFound(article.domain_id))?;

        let seed = voice_seed(&domain.domain, domain.niche.as_deref());
        let draft = article.content_markdown.clone().unwrap_or_default();
        let prompt = format!(
            "Rewrite the following draft in a natural, human voice (style seed \"{seed}\"), \
             keeping every fact intact:\n\n{draft}"
        );
        let generation = self.ai.generate("humanize", &prompt).await?;
        let content = strip_em_dashes(&generation.content);
        let count = word_count(&content);

        article.content_markdown = Some(content);
        article.word_count = count;
        article.generation_passes = 2;

        let article = store.upsert_article(article).await?;

        store
            .insert_api_call_log(ApiCallLog::from_generation(Some(article.id), "humanize", &generation))
            .await?;
        self.revisions
            .create(article.id, "humanize", serde_json::json!({ "word_count": article.word_count }))
            .await?;

        store
            .enqueue(NewJob {
                article_id: Some(article.id),
                domain_id: Some(article.domain_id),
                priority: job.priority,
                ..NewJob::new(JobType::SeoOptimize.as_str())
            })
            .await?;

        Ok(Some(serde_json::json!({ "article_id": article.id, "word_count": article.word_count })))
    }
}
