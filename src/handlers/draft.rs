//! Stage 4: `generate_draft` (spec §4.4).
//!
//! Choose a content-type-specific prompt, generate markdown, strip
//! em-dashes, compute `wordCount`; fail short non-calculator drafts;
//! persist `generationPasses=1`; enqueue **humanize**.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collab::{AiClient, ApiCallLog, Revisions};
use crate::executor::JobHandler;
use crate::handlers::support::{strip_em_dashes, word_count};
use crate::models::{ContentType, Job, JobType};
use crate::store::{NewJob, Store};

const MIN_WORD_COUNT: i32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftStagePayload {
    pub article_id: Uuid,
}

fn draft_prompt(content_type: ContentType, keyword: &str, title: &str) -> String {
    let angle = match content_type {
        ContentType::Comparison => "a side-by-side comparison",
        ContentType::Calculator => "an explainer accompanying an interactive calculator",
        ContentType::CostGuide => "a cost breakdown guide",
        ContentType::Wizard => "a decision-guidance walkthrough",
        ContentType::LeadCapture => "a consultation-oriented guide",
        ContentType::HealthDecision => "a cautious, citation-aware health guide",
        ContentType::Faq => "a frequently-asked-questions article",
        ContentType::Checklist => "a step-by-step checklist",
        ContentType::Review => "a ranked review roundup",
        ContentType::Article => "a general informational article",
    };
    format!("Write {angle} titled \"{title}\" targeting the keyword \"{keyword}\" in markdown.")
}

pub struct GenerateDraftHandler {
    ai: Arc<dyn AiClient>,
    revisions: Arc<dyn Revisions>,
}

impl GenerateDraftHandler {
    pub fn new(ai: Arc<dyn AiClient>, revisions: Arc<dyn Revisions>) -> Self {
        Self { ai, revisions }
    }
}

#[async_trait::async_trait]
impl JobHandler for GenerateDraftHandler {
    async fn handle(&self, job: &Job, store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>> {
        let payload: DraftStagePayload = job.deserialize_payload()?;

        let mut article = store
            .get_article(payload.article_id)
            .await?
            .ok_or(crate::error::AppError::ArticleNotFound(payload.article_id))?;

        let prompt = draft_prompt(article.content_type, &article.target_keyword, &article.title);
        let generation = self.ai.generate("generate_draft", &prompt).await?;
        let content = strip_em_dashes(&generation.content);
        let count = word_count(&content);

        if count < MIN_WORD_COUNT && article.content_type != ContentType::Calculator {
            anyhow::bail!("short content: draft has {count} words, minimum is {MIN_WORD_COUNT}");
        }

        article.content_markdown = Some(content);
        article.word_count = count;
        article.generation_passes = 1;

        let article = store.upsert_article(article).await?;

        store
            .insert_api_call_log(ApiCallLog::from_generation(Some(article.id), "generate_draft", &generation))
            .await?;
        self.revisions
            .create(article.id, "generate_draft", serde_json::json!({ "word_count": article.word_count }))
            .await?;

        store
            .enqueue(NewJob {
                article_id: Some(article.id),
                domain_id: Some(article.domain_id),
                priority: job.priority,
                ..NewJob::new(JobType::Humanize.as_str())
            })
            .await?;

        Ok(Some(serde_json::json!({ "article_id": article.id, "word_count": article.word_count })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_non_calculator_draft_is_rejected() {
        assert!(word_count("only a few words here") < MIN_WORD_COUNT);
    }
}
