//! Stage 2: `research` (spec §4.4).
//!
//! Populate `article.researchData` with statistics/quotes/hooks/developments
//! via the research cache collaborator, then enqueue **generate_outline**.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collab::{Revisions, ResearchCache};
use crate::executor::JobHandler;
use crate::models::{Job, JobType};
use crate::store::{NewJob, Store};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchStagePayload {
    pub article_id: Uuid,
}

pub struct ResearchHandler {
    research_cache: Arc<dyn ResearchCache>,
    revisions: Arc<dyn Revisions>,
}

impl ResearchHandler {
    pub fn new(research_cache: Arc<dyn ResearchCache>, revisions: Arc<dyn Revisions>) -> Self {
        Self {
            research_cache,
            revisions,
        }
    }
}

#[async_trait::async_trait]
impl JobHandler for ResearchHandler {
    async fn handle(&self, job: &Job, store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>> {
        let payload: ResearchStagePayload = job.deserialize_payload()?;

        let mut article = store
            .get_article(payload.article_id)
            .await?
            .ok_or(crate::error::AppError::ArticleNotFound(payload.article_id))?;

        let research = self.research_cache.generate(&article.target_keyword).await?;
        let snapshot = serde_json::to_value(&research)?;

        article.research_data = Some(snapshot.clone());
        let article = store.upsert_article(article).await?;

        self.revisions.create(article.id, "research", snapshot).await?;

        store
            .enqueue(NewJob {
                article_id: Some(article.id),
                domain_id: Some(article.domain_id),
                priority: job.priority,
                ..NewJob::new(JobType::GenerateOutline.as_str())
            })
            .await?;

        Ok(Some(serde_json::json!({ "article_id": article.id })))
    }
}
