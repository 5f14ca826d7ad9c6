//! Stage 1: `keyword_research` (spec §4.4).
//!
//! For a domain, generate N keyword opportunities, insert them, pick the
//! highest volume/difficulty ratio, create an article stub, enqueue
//! **research**.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collab::{AiClient, ApiCallLog};
use crate::executor::JobHandler;
use crate::handlers::slug::slugify_with_fallback;
use crate::handlers::support::title_case;
use crate::models::{Article, ArticleStatus, JobType, KeywordOpportunity};
use crate::store::{NewJob, Store};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordResearchPayload {
    pub domain_id: Uuid,
    pub niche: Option<String>,
    #[serde(default = "default_target_count")]
    pub target_count: i64,
}

fn default_target_count() -> i64 {
    5
}

#[derive(Debug, Deserialize)]
struct KeywordCandidate {
    keyword: String,
    volume: i64,
    difficulty: f64,
}

pub struct KeywordResearchHandler {
    ai: Arc<dyn AiClient>,
}

impl KeywordResearchHandler {
    pub fn new(ai: Arc<dyn AiClient>) -> Self {
        Self { ai }
    }
}

#[async_trait::async_trait]
impl JobHandler for KeywordResearchHandler {
    async fn handle(&self, job: &crate::models::Job, store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>> {
        let payload: KeywordResearchPayload = job.deserialize_payload()?;

        let domain = store
            .get_domain(payload.domain_id)
            .await?
            .ok_or(crate::error::AppError::DomainNotFound(payload.domain_id))?;

        let niche = payload.niche.clone().or_else(|| domain.niche.clone());
        let prompt = format!(
            "Generate {} keyword opportunities for domain \"{}\" in niche \"{}\". \
             Return a JSON array of objects with keyword, volume, and difficulty (0-100).",
            payload.target_count,
            domain.domain,
            niche.unwrap_or_else(|| "general".to_string()),
        );

        let (value, generation) = self.ai.generate_json("keyword_research", &prompt).await?;
        let candidates: Vec<KeywordCandidate> = serde_json::from_value(value)?;
        if candidates.is_empty() {
            anyhow::bail!("ai collaborator returned zero keyword candidates");
        }

        let opportunities: Vec<KeywordOpportunity> = candidates
            .into_iter()
            .map(|c| {
                KeywordOpportunity::builder()
                    .domain_id(domain.id)
                    .keyword(c.keyword)
                    .volume(c.volume)
                    .difficulty(c.difficulty)
                    .build()
            })
            .collect();

        store.insert_keyword_opportunities(&opportunities).await?;

        let best = KeywordOpportunity::best_of(&opportunities)
            .expect("non-empty opportunities checked above")
            .clone();

        let title = title_case(&best.keyword);
        let slug = slugify_with_fallback(&best.keyword, &title);

        let article = Article::builder()
            .domain_id(domain.id)
            .title(title)
            .slug(slug)
            .status(ArticleStatus::Draft)
            .target_keyword(best.keyword.clone())
            .build();
        let article = store.upsert_article(article).await?;

        store
            .insert_api_call_log(ApiCallLog::from_generation(Some(article.id), "keyword_research", &generation))
            .await?;

        store
            .enqueue(NewJob {
                article_id: Some(article.id),
                domain_id: Some(domain.id),
                channel: job.channel.clone(),
                priority: job.priority,
                ..NewJob::new(JobType::Research.as_str())
            })
            .await?;

        Ok(Some(serde_json::json!({
            "article_id": article.id,
            "keywords_inserted": opportunities.len(),
            "best_keyword": best.keyword,
        })))
    }
}
