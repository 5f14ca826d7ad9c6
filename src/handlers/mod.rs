//! Pipeline stage handlers (spec §4.4 C5).
//!
//! Every handler follows the same shape: load the job, load the referenced
//! article/domain, call an AI collaborator, persist outputs, record
//! API-call accounting, complete the job, and enqueue the next stage.

pub mod content_type;
pub mod draft;
pub mod humanize;
pub mod keyword_research;
pub mod meta;
pub mod outline;
pub mod research;
pub mod seo;
pub mod slug;
pub mod support;

use std::sync::Arc;

use crate::collab::{AiClient, ResearchCache, Revisions};
use crate::executor::JobExecutor;
use crate::models::JobType;

/// Register all 7 pipeline stage handlers on an executor (spec §4.4 stage
/// chain). `run_ai_reviewer` gates the optional reviewer in
/// `generate_meta` (config-driven, spec §9 open question: the reviewer must
/// actually run for `generationPasses` to reach 5).
pub fn register_pipeline_handlers(
    executor: &mut JobExecutor,
    ai: Arc<dyn AiClient>,
    research_cache: Arc<dyn ResearchCache>,
    revisions: Arc<dyn Revisions>,
    run_ai_reviewer: bool,
) {
    executor.register(
        JobType::KeywordResearch.as_str(),
        Arc::new(keyword_research::KeywordResearchHandler::new(ai.clone())),
    );
    executor.register(
        JobType::Research.as_str(),
        Arc::new(research::ResearchHandler::new(research_cache, revisions.clone())),
    );
    executor.register(
        JobType::GenerateOutline.as_str(),
        Arc::new(outline::GenerateOutlineHandler::new(ai.clone(), revisions.clone())),
    );
    executor.register(
        JobType::GenerateDraft.as_str(),
        Arc::new(draft::GenerateDraftHandler::new(ai.clone(), revisions.clone())),
    );
    executor.register(
        JobType::Humanize.as_str(),
        Arc::new(humanize::HumanizeHandler::new(ai.clone(), revisions.clone())),
    );
    executor.register(
        JobType::SeoOptimize.as_str(),
        Arc::new(seo::SeoOptimizeHandler::new(ai.clone(), revisions.clone())),
    );
    executor.register(
        JobType::GenerateMeta.as_str(),
        Arc::new(meta::GenerateMetaHandler::new(ai, revisions, run_ai_reviewer)),
    );
}
