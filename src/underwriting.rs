//! Acquisition underwriting flow (spec §4.6, C7): a three-stage chain from
//! raw listings to a bid plan, each stage idempotent by "no in-flight job
//! of the same type with the same `domainResearchId`".
//!
//! Mirrors the shape of `growth::publish` (idempotent enqueue helper +
//! one `JobHandler` per stage) rather than `handlers::*`, since this chain
//! is keyed by `domainResearchId` instead of `articleId`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collab::{Evaluator, FeatureFlags};
use crate::executor::JobExecutor;
use crate::models::{
    bid_increment_cents, AcquisitionEvent, BidPlan, BidPlanKind, DomainResearch, Job, JobType, PreviewBuild,
    ReviewTask, ReviewTaskStatus, UnderwritingDecision, UnderwritingSnapshot,
};
use crate::store::{NewJob, Store};

/// Feature flag gating this whole flow (spec §4.6, §6).
pub const FEATURE_FLAG: &str = "acquisition_underwriting_v1";

/// Insert an underwriting queue job idempotently, keyed by `(jobType,
/// domainResearchId)` (spec §4.6).
async fn enqueue_underwriting_job(
    store: &dyn Store,
    job_type: &str,
    domain_research_id: Uuid,
    payload: serde_json::Value,
    priority: i32,
) -> anyhow::Result<Option<Uuid>> {
    let idempotency_key = domain_research_id.to_string();
    let outcome = store
        .enqueue(NewJob {
            priority,
            payload: Some(payload),
            idempotency_key: Some(idempotency_key),
            domain_id: None,
            ..NewJob::new(job_type)
        })
        .await?;
    Ok(if outcome.is_created() { Some(outcome.job_id()) } else { None })
}

async fn log_event(
    store: &dyn Store,
    domain_research_id: Uuid,
    event_type: &str,
    attributes: Option<serde_json::Value>,
) -> anyhow::Result<()> {
    store
        .append_acquisition_event(
            AcquisitionEvent::builder()
                .domain_research_id(domain_research_id)
                .event_type(event_type)
                .maybe_attributes(attributes)
                .build(),
        )
        .await
}

/// One raw candidate from a listing feed (spec §3 "Underwriting record"
/// candidate listing fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingCandidate {
    pub domain: String,
    pub tld: String,
    #[serde(default)]
    pub list_price_cents: Option<i64>,
    #[serde(default)]
    pub auction_end_at: Option<DateTime<Utc>>,
}

fn normalize_domain(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestListingsPayload {
    pub candidates: Vec<ListingCandidate>,
}

/// **ingest_listings**: normalize and upsert candidates, log `ingested`,
/// enqueue `enrich_candidate` per candidate (spec §4.6).
pub struct IngestListingsHandler {
    feature_flags: Arc<dyn FeatureFlags>,
}

impl IngestListingsHandler {
    pub fn new(feature_flags: Arc<dyn FeatureFlags>) -> Self {
        Self { feature_flags }
    }
}

#[async_trait::async_trait]
impl crate::executor::JobHandler for IngestListingsHandler {
    async fn handle(&self, job: &Job, store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>> {
        if !self.feature_flags.is_enabled(FEATURE_FLAG).await {
            return Err(crate::error::AppError::FeatureDisabled(FEATURE_FLAG.to_string()).into());
        }

        let payload: IngestListingsPayload = job.deserialize_payload()?;
        let mut ingested = Vec::with_capacity(payload.candidates.len());

        for candidate in payload.candidates {
            let domain = normalize_domain(&candidate.domain);
            let research = store
                .upsert_domain_research(
                    DomainResearch::builder()
                        .domain(domain.clone())
                        .tld(candidate.tld)
                        .maybe_list_price_cents(candidate.list_price_cents)
                        .maybe_auction_end_at(candidate.auction_end_at)
                        .decision(UnderwritingDecision::Researching)
                        .build(),
                )
                .await?;

            log_event(store, research.id, "ingested", Some(serde_json::json!({ "domain": domain }))).await?;

            enqueue_underwriting_job(
                store,
                JobType::EnrichCandidate.as_str(),
                research.id,
                serde_json::json!({ "domain_research_id": research.id }),
                job.priority,
            )
            .await?;

            ingested.push(research.id);
        }

        Ok(Some(serde_json::json!({ "ingested": ingested })))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainResearchIdPayload {
    pub domain_research_id: Uuid,
}

/// **enrich_candidate**: call the evaluator, log `enriched` or `hard_fail`,
/// enqueue `score_candidate` unconditionally (spec §4.6 -- the hard-fail
/// short-circuit happens one stage later, in `score_candidate`).
pub struct EnrichCandidateHandler {
    evaluator: Arc<dyn Evaluator>,
}

impl EnrichCandidateHandler {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self { evaluator }
    }
}

#[async_trait::async_trait]
impl crate::executor::JobHandler for EnrichCandidateHandler {
    async fn handle(&self, job: &Job, store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>> {
        let payload: DomainResearchIdPayload = job.deserialize_payload()?;
        let research = store
            .get_domain_research(payload.domain_research_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("domain research {} not found", payload.domain_research_id))?;

        let evaluation = self
            .evaluator
            .evaluate_domain(&research.domain, serde_json::json!({ "tld": research.tld }))
            .await?;

        let updated = store
            .upsert_domain_research(DomainResearch {
                evaluation: Some(serde_json::to_value(&evaluation)?),
                hard_fail_reason: evaluation.hard_fail_reason.clone(),
                updated_at: Utc::now(),
                ..research
            })
            .await?;

        if let Some(reason) = &evaluation.hard_fail_reason {
            log_event(store, updated.id, "hard_fail", Some(serde_json::json!({ "reason": reason }))).await?;
        } else {
            log_event(
                store,
                updated.id,
                "enriched",
                Some(serde_json::json!({ "recommendation": evaluation.recommendation, "confidence": evaluation.confidence })),
            )
            .await?;
        }

        enqueue_underwriting_job(
            store,
            JobType::ScoreCandidate.as_str(),
            updated.id,
            serde_json::json!({ "domain_research_id": updated.id }),
            job.priority,
        )
        .await?;

        Ok(Some(serde_json::json!({ "domain_research_id": updated.id, "hard_fail": evaluation.hard_fail_reason.is_some() })))
    }
}

/// Decision thresholds for `score_candidate` (spec §4.6: "decide outcome
/// from the evaluator recommendation + confidence + risk thresholds" --
/// the spec names the inputs but not the cutoffs; these are this crate's
/// Open Question decision, recorded in DESIGN.md).
pub const BUY_CONFIDENCE_THRESHOLD: f64 = 0.7;
pub const BUY_RISK_THRESHOLD: f64 = 0.4;
pub const WATCHLIST_CONFIDENCE_THRESHOLD: f64 = 0.4;

fn decide(evaluation: &crate::collab::DomainEvaluation) -> UnderwritingDecision {
    if evaluation.hard_fail_reason.is_some() {
        return UnderwritingDecision::Pass;
    }
    let risk = risk_score(evaluation);
    if evaluation.recommendation == "buy" && evaluation.confidence >= BUY_CONFIDENCE_THRESHOLD && risk <= BUY_RISK_THRESHOLD {
        return UnderwritingDecision::Buy;
    }
    if evaluation.confidence >= WATCHLIST_CONFIDENCE_THRESHOLD {
        return UnderwritingDecision::Watchlist;
    }
    UnderwritingDecision::Pass
}

fn risk_score(evaluation: &crate::collab::DomainEvaluation) -> f64 {
    evaluation
        .risk_assessment
        .get("score")
        .and_then(|v| v.as_f64())
        .unwrap_or(1.0)
}

/// **score_candidate**: derive an underwriting snapshot, decide the
/// outcome, update the research row and review/preview side records, log
/// `scored`, enqueue `create_bid_plan` unless the candidate hard-failed
/// (spec §4.6).
pub struct ScoreCandidateHandler;

impl ScoreCandidateHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ScoreCandidateHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl crate::executor::JobHandler for ScoreCandidateHandler {
    async fn handle(&self, job: &Job, store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>> {
        let payload: DomainResearchIdPayload = job.deserialize_payload()?;
        let research = store
            .get_domain_research(payload.domain_research_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("domain research {} not found", payload.domain_research_id))?;

        let evaluation: crate::collab::DomainEvaluation = research
            .evaluation
            .clone()
            .ok_or_else(|| anyhow::anyhow!("domain research {} has not been enriched yet", research.id))?
            .pipe_deserialize()?;

        let decision = decide(&evaluation);
        let max_bid_cents = (evaluation.revenue_projection_cents as f64 * evaluation.confidence).max(0.0) as i64;
        let snapshot = UnderwritingSnapshot {
            demand_score: evaluation.composite_score,
            comps_score: evaluation
                .sub_scores
                .get("comps")
                .and_then(|v| v.as_f64())
                .unwrap_or(evaluation.composite_score),
            risk_score: risk_score(&evaluation),
            confidence: evaluation.confidence,
            max_bid_cents,
            hard_fail_reason: evaluation.hard_fail_reason.clone(),
        };

        let updated = store
            .upsert_domain_research(DomainResearch {
                evaluation: Some(serde_json::json!({ "evaluation": evaluation, "snapshot": snapshot })),
                decision,
                updated_at: Utc::now(),
                ..research
            })
            .await?;

        if decision == UnderwritingDecision::Buy {
            store
                .upsert_review_task(
                    ReviewTask::builder()
                        .domain_research_id(updated.id)
                        .status(ReviewTaskStatus::Pending)
                        .checklist(serde_json::json!([
                            "verify ownership transfer path",
                            "confirm no trademark conflicts",
                            "confirm bid cap approved",
                        ]))
                        .build(),
                )
                .await?;
        } else {
            store.cancel_pending_review_tasks(updated.id).await?;
        }

        store
            .upsert_preview_build(
                PreviewBuild::builder()
                    .domain_research_id(updated.id)
                    .preview_url(format!("https://preview.internal/underwriting/{}", updated.id))
                    .build(),
            )
            .await?;

        log_event(
            store,
            updated.id,
            "scored",
            Some(serde_json::json!({ "decision": decision, "snapshot": snapshot })),
        )
        .await?;

        if snapshot.hard_fail_reason.is_some() {
            return Ok(Some(serde_json::json!({ "domain_research_id": updated.id, "decision": decision, "bid_plan_enqueued": false })));
        }

        enqueue_underwriting_job(
            store,
            JobType::CreateBidPlan.as_str(),
            updated.id,
            serde_json::json!({ "domain_research_id": updated.id }),
            job.priority,
        )
        .await?;

        Ok(Some(serde_json::json!({ "domain_research_id": updated.id, "decision": decision, "bid_plan_enqueued": true })))
    }
}

/// Small helper so `serde_json::Value -> T` reads fluently at the call
/// site above (`research.evaluation` already holds a validated shape by
/// the time `score_candidate` runs).
trait PipeDeserialize {
    fn pipe_deserialize<T: serde::de::DeserializeOwned>(self) -> anyhow::Result<T>;
}

impl PipeDeserialize for serde_json::Value {
    fn pipe_deserialize<T: serde::de::DeserializeOwned>(self) -> anyhow::Result<T> {
        Ok(serde_json::from_value(self)?)
    }
}

/// **create_bid_plan**: turn the stored snapshot into a `BidPlan` using the
/// bid increment table, log `bid_plan_created` (spec §4.6).
pub struct CreateBidPlanHandler;

impl CreateBidPlanHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CreateBidPlanHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl crate::executor::JobHandler for CreateBidPlanHandler {
    async fn handle(&self, job: &Job, store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>> {
        let payload: DomainResearchIdPayload = job.deserialize_payload()?;
        let research = store
            .get_domain_research(payload.domain_research_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("domain research {} not found", payload.domain_research_id))?;

        let snapshot: UnderwritingSnapshot = research
            .evaluation
            .as_ref()
            .and_then(|v| v.get("snapshot"))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("domain research {} has not been scored yet", research.id))?
            .pipe_deserialize()?;

        let plan = match research.decision {
            UnderwritingDecision::Buy => {
                let kind = if research.auction_end_at.map(|t| t > Utc::now()).unwrap_or(false) {
                    BidPlanKind::AuctionBid
                } else {
                    BidPlanKind::BuyNow
                };
                BidPlan {
                    kind,
                    bid_increment_cents: Some(bid_increment_cents(snapshot.max_bid_cents)),
                    max_bid_cents: Some(snapshot.max_bid_cents),
                }
            }
            UnderwritingDecision::Watchlist => BidPlan {
                kind: BidPlanKind::Watchlist,
                bid_increment_cents: None,
                max_bid_cents: Some(snapshot.max_bid_cents),
            },
            UnderwritingDecision::Pass | UnderwritingDecision::Bought | UnderwritingDecision::Researching => BidPlan {
                kind: BidPlanKind::Pass,
                bid_increment_cents: None,
                max_bid_cents: None,
            },
        };

        log_event(store, research.id, "bid_plan_created", Some(serde_json::to_value(&plan)?)).await?;

        Ok(Some(serde_json::to_value(&plan)?))
    }
}

/// Register all 4 acquisition underwriting handlers on an executor (spec
/// §4.6 stage chain).
pub fn register_underwriting_handlers(
    executor: &mut JobExecutor,
    evaluator: Arc<dyn Evaluator>,
    feature_flags: Arc<dyn FeatureFlags>,
) {
    executor.register(JobType::IngestListings.as_str(), Arc::new(IngestListingsHandler::new(feature_flags)));
    executor.register(JobType::EnrichCandidate.as_str(), Arc::new(EnrichCandidateHandler::new(evaluator)));
    executor.register(JobType::ScoreCandidate.as_str(), Arc::new(ScoreCandidateHandler::new()));
    executor.register(JobType::CreateBidPlan.as_str(), Arc::new(CreateBidPlanHandler::new()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::DomainEvaluation;

    fn evaluation(recommendation: &str, confidence: f64, risk: f64) -> DomainEvaluation {
        DomainEvaluation {
            composite_score: 70.0,
            sub_scores: serde_json::json!({ "comps": 65.0 }),
            recommendation: recommendation.to_string(),
            revenue_projection_cents: 1_000_00,
            risk_assessment: serde_json::json!({ "score": risk }),
            flip_comps: serde_json::json!([]),
            confidence,
            hard_fail_reason: None,
        }
    }

    #[test]
    fn high_confidence_low_risk_buy_recommendation_decides_buy() {
        let decision = decide(&evaluation("buy", 0.9, 0.1));
        assert_eq!(decision, UnderwritingDecision::Buy);
    }

    #[test]
    fn low_confidence_falls_to_pass() {
        let decision = decide(&evaluation("buy", 0.1, 0.1));
        assert_eq!(decision, UnderwritingDecision::Pass);
    }

    #[test]
    fn moderate_confidence_without_buy_recommendation_is_watchlist() {
        let decision = decide(&evaluation("watchlist", 0.5, 0.3));
        assert_eq!(decision, UnderwritingDecision::Watchlist);
    }

    #[test]
    fn hard_fail_always_decides_pass() {
        let mut eval = evaluation("buy", 0.95, 0.05);
        eval.hard_fail_reason = Some("sanctioned registrant".to_string());
        assert_eq!(decide(&eval), UnderwritingDecision::Pass);
    }
}
