//! Abstract interfaces for the collaborators named in spec §6.
//!
//! The core queue and worker runtime depend only on these traits; concrete
//! AI model calls, channel adapters, and policy engines are out of scope
//! (spec §1 Explicitly OUT of scope). Implementations live outside this
//! crate and are injected via `Arc<dyn Trait>`, mirroring the teacher's
//! `ServerKernel` dependency-injection pattern (`kernel/traits.rs`).

pub mod unconfigured;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AiGeneration {
    pub content: String,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub cost_usd_micros: i64,
    pub duration_ms: i64,
    pub model_key: String,
    pub resolved_model: String,
    pub prompt_version: i32,
    pub routing_version: i32,
    pub used_fallback: bool,
}

/// `AIClient.generate` / `AIClient.generateJSON<T>` (spec §6).
///
/// `generate_json` returns an untyped `serde_json::Value` so the trait stays
/// object-safe (`Arc<dyn AiClient>`); callers deserialize into their own
/// per-stage payload type with `serde_json::from_value`.
#[async_trait]
pub trait AiClient: Send + Sync {
    async fn generate(&self, stage: &str, prompt: &str) -> anyhow::Result<AiGeneration>;

    async fn generate_json(
        &self,
        stage: &str,
        prompt: &str,
    ) -> anyhow::Result<(serde_json::Value, AiGeneration)>;
}

#[derive(Debug, Clone)]
pub struct ChannelPublishResult {
    pub external_post_id: String,
    pub status: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct Credential {
    pub source: CredentialSource,
    pub token: String,
}

/// Resolves a stored user credential for a (domain, channel) pair, if one
/// exists (spec §4.5 "resolve credentials: stored user credential if
/// available, else environment").
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn resolve(&self, domain_id: Uuid, channel: &str) -> anyhow::Result<Option<Credential>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    UserStored,
    Environment,
}

/// `ChannelAdapter.publish(channel, payload, { credential })` (spec §6).
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    async fn publish(
        &self,
        channel: &str,
        payload: serde_json::Value,
        credential: &Credential,
    ) -> anyhow::Result<ChannelPublishResult>;
}

#[derive(Debug, Clone, Default)]
pub struct PolicyEvaluation {
    pub allowed: bool,
    pub normalized_copy: Option<String>,
    pub warnings: Vec<String>,
    pub changes: Vec<String>,
    pub block_reasons: Vec<String>,
    pub destination_host: Option<String>,
    pub destination_risk_score: Option<f64>,
    pub policy_pack_id: Option<String>,
    pub policy_pack_version: Option<i32>,
    pub checks_applied: Vec<String>,
}

/// `PolicyEvaluator.evaluate({ channel, copy, destinationUrl })` (spec §6).
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        channel: &str,
        copy: &str,
        destination_url: &str,
    ) -> anyhow::Result<PolicyEvaluation>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainEvaluation {
    pub composite_score: f64,
    pub sub_scores: serde_json::Value,
    pub recommendation: String,
    pub revenue_projection_cents: i64,
    pub risk_assessment: serde_json::Value,
    pub flip_comps: serde_json::Value,
    pub confidence: f64,
    pub hard_fail_reason: Option<String>,
}

/// `Evaluator.evaluateDomain(domain, opts)` (spec §6).
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate_domain(
        &self,
        domain: &str,
        opts: serde_json::Value,
    ) -> anyhow::Result<DomainEvaluation>;
}

/// `FeatureFlags.isEnabled(flagName)` (spec §6). Gates
/// `acquisition_underwriting_v1`, `growth_channels_v1`.
#[async_trait]
pub trait FeatureFlags: Send + Sync {
    async fn is_enabled(&self, flag_name: &str) -> bool;
}

/// `Notifications.create(...)` (spec §6). Fire-and-forget from the queue's
/// perspective.
#[async_trait]
pub trait Notifications: Send + Sync {
    async fn create(&self, user_id: Uuid, kind: &str, payload: serde_json::Value) -> anyhow::Result<()>;
}

/// `Revisions.create(...)` (spec §6).
#[async_trait]
pub trait Revisions: Send + Sync {
    async fn create(
        &self,
        article_id: Uuid,
        stage: &str,
        snapshot: serde_json::Value,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ResearchPayload {
    pub statistics: Vec<String>,
    pub quotes: Vec<String>,
    pub hooks: Vec<String>,
    pub developments: Vec<String>,
}

/// `ResearchCache.generate(...)` (spec §6).
#[async_trait]
pub trait ResearchCache: Send + Sync {
    async fn generate(&self, keyword: &str) -> anyhow::Result<ResearchPayload>;
}

#[derive(Debug, Clone)]
pub struct RenderedVideo {
    pub asset_url: String,
    pub duration_seconds: i32,
}

/// The `render_short_video` step of the growth pipeline (spec §4.5) calls
/// out to a video renderer; named here because the spec's collaborator
/// list in §6 covers it only implicitly under "out of scope: concrete ...
/// storage of rendered media" (spec §1).
#[async_trait]
pub trait VideoRenderer: Send + Sync {
    async fn render(&self, script: &str) -> anyhow::Result<RenderedVideo>;
}

/// A single opaque API-call accounting row (spec §4.4: "API-call rows
/// include model key, resolved model, prompt version, routing version,
/// fallback indicator, input/output tokens, cost, and duration").
#[derive(Debug, Clone)]
pub struct ApiCallLog {
    pub id: Uuid,
    pub article_id: Option<Uuid>,
    pub stage: String,
    pub model_key: String,
    pub resolved_model: String,
    pub prompt_version: i32,
    pub routing_version: i32,
    pub used_fallback: bool,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub cost_usd_micros: i64,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl ApiCallLog {
    pub fn from_generation(article_id: Option<Uuid>, stage: &str, gen: &AiGeneration) -> Self {
        Self {
            id: Uuid::new_v4(),
            article_id,
            stage: stage.to_string(),
            model_key: gen.model_key.clone(),
            resolved_model: gen.resolved_model.clone(),
            prompt_version: gen.prompt_version,
            routing_version: gen.routing_version,
            used_fallback: gen.used_fallback,
            input_tokens: gen.input_tokens,
            output_tokens: gen.output_tokens,
            cost_usd_micros: gen.cost_usd_micros,
            duration_ms: gen.duration_ms,
            created_at: Utc::now(),
        }
    }
}
