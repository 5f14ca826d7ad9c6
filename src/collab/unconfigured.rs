//! Placeholder collaborators that refuse every call.
//!
//! The real AI model, channel, policy, and rendering integrations are
//! explicitly out of scope for this crate (spec §1); the worker binary
//! wires these in by default so it boots and drains the queue without a
//! panic, but any job that actually reaches one of these stages fails with
//! a clear "not configured" error until a real collaborator is injected in
//! its place (mirrors the teacher's `webhook.rs` "Extraction service not
//! configured" guard).

use async_trait::async_trait;
use uuid::Uuid;

use super::*;

pub struct Unconfigured;

#[async_trait]
impl AiClient for Unconfigured {
    async fn generate(&self, _stage: &str, _prompt: &str) -> anyhow::Result<AiGeneration> {
        Err(anyhow::anyhow!("AI client not configured"))
    }

    async fn generate_json(&self, _stage: &str, _prompt: &str) -> anyhow::Result<(serde_json::Value, AiGeneration)> {
        Err(anyhow::anyhow!("AI client not configured"))
    }
}

#[async_trait]
impl CredentialProvider for Unconfigured {
    async fn resolve(&self, _domain_id: Uuid, _channel: &str) -> anyhow::Result<Option<Credential>> {
        Err(anyhow::anyhow!("credential provider not configured"))
    }
}

#[async_trait]
impl ChannelAdapter for Unconfigured {
    async fn publish(
        &self,
        _channel: &str,
        _payload: serde_json::Value,
        _credential: &Credential,
    ) -> anyhow::Result<ChannelPublishResult> {
        Err(anyhow::anyhow!("channel adapter not configured"))
    }
}

#[async_trait]
impl PolicyEvaluator for Unconfigured {
    async fn evaluate(&self, _channel: &str, _copy: &str, _destination_url: &str) -> anyhow::Result<PolicyEvaluation> {
        Err(anyhow::anyhow!("policy evaluator not configured"))
    }
}

#[async_trait]
impl Evaluator for Unconfigured {
    async fn evaluate_domain(&self, _domain: &str, _opts: serde_json::Value) -> anyhow::Result<DomainEvaluation> {
        Err(anyhow::anyhow!("domain evaluator not configured"))
    }
}

/// Feature flags default closed rather than erroring, so an unconfigured
/// deployment simply skips the gated acquisition/growth flows (spec §4.6,
/// §4.5 "skip the entire job, no error, if the flag is off").
#[async_trait]
impl FeatureFlags for Unconfigured {
    async fn is_enabled(&self, _flag_name: &str) -> bool {
        false
    }
}

#[async_trait]
impl Notifications for Unconfigured {
    async fn create(&self, _user_id: Uuid, _kind: &str, _payload: serde_json::Value) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("notifications service not configured"))
    }
}

#[async_trait]
impl Revisions for Unconfigured {
    async fn create(&self, _article_id: Uuid, _stage: &str, _snapshot: serde_json::Value) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("revisions service not configured"))
    }
}

#[async_trait]
impl ResearchCache for Unconfigured {
    async fn generate(&self, _keyword: &str) -> anyhow::Result<ResearchPayload> {
        Err(anyhow::anyhow!("research cache not configured"))
    }
}

#[async_trait]
impl VideoRenderer for Unconfigured {
    async fn render(&self, _script: &str) -> anyhow::Result<RenderedVideo> {
        Err(anyhow::anyhow!("video renderer not configured"))
    }
}
