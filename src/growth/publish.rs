//! Growth publish engine (spec §4.5 C6): campaign state machine, per-channel
//! compatibility gate, the 7 ordered publish checks, and event recording.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collab::{ChannelAdapter, Credential, CredentialProvider, CredentialSource, Notifications, PolicyEvaluator, VideoRenderer};
use crate::config::Config;
use crate::executor::JobHandler;
use crate::growth::creative_hash::creative_hash;
use crate::growth::schedule::compute_schedule;
use crate::models::{
    Campaign, CampaignStatus, Channel, Job, JobType, MediaAssetType, PromotionEvent, PromotionEventType, PromotionJob,
    PromotionJobStatus,
};
use crate::store::{NewJob, Store};

fn start_of_utc_day(now: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(now.date_naive().and_hms_opt(0, 0, 0).unwrap(), Utc)
}

fn media_asset_type_for(channel: Channel) -> MediaAssetType {
    match channel {
        Channel::Pinterest => MediaAssetType::PinterestCreative,
        Channel::YoutubeShorts => MediaAssetType::ShortVideo,
    }
}

/// Insert a growth queue job idempotently, keyed by `(jobType, campaignId,
/// channel)` (spec §4.5 "Idempotent enqueue"), and write the paired
/// `promotion_jobs` row when a fresh job is created.
async fn enqueue_growth_job(
    store: &dyn Store,
    job_type: &str,
    campaign_id: Uuid,
    channel: Option<&str>,
    payload: serde_json::Value,
    priority: i32,
    scheduled_for: Option<DateTime<Utc>>,
) -> anyhow::Result<Option<Uuid>> {
    let idempotency_key = match channel {
        Some(c) => format!("{campaign_id}:{c}"),
        None => campaign_id.to_string(),
    };

    let outcome = store
        .enqueue(NewJob {
            priority,
            payload: Some(payload),
            idempotency_key: Some(idempotency_key),
            channel: channel.map(|c| c.to_string()),
            scheduled_for,
            ..NewJob::new(job_type)
        })
        .await?;

    if !outcome.is_created() {
        return Ok(None);
    }

    store
        .insert_promotion_job(
            PromotionJob::builder()
                .queue_job_id(outcome.job_id())
                .campaign_id(campaign_id)
                .job_type(job_type)
                .status(PromotionJobStatus::Pending)
                .build(),
        )
        .await?;

    Ok(Some(outcome.job_id()))
}

async fn append_event(
    store: &dyn Store,
    campaign_id: Uuid,
    event_type: PromotionEventType,
    channel: Option<&str>,
    creative_hash: Option<&str>,
    destination_host: Option<&str>,
    attributes: Option<serde_json::Value>,
) -> anyhow::Result<()> {
    store
        .append_event(
            PromotionEvent::builder()
                .campaign_id(campaign_id)
                .event_type(event_type.as_str())
                .maybe_channel(channel.map(|c| c.to_string()))
                .maybe_creative_hash(creative_hash.map(|c| c.to_string()))
                .maybe_destination_host(destination_host.map(|c| c.to_string()))
                .maybe_attributes(attributes)
                .build(),
        )
        .await
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePromotionPlanPayload {
    pub campaign_id: Uuid,
}

pub struct CreatePromotionPlanHandler {
    config: Arc<Config>,
}

impl CreatePromotionPlanHandler {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl JobHandler for CreatePromotionPlanHandler {
    async fn handle(&self, job: &Job, store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>> {
        let payload: CreatePromotionPlanPayload = job.deserialize_payload()?;
        let campaign = store
            .get_campaign(payload.campaign_id)
            .await?
            .ok_or(crate::error::AppError::CampaignNotFound(payload.campaign_id))?;

        if matches!(campaign.status, CampaignStatus::Cancelled | CampaignStatus::Completed) {
            append_event(store, campaign.id, PromotionEventType::PlanSkipped, None, None, None, Some(serde_json::json!({ "reason": "campaign_not_active" }))).await?;
            return Ok(Some(serde_json::json!({ "campaign_id": campaign.id, "plan": "skipped" })));
        }

        let domain_research = store
            .get_domain_research(campaign.domain_research_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("domain research {} not found", campaign.domain_research_id))?;
        let Some(domain_id) = domain_research.domain_id else {
            append_event(store, campaign.id, PromotionEventType::PlanSkipped, None, None, None, Some(serde_json::json!({ "reason": "no_linked_domain" }))).await?;
            return Ok(Some(serde_json::json!({ "campaign_id": campaign.id, "plan": "skipped" })));
        };

        let mut rng = rand::thread_rng();
        let mut planned_channels = Vec::new();

        for channel in campaign.channel_list() {
            let profile = store.domain_channel_profile(domain_id, channel.as_str()).await?;
            let Some(profile) = profile.filter(|p| p.is_publishable()) else {
                append_event(
                    store,
                    campaign.id,
                    PromotionEventType::PlanSkipped,
                    Some(channel.as_str()),
                    None,
                    None,
                    Some(serde_json::json!({ "reason": "channel_blocked_or_disabled" })),
                )
                .await?;
                continue;
            };

            let computed = compute_schedule(
                &profile,
                self.config.growth_default_min_jitter_minutes,
                self.config.growth_default_max_jitter_minutes,
                self.config.growth_default_quiet_hours_start,
                self.config.growth_default_quiet_hours_end,
                Utc::now(),
                &mut rng,
            );

            let next_job_type = match channel {
                Channel::Pinterest => JobType::PublishPinterestPin,
                Channel::YoutubeShorts => JobType::GenerateShortScript,
            };

            let created = enqueue_growth_job(
                store,
                next_job_type.as_str(),
                campaign.id,
                Some(channel.as_str()),
                serde_json::json!({ "campaign_id": campaign.id, "channel": channel.as_str() }),
                job.priority,
                Some(computed.scheduled_for),
            )
            .await?;

            if created.is_some() {
                planned_channels.push(channel.as_str());
                append_event(
                    store,
                    campaign.id,
                    PromotionEventType::PlanCreated,
                    Some(channel.as_str()),
                    None,
                    None,
                    Some(serde_json::json!({ "scheduled_for": computed.scheduled_for, "moved_out_of_quiet_hours": computed.moved_out_of_quiet_hours })),
                )
                .await?;
            }
        }

        if campaign.status == CampaignStatus::Draft {
            store
                .upsert_campaign(Campaign {
                    status: CampaignStatus::Active,
                    ..campaign
                })
                .await?;
        }

        Ok(Some(serde_json::json!({ "campaign_id": payload.campaign_id, "planned_channels": planned_channels })))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishStagePayload {
    pub campaign_id: Uuid,
    pub channel: String,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub asset_url: Option<String>,
    #[serde(default)]
    pub creative_hash: Option<String>,
    #[serde(default)]
    pub media_asset_id: Option<Uuid>,
}

struct PublishContext<'a> {
    store: &'a dyn Store,
    channel_adapter: &'a dyn ChannelAdapter,
    policy_evaluator: &'a dyn PolicyEvaluator,
    credentials: &'a dyn CredentialProvider,
    notifications: &'a dyn Notifications,
    config: &'a Config,
}

/// The 7 ordered per-publish checks (spec §4.5). Returns `Ok(Some(skip_reason))`
/// when a check blocks publication short of actually calling the adapter.
async fn run_publish_checks(
    ctx: &PublishContext<'_>,
    campaign: &Campaign,
    domain_id: Uuid,
    domain: &str,
    channel: Channel,
    copy: &str,
    destination_url: &str,
) -> anyhow::Result<Result<crate::collab::PolicyEvaluation, String>> {
    if campaign.status != CampaignStatus::Active {
        return Ok(Err("campaign_not_active".to_string()));
    }

    let profile = ctx.store.domain_channel_profile(domain_id, channel.as_str()).await?;
    let Some(profile) = profile else {
        return Ok(Err("channel_blocked".to_string()));
    };
    if !profile.is_publishable() {
        return Ok(Err(if profile.enabled { "channel_blocked".to_string() } else { "channel_disabled".to_string() }));
    }

    let day_start = start_of_utc_day(Utc::now());
    let campaign_cap = campaign.effective_daily_cap(ctx.config.growth_default_daily_cap);
    let campaign_count = ctx.store.count_published_events(campaign.id, None, day_start).await?;
    if campaign_count >= campaign_cap as i64 {
        return Ok(Err("campaign_daily_cap_reached".to_string()));
    }

    if let Some(channel_cap) = profile.daily_cap {
        let channel_count = ctx.store.count_published_events(campaign.id, Some(channel.as_str()), day_start).await?;
        if channel_count >= channel_cap as i64 {
            return Ok(Err("channel_daily_cap_reached".to_string()));
        }
    }

    let cooldown_since = Utc::now() - chrono::Duration::hours(ctx.config.growth_cooldown_hours);
    let today = Utc::now().format("%Y-%m-%d").to_string();
    let hash = creative_hash(campaign.id, domain, channel.as_str(), &today, None);

    if ctx
        .store
        .duplicate_creative_published(campaign.id, channel.as_str(), &hash, cooldown_since)
        .await?
    {
        return Ok(Err("duplicate_creative".to_string()));
    }

    if ctx
        .store
        .domain_cooldown_published(campaign.domain_research_id, channel.as_str(), cooldown_since)
        .await?
    {
        return Ok(Err("domain_cooldown".to_string()));
    }

    let evaluation = ctx.policy_evaluator.evaluate(channel.as_str(), copy, destination_url).await?;
    Ok(Ok(evaluation))
}

async fn execute_publish(
    ctx: &PublishContext<'_>,
    campaign: &Campaign,
    domain_id: Uuid,
    domain: &str,
    channel: Channel,
    payload: &PublishStagePayload,
    evaluation: crate::collab::PolicyEvaluation,
    launched_by: &str,
) -> anyhow::Result<serde_json::Value> {
    if !evaluation.allowed {
        append_event(
            ctx.store,
            campaign.id,
            PromotionEventType::PublishBlocked,
            Some(channel.as_str()),
            None,
            evaluation.destination_host.as_deref(),
            Some(serde_json::json!({ "reasons": evaluation.block_reasons })),
        )
        .await?;
        enqueue_growth_job(
            ctx.store,
            JobType::SyncCampaignMetrics.as_str(),
            campaign.id,
            None,
            serde_json::json!({ "campaign_id": campaign.id }),
            0,
            None,
        )
        .await?;
        if evaluation
            .block_reasons
            .iter()
            .any(|r| r.contains("destination") || r.contains("quality"))
        {
            if let Some(domain_research) = ctx.store.get_domain_research(campaign.domain_research_id).await? {
                if let Some(owner) = domain_research.domain_id {
                    let _ = ctx
                        .notifications
                        .create(owner, "growth_policy_block", serde_json::json!({ "campaign_id": campaign.id }))
                        .await;
                }
            }
        }
        crate::growth::integrity::evaluate_and_notify(
            ctx.store,
            ctx.notifications,
            campaign.id,
            campaign.domain_research_id,
            ctx.config,
        )
        .await?;
        return Ok(serde_json::json!({ "published": false, "reason": "policy_blocked" }));
    }

    let today = Utc::now().format("%Y-%m-%d").to_string();
    let hash = creative_hash(campaign.id, domain, channel.as_str(), &today, payload.creative_hash.as_deref());

    let asset_type = media_asset_type_for(channel);
    let media_asset = match payload.media_asset_id {
        Some(id) => Some(id),
        None => ctx.store.least_used_media_asset(domain_id, asset_type).await?.map(|a| a.id),
    };

    let credential = ctx
        .credentials
        .resolve(domain_id, channel.as_str())
        .await?
        .unwrap_or_else(|| Credential {
            source: CredentialSource::Environment,
            token: format!("env:{}", channel.as_str()),
        });

    let adapter_payload = serde_json::json!({
        "campaign_id": campaign.id,
        "copy": evaluation.normalized_copy,
        "asset_url": payload.asset_url,
        "script": payload.script,
    });
    let result = ctx.channel_adapter.publish(channel.as_str(), adapter_payload, &credential).await?;

    append_event(
        ctx.store,
        campaign.id,
        PromotionEventType::Published,
        Some(channel.as_str()),
        Some(&hash),
        evaluation.destination_host.as_deref(),
        Some(serde_json::json!({
            "external_post_id": result.external_post_id,
            "status": result.status,
            "media_asset_id": media_asset,
            "destination_risk_score": evaluation.destination_risk_score,
            "credential_source": credential.source,
            "policy_pack_id": evaluation.policy_pack_id,
            "policy_pack_version": evaluation.policy_pack_version,
            "checks_applied": evaluation.checks_applied,
            "warnings": evaluation.warnings,
            "changes": evaluation.changes,
            "launched_by": launched_by,
        })),
    )
    .await?;

    if let Some(asset_id) = media_asset {
        ctx.store.record_media_usage(asset_id, campaign.id, channel.as_str()).await?;
    }

    enqueue_growth_job(
        ctx.store,
        JobType::SyncCampaignMetrics.as_str(),
        campaign.id,
        None,
        serde_json::json!({ "campaign_id": campaign.id }),
        0,
        None,
    )
    .await?;

    crate::growth::integrity::evaluate_and_notify(
        ctx.store,
        ctx.notifications,
        campaign.id,
        campaign.domain_research_id,
        ctx.config,
    )
    .await?;

    Ok(serde_json::json!({ "published": true, "creative_hash": hash }))
}

async fn load_campaign_and_domain(store: &dyn Store, campaign_id: Uuid) -> anyhow::Result<(Campaign, Uuid, String)> {
    let campaign = store
        .get_campaign(campaign_id)
        .await?
        .ok_or(crate::error::AppError::CampaignNotFound(campaign_id))?;
    let domain_research = store
        .get_domain_research(campaign.domain_research_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("domain research {} not found", campaign.domain_research_id))?;
    let domain_id = domain_research
        .domain_id
        .ok_or_else(|| anyhow::anyhow!("domain research has no linked domain yet"))?;
    Ok((campaign, domain_id, domain_research.domain))
}

pub struct PublishPinterestPinHandler {
    channel_adapter: Arc<dyn ChannelAdapter>,
    policy_evaluator: Arc<dyn PolicyEvaluator>,
    credentials: Arc<dyn CredentialProvider>,
    notifications: Arc<dyn Notifications>,
    config: Arc<Config>,
}

impl PublishPinterestPinHandler {
    pub fn new(
        channel_adapter: Arc<dyn ChannelAdapter>,
        policy_evaluator: Arc<dyn PolicyEvaluator>,
        credentials: Arc<dyn CredentialProvider>,
        notifications: Arc<dyn Notifications>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            channel_adapter,
            policy_evaluator,
            credentials,
            notifications,
            config,
        }
    }
}

#[async_trait::async_trait]
impl JobHandler for PublishPinterestPinHandler {
    async fn handle(&self, job: &Job, store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>> {
        let payload: PublishStagePayload = job.deserialize_payload()?;
        let (campaign, domain_id, domain) = load_campaign_and_domain(store, payload.campaign_id).await?;
        let channel = Channel::Pinterest;

        let ctx = PublishContext {
            store,
            channel_adapter: self.channel_adapter.as_ref(),
            policy_evaluator: self.policy_evaluator.as_ref(),
            credentials: self.credentials.as_ref(),
            notifications: self.notifications.as_ref(),
            config: &self.config,
        };

        let copy = format!("Check out {domain}");
        let destination_url = format!("https://{domain}");

        match run_publish_checks(&ctx, &campaign, domain_id, &domain, channel, &copy, &destination_url).await? {
            Err(reason) => {
                append_event(store, campaign.id, PromotionEventType::PublishSkipped, Some(channel.as_str()), None, None, Some(serde_json::json!({ "reason": reason }))).await?;
                Ok(Some(serde_json::json!({ "published": false, "reason": reason })))
            }
            Ok(evaluation) => Ok(Some(execute_publish(&ctx, &campaign, domain_id, &domain, channel, &payload, evaluation, job.job_type.as_str()).await?)),
        }
    }
}

pub struct PublishYoutubeShortHandler {
    channel_adapter: Arc<dyn ChannelAdapter>,
    policy_evaluator: Arc<dyn PolicyEvaluator>,
    credentials: Arc<dyn CredentialProvider>,
    notifications: Arc<dyn Notifications>,
    config: Arc<Config>,
}

impl PublishYoutubeShortHandler {
    pub fn new(
        channel_adapter: Arc<dyn ChannelAdapter>,
        policy_evaluator: Arc<dyn PolicyEvaluator>,
        credentials: Arc<dyn CredentialProvider>,
        notifications: Arc<dyn Notifications>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            channel_adapter,
            policy_evaluator,
            credentials,
            notifications,
            config,
        }
    }
}

#[async_trait::async_trait]
impl JobHandler for PublishYoutubeShortHandler {
    async fn handle(&self, job: &Job, store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>> {
        let payload: PublishStagePayload = job.deserialize_payload()?;
        let (campaign, domain_id, domain) = load_campaign_and_domain(store, payload.campaign_id).await?;
        let channel = Channel::YoutubeShorts;

        let ctx = PublishContext {
            store,
            channel_adapter: self.channel_adapter.as_ref(),
            policy_evaluator: self.policy_evaluator.as_ref(),
            credentials: self.credentials.as_ref(),
            notifications: self.notifications.as_ref(),
            config: &self.config,
        };

        let copy = payload.script.clone().unwrap_or_else(|| format!("Check out {domain}"));
        let destination_url = format!("https://{domain}");

        match run_publish_checks(&ctx, &campaign, domain_id, &domain, channel, &copy, &destination_url).await? {
            Err(reason) => {
                append_event(store, campaign.id, PromotionEventType::PublishSkipped, Some(channel.as_str()), None, None, Some(serde_json::json!({ "reason": reason }))).await?;
                Ok(Some(serde_json::json!({ "published": false, "reason": reason })))
            }
            Ok(evaluation) => Ok(Some(execute_publish(&ctx, &campaign, domain_id, &domain, channel, &payload, evaluation, job.job_type.as_str()).await?)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateShortScriptPayload {
    pub campaign_id: Uuid,
    pub channel: String,
}

pub struct GenerateShortScriptHandler {
    ai: Arc<dyn crate::collab::AiClient>,
}

impl GenerateShortScriptHandler {
    pub fn new(ai: Arc<dyn crate::collab::AiClient>) -> Self {
        Self { ai }
    }
}

#[async_trait::async_trait]
impl JobHandler for GenerateShortScriptHandler {
    async fn handle(&self, job: &Job, store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>> {
        let payload: GenerateShortScriptPayload = job.deserialize_payload()?;
        let campaign = store
            .get_campaign(payload.campaign_id)
            .await?
            .ok_or(crate::error::AppError::CampaignNotFound(payload.campaign_id))?;

        let generation = self
            .ai
            .generate("generate_short_script", &format!("Write a 30-second video script promoting campaign {}", campaign.id))
            .await?;
        store
            .insert_api_call_log(crate::collab::ApiCallLog::from_generation(None, "generate_short_script", &generation))
            .await?;

        append_event(
            store,
            campaign.id,
            PromotionEventType::ScriptGenerated,
            Some(payload.channel.as_str()),
            None,
            None,
            None,
        )
        .await?;

        enqueue_growth_job(
            store,
            JobType::RenderShortVideo.as_str(),
            campaign.id,
            Some(&payload.channel),
            serde_json::json!({ "campaign_id": campaign.id, "channel": payload.channel, "script": generation.content }),
            job.priority,
            None,
        )
        .await?;

        Ok(Some(serde_json::json!({ "campaign_id": campaign.id, "script_generated": true })))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderShortVideoPayload {
    pub campaign_id: Uuid,
    pub channel: String,
    pub script: String,
}

pub struct RenderShortVideoHandler {
    renderer: Arc<dyn VideoRenderer>,
}

impl RenderShortVideoHandler {
    pub fn new(renderer: Arc<dyn VideoRenderer>) -> Self {
        Self { renderer }
    }
}

#[async_trait::async_trait]
impl JobHandler for RenderShortVideoHandler {
    async fn handle(&self, job: &Job, store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>> {
        let payload: RenderShortVideoPayload = job.deserialize_payload()?;
        let rendered = self.renderer.render(&payload.script).await?;

        append_event(
            store,
            payload.campaign_id,
            PromotionEventType::VideoRendered,
            Some(payload.channel.as_str()),
            None,
            None,
            Some(serde_json::json!({ "duration_seconds": rendered.duration_seconds })),
        )
        .await?;

        enqueue_growth_job(
            store,
            JobType::PublishYoutubeShort.as_str(),
            payload.campaign_id,
            Some(&payload.channel),
            serde_json::json!({
                "campaign_id": payload.campaign_id,
                "channel": payload.channel,
                "script": payload.script,
                "asset_url": rendered.asset_url,
            }),
            job.priority,
            None,
        )
        .await?;

        Ok(Some(serde_json::json!({ "campaign_id": payload.campaign_id, "rendered": true })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_asset_type_matches_channel() {
        assert_eq!(media_asset_type_for(Channel::Pinterest), MediaAssetType::PinterestCreative);
        assert_eq!(media_asset_type_for(Channel::YoutubeShorts), MediaAssetType::ShortVideo);
    }

    #[test]
    fn utc_day_start_truncates_time() {
        let now = Utc::now();
        let start = start_of_utc_day(now);
        assert_eq!(start.date_naive(), now.date_naive());
        assert_eq!(start.format("%H:%M:%S").to_string(), "00:00:00");
    }
}
