//! Growth publish engine (spec §4.5, C6): campaign promotion planning,
//! per-channel publish checks, and metrics rollup.

pub mod creative_hash;
pub mod integrity;
pub mod metrics;
pub mod publish;
pub mod schedule;

use std::sync::Arc;

use crate::collab::{AiClient, ChannelAdapter, CredentialProvider, Notifications, PolicyEvaluator, VideoRenderer};
use crate::config::Config;
use crate::executor::JobExecutor;
use crate::models::JobType;

/// Register all 6 growth-channel handlers on an executor (spec §4.5 growth
/// pipeline), mirroring `handlers::register_pipeline_handlers`'s shape.
pub fn register_growth_handlers(
    executor: &mut JobExecutor,
    ai: Arc<dyn AiClient>,
    channel_adapter: Arc<dyn ChannelAdapter>,
    policy_evaluator: Arc<dyn PolicyEvaluator>,
    credentials: Arc<dyn CredentialProvider>,
    notifications: Arc<dyn Notifications>,
    video_renderer: Arc<dyn VideoRenderer>,
    config: Arc<Config>,
) {
    executor.register(
        JobType::CreatePromotionPlan.as_str(),
        Arc::new(publish::CreatePromotionPlanHandler::new(config.clone())),
    );
    executor.register(
        JobType::PublishPinterestPin.as_str(),
        Arc::new(publish::PublishPinterestPinHandler::new(
            channel_adapter.clone(),
            policy_evaluator.clone(),
            credentials.clone(),
            notifications.clone(),
            config.clone(),
        )),
    );
    executor.register(
        JobType::PublishYoutubeShort.as_str(),
        Arc::new(publish::PublishYoutubeShortHandler::new(
            channel_adapter,
            policy_evaluator,
            credentials,
            notifications,
            config,
        )),
    );
    executor.register(
        JobType::GenerateShortScript.as_str(),
        Arc::new(publish::GenerateShortScriptHandler::new(ai)),
    );
    executor.register(
        JobType::RenderShortVideo.as_str(),
        Arc::new(publish::RenderShortVideoHandler::new(video_renderer)),
    );
    executor.register(
        JobType::SyncCampaignMetrics.as_str(),
        Arc::new(metrics::SyncCampaignMetricsHandler::new()),
    );
}
