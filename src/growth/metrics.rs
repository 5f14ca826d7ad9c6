//! `sync_campaign_metrics` (spec §4.5): fold the campaign's event log into
//! the denormalized `campaigns.metrics` summary.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::executor::JobHandler;
use crate::models::{CampaignMetrics, Job, PromotionEventType};
use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCampaignMetricsPayload {
    pub campaign_id: Uuid,
}

/// Fold a campaign's append-only event log into `CampaignMetrics`. Reads the
/// whole log rather than an aggregate query since this runs off the hot
/// publish path (spec §9 REDESIGN FLAGS scopes the aggregate-query
/// requirement to daily-cap checks, not this periodic rollup).
pub fn fold_metrics(events: &[crate::models::PromotionEvent]) -> CampaignMetrics {
    let mut metrics = CampaignMetrics::default();
    for event in events {
        metrics.total_events += 1;
        if event.event_type == PromotionEventType::Published.as_str() {
            metrics.published += 1;
            if metrics.latest_publish_at.map(|t| t < event.created_at).unwrap_or(true) {
                metrics.latest_publish_at = Some(event.created_at);
            }
        }
        if let Some(attrs) = &event.attributes {
            metrics.clicks += attrs.get("clicks").and_then(|v| v.as_i64()).unwrap_or(0);
            metrics.leads += attrs.get("leads").and_then(|v| v.as_i64()).unwrap_or(0);
            metrics.conversions += attrs.get("conversions").and_then(|v| v.as_i64()).unwrap_or(0);
        }
    }
    metrics
}

pub struct SyncCampaignMetricsHandler;

impl SyncCampaignMetricsHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SyncCampaignMetricsHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl JobHandler for SyncCampaignMetricsHandler {
    async fn handle(&self, job: &Job, store: &dyn Store) -> anyhow::Result<Option<serde_json::Value>> {
        let payload: SyncCampaignMetricsPayload = job.deserialize_payload()?;
        let campaign = store
            .get_campaign(payload.campaign_id)
            .await?
            .ok_or(crate::error::AppError::CampaignNotFound(payload.campaign_id))?;

        let events = store.events_for_campaign(campaign.id).await?;
        let metrics = fold_metrics(&events);

        store
            .upsert_campaign(crate::models::Campaign {
                metrics: Some(serde_json::to_value(&metrics)?),
                updated_at: chrono::Utc::now(),
                ..campaign
            })
            .await?;

        store
            .append_event(
                crate::models::PromotionEvent::builder()
                    .campaign_id(payload.campaign_id)
                    .event_type(PromotionEventType::MetricsSynced.as_str())
                    .build(),
            )
            .await?;

        Ok(Some(serde_json::to_value(&metrics)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PromotionEvent;

    #[test]
    fn folds_published_count_and_latest_timestamp() {
        let events = vec![
            PromotionEvent::builder()
                .campaign_id(Uuid::nil())
                .event_type(PromotionEventType::Published.as_str())
                .build(),
            PromotionEvent::builder()
                .campaign_id(Uuid::nil())
                .event_type(PromotionEventType::PublishSkipped.as_str())
                .build(),
        ];
        let metrics = fold_metrics(&events);
        assert_eq!(metrics.published, 1);
        assert_eq!(metrics.total_events, 2);
        assert!(metrics.latest_publish_at.is_some());
    }
}
