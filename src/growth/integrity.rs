//! Growth integrity alerting (spec §4.5 "Evaluate integrity alerts", §6
//! thresholds, §8: "Integrity alert fires once per campaign when
//! destination-host concentration ratio exceeds threshold with >= min
//! samples"). Grounded on `metrics.rs`'s fold-event-log-into-summary
//! pattern; this is the same shape applied to a pass/fail check instead of
//! a running count.

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::collab::Notifications;
use crate::config::Config;
use crate::models::{PromotionEvent, PromotionEventType};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq)]
pub struct IntegrityAlert {
    pub campaign_id: Uuid,
    pub reason: &'static str,
    pub top_host: Option<String>,
    pub concentration_ratio: f64,
    pub blocked_ratio: f64,
    pub sample_count: i64,
}

/// Evaluate whether this campaign's recent publish activity warrants an
/// integrity alert, and record one `integrity_alert` event if so. A prior
/// alert still within the window suppresses a repeat (spec: "fires once
/// per campaign").
pub async fn evaluate_integrity_alerts(
    store: &dyn Store,
    campaign_id: Uuid,
    config: &Config,
) -> anyhow::Result<Option<IntegrityAlert>> {
    let since = Utc::now() - chrono::Duration::hours(config.growth_integrity_alert_window_hours);
    let events = store.events_for_campaign_since(campaign_id, since).await?;

    if events.iter().any(|e| e.event_type == PromotionEventType::IntegrityAlert.as_str()) {
        return Ok(None);
    }

    let published: Vec<&PromotionEvent> =
        events.iter().filter(|e| e.event_type == PromotionEventType::Published.as_str()).collect();
    let blocked_count =
        events.iter().filter(|e| e.event_type == PromotionEventType::PublishBlocked.as_str()).count() as i64;
    let sample_count = published.len() as i64 + blocked_count;

    if sample_count < config.growth_integrity_min_samples {
        return Ok(None);
    }

    let mut host_counts: HashMap<String, i64> = HashMap::new();
    for event in &published {
        if let Some(host) = &event.destination_host {
            *host_counts.entry(host.clone()).or_insert(0) += 1;
        }
    }
    let hosted_total = host_counts.values().sum::<i64>();
    let (top_host, top_count) = host_counts
        .iter()
        .max_by_key(|(_, count)| **count)
        .map(|(host, count)| (Some(host.clone()), *count))
        .unwrap_or((None, 0));
    let concentration_ratio = if hosted_total > 0 { top_count as f64 / hosted_total as f64 } else { 0.0 };
    let blocked_ratio = blocked_count as f64 / sample_count as f64;

    let concentration_triggered =
        hosted_total >= config.growth_integrity_min_samples && concentration_ratio > config.growth_integrity_host_concentration_threshold;
    let blocked_triggered = blocked_ratio > config.growth_integrity_blocked_ratio_threshold;

    if !concentration_triggered && !blocked_triggered {
        return Ok(None);
    }

    let reason = if concentration_triggered && blocked_triggered {
        "host_concentration_and_blocked_rate"
    } else if concentration_triggered {
        "host_concentration"
    } else {
        "blocked_rate"
    };

    let alert = IntegrityAlert {
        campaign_id,
        reason,
        top_host: top_host.clone(),
        concentration_ratio,
        blocked_ratio,
        sample_count,
    };

    store
        .append_event(
            PromotionEvent::builder()
                .campaign_id(campaign_id)
                .event_type(PromotionEventType::IntegrityAlert.as_str())
                .maybe_destination_host(top_host)
                .attributes(serde_json::json!({
                    "reason": reason,
                    "concentration_ratio": concentration_ratio,
                    "blocked_ratio": blocked_ratio,
                    "sample_count": sample_count,
                }))
                .build(),
        )
        .await?;

    Ok(Some(alert))
}

/// Notify the domain owner when an alert fires, mirroring the policy-block
/// notification path in `publish.rs`.
pub async fn notify_integrity_alert(
    store: &dyn Store,
    notifications: &dyn Notifications,
    domain_research_id: Uuid,
    alert: &IntegrityAlert,
) -> anyhow::Result<()> {
    if let Some(domain_research) = store.get_domain_research(domain_research_id).await? {
        if let Some(owner) = domain_research.domain_id {
            notifications
                .create(
                    owner,
                    "growth_integrity_alert",
                    serde_json::json!({
                        "campaign_id": alert.campaign_id,
                        "reason": alert.reason,
                        "concentration_ratio": alert.concentration_ratio,
                        "blocked_ratio": alert.blocked_ratio,
                    }),
                )
                .await?;
        }
    }
    Ok(())
}

/// Evaluate and notify in one step, used from the publish handlers at both
/// call sites spec §4.5 names ("Evaluate integrity alerts" after a policy
/// block, and again after a successful publish).
pub async fn evaluate_and_notify(
    store: &dyn Store,
    notifications: &dyn Notifications,
    campaign_id: Uuid,
    domain_research_id: Uuid,
    config: &Config,
) -> anyhow::Result<Option<IntegrityAlert>> {
    let alert = evaluate_integrity_alerts(store, campaign_id, config).await?;
    if let Some(alert) = &alert {
        notify_integrity_alert(store, notifications, domain_research_id, alert).await?;
    }
    Ok(alert)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fake::FakeStore;

    fn event(campaign_id: Uuid, event_type: PromotionEventType, host: Option<&str>) -> PromotionEvent {
        PromotionEvent::builder()
            .campaign_id(campaign_id)
            .event_type(event_type.as_str())
            .maybe_destination_host(host.map(|h| h.to_string()))
            .build()
    }

    #[tokio::test]
    async fn fires_on_host_concentration_with_enough_samples() {
        let store = FakeStore::new();
        let campaign_id = Uuid::new_v4();
        let config = Config::default();

        for _ in 0..5 {
            store.append_event(event(campaign_id, PromotionEventType::Published, Some("dominant.example"))).await.unwrap();
        }

        let alert = evaluate_integrity_alerts(&store, campaign_id, &config).await.unwrap();
        assert!(alert.is_some());
        let alert = alert.unwrap();
        assert_eq!(alert.reason, "host_concentration");
        assert_eq!(alert.top_host.as_deref(), Some("dominant.example"));
    }

    #[tokio::test]
    async fn does_not_fire_below_min_samples() {
        let store = FakeStore::new();
        let campaign_id = Uuid::new_v4();
        let config = Config::default();

        for _ in 0..2 {
            store.append_event(event(campaign_id, PromotionEventType::Published, Some("dominant.example"))).await.unwrap();
        }

        let alert = evaluate_integrity_alerts(&store, campaign_id, &config).await.unwrap();
        assert!(alert.is_none());
    }

    #[tokio::test]
    async fn fires_only_once_per_window() {
        let store = FakeStore::new();
        let campaign_id = Uuid::new_v4();
        let config = Config::default();

        for _ in 0..5 {
            store.append_event(event(campaign_id, PromotionEventType::Published, Some("dominant.example"))).await.unwrap();
        }

        let first = evaluate_integrity_alerts(&store, campaign_id, &config).await.unwrap();
        assert!(first.is_some());
        let second = evaluate_integrity_alerts(&store, campaign_id, &config).await.unwrap();
        assert!(second.is_none(), "a prior in-window alert must suppress a repeat");
    }

    #[tokio::test]
    async fn fires_on_high_blocked_ratio() {
        let store = FakeStore::new();
        let campaign_id = Uuid::new_v4();
        let config = Config::default();

        store.append_event(event(campaign_id, PromotionEventType::Published, Some("a.example"))).await.unwrap();
        store.append_event(event(campaign_id, PromotionEventType::Published, Some("b.example"))).await.unwrap();
        for _ in 0..4 {
            store.append_event(event(campaign_id, PromotionEventType::PublishBlocked, None)).await.unwrap();
        }

        let alert = evaluate_integrity_alerts(&store, campaign_id, &config).await.unwrap();
        assert!(alert.is_some());
        assert_eq!(alert.unwrap().reason, "blocked_rate");
    }
}
