//! Acquisition underwriting records (`domainResearch`, spec §3, §4.6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "underwriting_decision", rename_all = "snake_case")]
pub enum UnderwritingDecision {
    #[default]
    Researching,
    Buy,
    Watchlist,
    Pass,
    Bought,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UnderwritingSnapshot {
    pub demand_score: f64,
    pub comps_score: f64,
    pub risk_score: f64,
    pub confidence: f64,
    pub max_bid_cents: i64,
    pub hard_fail_reason: Option<String>,
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct DomainResearch {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub domain: String,
    pub tld: String,

    #[builder(default, setter(strip_option))]
    pub list_price_cents: Option<i64>,
    #[builder(default, setter(strip_option))]
    pub auction_end_at: Option<DateTime<Utc>>,

    #[builder(default, setter(strip_option))]
    pub evaluation: Option<serde_json::Value>,

    #[builder(default)]
    pub decision: UnderwritingDecision,
    #[builder(default, setter(strip_option))]
    pub hard_fail_reason: Option<String>,
    #[builder(default = 1)]
    pub underwriting_version: i32,

    #[builder(default, setter(strip_option))]
    pub domain_id: Option<Uuid>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

/// Acquisition event log (spec §6 persisted-state layout:
/// `acquisition_events`).
#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct AcquisitionEvent {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub domain_research_id: Uuid,
    pub event_type: String,

    #[builder(default, setter(strip_option))]
    pub attributes: Option<serde_json::Value>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

/// One of {buy_now, auction_bid, watchlist, pass} with the increment table
/// from spec §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidPlanKind {
    BuyNow,
    AuctionBid,
    Watchlist,
    Pass,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidPlan {
    pub kind: BidPlanKind,
    pub bid_increment_cents: Option<i64>,
    pub max_bid_cents: Option<i64>,
}

/// Bid increment table: `<$50 -> $5, <$200 -> $10, <$500 -> $25, else $50`.
pub fn bid_increment_cents(max_bid_cents: i64) -> i64 {
    match max_bid_cents {
        n if n < 5_000 => 500,
        n if n < 20_000 => 1_000,
        n if n < 50_000 => 2_500,
        _ => 5_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bid_increment_table_matches_spec_breakpoints() {
        assert_eq!(bid_increment_cents(4_999), 500);
        assert_eq!(bid_increment_cents(5_000), 1_000);
        assert_eq!(bid_increment_cents(19_999), 1_000);
        assert_eq!(bid_increment_cents(20_000), 2_500);
        assert_eq!(bid_increment_cents(49_999), 2_500);
        assert_eq!(bid_increment_cents(50_000), 5_000);
        assert_eq!(bid_increment_cents(1_000_000), 5_000);
    }
}
