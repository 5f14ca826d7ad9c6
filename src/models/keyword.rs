//! Keyword opportunities discovered by the `keyword_research` stage
//! (spec §4.4 stage 1: "generate N keyword opportunities, insert them").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct KeywordOpportunity {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub domain_id: Uuid,
    pub keyword: String,
    pub volume: i64,
    pub difficulty: f64,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

impl KeywordOpportunity {
    /// The ranking metric named in spec §4.4: "highest volume/difficulty
    /// ratio". A zero or negative difficulty is treated as the lowest
    /// possible ratio rather than dividing by zero.
    pub fn volume_to_difficulty_ratio(&self) -> f64 {
        if self.difficulty <= 0.0 {
            return f64::MIN;
        }
        self.volume as f64 / self.difficulty
    }

    pub fn best_of(candidates: &[KeywordOpportunity]) -> Option<&KeywordOpportunity> {
        candidates.iter().max_by(|a, b| {
            a.volume_to_difficulty_ratio()
                .partial_cmp(&b.volume_to_difficulty_ratio())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_of_picks_highest_ratio() {
        let domain_id = Uuid::new_v4();
        let low = KeywordOpportunity::builder()
            .domain_id(domain_id)
            .keyword("low ratio")
            .volume(100i64)
            .difficulty(50.0)
            .build();
        let high = KeywordOpportunity::builder()
            .domain_id(domain_id)
            .keyword("high ratio")
            .volume(1000i64)
            .difficulty(10.0)
            .build();
        let best = KeywordOpportunity::best_of(&[low.clone(), high.clone()]).unwrap();
        assert_eq!(best.keyword, "high ratio");
    }
}
