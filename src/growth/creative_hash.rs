//! Creative hash: deterministic fingerprint for duplicate-publish detection
//! (spec §4.5 "Creative hash", glossary).

use sha2::{Digest, Sha256};
use uuid::Uuid;

const TRUNCATE_LEN: usize = 24;

/// SHA-256 over `"{campaignId}:{domain}:{channel}:{utcDay}"` truncated to
/// 24 hex chars, unless the caller supplied an explicit hash.
pub fn creative_hash(campaign_id: Uuid, domain: &str, channel: &str, utc_day: &str, explicit: Option<&str>) -> String {
    if let Some(h) = explicit {
        return h.to_string();
    }
    let input = format!("{campaign_id}:{domain}:{channel}:{utc_day}");
    let digest = Sha256::digest(input.as_bytes());
    let hex = hex::encode(digest);
    hex[..TRUNCATE_LEN.min(hex.len())].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_truncated() {
        let id = Uuid::nil();
        let a = creative_hash(id, "example.com", "pinterest", "2026-07-28", None);
        let b = creative_hash(id, "example.com", "pinterest", "2026-07-28", None);
        assert_eq!(a, b);
        assert_eq!(a.len(), 24);
    }

    #[test]
    fn different_days_hash_differently() {
        let id = Uuid::nil();
        let a = creative_hash(id, "example.com", "pinterest", "2026-07-28", None);
        let b = creative_hash(id, "example.com", "pinterest", "2026-07-29", None);
        assert_ne!(a, b);
    }

    #[test]
    fn explicit_hash_wins() {
        assert_eq!(
            creative_hash(Uuid::nil(), "x", "pinterest", "2026-07-28", Some("explicit-hash")),
            "explicit-hash"
        );
    }
}
