//! Content scheduler (spec §4.7, C8): seeds new pipelines per active
//! domain on a bucket-specific human-like cadence, using a stable seeded
//! RNG so the same domain/day combination always produces the same
//! schedule (spec §9 open question: the seeded variant, not `Math.random`,
//! is the one this crate implements).

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::models::{Domain, DomainBucket, JobType};
use crate::store::{NewJob, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Sporadic,
}

impl Frequency {
    fn parse(s: &str) -> Option<Frequency> {
        match s {
            "daily" => Some(Frequency::Daily),
            "weekly" => Some(Frequency::Weekly),
            "sporadic" => Some(Frequency::Sporadic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    Morning,
    Evening,
    Random,
}

impl TimeWindow {
    fn parse(s: &str) -> Option<TimeWindow> {
        match s {
            "morning" => Some(TimeWindow::Morning),
            "evening" => Some(TimeWindow::Evening),
            "random" => Some(TimeWindow::Random),
            _ => None,
        }
    }

    /// Hour range for this window (spec §4.7: "morning -> 6-10; evening ->
    /// 17-22; random -> weighted window pick"). `Random` itself picks
    /// uniformly across the full day since it has no fixed range.
    fn hour_range(&self) -> (u32, u32) {
        match self {
            TimeWindow::Morning => (6, 10),
            TimeWindow::Evening => (17, 22),
            TimeWindow::Random => (0, 23),
        }
    }
}

/// A bucket-specific cadence profile (spec §4.7). `time_windows` is a
/// weighted list used when the domain's own schedule names `"random"`.
#[derive(Debug, Clone)]
pub struct BucketCadenceProfile {
    pub fallback_frequency: Frequency,
    pub time_windows: Vec<(TimeWindow, f64)>,
    pub gap_multiplier: f64,
    pub phase_shift_hours: i32,
}

/// The four bucket cadence profiles (spec §4.7: "Pick a
/// `BucketCadenceProfile` from `bucket` (default `build`)").
pub fn profile_for_bucket(bucket: DomainBucket) -> BucketCadenceProfile {
    match bucket {
        DomainBucket::Build => BucketCadenceProfile {
            fallback_frequency: Frequency::Weekly,
            time_windows: vec![(TimeWindow::Morning, 0.5), (TimeWindow::Evening, 0.5)],
            gap_multiplier: 1.0,
            phase_shift_hours: 0,
        },
        DomainBucket::Redirect => BucketCadenceProfile {
            fallback_frequency: Frequency::Sporadic,
            time_windows: vec![(TimeWindow::Evening, 0.7), (TimeWindow::Morning, 0.3)],
            gap_multiplier: 1.6,
            phase_shift_hours: 2,
        },
        DomainBucket::Park => BucketCadenceProfile {
            fallback_frequency: Frequency::Sporadic,
            time_windows: vec![(TimeWindow::Random, 1.0)],
            gap_multiplier: 2.5,
            phase_shift_hours: 0,
        },
        DomainBucket::Defensive => BucketCadenceProfile {
            fallback_frequency: Frequency::Sporadic,
            time_windows: vec![(TimeWindow::Morning, 1.0)],
            gap_multiplier: 3.0,
            phase_shift_hours: -3,
        },
    }
}

/// Deterministic per-domain-per-day RNG seeded from
/// `"{domainId}:{domain}:{bucket}:{YYYY-MM-DD}"` via SHA-256, the same
/// construction as `growth::creative_hash` (spec §4.7, §9 open question:
/// the seeded variant, not `Math.random`).
fn seeded_rng(domain_id: uuid::Uuid, domain: &str, bucket: DomainBucket, today: &str) -> ChaCha8Rng {
    let input = format!("{domain_id}:{domain}:{bucket:?}:{today}");
    let digest = Sha256::digest(input.as_bytes());
    let mut seed_bytes = [0u8; 32];
    seed_bytes.copy_from_slice(&digest);
    ChaCha8Rng::from_seed(seed_bytes)
}

/// `gapDays` formula per frequency, multiplied by the profile's
/// `gapMultiplier` (spec §4.7).
fn gap_days(frequency: Frequency, gap_multiplier: f64, rng: &mut impl Rng) -> f64 {
    let base = match frequency {
        Frequency::Daily => 0.75 + rng.gen::<f64>() * 0.9,
        Frequency::Weekly => 5.5 + rng.gen::<f64>() * 3.5,
        Frequency::Sporadic => 1.5 + rng.gen::<f64>() * 4.5,
    };
    base * gap_multiplier
}

fn weighted_pick(windows: &[(TimeWindow, f64)], rng: &mut impl Rng) -> TimeWindow {
    let total: f64 = windows.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return TimeWindow::Random;
    }
    let mut roll = rng.gen::<f64>() * total;
    for (window, weight) in windows {
        if roll < *weight {
            return *window;
        }
        roll -= weight;
    }
    windows.last().map(|(w, _)| *w).unwrap_or(TimeWindow::Random)
}

/// Resolve the `frequency`/`timeOfDay` pair from the domain's own
/// `content_config.schedule`, falling back to the profile (spec §4.7).
fn resolve_frequency_and_window(domain: &Domain, profile: &BucketCadenceProfile) -> (Frequency, Option<TimeWindow>) {
    let schedule = domain.content_schedule();
    let frequency = schedule
        .as_ref()
        .and_then(|s| s.frequency.as_deref())
        .and_then(Frequency::parse)
        .unwrap_or(profile.fallback_frequency);
    let window = schedule.as_ref().and_then(|s| s.time_of_day.as_deref()).and_then(TimeWindow::parse);
    (frequency, window)
}

/// Compute the next `scheduledFor` for one domain (spec §4.7). Exposed
/// separately from `check_content_schedule` so its determinism can be unit
/// tested without a store.
pub fn compute_next_schedule(domain: &Domain, base_date: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let bucket = domain.bucket;
    let profile = profile_for_bucket(bucket);
    let today = base_date.format("%Y-%m-%d").to_string();
    let mut rng = seeded_rng(domain.id, &domain.domain, bucket, &today);

    let (frequency, fixed_window) = resolve_frequency_and_window(domain, &profile);
    let gap = gap_days(frequency, profile.gap_multiplier, &mut rng);
    let gap_seconds = (gap * 86_400.0).round() as i64;

    let window = fixed_window.unwrap_or_else(|| weighted_pick(&profile.time_windows, &mut rng));
    let (lo, hi) = window.hour_range();
    let hour = rng.gen_range(lo..=hi);
    let hour = ((hour as i32 + profile.phase_shift_hours).rem_euclid(24)) as u32;
    let minute = rng.gen_range(0..60);
    let second = rng.gen_range(0..60);

    let candidate_date = base_date.date_naive() + Duration::seconds(gap_seconds);
    let naive = candidate_date
        .and_hms_opt(hour, minute, second)
        .unwrap_or_else(|| candidate_date.and_hms_opt(hour.min(23), 0, 0).unwrap());
    let mut scheduled = DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc);

    if scheduled <= now + Duration::seconds(60) {
        let push_minutes = rng.gen_range(5..=45);
        scheduled = now + Duration::minutes(push_minutes);
    }

    scheduled
}

/// `checkContentSchedule()` (spec §4.7): seed a `keyword_research` job for
/// every active, non-busy domain.
pub async fn check_content_schedule(store: &dyn Store) -> anyhow::Result<i64> {
    let now = Utc::now();
    let domains = store.active_domains().await?;
    let busy = store.domains_with_recent_activity(now - Duration::hours(24)).await?;

    let mut enqueued = 0i64;
    for domain in domains {
        if busy.contains(&domain.id) {
            continue;
        }

        let last_article_at = store.latest_article_created_at(domain.id).await?;
        let base_date = match last_article_at {
            Some(t) if now - t <= Duration::days(30) => t,
            _ => now,
        };

        let scheduled_for = compute_next_schedule(&domain, base_date, now);

        store
            .enqueue(NewJob {
                priority: 2,
                domain_id: Some(domain.id),
                channel: Some("maintain".to_string()),
                scheduled_for: Some(scheduled_for),
                payload: Some(serde_json::json!({
                    "domain_id": domain.id,
                    "niche": domain.niche,
                })),
                ..NewJob::new(JobType::KeywordResearch.as_str())
            })
            .await?;
        enqueued += 1;
    }

    info!(enqueued, "content scheduler tick complete");
    Ok(enqueued)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn domain(bucket: DomainBucket) -> Domain {
        Domain::builder()
            .domain("example.com")
            .tld("com")
            .bucket(bucket)
            .build()
    }

    #[test]
    fn same_domain_and_day_produce_identical_schedule() {
        let d = domain(DomainBucket::Build);
        let base = Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap();
        let now = base;
        let a = compute_next_schedule(&d, base, now);
        let b = compute_next_schedule(&d, base, now);
        assert_eq!(a, b);
    }

    #[test]
    fn different_domain_ids_diverge() {
        let mut d1 = domain(DomainBucket::Build);
        let mut d2 = d1.clone();
        d1.id = Uuid::new_v4();
        d2.id = Uuid::new_v4();
        let base = Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap();
        assert_ne!(compute_next_schedule(&d1, base, base), compute_next_schedule(&d2, base, base));
    }

    #[test]
    fn schedule_always_pushed_past_now_plus_a_minute() {
        let d = domain(DomainBucket::Park);
        let now = Utc::now();
        let scheduled = compute_next_schedule(&d, now, now);
        assert!(scheduled > now + Duration::seconds(60));
    }
}
