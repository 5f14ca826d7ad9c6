//! `computeSchedule(profile)` (spec §4.5): jitter + quiet-hours wraparound.

use chrono::{DateTime, Duration, Timelike, Utc};
use rand::Rng;

use crate::models::DomainChannelProfile;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComputedSchedule {
    pub scheduled_for: DateTime<Utc>,
    pub moved_out_of_quiet_hours: bool,
}

fn in_quiet_hours(hour: u32, start: i32, end: i32) -> bool {
    let (start, end) = (start as u32, end as u32);
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

/// Draw a jitter minutes count, tentatively schedule, and shift out of
/// quiet hours if needed (spec §4.5). `rng` is injected so tests can use a
/// seeded generator; production calls pass `rand::thread_rng()` since only
/// the content scheduler (§4.7) requires the stable seeded variant.
pub fn compute_schedule(
    profile: &DomainChannelProfile,
    default_min_jitter: i32,
    default_max_jitter: i32,
    default_quiet_start: i32,
    default_quiet_end: i32,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> ComputedSchedule {
    let mut min_jitter = profile.min_jitter_minutes.unwrap_or(default_min_jitter).clamp(0, 1440);
    let mut max_jitter = profile.max_jitter_minutes.unwrap_or(default_max_jitter).clamp(0, 1440);
    if min_jitter > max_jitter {
        std::mem::swap(&mut min_jitter, &mut max_jitter);
    }
    let jitter_minutes = if min_jitter == max_jitter {
        min_jitter
    } else {
        rng.gen_range(min_jitter..=max_jitter)
    };

    let tentative = now + Duration::minutes(jitter_minutes as i64);

    let quiet_start = profile.quiet_hours_start.unwrap_or(default_quiet_start);
    let quiet_end = profile.quiet_hours_end.unwrap_or(default_quiet_end);

    if !in_quiet_hours(tentative.hour(), quiet_start, quiet_end) {
        return ComputedSchedule {
            scheduled_for: tentative,
            moved_out_of_quiet_hours: false,
        };
    }

    let wraps = quiet_start > quiet_end;
    let shift_to_next_day = wraps && tentative.hour() >= quiet_start as u32;
    let date = if shift_to_next_day {
        tentative.date_naive() + Duration::days(1)
    } else {
        tentative.date_naive()
    };

    let minute = rng.gen_range(5..=35);
    let shifted_naive = date
        .and_hms_opt(quiet_end as u32, minute, 0)
        .expect("quiet_end clamped to 0-23");
    let shifted = DateTime::<Utc>::from_naive_utc_and_offset(shifted_naive, Utc);

    ComputedSchedule {
        scheduled_for: shifted,
        moved_out_of_quiet_hours: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn profile(quiet_start: i32, quiet_end: i32) -> DomainChannelProfile {
        DomainChannelProfile::builder()
            .domain_id(uuid::Uuid::nil())
            .channel("pinterest")
            .quiet_hours_start(quiet_start)
            .quiet_hours_end(quiet_end)
            .min_jitter_minutes(0)
            .max_jitter_minutes(0)
            .build()
    }

    #[test]
    fn early_morning_quiet_hours_shift_same_day() {
        // 02:00 UTC with wraparound quiet hours 23-6 moves to 06:00-06:35 the same day (spec §8).
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 2, 0, 0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let computed = compute_schedule(&profile(23, 6), 0, 0, 23, 6, now, &mut rng);
        assert!(computed.moved_out_of_quiet_hours);
        assert_eq!(computed.scheduled_for.date_naive(), now.date_naive());
        assert_eq!(computed.scheduled_for.hour(), 6);
        assert!((5..=35).contains(&computed.scheduled_for.minute()));
    }

    #[test]
    fn late_evening_quiet_hours_shift_next_day() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 23, 30, 0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let computed = compute_schedule(&profile(23, 6), 0, 0, 23, 6, now, &mut rng);
        assert!(computed.moved_out_of_quiet_hours);
        assert_eq!(computed.scheduled_for.date_naive(), now.date_naive() + Duration::days(1));
        assert_eq!(computed.scheduled_for.hour(), 6);
    }

    #[test]
    fn outside_quiet_hours_keeps_tentative() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let computed = compute_schedule(&profile(23, 6), 0, 0, 23, 6, now, &mut rng);
        assert!(!computed.moved_out_of_quiet_hours);
        assert_eq!(computed.scheduled_for, now);
    }
}
