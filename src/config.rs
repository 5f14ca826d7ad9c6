//! Environment-backed configuration, loaded once at startup via `dotenvy`.
//!
//! Mirrors every option named in spec §6, each with its documented default
//! and clamp range.

use std::env;
use std::time::Duration;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str) -> bool {
    env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    pub disable_queue_worker: bool,
    pub test_mode: bool,

    pub queue_poll_interval: Duration,
    pub queue_batch_size: i64,
    pub job_lease_duration: Duration,
    pub job_default_timeout: Duration,
    pub worker_shutdown_grace: Duration,

    pub growth_cooldown_hours: i64,
    pub growth_default_daily_cap: i32,
    pub growth_default_min_jitter_minutes: i32,
    pub growth_default_max_jitter_minutes: i32,
    pub growth_default_quiet_hours_start: i32,
    pub growth_default_quiet_hours_end: i32,

    pub media_review_escalation_sweep_user_limit: i32,
    pub growth_integrity_alert_window_hours: i64,
    pub growth_integrity_host_concentration_threshold: f64,
    pub growth_integrity_blocked_ratio_threshold: f64,
    pub growth_integrity_min_samples: i64,

    pub ai_review_fallback_enabled: bool,
    pub openrouter_opus_review_model: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/pipeline".to_string()),

            disable_queue_worker: env_bool("DISABLE_SERVER_QUEUE_WORKER"),
            test_mode: env::var("NODE_ENV").map(|v| v == "test").unwrap_or(false),

            queue_poll_interval: Duration::from_millis(env_parse("QUEUE_POLL_INTERVAL_MS", 5_000)),
            queue_batch_size: env_parse("QUEUE_BATCH_SIZE", 5),
            job_lease_duration: Duration::from_millis(env_parse(
                "JOB_LEASE_DURATION_MS",
                660_000,
            )),
            job_default_timeout: Duration::from_secs(env_parse("JOB_TIMEOUT_SECS", 600)),
            worker_shutdown_grace: Duration::from_millis(env_parse(
                "WORKER_SHUTDOWN_GRACE_MS",
                20_000,
            )),

            growth_cooldown_hours: env_parse::<i64>("GROWTH_CHANNEL_COOLDOWN_HOURS", 24).max(1),
            growth_default_daily_cap: env_parse::<i32>("GROWTH_DEFAULT_DAILY_CAP", 2).max(1),
            growth_default_min_jitter_minutes: env_parse::<i32>(
                "GROWTH_DEFAULT_MIN_JITTER_MINUTES",
                15,
            )
            .clamp(0, 1440),
            growth_default_max_jitter_minutes: env_parse::<i32>(
                "GROWTH_DEFAULT_MAX_JITTER_MINUTES",
                90,
            )
            .clamp(0, 1440),
            growth_default_quiet_hours_start: env_parse::<i32>(
                "GROWTH_DEFAULT_QUIET_HOURS_START",
                23,
            )
            .clamp(0, 23),
            growth_default_quiet_hours_end: env_parse::<i32>("GROWTH_DEFAULT_QUIET_HOURS_END", 6)
                .clamp(0, 23),

            media_review_escalation_sweep_user_limit: env_parse::<i32>(
                "MEDIA_REVIEW_ESCALATION_SWEEP_USER_LIMIT",
                100,
            )
            .min(500),
            growth_integrity_alert_window_hours: env_parse::<i64>(
                "GROWTH_INTEGRITY_ALERT_WINDOW_HOURS",
                24,
            )
            .min(336),
            // §6 names these thresholds without defaults; chosen so a
            // single dominant destination host or a majority-blocked run
            // trips the alert, recorded as an Open Question decision in
            // DESIGN.md.
            growth_integrity_host_concentration_threshold: env_parse::<f64>(
                "GROWTH_INTEGRITY_HOST_CONCENTRATION_THRESHOLD",
                0.6,
            )
            .clamp(0.0, 1.0),
            growth_integrity_blocked_ratio_threshold: env_parse::<f64>(
                "GROWTH_INTEGRITY_BLOCKED_RATIO_THRESHOLD",
                0.5,
            )
            .clamp(0.0, 1.0),
            growth_integrity_min_samples: env_parse::<i64>("GROWTH_INTEGRITY_MIN_SAMPLES", 5).max(1),

            ai_review_fallback_enabled: env_bool("AI_REVIEW_FALLBACK_ENABLED"),
            openrouter_opus_review_model: env::var("OPENROUTER_OPUS_REVIEW_MODEL").ok(),
        }
    }
}

impl Config {
    /// Load from the process environment, first populating it from a
    /// `.env` file if present (no-op if already loaded by the caller).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::default()
    }

    /// Clamp an arbitrary `minFailedAgeMs` to the documented [0, 24h] range,
    /// defaulting to 2 minutes (spec §7).
    pub fn clamp_min_failed_age_ms(value: Option<i64>) -> i64 {
        value.unwrap_or(120_000).clamp(0, 24 * 60 * 60 * 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_min_failed_age() {
        assert_eq!(Config::clamp_min_failed_age_ms(None), 120_000);
        assert_eq!(Config::clamp_min_failed_age_ms(Some(-5)), 0);
        assert_eq!(
            Config::clamp_min_failed_age_ms(Some(999_999_999)),
            24 * 60 * 60 * 1000
        );
    }
}
