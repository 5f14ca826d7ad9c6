//! Failure classification and retry/backoff policy (spec §7).
//!
//! Per the REDESIGN FLAGS in spec §9, classification is primarily a
//! pattern-match on a structured error; string matching against the error
//! message is the last-resort fallback for opaque collaborator errors.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `{ category, confidence, retryable, humanReadable, suggestedAction,
/// extractedDetails }` (spec §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureClass {
    pub category: FailureCategory,
    pub confidence: f64,
    pub retryable: bool,
    pub human_readable: String,
    pub suggested_action: String,
    pub extracted_details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    RateLimit,
    Timeout,
    TransientNetwork,
    ProviderServerError,
    Validation,
    MissingEntity,
    PayloadSchema,
    FeatureFlagDisabled,
    ShortContent,
    Unknown,
}

impl FailureCategory {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureCategory::RateLimit
                | FailureCategory::Timeout
                | FailureCategory::TransientNetwork
                | FailureCategory::ProviderServerError
        )
    }
}

/// A handler's outcome, generalizing the teacher's string-keyed result into
/// a sum type (spec §9 REDESIGN FLAGS: "Exception-based error flow becomes
/// a sum-typed result").
#[derive(Debug)]
pub enum HandlerOutcome<T> {
    Ok(T),
    Retryable(FailureClass),
    Fatal(FailureClass),
}

/// Pattern-matched classification of an opaque `anyhow::Error` from a
/// collaborator call. Structured errors (`crate::error::AppError`) are
/// classified directly by variant; anything else falls back to message
/// matching.
pub fn classify(err: &anyhow::Error) -> FailureClass {
    if let Some(app_err) = err.downcast_ref::<crate::error::AppError>() {
        return classify_app_error(app_err);
    }
    classify_message(&err.to_string())
}

fn classify_app_error(err: &crate::error::AppError) -> FailureClass {
    use crate::error::AppError;
    match err {
        AppError::Timeout(_) => FailureClass {
            category: FailureCategory::Timeout,
            confidence: 1.0,
            retryable: true,
            human_readable: "the job exceeded its execution timeout".to_string(),
            suggested_action: "retry; consider raising the timeout".to_string(),
            extracted_details: None,
        },
        AppError::Validation(msg) => FailureClass {
            category: FailureCategory::Validation,
            confidence: 1.0,
            retryable: false,
            human_readable: msg.clone(),
            suggested_action: "fix the input and re-enqueue manually".to_string(),
            extracted_details: None,
        },
        AppError::JobNotFound(_) | AppError::ArticleNotFound(_) | AppError::DomainNotFound(_) | AppError::CampaignNotFound(_) => {
            FailureClass {
                category: FailureCategory::MissingEntity,
                confidence: 1.0,
                retryable: false,
                human_readable: err.to_string(),
                suggested_action: "verify the referenced entity still exists".to_string(),
                extracted_details: None,
            }
        }
        AppError::Serialization(_) => FailureClass {
            category: FailureCategory::PayloadSchema,
            confidence: 1.0,
            retryable: false,
            human_readable: err.to_string(),
            suggested_action: "inspect the payload shape for this job type".to_string(),
            extracted_details: None,
        },
        AppError::FeatureDisabled(flag) => FailureClass {
            category: FailureCategory::FeatureFlagDisabled,
            confidence: 1.0,
            retryable: false,
            human_readable: format!("feature '{flag}' is disabled"),
            suggested_action: "enable the feature flag or cancel the job".to_string(),
            extracted_details: None,
        },
        AppError::Store(_) => FailureClass {
            category: FailureCategory::TransientNetwork,
            confidence: 0.7,
            retryable: true,
            human_readable: err.to_string(),
            suggested_action: "retry; check store connectivity".to_string(),
            extracted_details: None,
        },
        AppError::Collaborator(msg) => classify_message(msg),
    }
}

const TRANSIENT_PATTERNS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "timeout",
    "timed out",
    "connection reset",
    "connection refused",
    "gateway",
    "econnreset",
    "socket hang up",
    "temporarily unavailable",
    "503",
    "502",
];

const NON_TRANSIENT_PATTERNS: &[&str] = &[
    "invalid payload",
    "invalid_payload",
    "not found",
    "validation",
    "unauthorized",
    "forbidden",
];

/// Last-resort string classification (spec §7 transient auto-retry rule).
pub fn classify_message(message: &str) -> FailureClass {
    let lower = message.to_lowercase();

    if lower.contains("short content") || lower.contains("short-content") {
        return FailureClass {
            category: FailureCategory::ShortContent,
            confidence: 0.9,
            retryable: false,
            human_readable: message.to_string(),
            suggested_action: "regenerate the draft with a longer target length".to_string(),
            extracted_details: None,
        };
    }

    if is_non_transient_message(&lower) {
        return FailureClass {
            category: FailureCategory::Validation,
            confidence: 0.6,
            retryable: false,
            human_readable: message.to_string(),
            suggested_action: "inspect the error message for a non-retryable cause".to_string(),
            extracted_details: None,
        };
    }

    if lower.contains("rate limit") || lower.contains("rate_limit") || lower.contains("429") {
        return FailureClass {
            category: FailureCategory::RateLimit,
            confidence: 0.8,
            retryable: true,
            human_readable: message.to_string(),
            suggested_action: "retry with backoff".to_string(),
            extracted_details: None,
        };
    }

    if is_transient_message(&lower) {
        return FailureClass {
            category: FailureCategory::TransientNetwork,
            confidence: 0.6,
            retryable: true,
            human_readable: message.to_string(),
            suggested_action: "retry with backoff".to_string(),
            extracted_details: None,
        };
    }

    FailureClass {
        category: FailureCategory::Unknown,
        confidence: 0.3,
        retryable: true,
        human_readable: message.to_string(),
        suggested_action: "inspect the error manually".to_string(),
        extracted_details: None,
    }
}

/// True if `message` matches a transient pattern AND no non-transient
/// pattern (spec §7 transient auto-retry eligibility).
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    !is_non_transient_message(&lower)
        && TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
}

fn is_non_transient_message(lower: &str) -> bool {
    NON_TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Exponential backoff, base 60s, doubled per attempt, capped at 30 min, no
/// jitter (spec §4.3, §7). `attempt` is 1-indexed (first retry = attempt 1).
pub fn backoff_duration(attempt: i32) -> Duration {
    let attempt = attempt.max(1) as u32;
    let secs = 60u64.saturating_mul(1u64 << (attempt - 1).min(62));
    Duration::from_secs(secs.min(30 * 60))
}

/// Bump `result.failure.autoRetryTransientCount` on a job's existing result
/// JSON (spec §7: transient auto-retry must record how many times a job has
/// been auto-retried). Preserves whatever the prior `failure` object already
/// held; starts the counter at 1 if there was no prior result.
pub fn bump_auto_retry_count(existing_result: Option<&serde_json::Value>) -> serde_json::Value {
    let mut failure = existing_result
        .and_then(|r| r.get("failure"))
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));

    let count = failure
        .get("autoRetryTransientCount")
        .and_then(|v| v.as_i64())
        .unwrap_or(0)
        + 1;

    if let Some(map) = failure.as_object_mut() {
        map.insert("autoRetryTransientCount".to_string(), serde_json::json!(count));
    }

    serde_json::json!({ "failure": failure })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps_at_30_minutes() {
        assert_eq!(backoff_duration(1), Duration::from_secs(60));
        assert_eq!(backoff_duration(2), Duration::from_secs(120));
        assert_eq!(backoff_duration(3), Duration::from_secs(240));
        assert_eq!(backoff_duration(10), Duration::from_secs(30 * 60));
    }

    #[test]
    fn rate_limit_message_is_retryable() {
        let fc = classify_message("OpenAI rate limit exceeded, try again later");
        assert_eq!(fc.category, FailureCategory::RateLimit);
        assert!(fc.retryable);
    }

    #[test]
    fn not_found_message_is_non_retryable_even_with_transient_words() {
        // "not found" wins over any transient pattern present.
        assert!(!is_transient_message("gateway said: article not found"));
    }

    #[test]
    fn connection_reset_is_transient() {
        assert!(is_transient_message("connection reset by peer"));
    }

    #[test]
    fn validation_error_is_non_retryable() {
        let fc = classify_message("invalid payload: missing targetKeyword");
        assert!(!fc.retryable);
    }

    #[test]
    fn short_content_is_non_retryable() {
        let fc = classify_message("short content: draft has 42 words, minimum is 100");
        assert_eq!(fc.category, FailureCategory::ShortContent);
        assert!(!fc.retryable);
    }
}
