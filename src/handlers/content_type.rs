//! Content-type detection via word-boundary matching on the lowercase
//! target keyword (spec §4.4).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::ContentType;

fn word(pattern: &str) -> Regex {
    Regex::new(&format!(r"\b{pattern}\b")).expect("valid content-type regex")
}

static VS: Lazy<Regex> = Lazy::new(|| word("vs"));
static VERSUS: Lazy<Regex> = Lazy::new(|| word("versus"));
static CALCULATOR: Lazy<Regex> = Lazy::new(|| word("calculator"));
static ESTIMATOR: Lazy<Regex> = Lazy::new(|| word("estimator"));
static COMPUTE: Lazy<Regex> = Lazy::new(|| word("compute"));
static TOOL: Lazy<Regex> = Lazy::new(|| word("tool"));
static TOOLKIT_FAMILY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(toolkit|toolbox|tools)\b").unwrap());
static COST: Lazy<Regex> = Lazy::new(|| word("cost"));
static PRICE: Lazy<Regex> = Lazy::new(|| word("price"));
static FEE: Lazy<Regex> = Lazy::new(|| word("fee"));
static WHICH: Lazy<Regex> = Lazy::new(|| word("which"));
static LAWYER: Lazy<Regex> = Lazy::new(|| word("lawyer"));
static ATTORNEY: Lazy<Regex> = Lazy::new(|| word("attorney"));
static CLAIM: Lazy<Regex> = Lazy::new(|| word("claim"));
static CASE: Lazy<Regex> = Lazy::new(|| word("case"));
static SAFE: Lazy<Regex> = Lazy::new(|| word("safe"));
static TREATMENT: Lazy<Regex> = Lazy::new(|| word("treatment"));
static SYMPTOM: Lazy<Regex> = Lazy::new(|| word("symptom"));
static DIAGNOSIS: Lazy<Regex> = Lazy::new(|| word("diagnosis"));
static FAQ: Lazy<Regex> = Lazy::new(|| word("faq"));
static QUESTIONS: Lazy<Regex> = Lazy::new(|| word("questions"));
static ANSWERED: Lazy<Regex> = Lazy::new(|| word("answered"));
static CHECKLIST: Lazy<Regex> = Lazy::new(|| word("checklist"));
static REVIEW: Lazy<Regex> = Lazy::new(|| word("review"));
static BEST: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bbest\s").unwrap());
static TOP_N: Lazy<Regex> = Lazy::new(|| Regex::new(r"\btop\s\d").unwrap());

/// Detect the content type from a target keyword per the rules in spec
/// §4.4, evaluated in the order documented there.
pub fn detect_content_type(keyword: &str) -> ContentType {
    let kw = keyword.to_lowercase();

    if VS.is_match(&kw) || VERSUS.is_match(&kw) || kw.contains("compared to") {
        return ContentType::Comparison;
    }

    if CALCULATOR.is_match(&kw)
        || ESTIMATOR.is_match(&kw)
        || COMPUTE.is_match(&kw)
        || (TOOL.is_match(&kw) && !TOOLKIT_FAMILY.is_match(&kw))
    {
        return ContentType::Calculator;
    }

    if COST.is_match(&kw) || PRICE.is_match(&kw) || FEE.is_match(&kw) || kw.contains("how much") {
        return ContentType::CostGuide;
    }

    let qualify_words = kw.contains("eligib") || kw.contains("qualify");
    if qualify_words
        || kw.contains("find out if")
        || kw.contains("do i qualify")
        || (WHICH.is_match(&kw) && kw.contains("right for"))
        || (kw.contains("should i") && (kw.contains(" or ") || kw.contains("choose")))
    {
        return ContentType::Wizard;
    }

    if LAWYER.is_match(&kw)
        || ATTORNEY.is_match(&kw)
        || kw.contains("get a quote")
        || (CLAIM.is_match(&kw) && !kw.contains("claim to"))
        || (CASE.is_match(&kw) && !kw.contains("case study") && !kw.contains("showcase"))
    {
        return ContentType::LeadCapture;
    }

    if SAFE.is_match(&kw)
        || kw.contains("side effects")
        || TREATMENT.is_match(&kw)
        || SYMPTOM.is_match(&kw)
        || DIAGNOSIS.is_match(&kw)
    {
        return ContentType::HealthDecision;
    }

    if FAQ.is_match(&kw) || QUESTIONS.is_match(&kw) || kw.contains("q&a") || ANSWERED.is_match(&kw) {
        return ContentType::Faq;
    }

    if CHECKLIST.is_match(&kw) || kw.contains("step by step") || kw.contains("steps to") {
        return ContentType::Checklist;
    }

    if (REVIEW.is_match(&kw))
        || (BEST.is_match(&kw) && !kw.contains("best practice") && !kw.contains("best way to"))
        || TOP_N.is_match(&kw)
    {
        return ContentType::Review;
    }

    ContentType::Article
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toolkit_is_excluded_from_calculator() {
        assert_eq!(detect_content_type("toolkit for teachers"), ContentType::Article);
    }

    #[test]
    fn best_n_review_routes_to_review() {
        assert_eq!(detect_content_type("best lawn mowers 2026"), ContentType::Review);
    }

    #[test]
    fn mortgage_calculator_routes_to_calculator() {
        assert_eq!(detect_content_type("mortgage calculator"), ContentType::Calculator);
    }

    #[test]
    fn elvis_biography_is_not_comparison() {
        // "vs" must be word-boundary matched -- "Presley" contains no "vs"
        // substring, but this guards the documented Elvis example directly.
        assert_eq!(detect_content_type("Elvis Presley biography"), ContentType::Article);
    }

    #[test]
    fn vs_word_boundary_not_substring() {
        assert_eq!(detect_content_type("advsor fees explained"), ContentType::Article);
        assert_eq!(detect_content_type("roth vs traditional ira"), ContentType::Comparison);
    }

    #[test]
    fn claim_to_excluded_from_lead_capture() {
        assert_eq!(
            detect_content_type("companies that claim to offer free trials"),
            ContentType::Article
        );
    }

    #[test]
    fn case_study_excluded_from_lead_capture() {
        assert_eq!(detect_content_type("a marketing case study"), ContentType::Article);
    }

    #[test]
    fn best_practice_excluded_from_review() {
        assert_eq!(
            detect_content_type("best practice for budgeting"),
            ContentType::Article
        );
    }

    #[test]
    fn cost_guide_detection() {
        assert_eq!(detect_content_type("how much does a root canal cost"), ContentType::CostGuide);
    }
}
