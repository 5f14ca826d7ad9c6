//! Slug generation with fallback (spec §4.4 "generate_meta": "slugify,
//! fall back to title-derived slug, then 'untitled'"; spec §8: "Slugify is
//! idempotent ... and never returns empty").

/// Lowercase, ASCII-transliterate, replace runs of non-alphanumerics with a
/// single hyphen, and trim leading/trailing hyphens. Returns `""` when
/// nothing alphanumeric survives -- callers apply the "untitled" fallback.
pub fn slugify(input: &str) -> String {
    let transliterated = slug::slugify(input);
    transliterated
}

/// Slugify with the documented fallback chain: try the keyword slug, then
/// the title slug, then `"untitled"`.
pub fn slugify_with_fallback(primary: &str, title_fallback: &str) -> String {
    let slug = slugify(primary);
    if !slug.is_empty() {
        return slug;
    }
    let fallback = slugify(title_fallback);
    if !fallback.is_empty() {
        return fallback;
    }
    "untitled".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_is_idempotent() {
        let once = slugify("10 Best Mortgage Calculators (2026)!");
        let twice = slugify(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn slugify_never_panics_on_empty_input() {
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn dash_only_input_falls_back_to_untitled() {
        assert_eq!(slugify_with_fallback("\u{2014}", ""), "untitled");
    }

    #[test]
    fn falls_back_to_title_before_untitled() {
        assert_eq!(slugify_with_fallback("\u{2014}", "My Great Article"), "my-great-article");
    }
}
