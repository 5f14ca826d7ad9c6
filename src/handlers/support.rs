//! Small helpers shared across pipeline stage handlers (spec §4.4).

/// Strip em-dashes from generated copy (spec §4.4 "strip em-dashes"),
/// replacing each with a plain hyphen so sentence structure survives.
pub fn strip_em_dashes(text: &str) -> String {
    text.replace('\u{2014}', "-")
}

pub fn word_count(text: &str) -> i32 {
    text.split_whitespace().count() as i32
}

/// Derive a human title from a raw keyword when the AI collaborator hasn't
/// supplied one yet (spec §4.4 "keyword_research": "create an article stub
/// with ... slugified title").
pub fn title_case(keyword: &str) -> String {
    keyword
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_em_dashes() {
        assert_eq!(strip_em_dashes("fast\u{2014}reliable\u{2014}cheap"), "fast-reliable-cheap");
    }

    #[test]
    fn counts_words() {
        assert_eq!(word_count("one two three"), 3);
        assert_eq!(word_count("  "), 0);
    }

    #[test]
    fn title_cases_a_keyword() {
        assert_eq!(title_case("mortgage refinance calculator"), "Mortgage Refinance Calculator");
    }
}
