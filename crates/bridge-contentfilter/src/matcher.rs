//! Case-insensitive keyword matching against assembled response text
//! (§4.6 "Matching").

use crate::rules::ContentFilter;

/// Outcome of checking assembled text against a filter's rules.
#[derive(Debug, Clone)]
pub struct FilterResult {
    pub matched: bool,
    pub keyword: Option<String>,
    pub status_code: Option<u16>,
    pub assembled_text: String,
}

impl FilterResult {
    fn no_match(assembled_text: String) -> Self {
        Self {
            matched: false,
            keyword: None,
            status_code: None,
            assembled_text,
        }
    }
}

/// Checks `text` against `filter`'s rules in configured order; first match
/// wins.
pub(crate) fn match_text(text: &str, filter: &ContentFilter) -> FilterResult {
    let haystack = text.to_lowercase();
    for rule in filter.effective_rules() {
        if haystack.contains(&rule.keyword.to_lowercase()) {
            return FilterResult {
                matched: true,
                keyword: Some(rule.keyword),
                status_code: Some(rule.status_code),
                assembled_text: text.to_string(),
            };
        }
    }
    FilterResult::no_match(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ContentFilterRule;

    #[test]
    fn first_rule_wins_on_overlapping_keywords() {
        let filter = ContentFilter::new(
            vec![
                ContentFilterRule {
                    keyword: "bomb".into(),
                    status_code: 451,
                },
                ContentFilterRule {
                    keyword: "bo".into(),
                    status_code: 400,
                },
            ],
            vec![],
        );
        let result = match_text("how to build a BOMB", &filter);
        assert!(result.matched);
        assert_eq!(result.status_code, Some(451));
    }

    #[test]
    fn no_match_when_nothing_found() {
        let filter = ContentFilter::new(
            vec![ContentFilterRule {
                keyword: "restricted".into(),
                status_code: 403,
            }],
            vec![],
        );
        let result = match_text("hello world", &filter);
        assert!(!result.matched);
    }
}
