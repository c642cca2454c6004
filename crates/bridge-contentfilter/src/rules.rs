//! Content-filter rule configuration (§3 "Content-Filter Rule").

/// `(keyword, statusCode)` — a match on `keyword` makes the pipeline treat
/// the response as a synthetic upstream failure with `status_code`.
#[derive(Debug, Clone)]
pub struct ContentFilterRule {
    pub keyword: String,
    pub status_code: u16,
}

/// The legacy `(keywords[], statusCode)` form: one status code shared by a
/// whole list of keywords, expanded to one rule per keyword.
#[derive(Debug, Clone, Default)]
pub struct LegacyKeywordRule {
    pub keywords: Vec<String>,
    pub status_code: u16,
}

/// A filter's configured rules, with the §4.6 precedence between the
/// explicit rule list and the legacy keyword list already resolved.
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    rules: Vec<ContentFilterRule>,
    legacy: Vec<LegacyKeywordRule>,
}

impl ContentFilter {
    pub fn new(rules: Vec<ContentFilterRule>, legacy: Vec<LegacyKeywordRule>) -> Self {
        Self { rules, legacy }
    }

    /// The rules actually checked, in order: `rules` if non-empty,
    /// otherwise `legacy` expanded one rule per keyword (§4.6: "if
    /// `filter.rules` is non-empty it is authoritative; otherwise the
    /// legacy form is expanded"; the two are never merged).
    pub(crate) fn effective_rules(&self) -> Vec<ContentFilterRule> {
        if !self.rules.is_empty() {
            return self.rules.clone();
        }
        self.legacy
            .iter()
            .flat_map(|legacy| {
                legacy.keywords.iter().map(move |keyword| ContentFilterRule {
                    keyword: keyword.clone(),
                    status_code: legacy.status_code,
                })
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.legacy.iter().all(|l| l.keywords.is_empty())
    }
}
