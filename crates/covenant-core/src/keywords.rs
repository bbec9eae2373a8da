//! Keyword admission filter.
//!
//! A downloaded document is admitted when the filter is empty or when any
//! keyword occurs as a case-insensitive substring anywhere in its text.

/// Normalised keyword set: lowercased, deduplicated, sorted, empty strings dropped.
///
/// Two filters built from the same words in a different order or case
/// compare equal, so a stored decision is only recomputed when the set
/// really changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordFilter {
    keywords: Vec<String>,
}

impl KeywordFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        keywords.sort();
        keywords.dedup();
        Self { keywords }
    }

    /// True when no keyword is configured; such a filter admits everything.
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Normalised keywords, as recorded alongside an admission decision.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Whether `recorded` (a previously stored keyword list) is the same set.
    pub fn same_as(&self, recorded: &[String]) -> bool {
        *self == Self::new(recorded)
    }

    /// Admission decision for `text`.
    pub fn admits(&self, text: &str) -> bool {
        self.is_empty() || self.first_match(text).is_some()
    }

    /// First keyword (in sorted order) present in `text`.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        if self.keywords.is_empty() {
            return None;
        }
        let haystack = text.to_lowercase();
        self.keywords
            .iter()
            .find(|k| haystack.contains(k.as_str()))
            .map(String::as_str)
    }
}
