//! Topic relevance filter.
//!
//! A span of text is relevant when it contains one of the topic keywords.
//! Word tokens are matched first; when no token matches, each keyword is
//! searched as a raw substring so scripts written without spaces
//! (`武漢肺炎中國確診逾`) still match.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("valid word regex"));

/// Keywords used when the source registry does not override them.
pub const DEFAULT_KEYWORDS: [&str; 4] = ["corona", "coronavirus", "武漢肺炎", "冠状病毒"];

/// Case-insensitive keyword predicate.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    keywords: HashSet<String>,
}

impl RelevanceFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    /// Does `text` mention any keyword?
    pub fn matches(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        let lowered = text.to_lowercase();
        if WORD
            .find_iter(&lowered)
            .any(|token| self.keywords.contains(token.as_str()))
        {
            return true;
        }
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }

    /// True when at least one of `spans` is relevant.
    pub fn matches_any(&self, spans: &[&str]) -> bool {
        spans.iter().any(|s| self.matches(s))
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().map(String::as_str)
    }
}

impl Default for RelevanceFilter {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS)
    }
}
