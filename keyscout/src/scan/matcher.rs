use regex::Regex;
use tracing::warn;

use crate::errors::{ScanError, ScanResult};

/// Compiles the whole-word pattern for an already lower-cased keyword
fn word_pattern(keyword: &str) -> ScanResult<Regex> {
    Regex::new(&format!(r"\b{}\b", regex::escape(keyword))).map_err(|e| {
        ScanError::invalid_configuration(format!("cannot match keyword '{}': {}", keyword, e))
    })
}

/// Checks whether `keyword` occurs in `content` as a whole word, ignoring case.
///
/// "python" matches "Python 3" and "PYTHON," but not "pythonic" or "ipython".
pub fn matches(content: &str, keyword: &str) -> bool {
    match word_pattern(&keyword.to_lowercase()) {
        Ok(regex) => regex.is_match(&content.to_lowercase()),
        Err(e) => {
            warn!("Treating keyword as absent: {}", e);
            false
        }
    }
}

/// A fixed keyword set with its whole-word patterns compiled once
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
    patterns: Vec<Regex>,
}

impl KeywordMatcher {
    /// Compiles a matcher for the given keywords. Keywords keep their original
    /// spelling for reporting; matching uses their lower-cased form.
    /// Repeated keywords are kept once, at their first position.
    pub fn new(keywords: &[String]) -> ScanResult<Self> {
        let mut unique: Vec<String> = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            if !unique.contains(keyword) {
                unique.push(keyword.clone());
            }
        }

        let patterns = unique
            .iter()
            .map(|keyword| word_pattern(&keyword.to_lowercase()))
            .collect::<ScanResult<Vec<_>>>()?;

        Ok(Self {
            keywords: unique,
            patterns,
        })
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Per-keyword presence in `content`, in keyword order
    pub fn find_keywords(&self, content: &str) -> Vec<bool> {
        let lowered = content.to_lowercase();
        self.patterns
            .iter()
            .map(|pattern| pattern.is_match(&lowered))
            .collect()
    }

    /// The keywords present in `content`
    pub fn present<'a>(&'a self, content: &str) -> impl Iterator<Item = &'a str> {
        self.keywords
            .iter()
            .zip(self.find_keywords(content))
            .filter_map(|(keyword, found)| found.then_some(keyword.as_str()))
    }
}
