//! Banned-term screening for user supplied topic text.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BannedTerm {
    pub term: String,
    pub severity: Severity,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl BannedTerm {
    pub fn new(term: impl Into<String>, severity: Severity) -> Self {
        Self {
            term: term.into(),
            severity,
            active: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub violated_terms: Vec<String>,
    pub max_severity: Option<Severity>,
}

impl ValidationResult {
    pub fn is_critical(&self) -> bool {
        self.max_severity == Some(Severity::Critical)
    }

    pub fn is_high_severity(&self) -> bool {
        matches!(self.max_severity, Some(Severity::High | Severity::Critical))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContentModerator {
    terms: Vec<BannedTerm>,
}

impl ContentModerator {
    pub fn new(terms: Vec<BannedTerm>) -> Self {
        Self { terms }
    }

    /// Case-insensitive substring match against every active term.
    pub fn validate(&self, text: &str) -> ValidationResult {
        let haystack = text.to_lowercase();
        let mut violated_terms = Vec::new();
        let mut max_severity = None;

        if !haystack.trim().is_empty() {
            for banned in self.terms.iter().filter(|t| t.active) {
                let needle = banned.term.to_lowercase();
                if needle.is_empty() || !haystack.contains(&needle) {
                    continue;
                }
                violated_terms.push(banned.term.clone());
                max_severity = max_severity.max(Some(banned.severity));
            }
        }

        ValidationResult {
            valid: violated_terms.is_empty(),
            violated_terms,
            max_severity,
        }
    }
}
