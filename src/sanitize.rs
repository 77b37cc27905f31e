//! Entity name sanitization.
//!
//! Replacer rules run in configuration order, each one rewriting the output
//! of the previous rule.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One `pattern -> replacement` rule as written in configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplacerRule {
    /// Regular expression to search for
    pub pattern: String,
    /// Replacement text (`$1` style group references are honoured)
    #[serde(default)]
    pub replacement: String,
}

impl ReplacerRule {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }
}

/// Compiled, ordered replacer rules
#[derive(Debug, Clone, Default)]
pub struct NameSanitizer {
    rules: Vec<(Regex, String)>,
}

impl NameSanitizer {
    /// Compile the rules. An invalid pattern fails here, never per metric.
    pub fn new(rules: &[ReplacerRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|re| (re, rule.replacement.clone()))
                    .map_err(|source| Error::Pattern {
                        pattern: rule.pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// A sanitizer that leaves names untouched
    pub fn passthrough() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule, in order, to `name`.
    pub fn apply(&self, name: &str) -> String {
        if name.is_empty() || self.rules.is_empty() {
            return name.to_string();
        }

        let mut current = name.to_string();
        for (pattern, replacement) in &self.rules {
            current = pattern
                .replace_all(&current, replacement.as_str())
                .into_owned();
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_rules_return_input() {
        let sanitizer = NameSanitizer::passthrough();
        assert_eq!(sanitizer.apply("esx-01|prod"), "esx-01|prod");

        let sanitizer = NameSanitizer::new(&[]).unwrap();
        assert_eq!(sanitizer.apply("vm:01"), "vm:01");
    }

    #[test]
    fn test_empty_name_is_untouched() {
        let sanitizer = NameSanitizer::new(&[ReplacerRule::new("^$", "x")]).unwrap();
        assert_eq!(sanitizer.apply(""), "");
    }

    #[test]
    fn test_rules_compose_sequentially() {
        let sanitizer =
            NameSanitizer::new(&[ReplacerRule::new("a", "b"), ReplacerRule::new("b", "c")])
                .unwrap();
        let out = sanitizer.apply("alpha");
        assert_eq!(out, "clphc");
        assert!(!out.contains('b'));
    }

    #[test]
    fn test_replacement_is_global() {
        let sanitizer = NameSanitizer::new(&[ReplacerRule::new(r"[|:,]", "_")]).unwrap();
        assert_eq!(sanitizer.apply("db|01:east,west"), "db_01_east_west");
    }

    #[test]
    fn test_group_references() {
        let sanitizer =
            NameSanitizer::new(&[ReplacerRule::new(r"(\w+)\.example\.com", "$1")]).unwrap();
        assert_eq!(sanitizer.apply("esx01.example.com"), "esx01");
    }

    #[test]
    fn test_invalid_pattern_fails_at_compile_time() {
        let err = NameSanitizer::new(&[ReplacerRule::new("(unclosed", "")]).unwrap_err();
        assert!(matches!(err, Error::Pattern { ref pattern, .. } if pattern == "(unclosed"));
    }
}
