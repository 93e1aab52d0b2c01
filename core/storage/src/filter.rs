//! Record name filtering.

use regex::Regex;

use credvault_common::{Error, Result};

/// A set of name patterns; a name passes if any pattern matches it.
///
/// An empty set lets every name through.
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    patterns: Vec<Regex>,
}

impl NameFilter {
    /// Compile the given patterns.
    ///
    /// # Errors
    /// - `InvalidInput` naming the first pattern that fails to compile
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| Error::InvalidInput(format!("Invalid filter '{}': {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Whether `name` passes the filter.
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.is_match(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(patterns: &[&str]) -> NameFilter {
        let owned: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        NameFilter::new(&owned).unwrap()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let f = filter(&[]);
        assert!(f.matches("anything"));
        assert!(f.matches(""));
    }

    #[test]
    fn test_patterns_are_unanchored() {
        let f = filter(&["admin"]);
        assert!(f.matches("prod-admin"));
        assert!(!f.matches("prod-reader"));
    }

    #[test]
    fn test_any_pattern_suffices() {
        let f = filter(&["^prod", "^staging"]);
        assert!(f.matches("prod-admin"));
        assert!(f.matches("staging-admin"));
        assert!(!f.matches("dev-prod"));
    }

    #[test]
    fn test_invalid_pattern_is_invalid_input() {
        let err = NameFilter::new(&["(unclosed".to_string()]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
