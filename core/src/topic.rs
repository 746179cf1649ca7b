//! Topic-exchange pattern matching.
//!
//! Routing keys are dot-segmented strings (`log.ERROR`). A binding
//! pattern matches segment-wise: `*` stands in for exactly one segment,
//! `#` for zero or more. In production the broker performs this match;
//! the in-memory broker used in tests runs the same semantics through
//! this module so binding behavior stays testable without a live broker.

/// A compiled binding pattern.
///
/// # Example
///
/// ```
/// use logsink_core::TopicPattern;
///
/// let pattern = TopicPattern::new("log.*");
/// assert!(pattern.matches("log.ERROR"));
/// assert!(!pattern.matches("log.ERROR.disk"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPattern {
    pattern: String,
    is_wildcard: bool,
}

impl TopicPattern {
    /// Compile a pattern string.
    pub fn new(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let is_wildcard = pattern
            .split('.')
            .any(|segment| segment == "*" || segment == "#");
        Self {
            pattern,
            is_wildcard,
        }
    }

    /// The pattern string this was compiled from.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Check whether a routing key matches this pattern.
    #[must_use]
    pub fn matches(&self, routing_key: &str) -> bool {
        if !self.is_wildcard {
            return self.pattern == routing_key;
        }

        let pattern: Vec<&str> = self.pattern.split('.').collect();
        let key: Vec<&str> = routing_key.split('.').collect();
        matches_segments(&pattern, &key)
    }
}

/// Segment-wise match: `*` consumes exactly one key segment, `#` consumes
/// any number (including none).
fn matches_segments(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_segments(rest, &key[skip..])),
        Some((&"*", rest)) => !key.is_empty() && matches_segments(rest, &key[1..]),
        Some((segment, rest)) => {
            key.first() == Some(segment) && matches_segments(rest, &key[1..])
        }
    }
}
