//! Message-based detection of transport failures.
//!
//! Fetch stacks rarely agree on codes, but their messages are stable enough to
//! match: "fetch failed", "Failed to fetch", "Network Error" and friends.

use regex::Regex;

/// A pattern for recognizing a network signal in a failure message.
#[derive(Debug)]
pub struct SignalPattern {
    regex: Regex,
    description: String,
}

impl SignalPattern {
    /// Creates a new signal pattern.
    ///
    /// # Panics
    /// Panics if the regex pattern is invalid.
    pub fn new(pattern: &str, description: impl Into<String>) -> Self {
        Self {
            regex: Regex::new(pattern).expect("Invalid regex pattern"),
            description: description.into(),
        }
    }

    /// Creates a signal pattern from a pre-compiled regex.
    pub fn with_regex(regex: Regex, description: impl Into<String>) -> Self {
        Self {
            regex,
            description: description.into(),
        }
    }

    /// Returns the description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Checks if this pattern matches the given text.
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Recognizes network-layer failures from their messages.
#[derive(Debug)]
pub struct NetworkSignalDetector {
    patterns: Vec<SignalPattern>,
}

impl Default for NetworkSignalDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkSignalDetector {
    /// Creates a detector with the built-in patterns.
    pub fn new() -> Self {
        Self {
            patterns: Self::default_patterns(),
        }
    }

    /// Creates a detector with custom patterns only.
    pub fn with_patterns(patterns: Vec<SignalPattern>) -> Self {
        Self { patterns }
    }

    fn default_patterns() -> Vec<SignalPattern> {
        vec![
            SignalPattern::new(r"(?i)fetch\s+failed", "Fetch failed"),
            SignalPattern::new(r"(?i)failed\s+to\s+fetch", "Failed to fetch"),
            SignalPattern::new(
                r"(?i)network\s*(error|failure|request\s+failed)",
                "Network error",
            ),
            SignalPattern::new(
                r"(?i)connection\s*(refused|reset|timed?\s*out)",
                "Connection error",
            ),
            SignalPattern::new(r"(?i)\boffline\b", "Host offline"),
        ]
    }

    /// Adds a custom pattern.
    pub fn add_pattern(&mut self, pattern: SignalPattern) {
        self.patterns.push(pattern);
    }

    /// Returns the number of patterns configured.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Returns the first pattern matching `text`.
    pub fn detect(&self, text: &str) -> Option<&SignalPattern> {
        self.patterns.iter().find(|p| p.matches(text))
    }

    /// Returns true if any pattern matches `text`.
    pub fn matches(&self, text: &str) -> bool {
        self.detect(text).is_some()
    }
}
