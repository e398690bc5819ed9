//! Failure-message extraction for readable reports.
//!
//! The assertion layer renders failures as
//!
//! ```text
//! {description}
//! Unexpected error:
//!     <{kind}>:
//!     {underlying error, possibly followed by an indented dump}
//! occurred
//! ```
//!
//! [`AssertionMessageExtractor`] recovers `description: underlying error` from
//! that shape. [`FirstLineExtractor`] is the permissive fallback for anything
//! else (panics, foreign assertion libraries). Extractors are pluggable through
//! [`MessageExtractor`] and composed with [`ExtractorChain`].

use regex::Regex;

/// Turns raw failure text into a one-line diagnostic.
pub trait MessageExtractor: Send + Sync {
    /// `None` when the text is not in a shape this extractor understands.
    fn extract(&self, raw: &str) -> Option<String>;
}

/// Understands the two-part "Unexpected error ... occurred" shape.
#[derive(Debug, Clone)]
pub struct AssertionMessageExtractor {
    pattern: Regex,
}

const ASSERTION_PATTERN: &str = r"(?s)^(?P<description>.*?)\n?\s*Unexpected error:[ \t]*\n(?P<body>.*?)\n?\s*occurred\s*$";

impl AssertionMessageExtractor {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(ASSERTION_PATTERN).expect("assertion pattern is a valid regex"),
        }
    }
}

impl Default for AssertionMessageExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageExtractor for AssertionMessageExtractor {
    fn extract(&self, raw: &str) -> Option<String> {
        let caps = self.pattern.captures(raw)?;
        let description = caps
            .name("description")
            .map(|m| m.as_str().trim())
            .unwrap_or_default();
        let cause = caps
            .name("body")
            .map(|m| underlying_error(m.as_str()))
            .unwrap_or_default();

        Some(join_parts(description, &cause))
    }
}

/// First meaningful line of the error body, without the `<type>:` marker or
/// any indented structure dump that follows it.
fn underlying_error(body: &str) -> String {
    let mut lines = body.lines().map(str::trim).filter(|l| !l.is_empty());

    let Some(first) = lines.next() else {
        return String::new();
    };

    if first.starts_with('<') {
        if let Some(idx) = first.find(">:") {
            let rest = first[idx + 2..].trim();
            if !rest.is_empty() && rest != "{" {
                return rest.to_string();
            }
            return lines
                .find(|l| *l != "{")
                .unwrap_or_default()
                .to_string();
        }
    }

    first.to_string()
}

fn join_parts(description: &str, cause: &str) -> String {
    match (description.is_empty(), cause.is_empty()) {
        (false, false) => format!("{description}: {cause}"),
        (false, true) => description.to_string(),
        (true, false) => cause.to_string(),
        (true, true) => String::new(),
    }
}

/// Falls back to the first non-blank line, trimmed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstLineExtractor;

impl MessageExtractor for FirstLineExtractor {
    fn extract(&self, raw: &str) -> Option<String> {
        Some(
            raw.lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or_default()
                .to_string(),
        )
    }
}

/// Tries each extractor in order; the first match wins.
pub struct ExtractorChain {
    extractors: Vec<Box<dyn MessageExtractor>>,
}

impl ExtractorChain {
    pub fn new(extractors: Vec<Box<dyn MessageExtractor>>) -> Self {
        Self { extractors }
    }

    /// Put `extractor` ahead of the existing ones.
    pub fn prepend(mut self, extractor: Box<dyn MessageExtractor>) -> Self {
        self.extractors.insert(0, extractor);
        self
    }

    pub fn extract(&self, raw: &str) -> String {
        self.extractors
            .iter()
            .find_map(|e| e.extract(raw))
            .unwrap_or_default()
    }
}

impl Default for ExtractorChain {
    fn default() -> Self {
        Self::new(vec![
            Box::new(AssertionMessageExtractor::new()),
            Box::new(FirstLineExtractor),
        ])
    }
}

impl std::fmt::Debug for ExtractorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorChain")
            .field("extractors", &self.extractors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_description_and_cause() {
        let raw = "Error retrieving resource\nUnexpected error:\n<...>:\n\"foo\" not found\n{...}\noccurred";
        let msg = AssertionMessageExtractor::new().extract(raw).expect("matches");
        assert_eq!(msg, "Error retrieving resource: \"foo\" not found");
    }

    #[test]
    fn test_extracts_indented_gomega_style() {
        let raw = "Error retrieving ServiceImport\nUnexpected error:\n    <*errors.StatusError | 0xc0004a2>: \n    serviceimports.multicluster.x-k8s.io \"hello\" not found\n    {\n        ErrStatus: {Code: 404}\n    }\noccurred";
        let msg = AssertionMessageExtractor::new().extract(raw).expect("matches");
        assert_eq!(
            msg,
            "Error retrieving ServiceImport: serviceimports.multicluster.x-k8s.io \"hello\" not found"
        );
    }

    #[test]
    fn test_cause_on_marker_line() {
        let raw = "Unexpected error:\n    <PollError>: failed to find it\noccurred";
        let msg = AssertionMessageExtractor::new().extract(raw).expect("matches");
        assert_eq!(msg, "failed to find it");
    }

    #[test]
    fn test_description_only() {
        let raw = "Could not list pods\nUnexpected error:\n    <Missing>: \noccurred";
        let msg = AssertionMessageExtractor::new().extract(raw).expect("matches");
        assert_eq!(msg, "Could not list pods");
    }

    #[test]
    fn test_unmatched_text_is_none() {
        assert!(AssertionMessageExtractor::new()
            .extract("thread panicked at 'boom'")
            .is_none());
    }

    #[test]
    fn test_first_line_fallback() {
        let msg = FirstLineExtractor.extract("\n  index out of bounds  \nbacktrace...");
        assert_eq!(msg.as_deref(), Some("index out of bounds"));
    }

    #[test]
    fn test_chain_uses_fallback() {
        let chain = ExtractorChain::default();
        assert_eq!(chain.extract("  boom\nmore"), "boom");
        assert_eq!(chain.extract(""), "");
    }

    struct Fixed;

    impl MessageExtractor for Fixed {
        fn extract(&self, _raw: &str) -> Option<String> {
            Some("fixed".to_string())
        }
    }

    #[test]
    fn test_chain_prepend_takes_priority() {
        let chain = ExtractorChain::default().prepend(Box::new(Fixed));
        assert_eq!(chain.extract("anything"), "fixed");
    }
}
