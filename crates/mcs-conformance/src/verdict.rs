//! Verdict classification.
//!
//! Rules, in priority order:
//! 1. Skipped or pending tests produce no verdict.
//! 2. Passed tests are conformant.
//! 3. Failed tests carrying a non-conformance signal are non-conformant; the
//!    last signal's message explains the violation.
//! 4. Any other failure is indeterminate and needs human triage, so it never
//!    counts for or against conformance.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::message::ExtractorChain;
use crate::outcome::{SpecState, TestOutcome};

/// Judgement on a single completed test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "message", rename_all = "snake_case")]
pub enum Verdict {
    ConformantPass,
    NonConformant(String),
    Indeterminate(String),
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::ConformantPass => "pass",
            Verdict::NonConformant(_) => "fail",
            Verdict::Indeterminate(_) => "indeterminate",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Verdict::ConformantPass => "",
            Verdict::NonConformant(m) | Verdict::Indeterminate(m) => m,
        }
    }

    /// Report suffix: ` - {message}` when there is a message, otherwise empty.
    pub fn annotation(&self) -> String {
        let message = self.message();
        if message.is_empty() {
            String::new()
        } else {
            format!(" - {message}")
        }
    }

    pub fn is_conformant(&self) -> bool {
        matches!(self, Verdict::ConformantPass)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.label(), self.annotation())
    }
}

/// Maps raw outcomes to verdicts using a pluggable message extractor.
#[derive(Debug, Default)]
pub struct VerdictClassifier {
    extractor: ExtractorChain,
}

impl VerdictClassifier {
    pub fn new(extractor: ExtractorChain) -> Self {
        Self { extractor }
    }

    /// `None` for outcomes excluded from reporting.
    pub fn classify(&self, outcome: &TestOutcome) -> Option<Verdict> {
        match outcome.state {
            SpecState::Skipped | SpecState::Pending => None,
            SpecState::Passed => Some(Verdict::ConformantPass),
            SpecState::Failed => Some(match outcome.non_conformance_messages().last() {
                Some(message) => Verdict::NonConformant(message.to_string()),
                None => {
                    Verdict::Indeterminate(self.extractor.extract(&outcome.raw_failure_text))
                }
            }),
        }
    }
}
