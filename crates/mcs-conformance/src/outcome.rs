//! Raw test outcomes as recorded by the suite runner.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::signal::{SignalRecord, SPEC_REF_CHANNEL};

/// Final execution state of one test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecState {
    Passed,
    Failed,
    Skipped,
    Pending,
}

impl SpecState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecState::Passed => "passed",
            SpecState::Failed => "failed",
            SpecState::Skipped => "skipped",
            SpecState::Pending => "pending",
        }
    }

    /// Skipped and pending tests never produce a verdict.
    pub fn is_reportable(&self) -> bool {
        matches!(self, SpecState::Passed | SpecState::Failed)
    }
}

impl fmt::Display for SpecState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single test, exactly as the execution engine saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Full test description.
    pub description: String,
    pub state: SpecState,
    /// Failure text as produced by the assertion layer (empty unless failed).
    #[serde(default)]
    pub raw_failure_text: String,
    /// Side-channel records in the order they were attached.
    #[serde(default)]
    pub signals: Vec<SignalRecord>,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub spec_ref: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl TestOutcome {
    pub fn new(description: impl Into<String>, state: SpecState) -> Self {
        Self {
            description: description.into(),
            state,
            raw_failure_text: String::new(),
            signals: Vec::new(),
            labels: BTreeSet::new(),
            spec_ref: None,
            duration_ms: 0,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    pub fn with_signal(mut self, signal: SignalRecord) -> Self {
        self.signals.push(signal);
        self
    }

    pub fn with_failure_text(mut self, text: impl Into<String>) -> Self {
        self.raw_failure_text = text.into();
        self
    }

    pub fn with_spec_ref(mut self, url: impl Into<String>) -> Self {
        self.spec_ref = Some(url.into());
        self
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Non-conformance messages, oldest first.
    pub fn non_conformance_messages(&self) -> impl Iterator<Item = &str> {
        self.signals
            .iter()
            .filter(|s| s.is_non_conformance())
            .map(|s| s.value.as_str())
    }

    /// The explicit spec reference, falling back to the first `spec-ref` signal.
    pub fn spec_reference(&self) -> Option<&str> {
        self.spec_ref.as_deref().or_else(|| {
            self.signals
                .iter()
                .find(|s| s.channel == SPEC_REF_CHANNEL)
                .map(|s| s.value.as_str())
        })
    }
}

/// Everything one suite run produced, persisted for offline reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    /// Set when suite setup failed; no test ran in that case.
    #[serde(default)]
    pub suite_failure: Option<String>,
    pub outcomes: Vec<TestOutcome>,
}

impl SuiteRun {
    pub fn new(run_id: impl Into<String>, outcomes: Vec<TestOutcome>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            suite_failure: None,
            outcomes,
        }
    }

    pub fn setup_failed(run_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            suite_failure: Some(message.into()),
            outcomes: Vec::new(),
        }
    }

    pub fn count(&self, state: SpecState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    /// Surface a setup failure as an error.
    pub fn setup_result(&self) -> Result<()> {
        match &self.suite_failure {
            Some(message) => Err(HarnessError::SuiteSetup(message.clone())),
            None => Ok(()),
        }
    }

    /// Write the run as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
