//! Assertion layer and side-channel records.
//!
//! A spec body fails through [`Abort`]. Results and options only become an
//! `Abort` via [`Assert`], which forces the author to pick one of two exits:
//!
//! - [`Assert::non_conformant`]: the failure is an observed violation of the
//!   MCS specification. The explanation thunk runs only if the assertion
//!   actually fails, and becomes a `non-conformance` signal on the outcome.
//! - [`Assert::indeterminate`]: the harness could not reach a judgement
//!   (environment trouble, an unexpected API error, a bug in the spec).

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Channel carrying the URL of the specification clause a test validates.
pub const SPEC_REF_CHANNEL: &str = "spec-ref";

/// Channel carrying the explanation of an observed specification violation.
pub const NON_CONFORMANCE_CHANNEL: &str = "non-conformance";

const MISSING_VALUE: &str = "expected a value but found none";

/// One named side-channel entry attached to a test outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub channel: String,
    pub value: String,
}

impl SignalRecord {
    pub fn new(channel: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            value: value.into(),
        }
    }

    pub fn spec_ref(url: impl Into<String>) -> Self {
        Self::new(SPEC_REF_CHANNEL, url)
    }

    pub fn non_conformance(message: impl Into<String>) -> Self {
        Self::new(NON_CONFORMANCE_CHANNEL, message)
    }

    pub fn is_non_conformance(&self) -> bool {
        self.channel == NON_CONFORMANCE_CHANNEL
    }
}

/// A failed assertion, carrying enough structure to classify and report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// What the test author was asserting.
    pub description: String,
    /// Underlying error text.
    pub cause: String,
    /// Type tag of the underlying error.
    pub kind: String,
    /// Present when the failure is a declared specification violation.
    pub non_conformance: Option<String>,
}

impl Failure {
    pub fn indeterminate(
        description: impl Into<String>,
        kind: &str,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            cause: cause.into(),
            kind: kind.to_string(),
            non_conformance: None,
        }
    }

    pub fn non_conformant(
        message: impl Into<String>,
        kind: &str,
        cause: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            description: message.clone(),
            cause: cause.into(),
            kind: kind.to_string(),
            non_conformance: Some(message),
        }
    }

    /// Raw failure text in the assertion layer's two-part shape.
    pub fn render(&self) -> String {
        let cause = self
            .cause
            .lines()
            .map(|line| format!("    {line}"))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "{}\nUnexpected error:\n    <{}>: \n{}\noccurred",
            self.description, self.kind, cause
        )
    }

    /// The signal this failure contributes to its outcome, if any.
    pub fn signal(&self) -> Option<SignalRecord> {
        self.non_conformance
            .as_ref()
            .map(|message| SignalRecord::non_conformance(message.clone()))
    }
}

/// Early exit from a spec body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Abort {
    Failed(Failure),
    Skipped(String),
}

impl Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Abort::Failed(failure) => f.write_str(&failure.render()),
            Abort::Skipped(reason) => write!(f, "skipped: {reason}"),
        }
    }
}

impl From<Failure> for Abort {
    fn from(failure: Failure) -> Self {
        Abort::Failed(failure)
    }
}

/// Return type of every spec body.
pub type SpecResult = Result<(), Abort>;

/// Converts fallible values into spec failures with an explicit verdict class.
pub trait Assert<T> {
    /// Fail as a specification violation. `explain` runs only on failure.
    fn non_conformant<F>(self, explain: F) -> Result<T, Abort>
    where
        F: FnOnce() -> String;

    /// Fail as an indeterminate harness or environment problem.
    fn indeterminate(self, description: &str) -> Result<T, Abort>;
}

impl<T, E: Display> Assert<T> for Result<T, E> {
    fn non_conformant<F>(self, explain: F) -> Result<T, Abort>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|err| {
            Failure::non_conformant(explain(), short_type_name::<E>(), err.to_string()).into()
        })
    }

    fn indeterminate(self, description: &str) -> Result<T, Abort> {
        self.map_err(|err| {
            Failure::indeterminate(description, short_type_name::<E>(), err.to_string()).into()
        })
    }
}

impl<T> Assert<T> for Option<T> {
    fn non_conformant<F>(self, explain: F) -> Result<T, Abort>
    where
        F: FnOnce() -> String,
    {
        self.ok_or_else(|| Failure::non_conformant(explain(), "Missing", MISSING_VALUE).into())
    }

    fn indeterminate(self, description: &str) -> Result<T, Abort> {
        self.ok_or_else(|| Failure::indeterminate(description, "Missing", MISSING_VALUE).into())
    }
}

/// An unmet boolean expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unmet(pub String);

impl Display for Unmet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}", self.0)
    }
}

/// Lift a boolean into the assertion path: `ensure(ok, "the type to be Headless")`.
pub fn ensure(condition: bool, what: impl Into<String>) -> Result<(), Unmet> {
    if condition {
        Ok(())
    } else {
        Err(Unmet(what.into()))
    }
}

/// Skip the current spec.
pub fn skip(reason: impl Into<String>) -> SpecResult {
    Err(Abort::Skipped(reason.into()))
}

fn short_type_name<E>() -> &'static str {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
