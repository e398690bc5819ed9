//! Error taxonomy for the conformance harness.
//!
//! Three layers:
//! - [`ApiError`]: what the cluster resource API hands back.
//! - [`PollError`]: how a poll ended when it did not succeed.
//! - [`HarnessError`]: configuration, persistence and suite-level failures.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Machine-readable reason attached to an API error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusReason {
    NotFound,
    AlreadyExists,
    Conflict,
    Invalid,
    Forbidden,
    Unauthorized,
    BadRequest,
    InternalError,
    ServerTimeout,
    Timeout,
    ServiceUnavailable,
    TooManyRequests,
    UnexpectedServerError,
    Unknown,
}

impl StatusReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusReason::NotFound => "NotFound",
            StatusReason::AlreadyExists => "AlreadyExists",
            StatusReason::Conflict => "Conflict",
            StatusReason::Invalid => "Invalid",
            StatusReason::Forbidden => "Forbidden",
            StatusReason::Unauthorized => "Unauthorized",
            StatusReason::BadRequest => "BadRequest",
            StatusReason::InternalError => "InternalError",
            StatusReason::ServerTimeout => "ServerTimeout",
            StatusReason::Timeout => "Timeout",
            StatusReason::ServiceUnavailable => "ServiceUnavailable",
            StatusReason::TooManyRequests => "TooManyRequests",
            StatusReason::UnexpectedServerError => "UnexpectedServerError",
            StatusReason::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by the cluster resource API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub reason: StatusReason,
    pub message: String,
}

impl ApiError {
    pub fn new(reason: StatusReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    /// `NotFound` error in the form the API server reports it.
    pub fn not_found(kind: &str, name: &str) -> Self {
        Self::new(StatusReason::NotFound, format!("{kind} \"{name}\" not found"))
    }

    pub fn is_not_found(&self) -> bool {
        self.reason == StatusReason::NotFound
    }
}

/// Outcome of a poll that did not produce a satisfying result.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The operation failed with an error that must not be retried.
    #[error("failed to {description}: {source}")]
    Fatal {
        description: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The check function itself reported an error.
    #[error("failed to {description}: {message}")]
    Check {
        description: String,
        message: String,
    },

    /// The deadline passed without the check being satisfied.
    #[error("failed to {description}{}", suffix(.last_message))]
    Timeout {
        description: String,
        last_message: String,
    },

    /// A condition expected to hold for a period stopped holding.
    #[error("{description} did not hold{}", suffix(.message))]
    Inconsistent {
        description: String,
        message: String,
    },
}

fn suffix(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(". {message}")
    }
}

impl PollError {
    /// Short tag naming the failure class, for logs and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            PollError::Fatal { .. } => "FatalOperationError",
            PollError::Check { .. } => "CheckError",
            PollError::Timeout { .. } => "TimeoutExceeded",
            PollError::Inconsistent { .. } => "ConditionNotHeld",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PollError::Timeout { .. })
    }
}

/// Harness-level errors.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("suite setup failed: {0}")]
    SuiteSetup(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;
