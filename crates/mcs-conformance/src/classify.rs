//! Transient-vs-fatal classification of resource API errors.
//!
//! The control plane under test may itself be overloaded or restarting, so a
//! handful of server-side conditions are retried by the poller rather than
//! being mistaken for the condition under test being false. Everything else,
//! `NotFound` included, is fatal.

use std::fmt::Display;

use crate::error::{ApiError, StatusReason};
use crate::obs::emit_poll_transient;

/// Classification of a single operation error. Computed fresh for every error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Fatal,
}

/// Boolean classifiers supplied by the resource API client.
///
/// Every predicate defaults to `false`, so an error type that knows nothing
/// about server status is always fatal.
pub trait ErrorPredicates {
    fn is_internal_error(&self) -> bool {
        false
    }

    fn is_server_timeout(&self) -> bool {
        false
    }

    fn is_timeout(&self) -> bool {
        false
    }

    fn is_service_unavailable(&self) -> bool {
        false
    }

    fn is_unexpected_server_error(&self) -> bool {
        false
    }

    fn is_too_many_requests(&self) -> bool {
        false
    }
}

impl ErrorPredicates for ApiError {
    fn is_internal_error(&self) -> bool {
        self.reason == StatusReason::InternalError
    }

    fn is_server_timeout(&self) -> bool {
        self.reason == StatusReason::ServerTimeout
    }

    fn is_timeout(&self) -> bool {
        self.reason == StatusReason::Timeout
    }

    fn is_service_unavailable(&self) -> bool {
        self.reason == StatusReason::ServiceUnavailable
    }

    fn is_unexpected_server_error(&self) -> bool {
        self.reason == StatusReason::UnexpectedServerError
    }

    fn is_too_many_requests(&self) -> bool {
        self.reason == StatusReason::TooManyRequests
    }
}

/// Pure classification, without the logging side effect.
pub fn error_class<E: ErrorPredicates>(err: &E) -> ErrorClass {
    if err.is_internal_error()
        || err.is_server_timeout()
        || err.is_timeout()
        || err.is_service_unavailable()
        || err.is_unexpected_server_error()
        || err.is_too_many_requests()
    {
        ErrorClass::Transient
    } else {
        ErrorClass::Fatal
    }
}

/// Classify an error raised while attempting `description`.
///
/// Transient errors are logged so a slow convergence can be diagnosed
/// without aborting the poll.
pub fn classify<E>(err: &E, description: &str) -> ErrorClass
where
    E: ErrorPredicates + Display,
{
    let class = error_class(err);
    if class == ErrorClass::Transient {
        emit_poll_transient(description, err);
    }
    class
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(reason: StatusReason) -> ApiError {
        ApiError::new(reason, "boom")
    }

    #[test]
    fn test_transient_reasons() {
        for reason in [
            StatusReason::InternalError,
            StatusReason::ServerTimeout,
            StatusReason::Timeout,
            StatusReason::ServiceUnavailable,
            StatusReason::UnexpectedServerError,
            StatusReason::TooManyRequests,
        ] {
            assert_eq!(classify(&api(reason), "list"), ErrorClass::Transient, "{reason}");
        }
    }

    #[test]
    fn test_fatal_reasons() {
        for reason in [
            StatusReason::NotFound,
            StatusReason::AlreadyExists,
            StatusReason::Conflict,
            StatusReason::Invalid,
            StatusReason::Forbidden,
            StatusReason::Unauthorized,
            StatusReason::BadRequest,
            StatusReason::Unknown,
        ] {
            assert_eq!(classify(&api(reason), "list"), ErrorClass::Fatal, "{reason}");
        }
    }

    #[derive(Debug)]
    struct Opaque;

    impl Display for Opaque {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("opaque")
        }
    }

    impl ErrorPredicates for Opaque {}

    #[test]
    fn test_unknown_error_types_are_fatal() {
        assert_eq!(classify(&Opaque, "exec"), ErrorClass::Fatal);
    }
}
