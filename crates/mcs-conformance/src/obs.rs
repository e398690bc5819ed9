//! Structured observability hooks for polls, specs and reports.
//!
//! Every emission carries an `event` field so log pipelines can filter on it.
//! For JSON output, initialise tracing with [`crate::telemetry::LogFormat::Json`].

use std::fmt::Display;
use std::time::Duration;

use tracing::{debug, info, info_span, warn, Span};

/// Span tagging everything logged while a spec runs.
///
/// Attach it with `tracing::Instrument` so it follows the spec future across
/// await points:
///
/// ```ignore
/// body(ctx).instrument(spec_span("ServiceImport should be created")).await
/// ```
pub fn spec_span(description: &str) -> Span {
    info_span!("mcs.spec", spec = %description)
}

/// Transient API failure tolerated by the poller.
pub fn emit_poll_transient(description: &str, error: &dyn Display) {
    warn!(
        event = "poll.transient",
        operation = %description,
        error = %error,
        "transient failure when attempting to {description}"
    );
}

pub fn emit_poll_satisfied(description: &str, attempts: u32, elapsed: Duration) {
    debug!(
        event = "poll.satisfied",
        operation = %description,
        attempts = attempts,
        elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
    );
}

pub fn emit_poll_fatal(description: &str, error: &dyn Display) {
    warn!(event = "poll.fatal", operation = %description, error = %error);
}

pub fn emit_poll_timeout(description: &str, attempts: u32, last_message: &str) {
    info!(
        event = "poll.timeout",
        operation = %description,
        attempts = attempts,
        last_message = %last_message,
    );
}

pub fn emit_spec_started(description: &str) {
    info!(event = "spec.started", spec = %description);
}

pub fn emit_spec_step(step: &str) {
    info!(event = "spec.step", step = %step);
}

pub fn emit_spec_finished(description: &str, state: &str, duration_ms: u64) {
    info!(
        event = "spec.finished",
        spec = %description,
        state = %state,
        duration_ms = duration_ms,
    );
}

pub fn emit_suite_setup_failed(run_id: &str, error: &dyn Display) {
    tracing::error!(event = "suite.setup_failed", run_id = %run_id, error = %error);
}

pub fn emit_report_written(path: &str, groups: usize) {
    info!(event = "report.written", path = %path, groups = groups);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_transient_emission_is_logged() {
        emit_poll_transient("list ServiceImports", &"the server is currently unable");
        assert!(logs_contain("poll.transient"));
        assert!(logs_contain("list ServiceImports"));
    }

    #[traced_test]
    #[test]
    fn test_spec_span_fields() {
        let span = spec_span("some spec");
        let _guard = span.enter();
        emit_spec_started("some spec");
        assert!(logs_contain("spec.started"));
    }
}
