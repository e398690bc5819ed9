//! Retry-until-condition engine.
//!
//! [`await_until`] repeatedly performs an operation and hands each result to a
//! check until the check is satisfied, a fatal error occurs, or the deadline
//! passes. Transient API errors are retried; everything else fails fast so a
//! real defect is never masked as a timeout.
//!
//! All timing goes through `tokio::time`, so tests can run on a paused clock.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};

use crate::classify::{classify, ErrorClass, ErrorPredicates};
use crate::error::PollError;
use crate::obs::{emit_poll_fatal, emit_poll_satisfied, emit_poll_timeout};

/// Polling cadence and budget.
///
/// # Invariants
///
/// `interval <= deadline` for any spec built through [`PollSpec::new`]; a
/// zero deadline still performs exactly one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSpec {
    /// Pause between attempts.
    #[serde(rename = "interval_ms", with = "millis")]
    pub interval: Duration,
    /// Total time budget, measured from the start of the poll.
    #[serde(rename = "deadline_ms", with = "millis")]
    pub deadline: Duration,
    /// When true the first attempt fires before the first sleep.
    #[serde(default = "default_immediate")]
    pub immediate: bool,
}

fn default_immediate() -> bool {
    true
}

impl PollSpec {
    /// Build a spec that checks immediately. The interval is clamped to the
    /// deadline.
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self {
            interval: interval.min(deadline),
            deadline,
            immediate: true,
        }
    }

    /// Defer the first attempt by one interval.
    pub fn deferred(mut self) -> Self {
        self.immediate = false;
        self
    }

    pub fn is_valid(&self) -> bool {
        self.interval <= self.deadline
    }
}

impl Default for PollSpec {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(10))
    }
}

/// Verdict of a single check invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// The condition holds; polling stops.
    Satisfied,
    /// Not yet; the message is kept as the latest diagnostic.
    Pending(String),
}

impl Readiness {
    pub fn pending(message: impl Into<String>) -> Self {
        Readiness::Pending(message.into())
    }

    /// Satisfied when `ok`, otherwise pending with `message`.
    pub fn when(ok: bool, message: impl FnOnce() -> String) -> Self {
        if ok {
            Readiness::Satisfied
        } else {
            Readiness::Pending(message())
        }
    }
}

/// Poll `operation` until `check` is satisfied.
///
/// Returns the first satisfying result. On failure the error encodes which
/// case occurred: [`PollError::Fatal`] for a non-transient operation error,
/// [`PollError::Check`] when the check errors, and [`PollError::Timeout`]
/// (carrying the last pending message) when the deadline passes.
///
/// Wall-clock time blocked is bounded by `deadline` plus one interval and the
/// latency of the in-flight call.
pub async fn await_until<T, E, C, Op, Fut, Chk>(
    description: &str,
    mut operation: Op,
    mut check: Chk,
    spec: PollSpec,
) -> Result<T, PollError>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ErrorPredicates + std::error::Error + Send + Sync + 'static,
    Chk: FnMut(&T) -> Result<Readiness, C>,
    C: Display,
{
    let started = Instant::now();
    let deadline = started + spec.deadline;
    let mut last_message = String::new();
    let mut attempts = 0u32;

    if !spec.immediate {
        sleep(spec.interval).await;
    }

    loop {
        attempts = attempts.saturating_add(1);

        match operation().await {
            Ok(result) => match check(&result) {
                Ok(Readiness::Satisfied) => {
                    emit_poll_satisfied(description, attempts, started.elapsed());
                    return Ok(result);
                }
                Ok(Readiness::Pending(message)) => last_message = message,
                Err(err) => {
                    emit_poll_fatal(description, &err);
                    return Err(PollError::Check {
                        description: description.to_string(),
                        message: err.to_string(),
                    });
                }
            },
            Err(err) => {
                if classify(&err, description) == ErrorClass::Fatal {
                    emit_poll_fatal(description, &err);
                    return Err(PollError::Fatal {
                        description: description.to_string(),
                        source: Box::new(err),
                    });
                }
            }
        }

        if Instant::now() >= deadline {
            emit_poll_timeout(description, attempts, &last_message);
            return Err(PollError::Timeout {
                description: description.to_string(),
                last_message,
            });
        }

        sleep(spec.interval).await;
    }
}

/// Require `check` to stay satisfied for the whole of `spec.deadline`.
///
/// Checks every `interval`. A pending check fails immediately with
/// [`PollError::Inconsistent`]; transient operation errors are tolerated and
/// fatal ones abort. Returns the last observed result, or
/// [`PollError::Timeout`] if no attempt ever produced one.
pub async fn hold_for<T, E, C, Op, Fut, Chk>(
    description: &str,
    mut operation: Op,
    mut check: Chk,
    spec: PollSpec,
) -> Result<T, PollError>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ErrorPredicates + std::error::Error + Send + Sync + 'static,
    Chk: FnMut(&T) -> Result<Readiness, C>,
    C: Display,
{
    let deadline = Instant::now() + spec.deadline;
    let mut last = None;

    if !spec.immediate {
        sleep(spec.interval).await;
    }

    loop {
        match operation().await {
            Ok(result) => match check(&result) {
                Ok(Readiness::Satisfied) => last = Some(result),
                Ok(Readiness::Pending(message)) => {
                    return Err(PollError::Inconsistent {
                        description: description.to_string(),
                        message,
                    });
                }
                Err(err) => {
                    return Err(PollError::Check {
                        description: description.to_string(),
                        message: err.to_string(),
                    });
                }
            },
            Err(err) => {
                if classify(&err, description) == ErrorClass::Fatal {
                    emit_poll_fatal(description, &err);
                    return Err(PollError::Fatal {
                        description: description.to_string(),
                        source: Box::new(err),
                    });
                }
            }
        }

        if Instant::now() >= deadline {
            return last.ok_or_else(|| PollError::Timeout {
                description: description.to_string(),
                last_message: "no successful attempt before the deadline".to_string(),
            });
        }

        sleep(spec.interval).await;
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, StatusReason};
    use std::cell::Cell;

    fn spec(interval_ms: u64, deadline_ms: u64) -> PollSpec {
        PollSpec::new(
            Duration::from_millis(interval_ms),
            Duration::from_millis(deadline_ms),
        )
    }

    fn never_fails(_: &u32) -> Result<Readiness, String> {
        Ok(Readiness::Satisfied)
    }

    #[test]
    fn test_poll_spec_clamps_interval() {
        let s = spec(500, 100);
        assert_eq!(s.interval, Duration::from_millis(100));
        assert!(s.is_valid());
    }

    #[test]
    fn test_readiness_when() {
        assert_eq!(Readiness::when(true, || "x".into()), Readiness::Satisfied);
        assert_eq!(
            Readiness::when(false, || "x".into()),
            Readiness::Pending("x".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_success_ignores_deadline() {
        let calls = Cell::new(0u32);
        let started = Instant::now();
        let result = await_until(
            "read value",
            || {
                calls.set(calls.get() + 1);
                async { Ok::<_, ApiError>(7u32) }
            },
            never_fails,
            spec(1_000, 60_000),
        )
        .await
        .expect("poll succeeds");

        assert_eq!(result, 7);
        assert_eq!(calls.get(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_fails_fast() {
        let calls = Cell::new(0u32);
        let started = Instant::now();
        let err = await_until(
            "read value",
            || {
                calls.set(calls.get() + 1);
                async { Err::<u32, _>(ApiError::new(StatusReason::Forbidden, "denied")) }
            },
            never_fails,
            spec(100, 10_000),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PollError::Fatal { .. }));
        assert!(err.to_string().contains("read value"));
        assert_eq!(calls.get(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_error_is_never_retried() {
        let calls = Cell::new(0u32);
        let err = await_until(
            "read value",
            || {
                calls.set(calls.get() + 1);
                async { Ok::<_, ApiError>(1u32) }
            },
            |_| Err::<Readiness, _>("malformed object"),
            spec(100, 10_000),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PollError::Check { .. }));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let calls = Cell::new(0u32);
        let result = await_until(
            "read value",
            || {
                let n = calls.get() + 1;
                calls.set(n);
                async move {
                    if n <= 3 {
                        Err(ApiError::new(StatusReason::ServiceUnavailable, "restarting"))
                    } else {
                        Ok(n)
                    }
                }
            },
            never_fails,
            spec(10, 1_000),
        )
        .await
        .expect("poll succeeds");

        assert_eq!(result, 4);
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_carries_last_message() {
        let calls = Cell::new(0u32);
        let err = await_until(
            "find the ServiceImport",
            || {
                let n = calls.get() + 1;
                calls.set(n);
                async move { Ok::<_, ApiError>(n) }
            },
            |n: &u32| Ok::<_, String>(Readiness::pending(format!("attempt {n} not ready"))),
            spec(100, 1_000),
        )
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        let text = err.to_string();
        assert!(text.starts_with("failed to find the ServiceImport. attempt "));
        assert!(text.ends_with(&format!("attempt {} not ready", calls.get())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_deadline_makes_one_attempt() {
        let calls = Cell::new(0u32);
        let err = await_until(
            "read value",
            || {
                calls.set(calls.get() + 1);
                async { Ok::<_, ApiError>(0u32) }
            },
            |_| Ok::<_, String>(Readiness::pending("")),
            spec(100, 0),
        )
        .await
        .unwrap_err();

        assert_eq!(calls.get(), 1);
        assert_eq!(err.to_string(), "failed to read value");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_spec_sleeps_before_first_attempt() {
        let started = Instant::now();
        await_until(
            "read value",
            || async { Ok::<_, ApiError>(1u32) },
            never_fails,
            spec(250, 1_000).deferred(),
        )
        .await
        .expect("poll succeeds");

        assert_eq!(started.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_for_passes_when_condition_holds() {
        let calls = Cell::new(0u32);
        let result = hold_for(
            "keep IPs empty",
            || {
                calls.set(calls.get() + 1);
                async { Ok::<_, ApiError>(Vec::<String>::new()) }
            },
            |ips: &Vec<String>| Ok::<_, String>(Readiness::when(ips.is_empty(), || "has IPs".into())),
            spec(1_000, 5_000),
        )
        .await
        .expect("condition holds");

        assert!(result.is_empty());
        assert_eq!(calls.get(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_for_fails_on_first_violation() {
        let calls = Cell::new(0u32);
        let err = hold_for(
            "keep IPs empty",
            || {
                let n = calls.get() + 1;
                calls.set(n);
                async move { Ok::<_, ApiError>(n) }
            },
            |n: &u32| Ok::<_, String>(Readiness::when(*n < 3, || format!("check {n} saw an IP"))),
            spec(1_000, 5_000),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PollError::Inconsistent { .. }));
        assert_eq!(err.to_string(), "keep IPs empty did not hold. check 3 saw an IP");
    }

    #[test]
    fn test_oversized_durations_saturate_when_serialized() {
        let value = serde_json::to_value(PollSpec::new(Duration::MAX, Duration::MAX)).unwrap();
        assert_eq!(value["interval_ms"], u64::MAX);
        assert_eq!(value["deadline_ms"], u64::MAX);
    }
}
