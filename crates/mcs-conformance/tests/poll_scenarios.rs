//! Condition poller scenarios against a scripted cluster on a paused clock.

use std::convert::Infallible;
use std::time::Duration;

use mcs_conformance::cluster::{ClusterApi, ServiceImport, ServiceImportType};
use mcs_conformance::error::{ApiError, StatusReason};
use mcs_conformance::fakes::{Call, ScriptedCluster};
use mcs_conformance::{await_until, PollError, PollSpec, Readiness};
use tokio::time::Instant;

fn spec(interval_ms: u64, deadline_ms: u64) -> PollSpec {
    PollSpec::new(
        Duration::from_millis(interval_ms),
        Duration::from_millis(deadline_ms),
    )
}

fn non_empty(imports: &Vec<ServiceImport>) -> Result<Readiness, Infallible> {
    Ok(Readiness::when(!imports.is_empty(), || {
        "no ServiceImports listed yet".to_string()
    }))
}

fn hello() -> ServiceImport {
    ServiceImport::new("ns", "hello", ServiceImportType::ClusterSetIP)
}

/// Test: 3 transient errors, then an empty list, then a non-empty list
#[tokio::test(start_paused = true)]
async fn test_converges_after_transient_errors_and_empty_list() {
    let cluster = ScriptedCluster::new("c1")
        .with_service_import_list(Err(ApiError::new(StatusReason::ServiceUnavailable, "unavailable")))
        .with_service_import_list(Err(ApiError::new(StatusReason::TooManyRequests, "throttled")))
        .with_service_import_list(Err(ApiError::new(StatusReason::ServerTimeout, "server timeout")))
        .with_service_import_list(Ok(vec![]))
        .with_service_import_list(Ok(vec![hello()]));

    let started = Instant::now();
    let imports = await_until(
        "list ServiceImports",
        || cluster.list_service_imports("ns"),
        non_empty,
        spec(10, 1000),
    )
    .await
    .expect("converges");

    let elapsed = started.elapsed();
    assert_eq!(imports, vec![hello()]);
    assert_eq!(cluster.calls(Call::ListServiceImports), 5);
    assert!(elapsed >= Duration::from_millis(40), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(1), "elapsed {elapsed:?}");
}

/// Test: immediate success does not wait for the interval or deadline
#[tokio::test(start_paused = true)]
async fn test_fast_success_ignores_deadline() {
    let cluster = ScriptedCluster::new("c1").with_service_import_list(Ok(vec![hello()]));

    let started = Instant::now();
    await_until(
        "list ServiceImports",
        || cluster.list_service_imports("ns"),
        non_empty,
        spec(5_000, 600_000),
    )
    .await
    .expect("first attempt");

    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(cluster.calls(Call::ListServiceImports), 1);
}

/// Test: a fatal error returns after one attempt without sleeping
#[tokio::test(start_paused = true)]
async fn test_fatal_error_fails_fast() {
    let cluster = ScriptedCluster::new("c1")
        .with_service_import_list(Err(ApiError::new(StatusReason::Forbidden, "forbidden")));

    let started = Instant::now();
    let err = await_until(
        "list ServiceImports",
        || cluster.list_service_imports("ns"),
        non_empty,
        spec(10, 1000),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PollError::Fatal { .. }));
    assert_eq!(err.to_string(), "failed to list ServiceImports: forbidden");
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(cluster.calls(Call::ListServiceImports), 1);
}

/// Test: NotFound is fatal to a raw poll
#[tokio::test(start_paused = true)]
async fn test_not_found_is_not_retried() {
    let cluster = ScriptedCluster::new("c1");

    let err = await_until(
        "get ServiceImport",
        || cluster.get_service_import("ns", "hello"),
        |_: &ServiceImport| Ok::<_, Infallible>(Readiness::Satisfied),
        spec(10, 1000),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), "FatalOperationError");
    assert!(err.to_string().contains("\"hello\" not found"));
}

/// Test: N transient errors with N x interval < deadline succeed on attempt N+1
#[tokio::test(start_paused = true)]
async fn test_bounded_retry() {
    for n in [1usize, 4, 9] {
        let mut cluster = ScriptedCluster::new("c1");
        for _ in 0..n {
            cluster = cluster.with_service_import_list(Err(ApiError::new(
                StatusReason::InternalError,
                "etcdserver: leader changed",
            )));
        }
        let cluster = cluster.with_service_import_list(Ok(vec![hello()]));

        await_until(
            "list ServiceImports",
            || cluster.list_service_imports("ns"),
            non_empty,
            spec(10, 1000),
        )
        .await
        .expect("succeeds");

        assert_eq!(cluster.calls(Call::ListServiceImports), n + 1);
    }
}

/// Test: the timeout error carries the last diagnostic from the check
#[tokio::test(start_paused = true)]
async fn test_timeout_reports_last_diagnostic() {
    let cluster = ScriptedCluster::new("c1").with_service_import_list(Ok(vec![hello()]));
    let mut attempt = 0u32;

    let started = Instant::now();
    let err = await_until(
        "observe 2 ServiceImports",
        || cluster.list_service_imports("ns"),
        |imports: &Vec<ServiceImport>| {
            attempt += 1;
            Ok::<_, Infallible>(Readiness::when(imports.len() == 2, || {
                format!("attempt {attempt}: found {} ServiceImport(s)", imports.len())
            }))
        },
        spec(100, 1000),
    )
    .await
    .unwrap_err();

    assert!(err.is_timeout());
    let text = err.to_string();
    assert!(text.starts_with("failed to observe 2 ServiceImports. "), "{text}");
    assert!(text.ends_with(&format!("attempt {attempt}: found 1 ServiceImport(s)")), "{text}");
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(started.elapsed() < Duration::from_millis(1200));
}
