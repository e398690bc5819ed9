//! Standard MCS conformance specs.
//!
//! Every spec assumes this workload is in place before the run starts, all of
//! it deployed in the first cluster:
//! - `hello`, a ClusterIP service, exported
//! - `hello-headless`, a headless service, exported
//! - `hello-unexported`, a ClusterIP service, not exported

use std::net::IpAddr;

use crate::cluster::{ServiceImportType, CONDITION_VALID};
use crate::driver::{HEADLESS_SERVICE_NAME, HELLO_SERVICE_NAME, UNEXPORTED_SERVICE_NAME};
use crate::error::PollError;
use crate::labels::{CLUSTER_IP, CONNECTIVITY, ENDPOINT_SLICE, HEADLESS, OPTIONAL, REQUIRED};
use crate::signal::{ensure, Abort, Assert, SpecResult};
use crate::suite::{ConformanceSuite, TestContext};

const KEP: &str = "https://github.com/kubernetes/enhancements/tree/master/keps/sig-multicluster/1645-multi-cluster-services-api";

/// Port the hello services listen on.
pub const HELLO_PORT: u16 = 42;
/// Requests issued to the unexported service from each cluster.
pub const UNEXPORTED_REQUEST_ATTEMPTS: u32 = 20;

pub fn standard_suite() -> ConformanceSuite {
    ConformanceSuite::new("MCS conformance")
        .spec(
            "Exporting a service should create a ServiceImport in every cluster of the cluster set",
            &[REQUIRED],
            service_import_created,
        )
        .spec(
            "An IP should be allocated for a ClusterSetIP ServiceImport",
            &[REQUIRED, CLUSTER_IP],
            cluster_set_ip_allocated,
        )
        .spec(
            "Exporting a headless service should create a ServiceImport of type Headless in every cluster of the cluster set",
            &[REQUIRED, HEADLESS],
            headless_service_import_created,
        )
        .spec(
            "No clusterset IP should be allocated for a Headless ServiceImport",
            &[REQUIRED, HEADLESS],
            headless_no_cluster_set_ip,
        )
        .spec(
            "A ServiceExport should report the Valid condition",
            &[REQUIRED],
            service_export_valid,
        )
        .spec(
            "Exporting a service should create an MCS EndpointSlice in each cluster with the required MCS labels",
            &[OPTIONAL, ENDPOINT_SLICE],
            mcs_endpoint_slices,
        )
        .spec(
            "A service that is not exported should be inaccessible from every cluster",
            &[REQUIRED],
            unexported_service_unreachable,
        )
        .spec(
            "A request to the clusterset address of an exported ClusterIP service should succeed from every cluster",
            &[OPTIONAL, CONNECTIVITY, CLUSTER_IP],
            clusterset_connectivity,
        )
}

/// A timeout means the implementation never converged. Any other poll error
/// comes from the environment and cannot be judged.
fn converged<T>(
    result: Result<T, PollError>,
    description: &str,
    violation: impl FnOnce() -> String,
) -> Result<T, Abort> {
    match result {
        Err(err) if !err.is_timeout() => Err::<T, _>(err).indeterminate(description),
        other => other.non_conformant(violation),
    }
}

/// A hold that broke is a violation. Any other poll error cannot be judged.
fn kept<T>(
    result: Result<T, PollError>,
    description: &str,
    violation: impl FnOnce() -> String,
) -> Result<T, Abort> {
    match result {
        Err(err) if !matches!(err, PollError::Inconsistent { .. }) => {
            Err::<T, _>(err).indeterminate(description)
        }
        other => other.non_conformant(violation),
    }
}

fn request_command(service: &str, namespace: &str) -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        format!("echo hi | nc {service}.{namespace}.svc.clusterset.local {HELLO_PORT}"),
    ]
}

/// Every cluster must import `service` with type `expected`.
async fn imported_with_type(
    ctx: &TestContext,
    service: &str,
    expected: ServiceImportType,
) -> SpecResult {
    let driver = ctx.driver();

    for cluster in ctx.clusters() {
        ctx.by(format!("Awaiting the ServiceImport on cluster {:?}", cluster.name()));
        let found = driver
            .await_service_import(cluster.as_ref(), service, |_| true)
            .await;
        let import = converged(found, "Error retrieving ServiceImport", || {
            format!("the ServiceImport was not found on cluster {:?}", cluster.name())
        })?;
        ensure(
            import.import_type == expected,
            format!("the ServiceImport type to be {expected:?}"),
        )
        .non_conformant(|| {
            format!(
                "ServiceImport on cluster {:?} has type {:?}",
                cluster.name(),
                import.import_type
            )
        })?;
    }
    Ok(())
}

async fn service_import_created(ctx: TestContext) -> SpecResult {
    ctx.spec_ref(format!("{KEP}#importing-services"));
    imported_with_type(&ctx, HELLO_SERVICE_NAME, ServiceImportType::ClusterSetIP).await
}

async fn headless_service_import_created(ctx: TestContext) -> SpecResult {
    ctx.spec_ref(format!("{KEP}#service-types"));
    imported_with_type(&ctx, HEADLESS_SERVICE_NAME, ServiceImportType::Headless).await
}

async fn headless_no_cluster_set_ip(ctx: TestContext) -> SpecResult {
    ctx.spec_ref(format!("{KEP}#clustersetip"));
    let cluster = ctx
        .clusters()
        .first()
        .indeterminate("No cluster is configured")?;
    let driver = ctx.driver();

    driver
        .await_service_import(cluster.as_ref(), HEADLESS_SERVICE_NAME, |_| true)
        .await
        .indeterminate("ServiceImport was not found")?;

    let held = driver
        .ensure_no_cluster_set_ip(cluster.as_ref(), HEADLESS_SERVICE_NAME)
        .await;
    kept(held, "Error retrieving ServiceImport", || {
        format!(
            "a clusterset IP was allocated for the Headless ServiceImport on cluster {:?}",
            cluster.name()
        )
    })?;
    Ok(())
}

async fn cluster_set_ip_allocated(ctx: TestContext) -> SpecResult {
    ctx.spec_ref(format!("{KEP}#clustersetip"));
    let cluster = ctx
        .clusters()
        .first()
        .indeterminate("No cluster is configured")?;

    let import = ctx
        .driver()
        .await_service_import(cluster.as_ref(), HELLO_SERVICE_NAME, |i| !i.ips.is_empty())
        .await
        .indeterminate("ServiceImport was not found")?;

    let ip = import
        .ips
        .first()
        .non_conformant(|| "the ServiceImport has no cluster-set IP".to_string())?;
    ip.parse::<IpAddr>()
        .non_conformant(|| format!("The value {ip:?} is not a valid IP"))?;
    Ok(())
}

async fn service_export_valid(ctx: TestContext) -> SpecResult {
    ctx.spec_ref(format!("{KEP}#service-export"));
    let cluster = ctx
        .clusters()
        .first()
        .indeterminate("No cluster is configured")?;

    let export = ctx
        .driver()
        .await_service_export_condition(cluster.as_ref(), HELLO_SERVICE_NAME, CONDITION_VALID)
        .await;
    converged(export, "Error retrieving ServiceExport", || {
        format!("The {CONDITION_VALID} condition was not set")
    })?;
    Ok(())
}

async fn mcs_endpoint_slices(ctx: TestContext) -> SpecResult {
    ctx.spec_ref(format!("{KEP}#using-endpointslice-objects-to-track-endpoints"));
    let driver = ctx.driver();

    for cluster in ctx.clusters() {
        let found = driver.await_mcs_endpoint_slice(cluster.as_ref()).await;
        let slice = converged(found, "Error retrieving EndpointSlices", || {
            format!(
                "an MCS EndpointSlice was not found on cluster {:?}. An MCS EndpointSlice is identified by \
                 the presence of at least one of the required MCS labels. If the implementation does not \
                 use MCS EndpointSlices, exclude the {ENDPOINT_SLICE:?} label to skip this test.",
                cluster.name()
            )
        })?;

        let violations = driver.mcs_slice_label_violations(&slice, HELLO_SERVICE_NAME);
        ensure(violations.is_empty(), "the MCS EndpointSlice labels to be valid")
            .non_conformant(|| violations.join("; "))?;
    }
    Ok(())
}

async fn unexported_service_unreachable(ctx: TestContext) -> SpecResult {
    ctx.spec_ref(format!("{KEP}#exporting-services"));
    let driver = ctx.driver();
    let command = request_command(UNEXPORTED_SERVICE_NAME, driver.namespace());

    for cluster in ctx.clusters() {
        ctx.by(format!(
            "Requesting the unexported service from cluster {:?}",
            cluster.name()
        ));
        let result = driver
            .ensure_cmd_output_lacks(cluster.as_ref(), &command, "pod ip", UNEXPORTED_REQUEST_ATTEMPTS)
            .await;
        kept(result, "Error executing the request command", || {
            format!(
                "the unexported service {UNEXPORTED_SERVICE_NAME:?} was reachable from cluster {:?}",
                cluster.name()
            )
        })?;
    }
    Ok(())
}

async fn clusterset_connectivity(ctx: TestContext) -> SpecResult {
    ctx.spec_ref(format!("{KEP}#dns"));
    let driver = ctx.driver();
    let command = request_command(HELLO_SERVICE_NAME, driver.namespace());

    for cluster in ctx.clusters() {
        ctx.by(format!(
            "Executing command {:?} on cluster {:?}",
            command.join(" "),
            cluster.name()
        ));
        let output = driver
            .await_cmd_output_contains(cluster.as_ref(), &command, "pod ip", 1)
            .await;
        converged(output, "Error executing the request command", || {
            format!(
                "the clusterset address of {HELLO_SERVICE_NAME:?} could not be reached from cluster {:?}",
                cluster.name()
            )
        })?;
    }
    Ok(())
}
