//! Polling checks shared by the conformance specs.
//!
//! A [`TestDriver`] is scoped to one test namespace. Each check waits for a
//! cluster to converge and returns a [`PollError`] when it does not; the spec
//! decides whether that failure is non-conformant or indeterminate.

use std::convert::Infallible;

use uuid::Uuid;

use crate::cluster::{
    ApiResult, ClusterApi, EndpointSlice, ExecOutput, ServiceExport, ServiceImport,
    LABEL_MANAGED_BY, LABEL_SERVICE_NAME, LABEL_SOURCE_CLUSTER,
};
use crate::classify::{classify, ErrorClass};
use crate::config::{HarnessConfig, ENDPOINT_SLICE_MANAGED_BY};
use crate::error::PollError;
use crate::poll::{await_until, hold_for, PollSpec, Readiness};

/// ClusterIP service exported from the first cluster.
pub const HELLO_SERVICE_NAME: &str = "hello";
/// Headless service exported from the first cluster.
pub const HEADLESS_SERVICE_NAME: &str = "hello-headless";
/// ClusterIP service deployed in the first cluster but never exported.
pub const UNEXPORTED_SERVICE_NAME: &str = "hello-unexported";
/// Pod used to issue requests from inside each cluster.
pub const REQUEST_POD_NAME: &str = "request";

/// A fresh `mcs-conformance-<8 hex>` namespace name.
pub fn generate_namespace() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("mcs-conformance-{}", &id[..8])
}

#[derive(Debug, Clone)]
pub struct TestDriver {
    namespace: String,
    poll: PollSpec,
    resource_poll: PollSpec,
    exec_poll: PollSpec,
    hold_poll: PollSpec,
    verify_managed_by: bool,
}

impl TestDriver {
    /// Driver for the configured namespace, or a freshly named one.
    pub fn new(config: &HarnessConfig) -> Self {
        let namespace = config.namespace.clone().unwrap_or_else(generate_namespace);
        Self {
            namespace,
            poll: config.poll,
            resource_poll: config.resource_poll,
            exec_poll: config.exec_poll,
            hold_poll: config.hold_poll,
            verify_managed_by: !config.skip_verify_endpoint_slice_managed_by,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Wait for the import `name` to exist and satisfy `verify`.
    ///
    /// `NotFound` keeps the poll going. If the import shows up but `verify`
    /// never holds, the last observed import is returned so the caller can
    /// assert on what is wrong with it.
    pub async fn await_service_import<V>(
        &self,
        cluster: &dyn ClusterApi,
        name: &str,
        verify: V,
    ) -> Result<ServiceImport, PollError>
    where
        V: Fn(&ServiceImport) -> bool,
    {
        let namespace = self.namespace.as_str();
        let mut last_seen: Option<ServiceImport> = None;

        let result = await_until(
            &format!("find ServiceImport {name:?} on cluster {:?}", cluster.name()),
            move || async move { found(cluster.get_service_import(namespace, name).await) },
            |import: &Option<ServiceImport>| {
                Ok::<_, Infallible>(match import {
                    None => Readiness::pending(format!("ServiceImport {name:?} not found")),
                    Some(import) => {
                        last_seen = Some(import.clone());
                        Readiness::when(verify(import), || {
                            format!("ServiceImport {name:?} does not have the expected state")
                        })
                    }
                })
            },
            self.resource_poll,
        )
        .await;

        match result {
            Ok(Some(import)) => Ok(import),
            Ok(None) => Err(PollError::Check {
                description: format!("find ServiceImport {name:?}"),
                message: "satisfied without an import".to_string(),
            }),
            Err(err) if err.is_timeout() => last_seen.ok_or(err),
            Err(err) => Err(err),
        }
    }

    /// Wait for the export `name` to report a condition of `condition_type`.
    pub async fn await_service_export_condition(
        &self,
        cluster: &dyn ClusterApi,
        name: &str,
        condition_type: &str,
    ) -> Result<ServiceExport, PollError> {
        let namespace = self.namespace.as_str();
        let result = await_until(
            &format!("observe the {condition_type} condition on ServiceExport {name:?}"),
            move || async move { found(cluster.get_service_export(namespace, name).await) },
            |export: &Option<ServiceExport>| {
                Ok::<_, Infallible>(match export {
                    None => Readiness::pending(format!("ServiceExport {name:?} not found")),
                    Some(export) => Readiness::when(export.condition(condition_type).is_some(), || {
                        format!("the {condition_type} condition was not set")
                    }),
                })
            },
            self.resource_poll,
        )
        .await?;

        result.ok_or_else(|| PollError::Check {
            description: format!("observe the {condition_type} condition"),
            message: "satisfied without an export".to_string(),
        })
    }

    /// Wait for an endpoint slice carrying the MCS labels to appear.
    pub async fn await_mcs_endpoint_slice(
        &self,
        cluster: &dyn ClusterApi,
    ) -> Result<EndpointSlice, PollError> {
        let namespace = self.namespace.as_str();
        let slices = await_until(
            &format!("find an MCS EndpointSlice on cluster {:?}", cluster.name()),
            move || async move { cluster.list_endpoint_slices(namespace).await },
            |slices: &Vec<EndpointSlice>| {
                Ok::<_, Infallible>(Readiness::when(slices.iter().any(EndpointSlice::is_mcs), || {
                    format!("none of the {} EndpointSlices carry an MCS label", slices.len())
                }))
            },
            self.resource_poll,
        )
        .await?;

        slices
            .into_iter()
            .find(EndpointSlice::is_mcs)
            .ok_or_else(|| PollError::Check {
                description: "find an MCS EndpointSlice".to_string(),
                message: "the MCS EndpointSlice disappeared".to_string(),
            })
    }

    /// Require the import `name` to keep an empty clusterset IP list for the
    /// whole hold window. The import must already exist.
    pub async fn ensure_no_cluster_set_ip(
        &self,
        cluster: &dyn ClusterApi,
        name: &str,
    ) -> Result<ServiceImport, PollError> {
        let namespace = self.namespace.as_str();
        hold_for(
            &format!("ServiceImport {name:?} on cluster {:?} without clusterset IPs", cluster.name()),
            move || async move { cluster.get_service_import(namespace, name).await },
            |import: &ServiceImport| {
                Ok::<_, Infallible>(Readiness::when(import.ips.is_empty(), || {
                    format!("clusterset IPs {:?} were allocated", import.ips)
                }))
            },
            self.hold_poll,
        )
        .await
    }

    /// Label problems on an MCS endpoint slice, one message per violation.
    pub fn mcs_slice_label_violations(
        &self,
        slice: &EndpointSlice,
        service_name: &str,
    ) -> Vec<String> {
        let mut violations = Vec::new();
        if slice.labels.get(LABEL_SERVICE_NAME).map(String::as_str) != Some(service_name) {
            violations.push(format!(
                "the MCS EndpointSlice {:?} does not contain the {LABEL_SERVICE_NAME:?} label referencing the service name",
                slice.name
            ));
        }
        for label in [LABEL_SOURCE_CLUSTER, LABEL_MANAGED_BY] {
            if !slice.labels.contains_key(label) {
                violations.push(format!(
                    "the MCS EndpointSlice {:?} does not contain the {label:?} label",
                    slice.name
                ));
            }
        }
        if self.verify_managed_by
            && slice.labels.get(LABEL_MANAGED_BY).map(String::as_str)
                == Some(ENDPOINT_SLICE_MANAGED_BY)
        {
            violations.push(format!(
                "the MCS EndpointSlice's {LABEL_MANAGED_BY:?} label must not reference {ENDPOINT_SLICE_MANAGED_BY:?}"
            ));
        }
        violations
    }

    /// Run `command` in the request pod until its output contains `expected`
    /// on `consecutive` runs in a row.
    pub async fn await_cmd_output_contains(
        &self,
        cluster: &dyn ClusterApi,
        command: &[String],
        expected: &str,
        consecutive: u32,
    ) -> Result<ExecOutput, PollError> {
        let namespace = self.namespace.as_str();
        let required = consecutive.max(1);
        let mut streak = 0u32;

        await_until(
            &format!("see {expected:?} in the output of {:?} on cluster {:?}", command.join(" "), cluster.name()),
            move || async move { cluster.exec(namespace, REQUEST_POD_NAME, command).await },
            |output: &ExecOutput| {
                if output.stdout.contains(expected) {
                    streak += 1;
                } else {
                    streak = 0;
                    return Ok::<_, Infallible>(Readiness::pending(format!(
                        "output {:?} does not contain {expected:?}",
                        output.stdout.trim()
                    )));
                }
                Ok(Readiness::when(streak >= required, || {
                    format!("matched {streak} of {required} consecutive runs")
                }))
            },
            self.exec_poll,
        )
        .await
    }

    /// Run `command` in the request pod `attempts` times; no run may print
    /// `unexpected`. Transient exec errors use up an attempt.
    pub async fn ensure_cmd_output_lacks(
        &self,
        cluster: &dyn ClusterApi,
        command: &[String],
        unexpected: &str,
        attempts: u32,
    ) -> Result<(), PollError> {
        let description = format!(
            "output of {:?} on cluster {:?} without {unexpected:?}",
            command.join(" "),
            cluster.name()
        );

        for attempt in 1..=attempts {
            match cluster.exec(&self.namespace, REQUEST_POD_NAME, command).await {
                Ok(output) if output.stdout.contains(unexpected) => {
                    return Err(PollError::Inconsistent {
                        description,
                        message: format!(
                            "run {attempt} of {attempts} printed {:?}",
                            output.stdout.trim()
                        ),
                    });
                }
                Ok(_) => {}
                Err(err) if classify(&err, &description) == ErrorClass::Fatal => {
                    return Err(PollError::Fatal {
                        description,
                        source: Box::new(err),
                    });
                }
                Err(_) => {}
            }
        }
        Ok(())
    }
}

/// Fold `NotFound` into an absent value so polls keep waiting on it.
fn found<T>(result: ApiResult<T>) -> ApiResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}
