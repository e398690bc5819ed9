//! Read-side view of a cluster's multi-cluster service resources.
//!
//! Only the fields the conformance checks inspect are modelled. Creating and
//! deleting workloads is the job of whatever backs [`ClusterApi`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Label naming the exported service on an MCS endpoint slice.
pub const LABEL_SERVICE_NAME: &str = "multicluster.kubernetes.io/service-name";
/// Label naming the cluster an MCS endpoint slice was sourced from.
pub const LABEL_SOURCE_CLUSTER: &str = "multicluster.kubernetes.io/source-cluster";
pub const LABEL_MANAGED_BY: &str = "endpointslice.kubernetes.io/managed-by";

/// ServiceExport condition reporting whether the export is valid.
pub const CONDITION_VALID: &str = "Valid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceImportType {
    ClusterSetIP,
    Headless,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    #[serde(default)]
    pub name: String,
    pub protocol: String,
    pub port: u16,
    #[serde(default)]
    pub app_protocol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceImport {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(rename = "type")]
    pub import_type: ServiceImportType,
    /// Cluster-set IPs; empty for headless imports.
    #[serde(default)]
    pub ips: Vec<String>,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
    #[serde(default)]
    pub session_affinity: Option<String>,
}

impl ServiceImport {
    pub fn new(namespace: &str, name: &str, import_type: ServiceImportType) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            import_type,
            ips: Vec::new(),
            ports: Vec::new(),
            session_affinity: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceExport {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ServiceExport {
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSlice {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl EndpointSlice {
    /// An MCS slice carries at least one of the MCS labels.
    pub fn is_mcs(&self) -> bool {
        self.labels.contains_key(LABEL_SERVICE_NAME) || self.labels.contains_key(LABEL_SOURCE_CLUSTER)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// One cluster participating in the cluster set.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Context name, used in messages.
    fn name(&self) -> &str;

    /// Returns `NotFound` if the import does not exist.
    async fn get_service_import(&self, namespace: &str, name: &str) -> ApiResult<ServiceImport>;

    async fn list_service_imports(&self, namespace: &str) -> ApiResult<Vec<ServiceImport>>;

    async fn get_service_export(&self, namespace: &str, name: &str) -> ApiResult<ServiceExport>;

    async fn list_endpoint_slices(&self, namespace: &str) -> ApiResult<Vec<EndpointSlice>>;

    /// Run `command` in `pod` and capture its output.
    async fn exec(&self, namespace: &str, pod: &str, command: &[String]) -> ApiResult<ExecOutput>;
}
