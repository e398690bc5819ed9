//! Scripted in-memory cluster (testing only).
//!
//! Each API method replays a queue of canned responses. The last response in
//! a queue repeats forever, which is what polling code wants: script a few
//! transient errors followed by the steady state.
//!
//! ServiceImport gets can be scripted per import name and execs per command
//! text; anything without its own script falls back to the shared queue.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::cluster::{
    ApiResult, ClusterApi, EndpointSlice, ExecOutput, ServiceExport, ServiceImport,
};
use crate::error::ApiError;

/// API methods, for call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    GetServiceImport,
    ListServiceImports,
    GetServiceExport,
    ListEndpointSlices,
    Exec,
}

#[derive(Debug)]
struct Script<T> {
    responses: Mutex<VecDeque<ApiResult<T>>>,
    calls: AtomicUsize,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }
}

impl<T: Clone> Script<T> {
    fn push(&self, response: ApiResult<T>) {
        self.responses.lock().unwrap().push_back(response);
    }

    fn next(&self, unscripted: impl FnOnce() -> ApiResult<T>) -> ApiResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            responses.pop_front().unwrap_or_else(unscripted)
        } else {
            responses.front().cloned().unwrap_or_else(unscripted)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// In-memory [`ClusterApi`] driven by scripted responses.
///
/// Unscripted gets return `NotFound`, unscripted lists are empty and
/// unscripted execs produce no output.
#[derive(Debug, Default)]
pub struct ScriptedCluster {
    name: String,
    service_imports: Script<ServiceImport>,
    named_service_imports: Mutex<BTreeMap<String, Arc<Script<ServiceImport>>>>,
    service_import_lists: Script<Vec<ServiceImport>>,
    service_exports: Script<ServiceExport>,
    endpoint_slices: Script<Vec<EndpointSlice>>,
    exec_outputs: Script<ExecOutput>,
    matched_exec_outputs: Mutex<Vec<(String, Arc<Script<ExecOutput>>)>>,
    commands: Mutex<Vec<Vec<String>>>,
}

impl ScriptedCluster {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_service_import(self, response: ApiResult<ServiceImport>) -> Self {
        self.service_imports.push(response);
        self
    }

    /// Script responses for the import `name` only.
    pub fn with_named_service_import(self, name: &str, response: ApiResult<ServiceImport>) -> Self {
        self.named_service_imports
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push(response);
        self
    }

    pub fn with_service_import_list(self, response: ApiResult<Vec<ServiceImport>>) -> Self {
        self.service_import_lists.push(response);
        self
    }

    pub fn with_service_export(self, response: ApiResult<ServiceExport>) -> Self {
        self.service_exports.push(response);
        self
    }

    pub fn with_endpoint_slices(self, response: ApiResult<Vec<EndpointSlice>>) -> Self {
        self.endpoint_slices.push(response);
        self
    }

    pub fn with_exec_output(self, response: ApiResult<ExecOutput>) -> Self {
        self.exec_outputs.push(response);
        self
    }

    /// Script responses for execs whose joined command contains `needle`.
    /// The first matching needle, in scripting order, wins.
    pub fn with_exec_output_matching(self, needle: &str, response: ApiResult<ExecOutput>) -> Self {
        {
            let mut matched = self.matched_exec_outputs.lock().unwrap();
            match matched.iter().find(|(n, _)| n == needle) {
                Some((_, script)) => script.push(response),
                None => {
                    let script = Arc::new(Script::default());
                    script.push(response);
                    matched.push((needle.to_string(), script));
                }
            }
        }
        self
    }

    /// Calls to `call`, including those answered by per-name or per-command scripts.
    pub fn calls(&self, call: Call) -> usize {
        match call {
            Call::GetServiceImport => {
                let named: usize = self
                    .named_service_imports
                    .lock()
                    .unwrap()
                    .values()
                    .map(|s| s.calls())
                    .sum();
                self.service_imports.calls() + named
            }
            Call::ListServiceImports => self.service_import_lists.calls(),
            Call::GetServiceExport => self.service_exports.calls(),
            Call::ListEndpointSlices => self.endpoint_slices.calls(),
            Call::Exec => {
                let matched: usize = self
                    .matched_exec_outputs
                    .lock()
                    .unwrap()
                    .iter()
                    .map(|(_, s)| s.calls())
                    .sum();
                self.exec_outputs.calls() + matched
            }
        }
    }

    /// Commands passed to `exec`, in call order.
    pub fn executed(&self) -> Vec<Vec<String>> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterApi for ScriptedCluster {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_service_import(&self, _namespace: &str, name: &str) -> ApiResult<ServiceImport> {
        let named = self.named_service_imports.lock().unwrap().get(name).cloned();
        let script = named.as_deref().unwrap_or(&self.service_imports);
        script.next(|| Err(ApiError::not_found("serviceimports", name)))
    }

    async fn list_service_imports(&self, _namespace: &str) -> ApiResult<Vec<ServiceImport>> {
        self.service_import_lists.next(|| Ok(Vec::new()))
    }

    async fn get_service_export(&self, _namespace: &str, name: &str) -> ApiResult<ServiceExport> {
        self.service_exports
            .next(|| Err(ApiError::not_found("serviceexports", name)))
    }

    async fn list_endpoint_slices(&self, _namespace: &str) -> ApiResult<Vec<EndpointSlice>> {
        self.endpoint_slices.next(|| Ok(Vec::new()))
    }

    async fn exec(&self, _namespace: &str, _pod: &str, command: &[String]) -> ApiResult<ExecOutput> {
        self.commands.lock().unwrap().push(command.to_vec());
        let joined = command.join(" ");
        let matched = self
            .matched_exec_outputs
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| joined.contains(needle.as_str()))
            .map(|(_, script)| Arc::clone(script));
        let script = matched.as_deref().unwrap_or(&self.exec_outputs);
        script.next(|| Ok(ExecOutput::default()))
    }
}
