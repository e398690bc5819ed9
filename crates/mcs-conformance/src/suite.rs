//! Suite runner.
//!
//! Runs an ordered list of specs against a [`RunContext`] and records one
//! [`TestOutcome`] per spec, in declaration order, whatever the parallelism.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use futures::future::BoxFuture;
use futures::{stream, FutureExt, StreamExt};
use tokio::time::Instant;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::cluster::ClusterApi;
use crate::config::HarnessConfig;
use crate::driver::{generate_namespace, TestDriver};
use crate::obs::{
    emit_spec_finished, emit_spec_started, emit_spec_step, emit_suite_setup_failed, spec_span,
};
use crate::outcome::{SpecState, SuiteRun, TestOutcome};
use crate::signal::{self, Abort, SignalRecord, SpecResult};

/// Error a setup hook may fail with.
pub type SetupError = Box<dyn std::error::Error + Send + Sync>;

type SetupHook = Box<dyn Fn(Arc<RunContext>) -> BoxFuture<'static, Result<(), SetupError>> + Send + Sync>;
type SpecBody = Box<dyn Fn(TestContext) -> BoxFuture<'static, SpecResult> + Send + Sync>;

/// Everything a run shares: built once, handed to every spec.
pub struct RunContext {
    pub run_id: String,
    /// Clusters in the set. The first one hosts the exported service.
    pub clusters: Vec<Arc<dyn ClusterApi>>,
    pub config: HarnessConfig,
}

impl RunContext {
    /// Every spec of the run shares one namespace; one is generated if the
    /// config leaves it unset.
    pub fn new(clusters: Vec<Arc<dyn ClusterApi>>, mut config: HarnessConfig) -> Self {
        config.namespace.get_or_insert_with(generate_namespace);
        Self {
            run_id: Uuid::new_v4().to_string(),
            clusters,
            config,
        }
    }
}

struct SpecDef {
    description: String,
    labels: Vec<String>,
    body: SpecBody,
}

/// Ordered collection of specs plus an optional setup hook.
pub struct ConformanceSuite {
    name: String,
    setup: Option<SetupHook>,
    specs: Vec<SpecDef>,
}

impl ConformanceSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            setup: None,
            specs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Runs once before any spec. A failure (or panic) aborts the whole run.
    pub fn before_suite<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Arc<RunContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SetupError>> + Send + 'static,
    {
        let hook = Arc::new(hook);
        self.setup = Some(Box::new(move |run| {
            let hook = Arc::clone(&hook);
            async move { hook(run).await }.boxed()
        }));
        self
    }

    pub fn spec<F, Fut>(mut self, description: impl Into<String>, labels: &[&str], body: F) -> Self
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SpecResult> + Send + 'static,
    {
        let body = Arc::new(body);
        self.specs.push(SpecDef {
            description: description.into(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            body: Box::new(move |ctx| {
                let body = Arc::clone(&body);
                async move { body(ctx).await }.boxed()
            }),
        });
        self
    }

    pub async fn run(&self, run: Arc<RunContext>) -> SuiteRun {
        let started_at = Utc::now();
        info!(run_id = %run.run_id, suite = %self.name, specs = self.specs.len(), "Starting conformance suite");

        if let Some(setup) = &self.setup {
            let failure = match AssertUnwindSafe(setup(Arc::clone(&run))).catch_unwind().await {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(panic) => Some(panic_message(panic.as_ref())),
            };
            if let Some(message) = failure {
                emit_suite_setup_failed(&run.run_id, &message);
                let mut failed = SuiteRun::setup_failed(run.run_id.clone(), message);
                failed.started_at = started_at;
                return failed;
            }
        }

        let parallelism = run.config.parallelism.max(1);
        let outcomes: Vec<TestOutcome> = stream::iter(
            self.specs
                .iter()
                .map(|spec| Self::run_spec(spec, Arc::clone(&run))),
        )
        .buffered(parallelism)
        .collect()
        .await;

        let mut finished = SuiteRun::new(run.run_id.clone(), outcomes);
        finished.started_at = started_at;
        info!(
            run_id = %run.run_id,
            passed = finished.count(SpecState::Passed),
            failed = finished.count(SpecState::Failed),
            skipped = finished.count(SpecState::Skipped),
            "Conformance suite finished"
        );
        finished
    }

    async fn run_spec(spec: &SpecDef, run: Arc<RunContext>) -> TestOutcome {
        let mut outcome = TestOutcome::new(spec.description.clone(), SpecState::Skipped);
        outcome.labels.extend(spec.labels.iter().cloned());

        if !run
            .config
            .label_filter
            .matches(spec.labels.iter().map(String::as_str))
        {
            emit_spec_finished(&spec.description, SpecState::Skipped.as_str(), 0);
            return outcome;
        }

        let ctx = TestContext::new(run, &spec.description);
        let started = Instant::now();
        emit_spec_started(&spec.description);

        let result = AssertUnwindSafe((spec.body)(ctx.clone()))
            .catch_unwind()
            .instrument(spec_span(&spec.description))
            .await;

        let record = ctx.take_record();
        outcome.signals = record.signals;
        outcome.spec_ref = record.spec_ref;

        let failure_text = match result {
            Ok(Ok(())) => {
                outcome.state = SpecState::Passed;
                None
            }
            Ok(Err(Abort::Skipped(reason))) => {
                info!(spec = %spec.description, reason = %reason, "Spec skipped");
                None
            }
            Ok(Err(Abort::Failed(failure))) => {
                let text = failure.render();
                outcome.signals.extend(evaluate(record.deferred));
                outcome.signals.extend(failure.signal());
                Some(text)
            }
            Err(panic) => {
                outcome.signals.extend(evaluate(record.deferred));
                Some(format!("spec panicked: {}", panic_message(panic.as_ref())))
            }
        };

        if let Some(text) = failure_text {
            outcome.state = SpecState::Failed;
            outcome.raw_failure_text = text;
        }

        outcome.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        emit_spec_finished(&spec.description, outcome.state.as_str(), outcome.duration_ms);
        outcome
    }
}

type Deferred = (String, Box<dyn FnOnce() -> String + Send>);

#[derive(Default)]
struct SpecRecord {
    signals: Vec<SignalRecord>,
    deferred: Vec<Deferred>,
    spec_ref: Option<String>,
}

fn evaluate(deferred: Vec<Deferred>) -> impl Iterator<Item = SignalRecord> {
    deferred
        .into_iter()
        .map(|(channel, thunk)| SignalRecord::new(channel, thunk()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle given to each spec body.
#[derive(Clone)]
pub struct TestContext {
    run: Arc<RunContext>,
    description: Arc<str>,
    record: Arc<Mutex<SpecRecord>>,
}

impl TestContext {
    fn new(run: Arc<RunContext>, description: &str) -> Self {
        Self {
            run,
            description: Arc::from(description),
            record: Arc::new(Mutex::new(SpecRecord::default())),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn run(&self) -> &RunContext {
        &self.run
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.run.config
    }

    pub fn clusters(&self) -> &[Arc<dyn ClusterApi>] {
        &self.run.clusters
    }

    /// A driver for the run's namespace, using the run's poll settings.
    pub fn driver(&self) -> TestDriver {
        TestDriver::new(&self.run.config)
    }

    /// Cite the specification clause this spec validates.
    pub fn spec_ref(&self, url: impl Into<String>) {
        let url = url.into();
        let mut record = self.lock();
        record.signals.push(SignalRecord::spec_ref(url.clone()));
        record.spec_ref.get_or_insert(url);
    }

    /// Log a step of the spec.
    pub fn by(&self, step: impl Display) {
        emit_spec_step(&step.to_string());
    }

    /// Attach an entry to `channel` that is only built if the spec fails.
    pub fn on_failure<F>(&self, channel: impl Into<String>, entry: F)
    where
        F: FnOnce() -> String + Send + 'static,
    {
        self.lock().deferred.push((channel.into(), Box::new(entry)));
    }

    pub fn skip(&self, reason: impl Into<String>) -> SpecResult {
        signal::skip(reason)
    }

    /// Skip unless the cluster set has at least `count` clusters.
    pub fn require_clusters(&self, count: usize) -> SpecResult {
        if self.run.clusters.len() < count {
            return self.skip(format!(
                "This test requires at least {count} clusters - skipping"
            ));
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SpecRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_record(&self) -> SpecRecord {
        std::mem::take(&mut *self.lock())
    }
}
