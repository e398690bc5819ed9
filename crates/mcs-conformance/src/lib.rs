//! MCS conformance harness
//!
//! Validates a multi-cluster services implementation against the MCS API:
//! - Polls eventually-consistent cluster state until it converges
//! - Classifies every test as conformant, non-conformant or indeterminate
//! - Renders text, HTML and JSON reports grouped by requirement label

pub mod catalog;
pub mod classify;
pub mod cluster;
pub mod config;
pub mod driver;
pub mod error;
pub mod fakes;
pub mod labels;
pub mod message;
pub mod obs;
pub mod outcome;
pub mod poll;
pub mod report;
pub mod signal;
pub mod suite;
pub mod telemetry;
pub mod verdict;

// Re-export key types
pub use classify::{classify, error_class, ErrorClass, ErrorPredicates};
pub use cluster::{ApiResult, ClusterApi};
pub use config::HarnessConfig;
pub use driver::TestDriver;
pub use error::{ApiError, HarnessError, PollError, Result, StatusReason};
pub use message::{ExtractorChain, MessageExtractor};
pub use outcome::{SpecState, SuiteRun, TestOutcome};
pub use poll::{await_until, hold_for, PollSpec, Readiness};
pub use report::{aggregate, write_reports, ConformanceReport, RequirementGroup};
pub use signal::{ensure, skip, Abort, Assert, SignalRecord, SpecResult};
pub use suite::{ConformanceSuite, RunContext, TestContext};
pub use verdict::{Verdict, VerdictClassifier};
