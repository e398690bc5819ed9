//! Harness configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//! Durations are written in milliseconds:
//!
//! ```toml
//! contexts = ["cluster-a", "cluster-b"]
//! parallelism = 2
//!
//! [poll]
//! interval_ms = 500
//! deadline_ms = 10000
//!
//! [label_filter]
//! exclude = ["EndpointSlice"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::labels::{default_priority, LabelFilter};
use crate::poll::PollSpec;

/// Label value the endpoint slice controller sets in `managed-by`.
pub const ENDPOINT_SLICE_MANAGED_BY: &str = "endpointslice-controller.k8s.io";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Cluster contexts under test, in order.
    pub contexts: Vec<String>,
    pub kubeconfig: Option<PathBuf>,
    /// Namespace holding the exported service. Generated per driver when unset.
    pub namespace: Option<String>,
    /// General condition polling.
    pub poll: PollSpec,
    /// Waiting for imported/exported resources to appear or disappear.
    pub resource_poll: PollSpec,
    /// Repeated in-pod command execution.
    pub exec_poll: PollSpec,
    /// Window over which a condition must keep holding.
    pub hold_poll: PollSpec,
    /// Labels reported first, in this order.
    pub label_priority: Vec<String>,
    pub label_filter: LabelFilter,
    /// Maximum number of specs run at once.
    pub parallelism: usize,
    pub skip_verify_endpoint_slice_managed_by: bool,
    pub report: ReportPaths,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            contexts: Vec::new(),
            kubeconfig: None,
            namespace: None,
            poll: PollSpec::default(),
            resource_poll: PollSpec::new(Duration::from_millis(100), Duration::from_secs(20)),
            exec_poll: PollSpec::new(Duration::from_secs(1), Duration::from_secs(20)),
            hold_poll: PollSpec::new(Duration::from_secs(1), Duration::from_secs(5)),
            label_priority: default_priority(),
            label_filter: LabelFilter::default(),
            parallelism: 1,
            skip_verify_endpoint_slice_managed_by: false,
            report: ReportPaths::default(),
        }
    }
}

impl HarnessConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, spec) in [
            ("poll", &self.poll),
            ("resource_poll", &self.resource_poll),
            ("exec_poll", &self.exec_poll),
            ("hold_poll", &self.hold_poll),
        ] {
            if !spec.is_valid() {
                return Err(HarnessError::Config(format!(
                    "{name}: interval ({:?}) exceeds deadline ({:?})",
                    spec.interval, spec.deadline
                )));
            }
        }
        if self.parallelism == 0 {
            return Err(HarnessError::Config(
                "parallelism must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Report file names, relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportPaths {
    pub text: PathBuf,
    pub html: PathBuf,
    pub json: PathBuf,
}

impl Default for ReportPaths {
    fn default() -> Self {
        Self {
            text: PathBuf::from("report.txt"),
            html: PathBuf::from("report.html"),
            json: PathBuf::from("report.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = HarnessConfig::from_toml_str("").expect("parse");
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.poll.interval, Duration::from_millis(500));
        assert_eq!(config.resource_poll.deadline, Duration::from_secs(20));
        assert_eq!(config.hold_poll.interval, Duration::from_secs(1));
        assert_eq!(config.hold_poll.deadline, Duration::from_secs(5));
        assert_eq!(config.label_priority, vec!["Required", "Optional"]);
    }

    #[test]
    fn test_parse_overrides() {
        let config = HarnessConfig::from_toml_str(
            r#"
contexts = ["a", "b"]
parallelism = 4

[poll]
interval_ms = 10
deadline_ms = 1000

[label_filter]
exclude = ["EndpointSlice"]

[report]
text = "out.txt"
"#,
        )
        .expect("parse");

        assert_eq!(config.contexts, vec!["a", "b"]);
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.poll.interval, Duration::from_millis(10));
        assert!(config.poll.immediate);
        assert_eq!(config.label_filter.exclude, vec!["EndpointSlice"]);
        assert_eq!(config.report.text, PathBuf::from("out.txt"));
        assert_eq!(config.report.html, PathBuf::from("report.html"));
    }

    #[test]
    fn test_interval_beyond_deadline_is_rejected() {
        let err = HarnessConfig::from_toml_str(
            "[exec_poll]\ninterval_ms = 5000\ndeadline_ms = 100\n",
        )
        .unwrap_err();
        assert!(matches!(err, HarnessError::Config(ref m) if m.starts_with("exec_poll")));
    }

    #[test]
    fn test_zero_parallelism_is_rejected() {
        assert!(matches!(
            HarnessConfig::from_toml_str("parallelism = 0"),
            Err(HarnessError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("harness.toml");
        std::fs::write(&path, "contexts = [\"kind-1\"]\n").expect("write");
        let config = HarnessConfig::load(&path).expect("load");
        assert_eq!(config.contexts, vec!["kind-1"]);
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            HarnessConfig::from_toml_str("parallelism = \"many\""),
            Err(HarnessError::ConfigParse(_))
        ));
    }
}
