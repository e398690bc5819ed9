//! Report aggregation and rendering.
//!
//! Produces three artifacts from one set of outcomes:
//! - `report.txt`: flat listing per label and verdict
//! - `report.html`: grouped document with verdict styling and spec links
//! - `report.json`: groups, summary counts and a digest of the text report
//!
//! All three are deterministic for the same outcomes.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ReportPaths;
use crate::error::Result;
use crate::labels;
use crate::obs::emit_report_written;
use crate::outcome::{SuiteRun, TestOutcome};
use crate::verdict::{Verdict, VerdictClassifier};

/// One classified test as it appears in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedTest {
    pub description: String,
    pub spec_ref: Option<String>,
    pub verdict: Verdict,
}

/// Every reportable test carrying `label`, in scan order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementGroup {
    pub label: String,
    pub tests: Vec<ReportedTest>,
}

impl RequirementGroup {
    fn with_verdict<'a>(
        &'a self,
        keep: impl Fn(&Verdict) -> bool + 'a,
    ) -> impl Iterator<Item = &'a ReportedTest> + 'a {
        self.tests.iter().filter(move |t| keep(&t.verdict))
    }
}

/// Group outcomes by label.
///
/// Labels in `priority` come first in that order; the rest follow lexically.
/// A test with several labels appears once in each of their groups. Skipped
/// and pending tests are left out, and labels with nothing left are omitted.
pub fn aggregate(
    outcomes: &[TestOutcome],
    priority: &[String],
    classifier: &VerdictClassifier,
) -> Vec<RequirementGroup> {
    let classified: Vec<(&TestOutcome, Verdict)> = outcomes
        .iter()
        .filter_map(|o| classifier.classify(o).map(|v| (o, v)))
        .collect();

    let present: BTreeSet<&str> = classified
        .iter()
        .flat_map(|(o, _)| o.labels.iter().map(String::as_str))
        .collect();

    labels::ordered(present, priority)
        .into_iter()
        .map(|label| {
            let tests = classified
                .iter()
                .filter(|(o, _)| o.has_label(&label))
                .map(|(o, verdict)| ReportedTest {
                    description: o.description.clone(),
                    spec_ref: o.spec_reference().map(str::to_string),
                    verdict: verdict.clone(),
                })
                .collect();
            RequirementGroup { label, tests }
        })
        .collect()
}

/// Verdict totals over distinct tests (a multi-label test counts once).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub conformant: usize,
    pub non_conformant: usize,
    pub indeterminate: usize,
    pub excluded: usize,
}

/// An aggregated run, ready to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConformanceReport {
    pub run_id: String,
    pub suite_failure: Option<String>,
    pub summary: ReportSummary,
    pub groups: Vec<RequirementGroup>,
}

impl ConformanceReport {
    pub fn build(run: &SuiteRun, priority: &[String], classifier: &VerdictClassifier) -> Self {
        let mut summary = ReportSummary::default();
        for outcome in &run.outcomes {
            match classifier.classify(outcome) {
                Some(Verdict::ConformantPass) => summary.conformant += 1,
                Some(Verdict::NonConformant(_)) => summary.non_conformant += 1,
                Some(Verdict::Indeterminate(_)) => summary.indeterminate += 1,
                None => summary.excluded += 1,
            }
        }

        Self {
            run_id: run.run_id.clone(),
            suite_failure: run.suite_failure.clone(),
            summary,
            groups: aggregate(&run.outcomes, priority, classifier),
        }
    }

    pub fn group(&self, label: &str) -> Option<&RequirementGroup> {
        self.groups.iter().find(|g| g.label == label)
    }

    /// True when the suite failed or any test under `label` is non-conformant.
    pub fn fails(&self, label: &str) -> bool {
        self.suite_failure.is_some()
            || self.group(label).is_some_and(|g| {
                g.tests
                    .iter()
                    .any(|t| matches!(t.verdict, Verdict::NonConformant(_)))
            })
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        if let Some(failure) = &self.suite_failure {
            out.push_str(&format!("SUITE SETUP FAILED: {failure}\n\n"));
        }

        for group in &self.groups {
            let sections: [(&str, Vec<&ReportedTest>); 3] = [
                (
                    "The implementation meets the following",
                    group.with_verdict(Verdict::is_conformant).collect(),
                ),
                (
                    "The implementation fails the following",
                    group
                        .with_verdict(|v| matches!(v, Verdict::NonConformant(_)))
                        .collect(),
                ),
                (
                    "The following",
                    group
                        .with_verdict(|v| matches!(v, Verdict::Indeterminate(_)))
                        .collect(),
                ),
            ];

            for (index, (heading, tests)) in sections.iter().enumerate() {
                if tests.is_empty() {
                    continue;
                }
                let tail = if index == 2 {
                    "requirements could not be verified"
                } else {
                    "requirements"
                };
                out.push_str(&format!("{heading} {} {tail}:\n", group.label));
                for test in tests {
                    out.push_str(&format!(
                        "⋅ {} ({}){}\n",
                        test.description,
                        test.spec_ref.as_deref().unwrap_or(""),
                        test.verdict.annotation()
                    ));
                }
            }
        }
        out
    }

    pub fn render_html(&self) -> String {
        let mut out = String::new();
        out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
        out.push_str("<title>MCS conformance report</title>\n");
        out.push_str(STYLE);
        out.push_str("</head>\n<body>\n<h1>MCS conformance report</h1>\n");

        if let Some(failure) = &self.suite_failure {
            out.push_str(&format!(
                "<div class=\"banner\">Suite setup failed: {}</div>\n",
                escape(failure)
            ));
        }

        out.push_str(&format!(
            "<p class=\"summary\">{} conformant, {} non-conformant, {} indeterminate</p>\n",
            self.summary.conformant, self.summary.non_conformant, self.summary.indeterminate
        ));

        for group in &self.groups {
            out.push_str(&format!(
                "<section>\n<h2>{} requirements</h2>\n<ul>\n",
                escape(&group.label)
            ));
            for test in &group.tests {
                out.push_str(&format!(
                    "<li class=\"{}\">{}",
                    test.verdict.label(),
                    escape(&test.description)
                ));
                if let Some(url) = &test.spec_ref {
                    out.push_str(&format!(
                        " (<a href=\"{0}\">{0}</a>)",
                        escape(url)
                    ));
                }
                let message = test.verdict.message();
                if !message.is_empty() {
                    out.push_str(&format!(
                        " <span class=\"message\">{}</span>",
                        escape(message)
                    ));
                }
                out.push_str("</li>\n");
            }
            out.push_str("</ul>\n</section>\n");
        }

        out.push_str("</body>\n</html>\n");
        out
    }

    /// Machine-readable artifact, including a SHA-256 of the text report.
    pub fn to_artifact(&self) -> ReportArtifact {
        ReportArtifact {
            schema_version: ARTIFACT_SCHEMA_VERSION.to_string(),
            text_digest: text_digest(&self.render_text()),
            report: self.clone(),
        }
    }
}

const ARTIFACT_SCHEMA_VERSION: &str = "1.0";

const STYLE: &str = "<style>\n\
body { font-family: sans-serif; }\n\
.banner { background: #c62828; color: #fff; padding: 0.5em; }\n\
.pass { color: #2e7d32; }\n\
.fail { color: #c62828; }\n\
.indeterminate { color: #ef6c00; }\n\
.message { font-style: italic; }\n\
</style>\n";

/// Persisted `report.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportArtifact {
    pub schema_version: String,
    pub text_digest: String,
    #[serde(flatten)]
    pub report: ConformanceReport,
}

/// Hex SHA-256 of a rendered text report.
pub fn text_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Files written by [`write_reports`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenReports {
    pub text: PathBuf,
    pub html: PathBuf,
    pub json: PathBuf,
}

/// Write all three reports under `dir`, creating it if needed.
pub fn write_reports(
    report: &ConformanceReport,
    dir: &Path,
    paths: &ReportPaths,
) -> Result<WrittenReports> {
    std::fs::create_dir_all(dir)?;
    let written = WrittenReports {
        text: dir.join(&paths.text),
        html: dir.join(&paths.html),
        json: dir.join(&paths.json),
    };

    std::fs::write(&written.text, report.render_text())?;
    std::fs::write(&written.html, report.render_html())?;
    std::fs::write(
        &written.json,
        serde_json::to_string_pretty(&report.to_artifact())?,
    )?;

    for path in [&written.text, &written.html, &written.json] {
        emit_report_written(&path.display().to_string(), report.groups.len());
    }
    Ok(written)
}
