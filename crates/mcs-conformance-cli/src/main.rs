//! MCS conformance CLI
//!
//! Renders reports from a recorded suite run.
//!
//! ## Commands
//!
//! - `report`: Write the text, HTML and JSON reports for a run
//! - `verdicts`: Print the verdict of every classified test

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mcs_conformance::labels::REQUIRED;
use mcs_conformance::telemetry::{init_tracing, LogFormat};
use mcs_conformance::{
    write_reports, ConformanceReport, HarnessConfig, SuiteRun, Verdict, VerdictClassifier,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "mcs-conformance")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-cluster services conformance reporting", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Harness configuration file (TOML)
    #[arg(short, long, global = true, env = "MCS_CONFORMANCE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write text, HTML and JSON reports for a recorded run
    Report {
        /// Recorded suite run (JSON)
        #[arg(long)]
        run: PathBuf,

        /// Directory the reports are written to
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Print one line per classified test
    Verdicts {
        /// Recorded suite run (JSON)
        #[arg(long)]
        run: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Serialize)]
struct VerdictLine<'a> {
    description: &'a str,
    labels: &'a BTreeSet<String>,
    #[serde(flatten)]
    verdict: &'a Verdict,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(LogFormat::from_json_flag(cli.json), level);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Report { run, out_dir } => cmd_report(&config, &run, &out_dir),
        Commands::Verdicts { run, format } => {
            let lines = cmd_verdicts(&run, format)?;
            for line in lines {
                println!("{line}");
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<HarnessConfig> {
    let config = match path {
        Some(path) => HarnessConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => HarnessConfig::default(),
    };
    config.validate().context("Invalid harness configuration")?;
    Ok(config)
}

fn read_run(path: &Path) -> Result<SuiteRun> {
    SuiteRun::read_json(path).with_context(|| format!("Failed to read suite run {}", path.display()))
}

fn cmd_report(config: &HarnessConfig, run_path: &Path, out_dir: &Path) -> Result<()> {
    let run = read_run(run_path)?;
    let report = ConformanceReport::build(
        &run,
        &config.label_priority,
        &VerdictClassifier::default(),
    );

    let written = write_reports(&report, out_dir, &config.report)
        .with_context(|| format!("Failed to write reports to {}", out_dir.display()))?;

    info!(
        run_id = %report.run_id,
        conformant = report.summary.conformant,
        non_conformant = report.summary.non_conformant,
        indeterminate = report.summary.indeterminate,
        "reports written"
    );
    println!("Text report: {}", written.text.display());
    println!("HTML report: {}", written.html.display());
    println!("JSON report: {}", written.json.display());

    gate(&report)
}

/// Fail the process when the run cannot be called conformant.
fn gate(report: &ConformanceReport) -> Result<()> {
    if let Some(failure) = &report.suite_failure {
        anyhow::bail!("Suite setup failed: {failure}");
    }
    if report.fails(REQUIRED) {
        anyhow::bail!("The implementation fails {REQUIRED} requirements");
    }
    Ok(())
}

fn cmd_verdicts(run_path: &Path, format: OutputFormat) -> Result<Vec<String>> {
    let run = read_run(run_path)?;
    let classifier = VerdictClassifier::default();

    let mut lines = Vec::new();
    for outcome in &run.outcomes {
        let Some(verdict) = classifier.classify(outcome) else {
            continue;
        };
        let line = match format {
            OutputFormat::Text => format!(
                "{}\t{}{}",
                verdict.label(),
                outcome.description,
                verdict.annotation()
            ),
            OutputFormat::Json => serde_json::to_string(&VerdictLine {
                description: &outcome.description,
                labels: &outcome.labels,
                verdict: &verdict,
            })?,
        };
        lines.push(line);
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcs_conformance::labels::OPTIONAL;
    use mcs_conformance::signal::SignalRecord;
    use mcs_conformance::{SpecState, TestOutcome};

    fn recorded_run(dir: &Path, outcomes: Vec<TestOutcome>) -> PathBuf {
        let path = dir.join("suite-run.json");
        SuiteRun::new("run-1", outcomes)
            .write_json(&path)
            .unwrap();
        path
    }

    fn passed(description: &str, label: &str) -> TestOutcome {
        TestOutcome::new(description, SpecState::Passed).with_label(label)
    }

    fn failed(description: &str, label: &str, message: &str) -> TestOutcome {
        TestOutcome::new(description, SpecState::Failed)
            .with_label(label)
            .with_signal(SignalRecord::non_conformance(message))
    }

    #[test]
    fn test_report_writes_all_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let run = recorded_run(
            temp_dir.path(),
            vec![passed("imports are created", REQUIRED)],
        );
        let out_dir = temp_dir.path().join("out");

        cmd_report(&HarnessConfig::default(), &run, &out_dir).unwrap();

        let text = std::fs::read_to_string(out_dir.join("report.txt")).unwrap();
        assert!(text.contains("⋅ imports are created ()"));
        assert!(out_dir.join("report.html").exists());
        assert!(out_dir.join("report.json").exists());
    }

    #[test]
    fn test_report_fails_on_required_violation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let run = recorded_run(
            temp_dir.path(),
            vec![failed("imports are created", REQUIRED, "no import")],
        );

        let err = cmd_report(&HarnessConfig::default(), &run, temp_dir.path()).unwrap_err();
        assert!(err.to_string().contains("fails Required requirements"));
        // Reports are still written before the gate trips.
        assert!(temp_dir.path().join("report.txt").exists());
    }

    #[test]
    fn test_optional_violation_does_not_fail() {
        let temp_dir = tempfile::tempdir().unwrap();
        let run = recorded_run(
            temp_dir.path(),
            vec![
                passed("imports are created", REQUIRED),
                failed("slices are labeled", OPTIONAL, "missing label"),
            ],
        );

        assert!(cmd_report(&HarnessConfig::default(), &run, temp_dir.path()).is_ok());
    }

    #[test]
    fn test_verdicts_text_lines() {
        let temp_dir = tempfile::tempdir().unwrap();
        let run = recorded_run(
            temp_dir.path(),
            vec![
                passed("imports are created", REQUIRED),
                failed("slices are labeled", OPTIONAL, "missing label"),
                TestOutcome::new("needs two clusters", SpecState::Skipped).with_label(REQUIRED),
            ],
        );

        let lines = cmd_verdicts(&run, OutputFormat::Text).unwrap();
        assert_eq!(
            lines,
            vec![
                "pass\timports are created".to_string(),
                "fail\tslices are labeled - missing label".to_string(),
            ]
        );
    }

    #[test]
    fn test_verdicts_json_lines() {
        let temp_dir = tempfile::tempdir().unwrap();
        let run = recorded_run(
            temp_dir.path(),
            vec![failed("slices are labeled", OPTIONAL, "missing label")],
        );

        let lines = cmd_verdicts(&run, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(value["description"], "slices are labeled");
        assert_eq!(value["verdict"], "non_conformant");
        assert_eq!(value["message"], "missing label");
        assert_eq!(value["labels"][0], OPTIONAL);
    }

    #[test]
    fn test_missing_config_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&temp_dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "mcs-conformance",
            "verdicts",
            "--run",
            "run.json",
            "--json",
            "-v",
        ])
        .unwrap();
        assert!(cli.json);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Verdicts { .. }));
    }
}
