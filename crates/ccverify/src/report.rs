use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use ccverify_corpus::{CorpusResolution, ExtractStats, ResolveOutcome};
use serde::Serialize;

use crate::task::CaptureBuf;

pub const RUN_REPORT_SCHEMA_VERSION: &str = "ccverify.run.report@0.1.0";
pub const RESOLVE_REPORT_SCHEMA_VERSION: &str = "ccverify.resolve.report@0.1.0";

/// Human diagnostics on stderr; `--json` documents go to stdout.
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    pub json: bool,
    pub quiet: bool,
    trace_sink: Option<CaptureBuf>,
}

impl Reporter {
    pub fn new(json: bool, quiet: bool) -> Self {
        Self {
            json,
            quiet,
            trace_sink: None,
        }
    }

    /// Send `trace` output to `sink` instead of stderr.
    pub fn with_trace_sink(mut self, sink: CaptureBuf) -> Self {
        self.trace_sink = Some(sink);
        self
    }

    pub fn progress(&self, msg: &str) {
        if self.json || self.quiet {
            return;
        }
        eprintln!("{msg}");
    }

    pub fn warn(&self, msg: &str) {
        eprintln!("warning: {msg}");
    }

    /// Output explicitly requested with a `--trace-*` flag.
    pub fn trace(&self, msg: &str) {
        match &self.trace_sink {
            Some(sink) => {
                sink.append(msg.as_bytes());
                sink.append(b"\n");
            }
            None => eprintln!("{msg}"),
        }
    }

    /// Failures warn; every other outcome is progress.
    pub fn resolution(&self, corpus: &str, outcome: &ResolveOutcome) {
        let line = describe_outcome(corpus, outcome);
        match outcome {
            ResolveOutcome::Failed { .. } => self.warn(&line),
            _ => self.progress(&line),
        }
    }

    pub fn failure(&self, failure: &CaseFailure) {
        if self.json {
            return;
        }
        eprintln!(
            "FAIL {} [{}]: {}",
            failure.path.display(),
            failure.kind.as_str(),
            failure.message
        );
        if let Some(trace) = &failure.trace {
            eprintln!("{trace}");
        }
    }

    pub fn emit_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let mut out = serde_json::to_vec_pretty(value).context("serialize report")?;
        out.push(b'\n');
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&out).context("write report")?;
        stdout.flush().context("flush report")?;
        Ok(())
    }
}

/// One human-readable line for a resolved corpus, keeping the skip reason.
pub fn describe_outcome(corpus: &str, outcome: &ResolveOutcome) -> String {
    match outcome {
        ResolveOutcome::Skipped { reason } => format!("{corpus}: skipped ({reason})"),
        ResolveOutcome::Fetched { stats } => {
            format!("{corpus}: fetched ({})", describe_stats(stats))
        }
        ResolveOutcome::Failed { error } => format!("{corpus}: {error}"),
        ResolveOutcome::Present | ResolveOutcome::NotADirectory => {
            format!("{corpus}: {}", outcome.as_str())
        }
    }
}

fn describe_stats(stats: &ExtractStats) -> String {
    format!(
        "{} dirs, {} files, {} skipped",
        stats.dirs, stats.files, stats.skipped
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTally {
    pub files_seen: u64,
    pub files_passed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CompileFault,
    ExecutionError,
    ComparisonMismatch,
    Filesystem,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::CompileFault => "compile_fault",
            FailureKind::ExecutionError => "execution_error",
            FailureKind::ComparisonMismatch => "comparison_mismatch",
            FailureKind::Filesystem => "filesystem",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseFailure {
    pub name: String,
    pub path: PathBuf,
    pub kind: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub schema_version: &'static str,
    pub corpus: String,
    pub test_root: PathBuf,
    pub tally: RunTally,
    /// Passing cases with no expectation file to compare against.
    pub recorded: Vec<String>,
    pub failures: Vec<CaseFailure>,
    pub golden: Option<PathBuf>,
}

impl RunReport {
    pub fn ok(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveReport {
    pub schema_version: &'static str,
    pub corpora: Vec<ResolveEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveEntry {
    pub corpus: String,
    pub root: PathBuf,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<&'static str>,
}

impl ResolveReport {
    pub fn from_resolutions(resolutions: &[CorpusResolution]) -> Self {
        let corpora = resolutions
            .iter()
            .map(|r| {
                let (detail, error_category) = match &r.outcome {
                    ResolveOutcome::Skipped { reason } => (Some(reason.clone()), None),
                    ResolveOutcome::Fetched { stats } => (Some(describe_stats(stats)), None),
                    ResolveOutcome::Failed { error } => {
                        (Some(error.to_string()), Some(error.category()))
                    }
                    ResolveOutcome::Present | ResolveOutcome::NotADirectory => (None, None),
                };
                ResolveEntry {
                    corpus: r.corpus.clone(),
                    root: r.root.clone(),
                    outcome: r.outcome.as_str(),
                    detail,
                    error_category,
                }
            })
            .collect();
        Self {
            schema_version: RESOLVE_REPORT_SCHEMA_VERSION,
            corpora,
        }
    }

    pub fn failed(&self) -> bool {
        self.corpora.iter().any(|c| c.outcome == "failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccverify_corpus::CorpusError;

    #[test]
    fn failure_kind_serializes_snake_case() {
        let v = serde_json::to_value(FailureKind::ComparisonMismatch).expect("json");
        assert_eq!(v, serde_json::json!("comparison_mismatch"));
        assert_eq!(FailureKind::CompileFault.as_str(), "compile_fault");
    }

    #[test]
    fn resolve_report_carries_outcomes_and_categories() {
        let resolutions = vec![
            CorpusResolution {
                corpus: "a".to_string(),
                root: PathBuf::from("assets/a"),
                outcome: ResolveOutcome::Present,
            },
            CorpusResolution {
                corpus: "b".to_string(),
                root: PathBuf::from("assets/b"),
                outcome: ResolveOutcome::Fetched {
                    stats: ExtractStats {
                        dirs: 1,
                        files: 2,
                        skipped: 0,
                    },
                },
            },
            CorpusResolution {
                corpus: "c".to_string(),
                root: PathBuf::from("assets/c"),
                outcome: ResolveOutcome::Failed {
                    error: CorpusError::Network {
                        url: "http://x/c.zip".to_string(),
                        message: "refused".to_string(),
                    },
                },
            },
        ];
        let report = ResolveReport::from_resolutions(&resolutions);
        assert!(report.failed());

        let v = serde_json::to_value(&report).expect("json");
        assert_eq!(v["schema_version"], RESOLVE_REPORT_SCHEMA_VERSION);
        assert_eq!(v["corpora"][0]["outcome"], "present");
        assert!(v["corpora"][0].get("detail").is_none());
        assert_eq!(v["corpora"][1]["detail"], "1 dirs, 2 files, 0 skipped");
        assert_eq!(v["corpora"][2]["error_category"], "network");
    }

    #[test]
    fn skipped_line_keeps_size_url_and_hint() {
        let outcome = ResolveOutcome::Skipped {
            reason: "developer resource (97000 KB at https://example.org/gcc.tar.gz); use --dev"
                .to_string(),
        };
        let line = describe_outcome("gcc", &outcome);
        assert_eq!(
            line,
            "gcc: skipped (developer resource (97000 KB at https://example.org/gcc.tar.gz); use --dev)"
        );
        assert_eq!(describe_outcome("tcc", &ResolveOutcome::Present), "tcc: present");
    }

    #[test]
    fn fetched_line_carries_stats() {
        let outcome = ResolveOutcome::Fetched {
            stats: ExtractStats {
                dirs: 3,
                files: 7,
                skipped: 1,
            },
        };
        assert_eq!(
            describe_outcome("sqlite", &outcome),
            "sqlite: fetched (3 dirs, 7 files, 1 skipped)"
        );
    }

    #[test]
    fn trace_goes_to_sink_when_set() {
        let sink = CaptureBuf::new();
        let reporter = Reporter::new(false, true).with_trace_sink(sink.clone());
        reporter.trace("tests/00_a.c");
        reporter.trace("hello");
        assert_eq!(sink.contents(), b"tests/00_a.c\nhello\n");
    }

    #[test]
    fn run_report_shape() {
        let report = RunReport {
            schema_version: RUN_REPORT_SCHEMA_VERSION,
            corpus: "tcc".to_string(),
            test_root: PathBuf::from("t"),
            tally: RunTally {
                files_seen: 2,
                files_passed: 1,
            },
            recorded: vec!["a.c".to_string()],
            failures: vec![CaseFailure {
                name: "b.c".to_string(),
                path: PathBuf::from("t/b.c"),
                kind: FailureKind::ExecutionError,
                message: "exit status 1".to_string(),
                trace: None,
            }],
            golden: None,
        };
        assert!(!report.ok());
        let v = serde_json::to_value(&report).expect("json");
        assert_eq!(v["tally"]["files_seen"], 2);
        assert_eq!(v["failures"][0]["kind"], "execution_error");
        assert!(v["failures"][0].get("trace").is_none());
        assert!(v["golden"].is_null());
    }
}
