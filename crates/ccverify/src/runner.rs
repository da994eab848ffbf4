use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ccverify_corpus::ScratchDir;
use walkdir::WalkDir;

use crate::adapter::{compile_isolated, CompileFault};
use crate::config::HarnessConfig;
use crate::exec::run_artifact;
use crate::golden::GoldenLog;
use crate::normalize::{compare, expect_path_for, Verdict};
use crate::report::{
    CaseFailure, FailureKind, Reporter, RunReport, RunTally, RUN_REPORT_SCHEMA_VERSION,
};
use crate::task::{CaptureBuf, TaskFactory};

/// Test sources never exercised, keyed by base name.
pub const EXCLUDED: &[(&str, &str)] = &[
    ("34_array_assignment.c", "diverges from the reference compiler"),
    ("60_errors_and_warnings.c", "expects diagnostics, not a program"),
    ("73_arm64.c", "platform-specific"),
    ("85_asm-outside-function.c", "inline assembly unsupported"),
    ("96_nodata_wanted.c", "relies on section layout of the reference compiler"),
    ("98_al_ax_extend.c", "platform-specific"),
    ("99_fastcall.c", "platform-specific"),
    ("95_bitfields_ms.c", "MS bitfield layout unsupported"),
    ("83_utf8_in_identifiers.c", "unsupported feature"),
];

struct ArgOverride {
    name: &'static str,
    args: &'static [&'static str],
    /// Copied from the source directory into the working directory before execution.
    helpers: &'static [&'static str],
}

const ARG_OVERRIDES: &[ArgOverride] = &[
    ArgOverride {
        name: "31_args.c",
        args: &["arg1", "arg2", "arg3", "arg4", "arg5"],
        helpers: &[],
    },
    ArgOverride {
        name: "46_grep.c",
        args: &[r"[^* ]*[:a:d: ]+\:\*-/: $", "46_grep.c"],
        helpers: &["46_grep.c"],
    },
];

pub fn exclusion_reason(base_name: &str) -> Option<&'static str> {
    EXCLUDED
        .iter()
        .find(|(name, _)| *name == base_name)
        .map(|(_, why)| *why)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub source: PathBuf,
    pub base_name: String,
    pub args: Vec<String>,
    pub helper_files: Vec<String>,
    /// `None`: accept and record without comparing.
    pub expected: Option<PathBuf>,
}

impl TestCase {
    pub fn from_source(source: &Path) -> Option<Self> {
        let base_name = source.file_name()?.to_str()?.to_string();
        let (args, helper_files) = match ARG_OVERRIDES.iter().find(|o| o.name == base_name) {
            Some(o) => (
                o.args.iter().map(|s| s.to_string()).collect(),
                o.helpers.iter().map(|s| s.to_string()).collect(),
            ),
            None => (Vec::new(), Vec::new()),
        };
        let expect = expect_path_for(source);
        Some(Self {
            source: source.to_path_buf(),
            base_name,
            args,
            helper_files,
            expected: expect.is_file().then_some(expect),
        })
    }
}

enum CaseOutcome {
    Matched,
    Recorded,
}

pub struct ComplianceRunner<'a> {
    config: &'a HarnessConfig,
    compiler: &'a dyn TaskFactory,
    reporter: Reporter,
}

impl<'a> ComplianceRunner<'a> {
    pub fn new(config: &'a HarnessConfig, compiler: &'a dyn TaskFactory, reporter: Reporter) -> Self {
        Self {
            config,
            compiler,
            reporter,
        }
    }

    /// Exercises every candidate under `test_root`, one at a time.
    ///
    /// Per-case problems land in the report; only a test root that cannot be
    /// enumerated (or a golden file that cannot be written) is an `Err`.
    pub fn run_corpus(&self, corpus: &str, test_root: &Path) -> Result<RunReport> {
        if !test_root.is_dir() {
            bail!("test directory not found: {}", test_root.display());
        }

        let mut tally = RunTally::default();
        let mut golden = GoldenLog::new(corpus, self.config.golden.clone());
        let mut recorded = Vec::new();
        let mut failures = Vec::new();

        for entry in WalkDir::new(test_root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden_dir(e))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 || err.path() == Some(test_root) => {
                    return Err(err).with_context(|| format!("walk {}", test_root.display()))
                }
                Err(err) => {
                    self.reporter.warn(&format!("walk {}: {err}", test_root.display()));
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_c_source(entry.path()) {
                continue;
            }
            let Some(case) = TestCase::from_source(entry.path()) else {
                continue;
            };
            if let Some(why) = exclusion_reason(&case.base_name) {
                self.reporter
                    .progress(&format!("skip {} ({why})", case.base_name));
                continue;
            }
            tally.files_seen += 1;
            if !self.config.selects(&case.source) {
                continue;
            }
            if self.config.trace.tested_paths {
                self.reporter.trace(&case.source.display().to_string());
            }

            match self.run_case(&case) {
                Ok(outcome) => {
                    tally.files_passed += 1;
                    golden.push(&case.base_name);
                    if let CaseOutcome::Recorded = outcome {
                        self.reporter.progress(&format!(
                            "recorded {} (no expectation file)",
                            case.base_name
                        ));
                        recorded.push(case.base_name.clone());
                    }
                }
                Err(failure) => {
                    self.reporter.failure(&failure);
                    failures.push(failure);
                }
            }
        }

        let golden_path = golden.finish()?;
        self.reporter.progress(&format!(
            "{corpus}: {}/{} passed",
            tally.files_passed, tally.files_seen
        ));

        Ok(RunReport {
            schema_version: RUN_REPORT_SCHEMA_VERSION,
            corpus: corpus.to_string(),
            test_root: test_root.to_path_buf(),
            tally,
            recorded,
            failures,
            golden: golden_path,
        })
    }

    fn run_case(&self, case: &TestCase) -> Result<CaseOutcome, CaseFailure> {
        let fail = |kind: FailureKind, message: String, trace: Option<String>| CaseFailure {
            name: case.base_name.clone(),
            path: case.source.clone(),
            kind,
            message,
            trace,
        };

        let scratch = ScratchDir::new("ccverify-case")
            .map_err(|e| fail(FailureKind::Filesystem, format!("create scratch dir: {e}"), None))?;
        let artifact = scratch.path().join("a.out");
        let log_path = scratch.path().join("out.log");
        let work = scratch.path().join("work");
        std::fs::create_dir(&work).map_err(|e| {
            fail(
                FailureKind::Filesystem,
                format!("mkdir {}: {e}", work.display()),
                None,
            )
        })?;

        if self.config.trace.source {
            match std::fs::read_to_string(&case.source) {
                Ok(text) => self.reporter.trace(&text),
                Err(e) => {
                    return Err(fail(
                        FailureKind::Filesystem,
                        format!("read {}: {e}", case.source.display()),
                        None,
                    ))
                }
            }
        }

        let diagnostics = CaptureBuf::new();
        let args = vec![
            "cc".to_string(),
            "-o".to_string(),
            artifact.display().to_string(),
            case.source.display().to_string(),
        ];
        if let Err(fault) = compile_isolated(
            self.compiler,
            args,
            Some(Box::new(diagnostics.clone())),
            Some(Box::new(diagnostics.clone())),
            self.config.trace.on_crash,
        ) {
            let mut message = fault.to_string();
            let output = diagnostics.contents();
            if !output.is_empty() {
                message.push_str("\n---- compiler output ----\n");
                message.push_str(&String::from_utf8_lossy(&output));
            }
            let trace = match fault {
                CompileFault::Crash { trace, .. } => trace,
                CompileFault::Error(_) => None,
            };
            return Err(fail(FailureKind::CompileFault, message, trace));
        }

        let source_dir = case.source.parent().unwrap_or(Path::new("."));
        for helper in &case.helper_files {
            let from = source_dir.join(helper);
            let to = work.join(helper);
            std::fs::copy(&from, &to).map_err(|e| {
                fail(
                    FailureKind::Filesystem,
                    format!("copy {} to {}: {e}", from.display(), to.display()),
                    None,
                )
            })?;
        }

        let output = run_artifact(
            &artifact,
            &case.args,
            &work,
            &log_path,
            self.config.exec_timeout,
        )
        .map_err(|e| fail(FailureKind::ExecutionError, e.to_string(), None))?;

        if self.config.trace.output {
            self.reporter.trace(&String::from_utf8_lossy(&output));
        }

        let Some(expect_path) = &case.expected else {
            return Ok(CaseOutcome::Recorded);
        };
        let expected = std::fs::read(expect_path).map_err(|e| {
            fail(
                FailureKind::Filesystem,
                format!("read {}: {e}", expect_path.display()),
                None,
            )
        })?;
        match compare(&case.base_name, &output, &expected) {
            Verdict::Match => Ok(CaseOutcome::Matched),
            Verdict::Mismatch { expected, actual } => Err(fail(
                FailureKind::ComparisonMismatch,
                format!("---- expected ----\n{expected}\n---- actual ----\n{actual}"),
                None,
            )),
        }
    }
}

fn is_hidden_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name().to_string_lossy().starts_with('.')
}

fn is_c_source(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("c")
}
