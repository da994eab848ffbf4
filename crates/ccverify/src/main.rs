use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use ccverify::exports::{ExportLookup as _, NmExports};
use ccverify::report::{describe_outcome, ResolveReport};
use ccverify::{
    ComplianceRunner, ConfigFile, ExternalCompiler, HarnessConfig, Reporter, TraceFlags,
};
use ccverify_corpus::{known_corpora, resolve_all, CorpusSpec, ResolveOptions, ResolveOutcome};
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ccverify")]
#[command(about = "Regression harness for a C compiler.", long_about = None)]
struct Cli {
    /// Directory holding one root per corpus.
    #[arg(long, global = true, default_value = "assets")]
    assets: PathBuf,

    /// JSON file replacing the built-in corpus catalog.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Make sure every corpus is present under the assets directory.
    Fetch(FetchArgs),
    /// Compile, execute, and check every test program of the available corpora.
    Run(RunArgs),
    /// List the symbols a library package exports.
    Exports(ExportsArgs),
}

#[derive(Debug, Args)]
struct AcquireArgs {
    /// Download corpora that are not present yet.
    #[arg(long)]
    download: bool,

    /// Also acquire developer-only corpora.
    #[arg(long)]
    dev: bool,

    #[arg(long, default_value_t = 600)]
    download_timeout_secs: u64,
}

#[derive(Debug, Args)]
struct FetchArgs {
    #[command(flatten)]
    acquire: AcquireArgs,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Compiler executable under test.
    #[arg(long)]
    compiler: PathBuf,

    /// Extra argument passed to the compiler before `-o`.
    #[arg(long = "compiler-arg", allow_hyphen_values = true)]
    compiler_args: Vec<String>,

    #[command(flatten)]
    acquire: AcquireArgs,

    /// Restrict the run to the named corpora.
    #[arg(long = "corpus")]
    corpora: Vec<String>,

    /// Only exercise test paths matching this regex (no golden file is written).
    #[arg(long)]
    filter: Option<String>,

    /// Keep a backtrace when the compiler crashes.
    #[arg(long)]
    trc: bool,

    #[arg(long)]
    trace_tested_paths: bool,

    #[arg(long)]
    trace_output: bool,

    #[arg(long)]
    trace_source: bool,

    #[arg(long, default_value = "golden")]
    golden_dir: PathBuf,

    #[arg(long)]
    no_golden: bool,

    #[arg(long, default_value_t = 30)]
    exec_timeout_secs: u64,

    #[arg(long, default_value_t = 120)]
    compile_timeout_secs: u64,
}

#[derive(Debug, Args)]
struct ExportsArgs {
    /// Library path, or a name looked up as `lib<name>.{so,a}`.
    package: String,

    #[arg(long = "search-dir")]
    search_dirs: Vec<PathBuf>,
}

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let reporter = Reporter::new(cli.json, cli.quiet);

    match cli.cmd {
        Command::Fetch(args) => cmd_fetch(&cli.assets, cli.config.as_deref(), args, &reporter),
        Command::Run(args) => cmd_run(&cli.assets, cli.config.as_deref(), args, &reporter),
        Command::Exports(args) => cmd_exports(args, &reporter),
    }
}

fn load_corpora(config: Option<&Path>) -> Result<Vec<CorpusSpec>> {
    match config {
        Some(path) => Ok(ConfigFile::load(path)?.corpora_or(known_corpora())),
        None => Ok(known_corpora()),
    }
}

fn resolve_options(assets: &Path, acquire: &AcquireArgs) -> ResolveOptions {
    ResolveOptions {
        assets_dir: assets.to_path_buf(),
        allow_download: acquire.download,
        allow_developer: acquire.dev,
        download_timeout: Some(Duration::from_secs(acquire.download_timeout_secs)),
    }
}

fn cmd_fetch(
    assets: &Path,
    config: Option<&Path>,
    args: FetchArgs,
    reporter: &Reporter,
) -> Result<ExitCode> {
    let corpora = load_corpora(config)?;
    let opts = resolve_options(assets, &args.acquire);
    let resolutions = resolve_all(&corpora, &opts, &mut |msg: &str| reporter.progress(msg));

    for r in &resolutions {
        reporter.resolution(&r.corpus, &r.outcome);
    }

    let report = ResolveReport::from_resolutions(&resolutions);
    if reporter.json {
        reporter.emit_json(&report)?;
    }
    Ok(if report.failed() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn cmd_run(
    assets: &Path,
    config: Option<&Path>,
    args: RunArgs,
    reporter: &Reporter,
) -> Result<ExitCode> {
    let mut corpora = load_corpora(config)?;
    if !args.corpora.is_empty() {
        for name in &args.corpora {
            if !corpora.iter().any(|c| &c.name == name) {
                bail!("unknown corpus: {name}");
            }
        }
        corpora.retain(|c| args.corpora.contains(&c.name));
    }

    let harness = HarnessConfig::new(
        args.filter.as_deref(),
        TraceFlags {
            on_crash: args.trc,
            tested_paths: args.trace_tested_paths,
            output: args.trace_output,
            source: args.trace_source,
        },
        &args.golden_dir,
        args.no_golden,
        Duration::from_secs(args.exec_timeout_secs),
    )?;
    let compiler = ExternalCompiler {
        program: args.compiler.clone(),
        extra_args: args.compiler_args.clone(),
        timeout: Duration::from_secs(args.compile_timeout_secs),
    };

    let opts = resolve_options(assets, &args.acquire);
    let resolutions = resolve_all(&corpora, &opts, &mut |msg: &str| reporter.progress(msg));
    let runner = ComplianceRunner::new(&harness, &compiler, reporter.clone());

    let mut any_failed = false;
    for (spec, resolution) in corpora.iter().zip(&resolutions) {
        if !resolution.outcome.is_available() {
            match &resolution.outcome {
                outcome @ ResolveOutcome::NotADirectory => {
                    reporter.warn(&describe_outcome(&spec.name, outcome))
                }
                outcome => reporter.resolution(&spec.name, outcome),
            }
            continue;
        }
        let Some(test_root) = spec.test_root_in(assets) else {
            reporter.progress(&format!("{}: no test directory, nothing to run", spec.name));
            continue;
        };

        reporter.progress(&format!("{}: running {}", spec.name, test_root.display()));
        let report = runner
            .run_corpus(&spec.name, &test_root)
            .with_context(|| format!("corpus {}", spec.name))?;
        if let Some(path) = &report.golden {
            reporter.progress(&format!("golden: {}", path.display()));
        }
        any_failed |= !report.ok();
        if reporter.json {
            reporter.emit_json(&report)?;
        }
    }

    Ok(if any_failed {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn cmd_exports(args: ExportsArgs, reporter: &Reporter) -> Result<ExitCode> {
    let lookup = NmExports::new(args.search_dirs);
    let exports = lookup.exports(&args.package)?;
    reporter.progress(&format!(
        "{}: {} symbols from {}",
        exports.package,
        exports.symbols.len(),
        exports.library.display()
    ));
    reporter.emit_json(&exports)?;
    Ok(ExitCode::SUCCESS)
}
