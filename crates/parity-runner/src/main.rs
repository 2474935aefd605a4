use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use parity_contracts::{PARITY_COMPARE_REPORT_SCHEMA_VERSION, PARITY_RUN_REPORT_SCHEMA_VERSION};
use parity_runner::{report, CompareOptions, DirProjectStore, Orchestrator, RunnerConfig};
use parity_sandbox::{is_interpreter_available, run, ExecutionRequest, ScopedDir};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "PARITY_LOG";

#[derive(Parser)]
#[command(name = "parity-runner")]
#[command(
    about = "Run a program under its source and target runtimes and compare behavior.",
    long_about = None
)]
struct Cli {
    /// JSON config file (parity.config@0.1.0).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run one project file under both runtimes and compare.
    Compare(CompareArgs),
    /// Run a single program in the sandbox.
    Run(RunArgs),
    /// Check that an interpreter answers `--version`.
    Probe(ProbeArgs),
}

#[derive(Args)]
struct CompareArgs {
    #[arg(long)]
    project: String,

    #[arg(long)]
    file: String,

    #[arg(long)]
    projects_dir: Option<PathBuf>,

    #[arg(long)]
    timeout_seconds: Option<u64>,

    #[arg(long, conflicts_with = "stdin_file")]
    stdin: Option<String>,

    #[arg(long)]
    stdin_file: Option<PathBuf>,

    #[arg(long)]
    source_interpreter: Option<PathBuf>,

    #[arg(long)]
    target_interpreter: Option<PathBuf>,
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    interpreter: PathBuf,

    #[arg(long)]
    tree: PathBuf,

    #[arg(long)]
    entry: PathBuf,

    #[arg(long)]
    timeout_seconds: Option<u64>,

    #[arg(long)]
    memory_limit_mb: Option<u64>,

    #[arg(long, value_name = "BYTES")]
    max_output_bytes: Option<usize>,

    #[arg(long)]
    stdin: Option<String>,
}

#[derive(Args)]
struct ProbeArgs {
    #[arg(long)]
    interpreter: PathBuf,
}

fn main() -> ExitCode {
    init_tracing();
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn try_main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = RunnerConfig::load(cli.config.as_deref())?;
    match cli.command {
        Cmd::Compare(args) => cmd_compare(config, args),
        Cmd::Run(args) => cmd_run(config, args),
        Cmd::Probe(args) => Ok(cmd_probe(args)),
    }
}

fn cmd_compare(mut config: RunnerConfig, args: CompareArgs) -> Result<ExitCode> {
    if let Some(dir) = args.projects_dir {
        config.projects_dir = dir;
    }
    if let Some(p) = args.source_interpreter {
        config.source_interpreter = p;
    }
    if let Some(p) = args.target_interpreter {
        config.target_interpreter = p;
    }
    config.validate()?;

    let stdin_input = match (args.stdin, &args.stdin_file) {
        (Some(text), _) => Some(text),
        (None, Some(path)) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("read stdin file: {}", path.display()))?,
        ),
        (None, None) => None,
    };
    let options = CompareOptions {
        timeout_seconds: args.timeout_seconds,
        stdin_input,
    };

    let store = DirProjectStore::new(config.projects_dir.clone());
    let orchestrator = Orchestrator::new(config, store);
    match orchestrator.compare(&args.project, &args.file, &options) {
        Ok(outcome) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&report::compare_report(&outcome))?
            );
            Ok(ExitCode::from(if outcome.is_match() { 0 } else { 1 }))
        }
        Err(err) => {
            eprintln!("parity-runner: {err}");
            let doc = report::error_report(
                PARITY_COMPARE_REPORT_SCHEMA_VERSION,
                err.kind(),
                &err.to_string(),
            );
            println!("{}", serde_json::to_string_pretty(&doc)?);
            Ok(ExitCode::from(2))
        }
    }
}

fn cmd_run(mut config: RunnerConfig, args: RunArgs) -> Result<ExitCode> {
    if let Some(t) = args.timeout_seconds {
        config.timeout_seconds = t;
    }
    if let Some(m) = args.memory_limit_mb {
        config.memory_limit_mb = m;
    }
    if let Some(b) = args.max_output_bytes {
        config.max_output_bytes = b;
    }
    config.validate()?;

    let workspace = ScopedDir::seeded_from_in(&config.scratch_dir(), &args.tree, "parity_run")
        .with_context(|| format!("prepare working copy of {}", args.tree.display()))?;
    let request = ExecutionRequest::new(&args.interpreter, workspace, &args.entry)
        .with_stdin(args.stdin)
        .with_limits(config.limits(config.timeout_seconds))
        .with_module_path_var(config.module_path_var().map(str::to_string));

    match run(request) {
        Ok(result) => {
            let doc = report::run_report(&args.interpreter, &args.entry, &result);
            println!("{}", serde_json::to_string_pretty(&doc)?);
            let ok = result.exit_code == Some(0) && !result.timed_out;
            Ok(ExitCode::from(if ok { 0 } else { 1 }))
        }
        Err(err) => {
            eprintln!("parity-runner: {err}");
            let doc = report::error_report(
                PARITY_RUN_REPORT_SCHEMA_VERSION,
                err.kind().as_str(),
                &err.to_string(),
            );
            println!("{}", serde_json::to_string_pretty(&doc)?);
            Ok(ExitCode::from(2))
        }
    }
}

fn cmd_probe(args: ProbeArgs) -> ExitCode {
    let available = is_interpreter_available(&args.interpreter);
    let doc = report::probe_report(&args.interpreter, available);
    println!("{doc}");
    ExitCode::from(if available { 0 } else { 1 })
}
