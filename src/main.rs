//! ferry - Copy and move files on a bounded pool of workers.
//!
//! Usage:
//!   ferry copy <SOURCES>... --to <DIR>   Copy items into a directory
//!   ferry move <SOURCES>... --to <DIR>   Move items into a directory
//!   ferry --help                         Show help

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use ferry_core::{ConflictPolicy, EngineConfig, TransferOutcome};
use ferry_ops::{ConflictPrompt, Engine, EngineEvent, NoopHost, PasteStatus, Resolution};

#[derive(Parser)]
#[command(
    name = "ferry",
    version,
    about = "Copy and move files with conflict prompts",
    long_about = "ferry runs copies and moves on a bounded pool of workers.\n\n\
                  Name collisions are resolved interactively unless a policy \
                  is given with --on-conflict or in the config file."
)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Number of worker slots
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Log ferry internals at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy items into a directory
    Copy(TransferArgs),

    /// Move items into a directory
    Move(TransferArgs),
}

#[derive(Args)]
struct TransferArgs {
    /// Items to transfer
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Destination directory
    #[arg(short, long)]
    to: PathBuf,

    /// What to do when a destination already exists
    #[arg(long)]
    on_conflict: Option<ConflictChoice>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConflictChoice {
    Ask,
    Skip,
    Replace,
    KeepBoth,
}

impl ConflictChoice {
    fn policy(self) -> Option<ConflictPolicy> {
        match self {
            Self::Ask => None,
            Self::Skip => Some(ConflictPolicy::Skip),
            Self::Replace => Some(ConflictPolicy::Replace),
            Self::KeepBoth => Some(ConflictPolicy::KeepBoth),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Everything a run produced, in completion order.
#[derive(Debug, Default, Serialize)]
struct Report {
    moved: bool,
    outcomes: Vec<TransferOutcome>,
    failures: Vec<Failure>,
    cancelled: bool,
}

#[derive(Debug, Serialize)]
struct Failure {
    item: PathBuf,
    message: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let (args, moved) = match cli.command {
        Command::Copy(ref args) => (args, false),
        Command::Move(ref args) => (args, true),
    };

    let config = load_config(&cli, args)?;
    let destination = args
        .to
        .canonicalize()
        .with_context(|| format!("Invalid destination {}", args.to.display()))?;
    if !destination.is_dir() {
        bail!("{} is not a directory", destination.display());
    }
    let sources = args
        .sources
        .iter()
        .map(|source| {
            source
                .canonicalize()
                .with_context(|| format!("Invalid source {}", source.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut engine = Engine::new(&config, Arc::new(NoopHost))?;
    let report = run_transfer(&mut engine, &sources, &destination, moved).await?;
    engine.shutdown();

    match cli.format {
        OutputFormat::Text => print_report(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if !report.failures.is_empty() {
        bail!("{} item(s) failed", report.failures.len());
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if verbose {
        for directive in ["ferry=debug", "ferry_core=debug", "ferry_ops=debug"] {
            if let Ok(directive) = directive.parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Load the config file, then apply command-line overrides.
fn load_config(cli: &Cli, args: &TransferArgs) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_or_default()?,
    };

    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(choice) = args.on_conflict {
        config.default_policy = choice.policy();
    }
    config.validate()?;
    debug!(workers = config.workers, policy = ?config.default_policy, "configuration loaded");
    Ok(config)
}

/// Paste, then keep answering prompts until nothing is left to run.
async fn run_transfer(
    engine: &mut Engine,
    sources: &[PathBuf],
    destination: &Path,
    moved: bool,
) -> Result<Report> {
    let mut report = Report {
        moved,
        ..Report::default()
    };
    let mut status = engine.paste(sources, destination, moved)?;

    loop {
        match status {
            PasteStatus::NeedsResolution(prompt) => {
                let resolution = ask(&prompt)?;
                status = engine.resolve(prompt.id, resolution)?;
                continue;
            }
            PasteStatus::Cancelled => {
                report.cancelled = true;
                return Ok(report);
            }
            PasteStatus::Nothing => return Ok(report),
            PasteStatus::Submitted(submission) => {
                eprintln!("Transfer {} started...", submission.id());
            }
        }

        let mut next = None;
        for event in engine.wait_idle().await {
            match event {
                EngineEvent::Completed { outcome, .. } => report.outcomes.push(outcome),
                EngineEvent::ConflictsDetected(prompt) => next = Some(prompt),
                EngineEvent::TransferFailed { item, message, .. } => {
                    report.failures.push(Failure { item, message })
                }
            }
        }

        match next {
            Some(prompt) => status = PasteStatus::NeedsResolution(prompt),
            None => return Ok(report),
        }
    }
}

/// Ask on the terminal how to resolve a prompt.
fn ask(prompt: &ConflictPrompt) -> Result<Resolution> {
    eprintln!();
    eprintln!("{} item(s) already exist:", prompt.conflicts.len());
    for conflict in &prompt.conflicts {
        eprintln!("   {} ({})", conflict.destination.display(), conflict.kind);
    }

    let stdin = io::stdin();
    loop {
        eprint!("[s]kip, [r]eplace, [k]eep both, [c]ancel? ");
        io::stderr().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(Resolution::Cancel);
        }
        let resolution = match line.trim().to_lowercase().as_str() {
            "s" | "skip" => Resolution::All(ConflictPolicy::Skip),
            "r" | "replace" => Resolution::All(ConflictPolicy::Replace),
            "k" | "keep" | "keep both" => Resolution::All(ConflictPolicy::KeepBoth),
            "c" | "cancel" => Resolution::Cancel,
            _ => continue,
        };
        return Ok(resolution);
    }
}

fn print_report(report: &Report) {
    println!();
    println!("{}", "─".repeat(60));
    for outcome in &report.outcomes {
        println!(" {}", outcome.summary(report.moved));
    }
    if report.cancelled {
        println!(" Cancelled");
    }

    let bytes: u64 = report.outcomes.iter().map(|o| o.bytes_transferred).sum();
    let pasted: usize = report.outcomes.iter().map(|o| o.pasted.len()).sum();
    println!(" {} items, {} transferred", pasted, format_size(bytes));
    println!("{}", "─".repeat(60));

    for failure in &report.failures {
        eprintln!(" failed: {}: {}", failure.item.display(), failure.message);
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
