use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use tabular_reconcile::console::ConsoleDecider;
use tabular_reconcile::csv_io::{read_dataset, read_datasets, write_dataset};
use tabular_reconcile::{report, BatchDecider, Dataset, DecisionProvider, ReconcileConfig};

fn main() {
    init_tracing();

    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Merge(args) => execute_merge(args),
        Command::Sync(args) => execute_sync(args),
    }
}

fn decider(interactive: bool) -> Box<dyn DecisionProvider> {
    if interactive {
        Box::new(ConsoleDecider::stdio())
    } else {
        Box::new(BatchDecider)
    }
}

fn execute_merge(args: MergeArgs) -> Result<()> {
    let config = ReconcileConfig::from_file(&args.common.config)?;
    let engine = config.merge_engine()?;
    let mut ctx = config.run_context();
    let mut decider = decider(args.common.interactive);

    let datasets = read_datasets(&args.inputs);
    let outcome = engine.run(&datasets, &mut ctx, decider.as_mut())?;

    write_dataset(&args.common.output, &outcome.merged)?;
    let reports = [
        ("duplicates", report::duplicate_report(&outcome)),
        ("merge_stats", report::merge_stats_report(&outcome)),
        ("field_summary", report::field_summary_report(&outcome)),
    ];
    write_reports(&args.common, &reports)?;

    println!(
        "✓ merged {} records into {} ({} duplicate clusters, {} conflicting)",
        outcome.stats.input_records,
        outcome.stats.output_records,
        outcome.stats.duplicate_clusters,
        outcome.stats.conflicting_clusters
    );
    print_warnings(outcome.warnings.len());
    Ok(())
}

fn execute_sync(args: SyncArgs) -> Result<()> {
    let config = ReconcileConfig::from_file(&args.common.config)?;
    let engine = config.sync_engine()?;
    let mut ctx = config.run_context();
    let mut decider = decider(args.common.interactive);

    let target = read_dataset(&args.target)?;
    let sources = read_datasets(&args.sources);
    let result = engine.run(&target, &sources, &mut ctx, decider.as_mut())?;

    write_dataset(&args.common.output, &result.target)?;
    let reports = [
        ("sync_stats", report::sync_stats_report(&result)),
        ("sync_changes", report::sync_changes_report(&result)),
        ("sync_fields", report::sync_field_report(&result)),
    ];
    write_reports(&args.common, &reports)?;

    println!(
        "✓ updated {} of {} target rows ({:.1}%), {} unmatched, {} without link value",
        result.stats.updated_rows,
        result.stats.target_rows,
        result.stats.success_rate * 100.0,
        result.stats.unmatched_rows,
        result.stats.failed_rows
    );
    print_warnings(result.warnings.len());
    Ok(())
}

/// Reports land next to the output as `<stem>_<name>.csv` unless a report dir is given.
fn write_reports(common: &CommonArgs, reports: &[(&str, Dataset)]) -> Result<()> {
    let dir = match &common.report_dir {
        Some(dir) => dir.clone(),
        None => common
            .output
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    if !dir.as_os_str().is_empty() {
        std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create report dir: {:?}", dir))?;
    }

    let Some(stem) = common.output.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        bail!("output path has no file name: {:?}", common.output);
    };
    for (name, dataset) in reports {
        write_dataset(dir.join(format!("{}_{}.csv", stem, name)), dataset)?;
    }
    Ok(())
}

fn print_warnings(count: usize) {
    if count > 0 {
        println!("⚠️  {} warnings (see log output)", count);
    }
}

#[derive(Parser)]
#[command(
    name = "tabrecon",
    author,
    version,
    about = "Reconcile tabular records across heterogeneous CSV sheets."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge several sheets into one deduplicated sheet.
    Merge(MergeArgs),
    /// Fill or overwrite fields of a target sheet from source sheets.
    Sync(SyncArgs),
}

#[derive(Args)]
struct CommonArgs {
    /// JSON configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Where to write the resulting sheet.
    #[arg(short, long)]
    output: PathBuf,

    /// Directory for report sheets (defaults to the output's directory).
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Answer policy questions on the terminal instead of using batch defaults.
    #[arg(long)]
    interactive: bool,
}

#[derive(Args)]
struct MergeArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Input CSV files, merged in the order given.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Args)]
struct SyncArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Sheet to supplement.
    #[arg(short, long)]
    target: PathBuf,

    /// Source CSV files, in priority order.
    #[arg(required = true)]
    sources: Vec<PathBuf>,
}
