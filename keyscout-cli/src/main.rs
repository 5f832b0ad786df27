use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use keyscout::{
    metrics::ScanStats, scan, CollectionStatus, ConcurrencyModel, ConfigOverrides, EncodingMode,
    ScanConfig, ScanOutput, WorkerCommand,
};
use serde_json::json;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
struct CliScanConfig {
    /// Directory holding the files to scan
    #[arg(short = 'd', long = "dir")]
    dir: Option<PathBuf>,

    /// Keyword to look for (can be specified multiple times)
    #[arg(short = 'k', long = "keyword")]
    keywords: Vec<String>,

    /// Glob matched against file names (default: *.txt)
    #[arg(short = 'g', long = "glob")]
    glob: Option<String>,

    /// Number of workers to partition the files across (default: CPU cores)
    #[arg(short = 'j', long = "workers")]
    workers: Option<usize>,

    /// Concurrency model (threads|processes)
    #[arg(short = 'm', long)]
    model: Option<ConcurrencyModel>,

    /// Descend into subdirectories
    #[arg(short = 'r', long)]
    recursive: bool,

    /// How to handle invalid UTF-8 sequences (ignore|lossy|failfast)
    #[arg(long)]
    encoding: Option<EncodingMode>,

    /// Longest wait for a single worker result, e.g. "30s" (process model)
    #[arg(long, value_parser = humantime::parse_duration)]
    collect_timeout: Option<Duration>,

    /// Deadline for worker processes to exit after collection, e.g. "10s"
    #[arg(long, value_parser = humantime::parse_duration)]
    join_timeout: Option<Duration>,

    /// Configuration file (YAML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Show only statistics, not matching files
    #[arg(short, long)]
    stats: bool,

    /// Print a machine-readable JSON summary
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a directory for keywords
    Scan(Box<CliScanConfig>),

    /// Serve one isolated worker job on stdin/stdout
    #[command(hide = true)]
    Worker,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan(args) => run_scan(*args),
        Commands::Worker => {
            init_logging("warn");
            let stdout = BufWriter::new(io::stdout().lock());
            keyscout::scan::serve(io::stdin().lock(), stdout).context("worker job failed")
        }
    }
}

/// Logs to stderr; `RUST_LOG` overrides the configured level
fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run_scan(args: CliScanConfig) -> Result<()> {
    let file_config = ScanConfig::load_from(args.config.as_deref())
        .context("failed to load configuration")?;

    let mut config = file_config.merge_with_cli(ConfigOverrides {
        root_path: args.dir,
        file_pattern: args.glob,
        keywords: args.keywords,
        worker_count: args.workers,
        model: args.model,
        recursive: args.recursive,
        encoding_mode: args.encoding,
        collect_timeout: args.collect_timeout,
        join_timeout: args.join_timeout,
        log_level: args.log_level,
    });
    init_logging(&config.log_level);

    // This binary serves isolated jobs through its hidden `worker` subcommand
    if config.model == ConcurrencyModel::Processes && config.worker_command.is_none() {
        let command = WorkerCommand::current_exe()?;
        debug!("Using {} as worker program", command.program.display());
        config.worker_command = Some(command);
    }

    let result = scan(&config)?;

    if args.json {
        print_json(&config, &result)?;
    } else {
        print_scan_results(&config, &result, args.stats);
    }
    Ok(())
}

fn print_scan_results(config: &ScanConfig, result: &ScanOutput, stats_only: bool) {
    if !stats_only {
        for keyword in &config.keywords {
            let files = result.file_set(keyword);
            println!(
                "\n{} ({} files)",
                keyword.bold().blue(),
                files.len().to_string().green()
            );
            for path in files {
                println!("  {}", path.display());
            }
        }
    }

    let stats = ScanStats::from_result(result);
    println!(
        "\nScanned {} of {} files in {} ({:.1} files/sec), {} errors",
        stats.files_processed,
        stats.files_discovered,
        humantime::format_duration(round_millis(stats.elapsed)),
        stats.files_per_second,
        if stats.errors > 0 {
            stats.errors.to_string().red()
        } else {
            stats.errors.to_string().normal()
        }
    );
    println!(
        "Workers: {} of {} requested ({:?} model)",
        result.workers_spawned, result.workers_requested, config.model
    );

    if result.fatal_workers > 0 {
        println!(
            "{}",
            format!("{} workers failed; their files are not counted", result.fatal_workers)
                .yellow()
        );
    }
    if let CollectionStatus::TimedOut { missing } = result.collection {
        println!(
            "{}",
            format!(
                "Partial result: {} workers did not report, {} terminated",
                missing, result.workers_terminated
            )
            .yellow()
        );
    }
}

fn print_json(config: &ScanConfig, result: &ScanOutput) -> Result<()> {
    let summary = json!({
        "root": config.root_path,
        "model": config.model,
        "matches": result.file_sets(),
        "files_discovered": result.files_discovered,
        "files_processed": result.files_processed,
        "errors": result.errors,
        "workers_requested": result.workers_requested,
        "workers_spawned": result.workers_spawned,
        "workers_reported": result.workers_reported,
        "fatal_workers": result.fatal_workers,
        "workers_terminated": result.workers_terminated,
        "collection": result.collection,
        "elapsed_ms": result.elapsed.as_millis() as u64,
        "files_per_second": result.files_per_second(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn round_millis(elapsed: Duration) -> Duration {
    Duration::from_millis(elapsed.as_millis() as u64)
}
