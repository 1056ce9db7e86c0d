use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dvf_aggregator::{
    record_import_run, setup_database, verify_count, write_jsonl, write_jsonl_file,
    AggregationReport, Aggregator, AggregatorConfig, ConfigOverrides, DataQualityEngine,
};

#[derive(Parser)]
#[command(
    name = "dvf-aggregator",
    version,
    about = "Fold DVF rows into one record per disposition"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Aggregate a DVF file and export transactions
    Aggregate(AggregateArgs),
    /// Aggregate a DVF file and print a quality profile
    Profile(InputArgs),
}

#[derive(Args)]
struct InputArgs {
    /// Pipe-separated DVF file (valeursfoncieres-YYYY.txt)
    input: PathBuf,

    /// JSON configuration file
    #[arg(long, env = "DVF_CONFIG")]
    config: Option<PathBuf>,

    /// Key rows by the published document identifier only (`--strict-keys=false` to disable)
    #[arg(long, env = "DVF_STRICT_KEYS", num_args = 0..=1, default_missing_value = "true")]
    strict_keys: Option<bool>,

    /// Keep a repeated built/land line of the same parcel only once
    #[arg(long, env = "DVF_COLLAPSE_REPEATED", num_args = 0..=1, default_missing_value = "true")]
    collapse_repeated: Option<bool>,

    /// Lower bound of the plausible price per built m²
    #[arg(long, env = "DVF_MIN_PRICE_PER_M2")]
    min_price_per_m2: Option<f64>,

    /// Upper bound of the plausible price per built m²
    #[arg(long, env = "DVF_MAX_PRICE_PER_M2")]
    max_price_per_m2: Option<f64>,
}

#[derive(Args)]
struct AggregateArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Transactions as JSON lines (stdout when omitted)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Anomalies as JSON lines
    #[arg(long)]
    anomalies: Option<PathBuf>,

    /// SQLite database to store the run in
    #[arg(long, env = "DVF_DB")]
    db: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Aggregate(args) => run_aggregate(args),
        Command::Profile(args) => run_profile(args),
    }
}

fn load_config(args: &InputArgs) -> Result<AggregatorConfig> {
    let config = match &args.config {
        Some(path) => AggregatorConfig::from_file(path)?,
        None => AggregatorConfig::default(),
    };

    config.with_overrides(&ConfigOverrides {
        strict_keys: args.strict_keys,
        collapse_repeated_components: args.collapse_repeated,
        min_price_per_m2: args.min_price_per_m2,
        max_price_per_m2: args.max_price_per_m2,
    })
}

fn aggregate_input(args: &InputArgs, config: &AggregatorConfig) -> Result<AggregationReport> {
    info!(input = %args.input.display(), ?config, "dvf-aggregator v{}", dvf_aggregator::VERSION);

    Aggregator::new(config.clone()).aggregate_file(&args.input)
}

fn run_aggregate(args: AggregateArgs) -> Result<()> {
    let config = load_config(&args.input)?;
    let report = aggregate_input(&args.input, &config)?;

    match &args.output {
        Some(path) => {
            let written = write_jsonl_file(path, &report.transactions)?;
            info!(written, path = %path.display(), "wrote transactions");
        }
        None => {
            write_jsonl(io::stdout().lock(), &report.transactions)?;
        }
    }

    if let Some(path) = &args.anomalies {
        let written = write_jsonl_file(path, &report.anomalies)?;
        info!(written, path = %path.display(), "wrote anomalies");
    }

    if let Some(db_path) = &args.db {
        store_report(db_path, &args.input.input, &report)?;
    }

    info!("{}", report.stats.summary());
    Ok(())
}

fn store_report(db_path: &Path, input: &Path, report: &AggregationReport) -> Result<()> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    setup_database(&conn)?;

    let run_id = record_import_run(
        &conn,
        &input.display().to_string(),
        &report.transactions,
        &report.anomalies,
        &report.stats,
    )?;

    let count = verify_count(&conn)?;
    info!(%run_id, stored = count, "import run recorded");
    Ok(())
}

fn run_profile(args: InputArgs) -> Result<()> {
    let config = load_config(&args)?;
    let report = aggregate_input(&args, &config)?;
    let engine = DataQualityEngine::new(&config);

    let reports = engine.validate_batch(&report.transactions);
    let summary = engine.batch_summary(&reports);

    println!("📊 DVF profile: {}", args.input.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", report.stats.summary());
    println!("Total value (one price per disposition): {} €", report.total_value());

    if !report.stats.anomalies_by_kind.is_empty() {
        println!("\n⚠️  Anomalies");
        for (kind, count) in &report.stats.anomalies_by_kind {
            println!("  {:<20} {}", kind, count);
        }
    }

    println!("\n✅ Quality");
    println!("  {}", summary.summary());

    let mut by_rule: BTreeMap<&str, usize> = BTreeMap::new();
    for validation in reports.iter().flat_map(|r| r.validations.iter()) {
        if !validation.passed {
            *by_rule.entry(validation.rule_name.as_str()).or_insert(0) += 1;
        }
    }
    for (rule, count) in by_rule {
        println!("  {:<24} {}", rule, count);
    }

    Ok(())
}
