#![forbid(unsafe_code)]
//! # KinderMiner CLI
//!
//! Command-line front end for the `kinderminer` crate: reads a tab-separated
//! count file, scores every target against the keyphrase and writes the
//! ranked report.
//!
//! ## Example
//! ```bash
//! cargo run --release -- obesity_counts.txt --output obesity_ranked.tsv --threshold 1e-5
//! ```
//!
//! See `--help` for all available options.

use clap::Parser;
use kinderminer::{
    DEFAULT_SIGNIFICANCE_THRESHOLD, ExportFormat, ScoringOptions, default_output_path,
    print_skipped_records, read_counts_file, save_report, score_batch,
};
use log::error;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Tab-separated count file (target, target_with_keyphrase_count, target_count, keyphrase_count, db_article_count)
    count_file: PathBuf,

    /// Report path (default: <count file stem>_<timestamp>_kinderminer.<ext> in the current directory)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Only targets with a p-value strictly below this are reported
    #[arg(long, short, default_value_t = DEFAULT_SIGNIFICANCE_THRESHOLD)]
    threshold: f64,

    /// Output format for the report (tsv, csv, json)
    #[arg(long, default_value = "tsv")]
    export_format: ExportFormat,

    /// Abort on the first malformed or inconsistent record instead of skipping it
    #[arg(long, default_value_t = false)]
    strict: bool,
}

fn run(cli: &Cli) -> kinderminer::Result<()> {
    let instant = Instant::now();
    let options = ScoringOptions {
        significance_threshold: cli.threshold,
        strict: cli.strict,
    };
    options.validate()?;

    let batch = read_counts_file(&cli.count_file)?;
    let report = score_batch(&batch, &options)?;

    let path = match &cli.output {
        Some(p) => p.clone(),
        None => default_output_path(&cli.count_file, cli.export_format, Path::new(".")),
    };
    let path = save_report(&report.results, cli.export_format, path)?;

    println!(
        "Wrote {} ranked target(s) to {} ({} excluded, {} skipped) in {:.3}s",
        report.results.len(),
        path.display(),
        report.excluded,
        report.skipped.len(),
        instant.elapsed().as_secs_f64()
    );
    if !report.skipped.is_empty() {
        print_skipped_records(&report.skipped);
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        error!("Error: {}", e);
        process::exit(1);
    }
}
