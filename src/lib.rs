//! # KinderMiner scoring
//!
//! Ranks candidate target terms by how strongly they co-occur with a fixed
//! keyphrase in a literature corpus. Each target comes with four counts
//! (documents mentioning target and keyphrase, the target, the keyphrase, and
//! the corpus size). From these the crate
//!
//! 1. derives a 2x2 contingency table ([`derive`]),
//! 2. runs a one-sided Fisher exact test for positive association
//!    ([`one_sided_p_value`]),
//! 3. keeps targets with `p < threshold` and scores them as
//!    `-log10(p) + log10(a / (a + c))` ([`ScoreCombiner`]),
//! 4. ranks the survivors, strongest first ([`score_all`]).
//!
//! Count files and reports are tab-separated by default; see [`read_counts`]
//! and [`write_report`].
//!
//! ## Example
//! ```
//! use kinderminer::{CoOccurrenceCounts, ExportFormat, score_all, write_report};
//!
//! let counts = vec![
//!     CoOccurrenceCounts::new("leptin", 8, 10, 20, 1000),
//!     CoOccurrenceCounts::new("insulin", 9, 10, 20, 1000),
//! ];
//! let report = score_all(&counts, 1e-5);
//! assert_eq!(report.results[0].target_id(), "insulin");
//!
//! let mut out = Vec::new();
//! write_report(&report.results, ExportFormat::Tsv, &mut out).unwrap();
//! ```

pub mod counts;
pub mod error;
pub mod exact;
pub mod io;
pub mod pipeline;
pub mod score;

pub use counts::{CoOccurrenceCounts, ContingencyTable, derive};
pub use error::{KinderMinerError, Result};
pub use exact::{P_VALUE_FLOOR, floor_p_value, one_sided_p_value};
pub use io::{
    COUNT_COLUMNS, CountBatch, ExportFormat, REPORT_COLUMNS, csv_safe_cell, default_output_path,
    read_counts, read_counts_file, save_report, write_counts, write_report,
};
pub use pipeline::{
    ScoredResult, ScoringOptions, ScoringReport, SkipCause, SkippedRecord, SourcePosition, rank,
    score_all, score_batch, score_with,
};
pub use score::{DEFAULT_SIGNIFICANCE_THRESHOLD, ScoreCombiner, co_occurrence_ratio};

/// Prints rejected records to stderr, one per line.
pub fn print_skipped_records(skipped: &[SkippedRecord]) {
    eprintln!("Skipped {} record(s):", skipped.len());
    for s in skipped {
        let location = match s.line {
            Some(line) => format!("line {line}"),
            None => format!("#{}", s.index),
        };
        eprintln!(
            "  - {} {}: {}",
            location,
            s.target_id.as_deref().unwrap_or("<unknown>"),
            s.reason
        );
    }
}
