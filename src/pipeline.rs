//! Batch scoring: derive, test, combine, filter and rank every target.

use std::collections::HashMap;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::counts::{CoOccurrenceCounts, derive};
use crate::error::{KinderMinerError, Result};
use crate::exact::one_sided_p_value;
use crate::io::CountBatch;
use crate::score::{DEFAULT_SIGNIFICANCE_THRESHOLD, ScoreCombiner, co_occurrence_ratio};

/// Runtime knobs for a scoring run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringOptions {
    /// Targets with `p >= significance_threshold` are left out of the report.
    pub significance_threshold: f64,
    /// Fail the whole run on the first rejected record instead of skipping it.
    pub strict: bool,
}

impl Default for ScoringOptions {
    fn default() -> Self {
        Self {
            significance_threshold: DEFAULT_SIGNIFICANCE_THRESHOLD,
            strict: false,
        }
    }
}

impl ScoringOptions {
    pub fn validate(&self) -> Result<()> {
        let t = self.significance_threshold;
        if !t.is_finite() || t <= 0.0 {
            return Err(KinderMinerError::InvalidThreshold(t));
        }
        Ok(())
    }
}

/// A target that cleared the significance filter.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredResult {
    pub counts: CoOccurrenceCounts,
    pub p_value: f64,
    pub co_occurrence_ratio: f64,
    pub ranking_score: f64,
}

impl ScoredResult {
    pub fn target_id(&self) -> &str {
        &self.counts.target_id
    }
}

/// Where a record sat in its count file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
    /// Zero-based data row, counting rows that failed to parse.
    pub index: usize,
    /// One-based line, header included.
    pub line: u64,
}

/// Why a record was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipCause {
    /// The row could not be read as five counts.
    Unparsable,
    /// The counts parsed but describe an impossible table.
    InvalidCounts,
}

/// A record that was rejected instead of scored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    /// Zero-based position in the sequence the record came from.
    pub index: usize,
    /// Source line, when the record came from a count file.
    pub line: Option<u64>,
    pub target_id: Option<String>,
    pub cause: SkipCause,
    pub reason: String,
}

impl SkippedRecord {
    pub fn into_error(self) -> KinderMinerError {
        match self.cause {
            SkipCause::Unparsable => KinderMinerError::Record {
                line: self.line.unwrap_or(0),
                message: self.reason,
            },
            SkipCause::InvalidCounts => KinderMinerError::InvalidCounts {
                target: self
                    .target_id
                    .unwrap_or_else(|| format!("<record {}>", self.index)),
                reason: match self.line {
                    Some(line) => format!("line {line}: {}", self.reason),
                    None => self.reason,
                },
            },
        }
    }
}

/// Outcome of one batch. `results` is ranked, strongest association first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoringReport {
    pub results: Vec<ScoredResult>,
    pub skipped: Vec<SkippedRecord>,
    /// Valid records that were not significant or had no ratio.
    pub excluded: usize,
}

impl ScoringReport {
    /// Read-only lookup by target identifier. The first result wins if an
    /// identifier repeats.
    pub fn by_target(&self) -> HashMap<&str, &ScoredResult> {
        let mut index = HashMap::with_capacity(self.results.len());
        for result in &self.results {
            index.entry(result.target_id()).or_insert(result);
        }
        index
    }
}

enum Outcome {
    Scored(ScoredResult),
    Excluded,
    Invalid(SkippedRecord),
}

fn score_one(
    position: SourcePosition,
    counts: &CoOccurrenceCounts,
    combiner: &ScoreCombiner,
    from_file: bool,
) -> Outcome {
    let table = match derive(counts) {
        Ok(table) => table,
        Err(e) => {
            let reason = match e {
                KinderMinerError::InvalidCounts { reason, .. } => reason,
                other => other.to_string(),
            };
            return Outcome::Invalid(SkippedRecord {
                index: position.index,
                line: from_file.then_some(position.line),
                target_id: Some(counts.target_id.clone()),
                cause: SkipCause::InvalidCounts,
                reason,
            });
        }
    };

    let p_value = one_sided_p_value(&table);
    let a_plus_c = table.target_margin();
    let (Some(ratio), Some(score)) = (
        co_occurrence_ratio(table.a, a_plus_c),
        combiner.combine(p_value, table.a, a_plus_c),
    ) else {
        debug!("Excluded {} (p = {:e})", counts.target_id, p_value);
        return Outcome::Excluded;
    };

    debug!(
        "Scored {}: p = {:e}, ratio = {}, score = {}",
        counts.target_id, p_value, ratio, score
    );
    Outcome::Scored(ScoredResult {
        counts: counts.clone(),
        p_value,
        co_occurrence_ratio: ratio,
        ranking_score: score,
    })
}

/// Sorts by `ranking_score`, descending. Stable, so equal scores keep input order.
pub fn rank(results: &mut [ScoredResult]) {
    results.sort_by(|x, y| y.ranking_score.total_cmp(&x.ranking_score));
}

/// Scores every record and returns the ranked report.
///
/// Records run in parallel; the ranking happens once, after all of them are
/// collected in input order. Invalid records never abort the batch: each one
/// becomes a [`SkippedRecord`].
///
/// # Example
/// ```
/// use kinderminer::{CoOccurrenceCounts, score_all};
/// let counts = vec![
///     CoOccurrenceCounts::new("weak", 1, 50, 20, 1000),
///     CoOccurrenceCounts::new("strong", 8, 10, 20, 1000),
///     CoOccurrenceCounts::new("broken", 30, 10, 20, 1000),
/// ];
/// let report = score_all(&counts, 1e-5);
/// assert_eq!(report.results.len(), 1);
/// assert_eq!(report.results[0].target_id(), "strong");
/// assert_eq!(report.excluded, 1);
/// assert_eq!(report.skipped[0].target_id.as_deref(), Some("broken"));
/// ```
pub fn score_all(counts: &[CoOccurrenceCounts], significance_threshold: f64) -> ScoringReport {
    score_records(counts, None, significance_threshold)
}

fn score_records(
    counts: &[CoOccurrenceCounts],
    positions: Option<&[SourcePosition]>,
    significance_threshold: f64,
) -> ScoringReport {
    let combiner = ScoreCombiner::new(significance_threshold);

    let outcomes: Vec<Outcome> = counts
        .par_iter()
        .enumerate()
        .map(|(index, c)| {
            let position = positions
                .and_then(|p| p.get(index).copied())
                .unwrap_or(SourcePosition { index, line: 0 });
            score_one(position, c, &combiner, positions.is_some())
        })
        .collect();

    let mut report = ScoringReport::default();
    for outcome in outcomes {
        match outcome {
            Outcome::Scored(result) => report.results.push(result),
            Outcome::Excluded => report.excluded += 1,
            Outcome::Invalid(skip) => {
                warn!(
                    "Skipping record {} ({}): {}",
                    skip.index,
                    skip.target_id.as_deref().unwrap_or("?"),
                    skip.reason
                );
                report.skipped.push(skip);
            }
        }
    }
    rank(&mut report.results);

    info!(
        "Scored {} records: {} reported, {} excluded, {} skipped",
        counts.len(),
        report.results.len(),
        report.excluded,
        report.skipped.len()
    );
    report
}

/// [`score_all`] with validated options; in strict mode the first invalid
/// record fails the run.
pub fn score_with(
    counts: &[CoOccurrenceCounts],
    options: &ScoringOptions,
) -> Result<ScoringReport> {
    options.validate()?;
    let mut report = score_all(counts, options.significance_threshold);
    if options.strict && !report.skipped.is_empty() {
        return Err(report.skipped.swap_remove(0).into_error());
    }
    Ok(report)
}

/// Scores a batch read from a count file.
///
/// Rows rejected while reading and rows rejected by [`derive`] are merged
/// into one list in file order, each carrying its source line. In strict
/// mode the earliest of them fails the run.
pub fn score_batch(batch: &CountBatch, options: &ScoringOptions) -> Result<ScoringReport> {
    options.validate()?;
    let mut report = score_records(
        &batch.records,
        Some(&batch.positions),
        options.significance_threshold,
    );
    report.skipped.extend(batch.rejected.iter().cloned());
    report.skipped.sort_by_key(|s| s.index);
    if options.strict && !report.skipped.is_empty() {
        return Err(report.skipped.swap_remove(0).into_error());
    }
    Ok(report)
}
