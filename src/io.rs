//! Count files in, ranked reports out.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::prelude::*;
use clap::ValueEnum;
use csv::{ErrorKind, QuoteStyle, ReaderBuilder, StringRecord, Trim, WriterBuilder};
use log::{info, warn};
use serde::Serialize;

use crate::counts::CoOccurrenceCounts;
use crate::error::{KinderMinerError, Result};
use crate::pipeline::{ScoredResult, SkipCause, SkippedRecord, SourcePosition};

/// Columns every count file must carry (any order, extra columns allowed).
pub const COUNT_COLUMNS: [&str; 5] = [
    "target",
    "target_with_keyphrase_count",
    "target_count",
    "keyphrase_count",
    "db_article_count",
];

/// Report header, in output order.
pub const REPORT_COLUMNS: [&str; 8] = [
    "target",
    "target_with_keyphrase_count",
    "target_count",
    "keyphrase_count",
    "db_article_count",
    "fet_p_value",
    "target_and_keyphrase_ratio",
    "fet_p_value_and_ratio",
];

/// Supported report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExportFormat {
    /// Tab-separated with a header row.
    #[default]
    Tsv,
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Tsv => "tsv",
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// Records read from a count file, plus the rows that could not be parsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountBatch {
    pub records: Vec<CoOccurrenceCounts>,
    /// Where each entry of `records` sat in the file; same length and order.
    pub positions: Vec<SourcePosition>,
    pub rejected: Vec<SkippedRecord>,
}

/// Field-level message for a row error; the line is carried separately.
fn row_error_message(e: &csv::Error) -> String {
    match e.kind() {
        ErrorKind::Deserialize { err, .. } => err.to_string(),
        ErrorKind::UnequalLengths {
            expected_len,
            len,
            ..
        } => format!("expected {expected_len} fields, found {len}"),
        _ => e.to_string(),
    }
}

/// Reads a tab-separated count file.
///
/// Fields are split on tabs only; quote characters are part of the value.
/// A missing required column fails the whole read. A row that does not parse
/// (short row, negative or non-numeric count) lands in
/// [`CountBatch::rejected`] and reading carries on.
///
/// # Example
/// ```
/// use kinderminer::read_counts;
/// let tsv = "target\ttarget_with_keyphrase_count\ttarget_count\tkeyphrase_count\tdb_article_count\n\
///            TP53\t8\t10\t20\t1000\n";
/// let batch = read_counts(tsv.as_bytes()).unwrap();
/// assert_eq!(batch.records[0].target_id, "TP53");
/// assert_eq!(batch.records[0].corpus_size, 1000);
/// assert_eq!(batch.positions[0].line, 2);
/// ```
pub fn read_counts<R: Read>(reader: R) -> Result<CountBatch> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .trim(Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    for column in COUNT_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(KinderMinerError::MissingColumn(column.to_string()));
        }
    }
    let target_col = headers.iter().position(|h| h == "target");

    let mut batch = CountBatch::default();
    let mut record = StringRecord::new();
    let mut index = 0_usize;
    loop {
        match rdr.read_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {
                let line = record.position().map_or(0, |p| p.line());
                match record.deserialize::<CoOccurrenceCounts>(Some(&headers)) {
                    Ok(counts) => {
                        batch.records.push(counts);
                        batch.positions.push(SourcePosition { index, line });
                    }
                    Err(e) => batch.rejected.push(SkippedRecord {
                        index,
                        line: Some(line),
                        target_id: target_col.and_then(|i| record.get(i)).map(String::from),
                        cause: SkipCause::Unparsable,
                        reason: row_error_message(&e),
                    }),
                }
            }
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => batch.rejected.push(SkippedRecord {
                index,
                line: e.position().map(|p| p.line()),
                target_id: None,
                cause: SkipCause::Unparsable,
                reason: row_error_message(&e),
            }),
        }
        index += 1;
    }

    for skip in &batch.rejected {
        warn!(
            "Rejected count row {} (line {:?}): {}",
            skip.index, skip.line, skip.reason
        );
    }
    info!(
        "Read {} count records ({} rejected)",
        batch.records.len(),
        batch.rejected.len()
    );
    Ok(batch)
}

pub fn read_counts_file(path: &Path) -> Result<CountBatch> {
    let file = File::open(path)?;
    read_counts(file)
}

/// Writes counts in the format [`read_counts`] accepts.
pub fn write_counts<W: Write>(counts: &[CoOccurrenceCounts], writer: W) -> Result<()> {
    let mut wtr = WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(QuoteStyle::Never)
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(COUNT_COLUMNS)?;
    for c in counts {
        wtr.serialize(c)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Neutralizes spreadsheet formula injection for CSV cells.
///
/// # Example
/// ```
/// use kinderminer::csv_safe_cell;
/// assert_eq!(csv_safe_cell("=SUM(A1)"), "'=SUM(A1)");
/// assert_eq!(csv_safe_cell("BRCA1"), "BRCA1");
/// ```
pub fn csv_safe_cell(cell: &str) -> Cow<'_, str> {
    match cell.chars().next() {
        Some('=' | '+' | '-' | '@') => Cow::Owned(format!("'{cell}")),
        _ => Cow::Borrowed(cell),
    }
}

#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    target: Cow<'a, str>,
    target_with_keyphrase_count: u64,
    target_count: u64,
    keyphrase_count: u64,
    db_article_count: u64,
    fet_p_value: f64,
    target_and_keyphrase_ratio: f64,
    fet_p_value_and_ratio: f64,
}

impl<'a> ReportRow<'a> {
    fn new(result: &'a ScoredResult, target: Cow<'a, str>) -> Self {
        let c = &result.counts;
        Self {
            target,
            target_with_keyphrase_count: c.target_and_keyphrase_count,
            target_count: c.target_count,
            keyphrase_count: c.keyphrase_count,
            db_article_count: c.corpus_size,
            fet_p_value: result.p_value,
            target_and_keyphrase_ratio: result.co_occurrence_ratio,
            fet_p_value_and_ratio: result.ranking_score,
        }
    }
}

/// Serializes ranked results in the given format, preserving their order.
///
/// TSV is written unquoted, like the count files it is read alongside; CSV
/// quotes as needed and guards formula-like targets with [`csv_safe_cell`].
pub fn write_report<W: Write>(
    results: &[ScoredResult],
    format: ExportFormat,
    writer: W,
) -> Result<()> {
    let mut builder = WriterBuilder::new();
    builder.has_headers(false);
    match format {
        ExportFormat::Json => {
            let rows: Vec<ReportRow> = results
                .iter()
                .map(|r| ReportRow::new(r, Cow::Borrowed(r.target_id())))
                .collect();
            let mut writer = writer;
            serde_json::to_writer_pretty(&mut writer, &rows)?;
            writeln!(writer)?;
            writer.flush()?;
            return Ok(());
        }
        ExportFormat::Tsv => {
            builder.delimiter(b'\t').quote_style(QuoteStyle::Never);
        }
        ExportFormat::Csv => {
            builder.delimiter(b',');
        }
    }

    let mut wtr = builder.from_writer(writer);
    wtr.write_record(REPORT_COLUMNS)?;
    for r in results {
        let target = match format {
            ExportFormat::Csv => csv_safe_cell(r.target_id()),
            _ => Cow::Borrowed(r.target_id()),
        };
        wtr.serialize(ReportRow::new(r, target))?;
    }
    wtr.flush()?;
    Ok(())
}

/// `<input stem>_<YYYYmmdd_HHMMSS>_kinderminer.<ext>` inside `dir`.
pub fn default_output_path(input: &Path, format: ExportFormat, dir: &Path) -> PathBuf {
    let local: DateTime<Local> = Local::now();
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "counts".to_string());
    let file_name = format!(
        "{}_{}_kinderminer.{}",
        stem,
        local.format("%Y%m%d_%H%M%S"),
        format.extension()
    );
    dir.join(file_name)
}

/// Writes the report to `path`, replacing any existing file. Returns `path`.
pub fn save_report(
    results: &[ScoredResult],
    format: ExportFormat,
    path: PathBuf,
) -> Result<PathBuf> {
    let file = File::create(&path)?;
    let mut writer = BufWriter::new(file);
    write_report(results, format, &mut writer)?;
    writer.flush()?;
    Ok(path)
}
