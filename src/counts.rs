//! Per-target co-occurrence counts and the 2x2 contingency table derived from them.

use serde::{Deserialize, Serialize};

use crate::error::{KinderMinerError, Result};

/// Raw counts for one target term, as delivered by the count-acquisition step.
///
/// Field names on the wire follow the count file header
/// (`target`, `target_with_keyphrase_count`, ..., `db_article_count`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoOccurrenceCounts {
    #[serde(rename = "target")]
    pub target_id: String,
    #[serde(rename = "target_with_keyphrase_count")]
    pub target_and_keyphrase_count: u64,
    pub target_count: u64,
    pub keyphrase_count: u64,
    #[serde(rename = "db_article_count")]
    pub corpus_size: u64,
}

impl CoOccurrenceCounts {
    pub fn new(
        target_id: impl Into<String>,
        target_and_keyphrase_count: u64,
        target_count: u64,
        keyphrase_count: u64,
        corpus_size: u64,
    ) -> Self {
        Self {
            target_id: target_id.into(),
            target_and_keyphrase_count,
            target_count,
            keyphrase_count,
            corpus_size,
        }
    }
}

/// Presence/absence table for target (rows) against keyphrase (columns).
///
/// ```text
///                 keyphrase   no keyphrase
/// target              a            c
/// no target           b            d
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContingencyTable {
    /// Target and keyphrase.
    pub a: u64,
    /// Keyphrase without target.
    pub b: u64,
    /// Target without keyphrase.
    pub c: u64,
    /// Neither.
    pub d: u64,
}

impl ContingencyTable {
    pub fn total(&self) -> u64 {
        self.a + self.b + self.c + self.d
    }

    /// Documents mentioning the keyphrase (`a + b`).
    pub fn keyphrase_margin(&self) -> u64 {
        self.a + self.b
    }

    /// Documents mentioning the target (`a + c`).
    pub fn target_margin(&self) -> u64 {
        self.a + self.c
    }
}

/// Derives the contingency table for `counts`, rejecting margins that would
/// produce a negative cell.
///
/// # Example
/// ```
/// use kinderminer::{CoOccurrenceCounts, derive};
/// let counts = CoOccurrenceCounts::new("TP53", 8, 10, 20, 1000);
/// let table = derive(&counts).unwrap();
/// assert_eq!((table.a, table.b, table.c, table.d), (8, 12, 2, 978));
/// assert_eq!(table.total(), 1000);
/// ```
pub fn derive(counts: &CoOccurrenceCounts) -> Result<ContingencyTable> {
    let invalid = |reason: String| KinderMinerError::InvalidCounts {
        target: counts.target_id.clone(),
        reason,
    };

    let a = counts.target_and_keyphrase_count;
    if counts.target_count > counts.corpus_size {
        return Err(invalid(format!(
            "target_count {} exceeds corpus_size {}",
            counts.target_count, counts.corpus_size
        )));
    }
    if counts.keyphrase_count > counts.corpus_size {
        return Err(invalid(format!(
            "keyphrase_count {} exceeds corpus_size {}",
            counts.keyphrase_count, counts.corpus_size
        )));
    }
    let b = counts.keyphrase_count.checked_sub(a).ok_or_else(|| {
        invalid(format!(
            "target_and_keyphrase_count {} exceeds keyphrase_count {}",
            a, counts.keyphrase_count
        ))
    })?;
    let c = counts.target_count.checked_sub(a).ok_or_else(|| {
        invalid(format!(
            "target_and_keyphrase_count {} exceeds target_count {}",
            a, counts.target_count
        ))
    })?;
    // target_count <= corpus_size was checked above, so only the `- b` can underflow.
    let d = (counts.corpus_size - counts.target_count)
        .checked_sub(b)
        .ok_or_else(|| {
            invalid(format!(
                "target_count {} and keyphrase_count {} with overlap {} do not fit in corpus_size {}",
                counts.target_count, counts.keyphrase_count, a, counts.corpus_size
            ))
        })?;

    Ok(ContingencyTable { a, b, c, d })
}
