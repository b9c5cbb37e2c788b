//! Combines significance and prevalence into a single ranking score.

use crate::exact::floor_p_value;

/// Default cutoff: only targets with `p < 1e-5` are reported.
pub const DEFAULT_SIGNIFICANCE_THRESHOLD: f64 = 1e-5;

/// Fraction of target documents that also mention the keyphrase, `a / (a + c)`.
///
/// `None` when the target never occurs (`a + c == 0`).
pub fn co_occurrence_ratio(a: u64, a_plus_c: u64) -> Option<f64> {
    if a_plus_c == 0 {
        return None;
    }
    Some(a as f64 / a_plus_c as f64)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreCombiner {
    pub significance_threshold: f64,
}

impl Default for ScoreCombiner {
    fn default() -> Self {
        Self {
            significance_threshold: DEFAULT_SIGNIFICANCE_THRESHOLD,
        }
    }
}

impl ScoreCombiner {
    pub fn new(significance_threshold: f64) -> Self {
        Self {
            significance_threshold,
        }
    }

    /// `p_value < threshold`, strictly.
    pub fn is_significant(&self, p_value: f64) -> bool {
        p_value < self.significance_threshold
    }

    /// Ranking score `-log10(p) + log10(a / (a + c))`.
    ///
    /// Returns `None`, excluding the target from the report, when the target
    /// has no documents, never co-occurs, or `p_value` is not below the threshold.
    ///
    /// # Example
    /// ```
    /// use kinderminer::ScoreCombiner;
    /// let combiner = ScoreCombiner::default();
    /// let score = combiner.combine(1e-8, 5, 10).unwrap();
    /// assert!((score - (8.0 + 0.5f64.log10())).abs() < 1e-12);
    /// assert_eq!(combiner.combine(1e-5, 5, 10), None);
    /// ```
    pub fn combine(&self, p_value: f64, a: u64, a_plus_c: u64) -> Option<f64> {
        let ratio = co_occurrence_ratio(a, a_plus_c)?;
        if ratio <= 0.0 || !self.is_significant(p_value) {
            return None;
        }
        let p_value = floor_p_value(p_value);
        Some(-p_value.log10() + ratio.log10())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exact::P_VALUE_FLOOR;

    #[test]
    fn ratio_of_empty_target_is_none() {
        assert_eq!(co_occurrence_ratio(0, 0), None);
        assert_eq!(co_occurrence_ratio(8, 10), Some(0.8));
        assert_eq!(co_occurrence_ratio(3, 3), Some(1.0));
    }

    #[test]
    fn threshold_is_strict() {
        let combiner = ScoreCombiner::default();
        let threshold = DEFAULT_SIGNIFICANCE_THRESHOLD;
        assert_eq!(combiner.combine(threshold, 5, 10), None);

        let just_below = f64::from_bits(threshold.to_bits() - 1);
        assert!(just_below < threshold);
        assert!(combiner.combine(just_below, 5, 10).is_some());
    }

    #[test]
    fn custom_threshold() {
        let combiner = ScoreCombiner::new(0.05);
        assert!(combiner.combine(0.01, 1, 2).is_some());
        assert!(combiner.combine(0.05, 1, 2).is_none());
        assert!(ScoreCombiner::default().combine(0.01, 1, 2).is_none());
    }

    #[test]
    fn zero_denominator_or_zero_overlap_excluded() {
        let combiner = ScoreCombiner::default();
        assert_eq!(combiner.combine(1e-20, 0, 0), None);
        assert_eq!(combiner.combine(1e-20, 0, 10), None);
    }

    #[test]
    fn floored_p_value_gives_finite_score() {
        let combiner = ScoreCombiner::default();
        let from_zero = combiner.combine(0.0, 10, 10).unwrap();
        let from_floor = combiner.combine(P_VALUE_FLOOR, 10, 10).unwrap();
        assert!(from_zero.is_finite());
        assert_eq!(from_zero, from_floor);
        assert!((from_zero - 323.3062153431158).abs() < 1e-9);
    }

    #[test]
    fn score_can_be_negative() {
        // Significant, but only a sliver of the target's documents co-occur.
        let score = ScoreCombiner::new(1.0).combine(0.5, 1, 1000).unwrap();
        assert!((score - (0.5f64.log10().abs() - 3.0)).abs() < 1e-12);
        assert!(score < 0.0);
    }
}
