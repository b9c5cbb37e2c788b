//! One-sided (positive association) Fisher exact test on a 2x2 table.
//!
//! The p-value is the upper tail of the hypergeometric distribution of the
//! co-occurrence cell given fixed margins. Everything is computed in log space
//! so corpora with tens of millions of documents neither overflow the
//! binomial coefficients nor underflow the individual tail terms.

use crate::counts::ContingencyTable;

/// Smallest positive `f64` (the subnormal `4.9e-324`).
///
/// Returned in place of a tail probability that underflows to `0.0`, so that
/// `-log10(p)` stays finite downstream.
pub const P_VALUE_FLOOR: f64 = f64::from_bits(1);

/// Stop summing once the remaining tail is provably below this fraction of the running sum.
const TAIL_TOLERANCE: f64 = 1e-17;

/// Below this `n`, `ln(n!)` is taken from the direct product, which is still exact enough in `f64`.
const STIRLING_CUTOFF: u64 = 32;

/// Natural log of `n!`.
///
/// # Example
/// ```
/// use kinderminer::exact::ln_factorial;
/// assert_eq!(ln_factorial(0), 0.0);
/// assert!((ln_factorial(5) - 120f64.ln()).abs() < 1e-12);
/// ```
pub fn ln_factorial(n: u64) -> f64 {
    if n < STIRLING_CUTOFF {
        let product: f64 = (2..=n).map(|k| k as f64).product();
        return product.ln();
    }
    let x = n as f64;
    x * x.ln() - x + 0.5 * (2.0 * std::f64::consts::PI * x).ln() + stirling_correction(x)
}

/// Stirling series tail `1/(12x) - 1/(360x^3) + 1/(1260x^5) - 1/(1680x^7)`.
fn stirling_correction(x: f64) -> f64 {
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    inv * (1.0 / 12.0 - inv2 * (1.0 / 360.0 - inv2 * (1.0 / 1260.0 - inv2 / 1680.0)))
}

/// `ln(n! / m!)` for `m <= n`.
///
/// `n ln n` and `m ln m` are never formed separately; at tens of millions of
/// documents each is ~5e8 and subtracting them loses half the mantissa.
fn ln_factorial_ratio(n: u64, m: u64) -> f64 {
    debug_assert!(m <= n);
    if m < STIRLING_CUTOFF {
        return ln_factorial(n) - ln_factorial(m);
    }
    let (x, y) = (n as f64, m as f64);
    let diff = (n - m) as f64;
    // ln(x / y), accurate when x and y are close.
    let ln_ratio = -(-diff / x).ln_1p();
    diff * x.ln() + y * ln_ratio - diff + 0.5 * ln_ratio + stirling_correction(x)
        - stirling_correction(y)
}

/// Natural log of the binomial coefficient `C(n, k)`; `k <= n` is the caller's job.
pub fn ln_binomial(n: u64, k: u64) -> f64 {
    debug_assert!(k <= n);
    let (small, large) = if k <= n - k { (k, n - k) } else { (n - k, k) };
    ln_factorial_ratio(n, large) - ln_factorial(small)
}

/// `ln(exp(x) + exp(y))` without leaving log space.
fn log_add_exp(x: f64, y: f64) -> f64 {
    let (hi, lo) = if x >= y { (x, y) } else { (y, x) };
    if lo == f64::NEG_INFINITY {
        return hi;
    }
    hi + (lo - hi).exp().ln_1p()
}

/// Hypergeometric setting of a table: `population` documents, `successes` of
/// them mention the target, `draws` mention the keyphrase.
#[derive(Debug, Clone, Copy)]
struct Hypergeometric {
    population: u64,
    successes: u64,
    draws: u64,
}

impl Hypergeometric {
    fn from_table(table: &ContingencyTable) -> Self {
        Self {
            population: table.total(),
            successes: table.target_margin(),
            draws: table.keyphrase_margin(),
        }
    }

    /// Smallest feasible co-occurrence count.
    fn support_min(&self) -> u64 {
        (self.draws + self.successes).saturating_sub(self.population)
    }

    /// Largest feasible co-occurrence count.
    fn support_max(&self) -> u64 {
        self.successes.min(self.draws)
    }

    fn mean(&self) -> f64 {
        self.draws as f64 * self.successes as f64 / self.population as f64
    }

    fn ln_pmf(&self, k: u64) -> f64 {
        ln_binomial(self.successes, k)
            + ln_binomial(self.population - self.successes, self.draws - k)
            - ln_binomial(self.population, self.draws)
    }

    /// `pmf(k + 1) / pmf(k)`, for `k < support_max()`.
    fn ratio_up(&self, k: u64) -> f64 {
        let num = (self.successes - k) as f64 * (self.draws - k) as f64;
        let den = (k + 1) as f64 * (self.population + k + 1 - self.successes - self.draws) as f64;
        num / den
    }

    /// `pmf(k - 1) / pmf(k)`, for `k > support_min()`.
    fn ratio_down(&self, k: u64) -> f64 {
        let num = k as f64 * (self.population + k - self.successes - self.draws) as f64;
        let den = (self.successes - k + 1) as f64 * (self.draws - k + 1) as f64;
        num / den
    }

    /// `ln P(X >= k)`.
    fn ln_upper_tail(&self, k: u64) -> f64 {
        let end = self.support_max();
        let mut ln_term = self.ln_pmf(k);
        let mut ln_sum = ln_term;
        let mut i = k;
        while i < end {
            let ratio = self.ratio_up(i);
            ln_term += ratio.ln();
            i += 1;
            ln_sum = log_add_exp(ln_sum, ln_term);
            if tail_negligible(ln_term, ln_sum, ratio) {
                break;
            }
        }
        ln_sum
    }

    /// `ln P(X <= k)`.
    fn ln_lower_tail(&self, k: u64) -> f64 {
        let start = self.support_min();
        let mut ln_term = self.ln_pmf(k);
        let mut ln_sum = ln_term;
        let mut i = k;
        while i > start {
            let ratio = self.ratio_down(i);
            ln_term += ratio.ln();
            i -= 1;
            ln_sum = log_add_exp(ln_sum, ln_term);
            if tail_negligible(ln_term, ln_sum, ratio) {
                break;
            }
        }
        ln_sum
    }
}

/// The pmf is log-concave, so once successive ratios drop below one the rest of
/// the tail is bounded by the geometric series `term * r / (1 - r)`.
fn tail_negligible(ln_term: f64, ln_sum: f64, ratio: f64) -> bool {
    if ratio >= 1.0 {
        return false;
    }
    let ln_bound = ln_term + ratio.ln() - (-ratio).ln_1p();
    ln_bound < ln_sum + TAIL_TOLERANCE.ln()
}

/// Substitutes [`P_VALUE_FLOOR`] for a p-value that underflowed to zero.
pub fn floor_p_value(p_value: f64) -> f64 {
    if p_value > 0.0 {
        p_value
    } else {
        P_VALUE_FLOOR
    }
}

/// Probability, under independence with fixed margins, of a co-occurrence
/// count at least as large as `table.a`.
///
/// Degenerate margins (no keyphrase or target documents, or one of them in
/// every document) carry no evidence and yield exactly `1.0`. The result is
/// never `0.0`: an underflowing tail returns [`P_VALUE_FLOOR`].
///
/// # Example
/// ```
/// use kinderminer::{CoOccurrenceCounts, derive, one_sided_p_value};
/// let table = derive(&CoOccurrenceCounts::new("x", 5, 5, 5, 10)).unwrap();
/// // 1 / C(10, 5)
/// assert!((one_sided_p_value(&table) - 1.0 / 252.0).abs() < 1e-12);
/// ```
pub fn one_sided_p_value(table: &ContingencyTable) -> f64 {
    let dist = Hypergeometric::from_table(table);
    let n = dist.population;
    if dist.draws == 0 || dist.successes == 0 || dist.draws == n || dist.successes == n {
        return 1.0;
    }

    let a = table.a;
    let p_value = if a <= dist.support_min() {
        1.0
    } else if (a as f64) <= dist.mean() {
        // Upper tail holds most of the mass; sum the short lower side instead.
        1.0 - dist.ln_lower_tail(a - 1).exp()
    } else {
        dist.ln_upper_tail(a).exp()
    };

    floor_p_value(p_value.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counts::{CoOccurrenceCounts, derive};

    fn table(a: u64, b: u64, c: u64, d: u64) -> ContingencyTable {
        ContingencyTable { a, b, c, d }
    }

    fn assert_rel_close(actual: f64, expected: f64, tol: f64) {
        let rel = ((actual - expected) / expected).abs();
        assert!(
            rel < tol,
            "expected {expected:e}, got {actual:e} (relative error {rel:e})"
        );
    }

    #[test]
    fn ln_factorial_matches_direct_sum_across_cutoff() {
        let mut direct = 0.0_f64;
        for n in 1..=200_u64 {
            direct += (n as f64).ln();
            let got = ln_factorial(n);
            assert!(
                (got - direct).abs() < 1e-10 * direct.max(1.0),
                "n={n}: {got} vs {direct}"
            );
        }
    }

    #[test]
    fn ln_factorial_ratio_agrees_with_difference() {
        for (n, m) in [(40_u64, 33_u64), (1000, 10), (1000, 999), (5000, 32)] {
            let expected = ln_factorial(n) - ln_factorial(m);
            assert!((ln_factorial_ratio(n, m) - expected).abs() < 1e-9 * expected.max(1.0));
        }
        assert_eq!(ln_factorial_ratio(77, 77), 0.0);
    }

    #[test]
    fn ln_binomial_small_values() {
        assert!((ln_binomial(10, 5) - 252f64.ln()).abs() < 1e-12);
        assert_eq!(ln_binomial(7, 0), 0.0);
        assert!((ln_binomial(52, 5) - 2_598_960f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn log_add_exp_handles_negative_infinity() {
        assert_eq!(log_add_exp(f64::NEG_INFINITY, -3.0), -3.0);
        assert!((log_add_exp(0.0, 0.0) - 2f64.ln()).abs() < 1e-15);
    }

    #[test]
    fn matches_exact_rational_values() {
        // Reference values from exact big-integer hypergeometric sums.
        let cases = [
            (table(8, 12, 2, 978), 2.300366552745083e-13),
            (table(3, 1, 1, 3), 0.24285714285714285),
            (table(2, 3, 4, 5), 0.7622377622377622),
            (table(1, 9, 11, 3), 0.9999663480953022),
            (table(5, 0, 0, 5), 0.003968253968253968),
            (table(1, 0, 0, 1), 0.5),
            (table(10, 90, 90, 9810), 5.207206701008276e-08),
            (table(50, 950, 450, 98550), 9.922611631201523e-34),
        ];
        for (t, expected) in cases {
            assert_rel_close(one_sided_p_value(&t), expected, 1e-9);
        }
    }

    #[test]
    fn large_corpus_stays_accurate() {
        // 30 million documents.
        assert_rel_close(
            one_sided_p_value(&table(20, 4980, 1980, 29_993_020)),
            7.544365256172377e-29,
            1e-6,
        );
        assert_rel_close(
            one_sided_p_value(&table(40, 9960, 3960, 29_986_040)),
            2.57080525097582e-44,
            1e-6,
        );
    }

    #[test]
    fn zero_co_occurrence_is_never_significant() {
        assert_eq!(one_sided_p_value(&table(0, 5, 5, 10)), 1.0);
        assert_eq!(one_sided_p_value(&table(0, 100, 40, 10_000)), 1.0);
    }

    #[test]
    fn degenerate_margins_return_one() {
        // No target documents.
        assert_eq!(one_sided_p_value(&table(0, 20, 0, 80)), 1.0);
        // No keyphrase documents.
        assert_eq!(one_sided_p_value(&table(0, 0, 20, 80)), 1.0);
        // Target present in every document.
        let all_target = derive(&CoOccurrenceCounts::new("x", 20, 100, 20, 100)).unwrap();
        assert_eq!(one_sided_p_value(&all_target), 1.0);
        // Keyphrase present in every document.
        assert_eq!(one_sided_p_value(&table(100, 0, 0, 0)), 1.0);
        // Empty corpus.
        assert_eq!(one_sided_p_value(&table(0, 0, 0, 0)), 1.0);
    }

    #[test]
    fn non_increasing_in_co_occurrence() {
        // Margins held fixed: 40 target docs, 60 keyphrase docs, 1000 total.
        let (targets, keyphrases, corpus) = (40_u64, 60_u64, 1000_u64);
        let mut previous = f64::INFINITY;
        for a in 0..=targets {
            let counts = CoOccurrenceCounts::new("x", a, targets, keyphrases, corpus);
            let p = one_sided_p_value(&derive(&counts).unwrap());
            assert!(p <= previous, "p({a}) = {p} > {previous}");
            assert!(p > 0.0 && p <= 1.0);
            previous = p;
        }
    }

    #[test]
    fn underflow_returns_floor() {
        // 1 / C(2000, 1000) is around 1e-600.
        let p = one_sided_p_value(&table(1000, 0, 0, 1000));
        assert_eq!(p, P_VALUE_FLOOR);
        assert!(p > 0.0);

        let p = one_sided_p_value(&table(300, 4700, 2700, 9_992_300));
        assert_eq!(p, P_VALUE_FLOOR);
    }

    #[test]
    fn floor_only_replaces_zero() {
        assert_eq!(floor_p_value(0.0), P_VALUE_FLOOR);
        assert_eq!(floor_p_value(1e-300), 1e-300);
        assert_eq!(floor_p_value(1.0), 1.0);
    }

    #[test]
    fn deterministic() {
        let t = table(17, 483, 283, 99_217);
        let first = one_sided_p_value(&t);
        for _ in 0..10 {
            assert_eq!(one_sided_p_value(&t).to_bits(), first.to_bits());
        }
    }
}
