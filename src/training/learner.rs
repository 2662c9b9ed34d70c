//! Term learners: the per-bag update builders the generation driver
//! dispatches to by dimensionality.
//!
//! Each learner writes its update into a scratch [`SegmentedTensor`] whose
//! dimension count has been set by the driver, and returns a non-positive
//! gain (the proposed objective decrease); only the one-dimensional learner
//! reports a real gain, matching the driver contract.
//!
//! Segment values are Newton steps: `sum_residual / count` for regression,
//! `sum_residual / sum(|r|(1-|r|))` for classification logits.

use crate::data::{Term, TermDataset};
use crate::sampling::BootstrapSample;
use crate::tensor::SegmentedTensor;
use crate::training::passes::for_each_case;
use crate::training::stats;
use crate::training::Mode;

/// Cached aggregation scratch, reused across rounds.
///
/// The variant is fixed at construction from the learning mode; regression
/// never needs Newton denominators.
#[derive(Debug)]
pub(crate) enum LearnerCache {
    Regression {
        counts: Vec<f64>,
        sums: Vec<f64>,
    },
    Classification {
        counts: Vec<f64>,
        sums: Vec<f64>,
        denominators: Vec<f64>,
    },
}

impl LearnerCache {
    pub(crate) fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Regression => LearnerCache::Regression {
                counts: Vec::new(),
                sums: Vec::new(),
            },
            Mode::Binary | Mode::Multiclass => LearnerCache::Classification {
                counts: Vec::new(),
                sums: Vec::new(),
                denominators: Vec::new(),
            },
        }
    }

    /// Zero-fill for `n_slots` histogram slots of `v` values each.
    fn prepare(&mut self, n_slots: usize, v: usize) {
        let fill = |buf: &mut Vec<f64>, len: usize| {
            buf.clear();
            buf.resize(len, 0.0);
        };
        match self {
            LearnerCache::Regression { counts, sums } => {
                fill(counts, n_slots);
                fill(sums, n_slots * v);
            }
            LearnerCache::Classification {
                counts,
                sums,
                denominators,
            } => {
                fill(counts, n_slots);
                fill(sums, n_slots * v);
                fill(denominators, n_slots * v);
            }
        }
    }
}

/// Newton step for one segment slot, guarded against empty segments.
#[inline]
fn segment_value(sum: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        sum / denominator
    } else {
        0.0
    }
}

// =============================================================================
// Zero-dimensional learner
// =============================================================================

/// Intercept update: one Newton step over the whole bag. Reports no gain.
pub(crate) fn train_intercept(
    mode: Mode,
    ds: &TermDataset,
    bag: &BootstrapSample,
    out: &mut SegmentedTensor,
) {
    let v = ds.v;
    debug_assert_eq!(out.n_dimensions(), 0);

    match mode {
        Mode::Regression => {
            let mut sum = 0.0;
            let mut count = 0.0;
            for (case, residual) in ds.residuals.iter().enumerate() {
                let weight = bag.count(case) as f64;
                sum += residual * weight;
                count += weight;
            }
            out.values_mut()[0] = segment_value(sum, count);
        }
        Mode::Binary | Mode::Multiclass => {
            let mut sums = vec![0.0; v];
            let mut denominators = vec![0.0; v];
            for case in 0..ds.n_cases {
                let weight = bag.count(case) as f64;
                if weight == 0.0 {
                    continue;
                }
                let residuals = &ds.residuals[case * v..(case + 1) * v];
                for j in 0..v {
                    sums[j] += residuals[j] * weight;
                    denominators[j] += stats::newton_denominator(residuals[j]) * weight;
                }
            }
            for j in 0..v {
                out.values_mut()[j] = segment_value(sums[j], denominators[j]);
            }
        }
    }
}

// =============================================================================
// One-dimensional learner
// =============================================================================

/// Greedy best-first binary splitting over one feature's bins.
///
/// Builds a per-bin histogram of the bag, then repeatedly splits the leaf
/// whose best cut improves the splitting score most, bounded by
/// `max_splits` and the `min_parent_cases` bag weight. Writes cuts plus
/// per-segment Newton values into `out` and returns the gain
/// (`root_score - sum(leaf_scores)`, never positive).
#[allow(clippy::too_many_arguments)]
pub(crate) fn train_one_dimensional(
    mode: Mode,
    ds: &TermDataset,
    term_index: usize,
    term: &Term,
    bag: &BootstrapSample,
    max_splits: usize,
    min_parent_cases: usize,
    cache: &mut LearnerCache,
    out: &mut SegmentedTensor,
) -> f64 {
    let v = ds.v;
    let n_bins = term.shape()[0];
    debug_assert_eq!(out.n_dimensions(), 1);

    cache.prepare(n_bins, v);
    aggregate(ds, term_index, term, bag, v, cache);

    // Prefix sums so range aggregates are O(v).
    let (counts, sums, denominators) = cache_slices(cache);
    let mut prefix_counts = vec![0.0; n_bins + 1];
    let mut prefix_sums = vec![0.0; (n_bins + 1) * v];
    let mut prefix_denoms = vec![0.0; (n_bins + 1) * v];
    for bin in 0..n_bins {
        prefix_counts[bin + 1] = prefix_counts[bin] + counts[bin];
        for j in 0..v {
            prefix_sums[(bin + 1) * v + j] = prefix_sums[bin * v + j] + sums[bin * v + j];
            let denom = denominators.map_or(0.0, |d| d[bin * v + j]);
            prefix_denoms[(bin + 1) * v + j] = prefix_denoms[bin * v + j] + denom;
        }
    }

    let range_count = |start: usize, end: usize| prefix_counts[end] - prefix_counts[start];
    let range_sum = |start: usize, end: usize, j: usize| {
        prefix_sums[end * v + j] - prefix_sums[start * v + j]
    };
    let range_denom = |start: usize, end: usize, j: usize| {
        prefix_denoms[end * v + j] - prefix_denoms[start * v + j]
    };

    // Splitting score of one candidate segment; larger is better.
    let segment_score = |start: usize, end: usize| -> f64 {
        let count = range_count(start, end);
        if count <= 0.0 {
            return 0.0;
        }
        (0..v).map(|j| range_sum(start, end, j).powi(2) / count).sum()
    };

    let min_parent = min_parent_cases as f64;
    let mut leaves: Vec<(usize, usize)> = vec![(0, n_bins)];
    let mut splits_done = 0;

    while splits_done < max_splits {
        let mut best: Option<(usize, usize, f64)> = None;
        for (leaf_index, &(start, end)) in leaves.iter().enumerate() {
            if end - start < 2 || range_count(start, end) < min_parent {
                continue;
            }
            let parent_score = segment_score(start, end);
            for cut in start + 1..end {
                if range_count(start, cut) <= 0.0 || range_count(cut, end) <= 0.0 {
                    continue;
                }
                let improvement = segment_score(start, cut) + segment_score(cut, end) - parent_score;
                if improvement > best.map_or(0.0, |(_, _, gain)| gain) {
                    best = Some((leaf_index, cut, improvement));
                }
            }
        }
        let Some((leaf_index, cut, _)) = best else {
            break;
        };
        let (start, end) = leaves[leaf_index];
        leaves[leaf_index] = (start, cut);
        leaves.push((cut, end));
        splits_done += 1;
    }

    leaves.sort_unstable();

    let mut values = Vec::with_capacity(leaves.len() * v);
    let mut leaf_score_total = 0.0;
    for &(start, end) in &leaves {
        leaf_score_total += segment_score(start, end);
        let count = range_count(start, end);
        for j in 0..v {
            let value = match mode {
                Mode::Regression => segment_value(range_sum(start, end, j), count),
                Mode::Binary | Mode::Multiclass => {
                    segment_value(range_sum(start, end, j), range_denom(start, end, j))
                }
            };
            values.push(value);
        }
    }

    let cuts: Vec<usize> = leaves.iter().skip(1).map(|&(start, _)| start).collect();
    let gain = segment_score(0, n_bins) - leaf_score_total;
    out.set_segments(vec![cuts], values);
    gain.min(0.0)
}

// =============================================================================
// Multi-dimensional learner
// =============================================================================

/// Per-cell Newton update over the term's full grid. Reports no gain.
pub(crate) fn train_multi_dimensional(
    mode: Mode,
    ds: &TermDataset,
    term_index: usize,
    term: &Term,
    bag: &BootstrapSample,
    cache: &mut LearnerCache,
    out: &mut SegmentedTensor,
) {
    let v = ds.v;
    let n_cells = term.n_cells();
    debug_assert_eq!(out.n_dimensions(), term.n_dimensions());

    cache.prepare(n_cells, v);
    aggregate(ds, term_index, term, bag, v, cache);

    let (counts, sums, denominators) = cache_slices(cache);
    let mut values = Vec::with_capacity(n_cells * v);
    for cell in 0..n_cells {
        for j in 0..v {
            let value = match mode {
                Mode::Regression => segment_value(sums[cell * v + j], counts[cell]),
                Mode::Binary | Mode::Multiclass => {
                    let denom = denominators.map_or(0.0, |d| d[cell * v + j]);
                    segment_value(sums[cell * v + j], denom)
                }
            };
            values.push(value);
        }
    }

    let cuts: Vec<Vec<usize>> = term.shape().iter().map(|&n| (1..n).collect()).collect();
    out.set_segments(cuts, values);
}

// =============================================================================
// Shared aggregation
// =============================================================================

/// Accumulate bag-weighted residual statistics per histogram slot.
fn aggregate(
    ds: &TermDataset,
    term_index: usize,
    term: &Term,
    bag: &BootstrapSample,
    v: usize,
    cache: &mut LearnerCache,
) {
    match cache {
        LearnerCache::Regression { counts, sums } => {
            for_each_case(term, &ds.columns[term_index], ds.n_cases, |case, cell| {
                let weight = bag.count(case) as f64;
                if weight == 0.0 {
                    return;
                }
                counts[cell] += weight;
                sums[cell] += ds.residuals[case] * weight;
            });
        }
        LearnerCache::Classification {
            counts,
            sums,
            denominators,
        } => {
            for_each_case(term, &ds.columns[term_index], ds.n_cases, |case, cell| {
                let weight = bag.count(case) as f64;
                if weight == 0.0 {
                    return;
                }
                counts[cell] += weight;
                let residuals = &ds.residuals[case * v..(case + 1) * v];
                for j in 0..v {
                    sums[cell * v + j] += residuals[j] * weight;
                    denominators[cell * v + j] +=
                        stats::newton_denominator(residuals[j]) * weight;
                }
            });
        }
    }
}

/// Borrow the cache's histogram slices uniformly.
fn cache_slices(cache: &LearnerCache) -> (&[f64], &[f64], Option<&[f64]>) {
    match cache {
        LearnerCache::Regression { counts, sums } => (counts, sums, None),
        LearnerCache::Classification {
            counts,
            sums,
            denominators,
        } => (counts, sums, Some(denominators)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Feature, FeatureSpec, SplitRole, SplitTargets};
    use approx::assert_abs_diff_eq;

    fn regression_ds(targets: &[f64], bins: &[u64], n_bins: usize) -> (TermDataset, Term) {
        let features = vec![Feature::from_spec(0, &FeatureSpec::ordinal(n_bins))];
        let term = Term::new(0, &[0], &features).unwrap();
        let ds = TermDataset::new(
            SplitRole::Training,
            SplitTargets::Regression(targets),
            1,
            bins,
            None,
            &features,
            std::slice::from_ref(&term),
        )
        .unwrap();
        (ds, term)
    }

    fn scratch(v: usize, n_dims: usize) -> SegmentedTensor {
        let mut tensor = SegmentedTensor::allocate(crate::data::MAX_DIMENSIONS, v);
        tensor.set_dimension_count(n_dims);
        tensor.reset();
        tensor
    }

    #[test]
    fn intercept_regression_is_bag_mean() {
        let ds = TermDataset::new(
            SplitRole::Training,
            SplitTargets::Regression(&[1.0, 3.0, 5.0, 7.0]),
            1,
            &[],
            None,
            &[],
            &[],
        )
        .unwrap();
        let mut out = scratch(1, 0);
        train_intercept(Mode::Regression, &ds, &BootstrapSample::identity(4), &mut out);
        assert_abs_diff_eq!(out.values()[0], 4.0);
    }

    #[test]
    fn intercept_binary_balanced_labels_give_zero() {
        let ds = TermDataset::new(
            SplitRole::Training,
            SplitTargets::Classification {
                targets: &[0, 1, 0, 1],
                n_classes: 2,
                zero_class: None,
            },
            1,
            &[],
            None,
            &[],
            &[],
        )
        .unwrap();
        let mut out = scratch(1, 0);
        train_intercept(Mode::Binary, &ds, &BootstrapSample::identity(4), &mut out);
        assert_abs_diff_eq!(out.values()[0], 0.0);
    }

    #[test]
    fn one_dimensional_finds_the_step_boundary() {
        let targets = [-1.0, -1.0, 1.0, 1.0];
        let bins = [0u64, 1, 2, 3];
        let (ds, term) = regression_ds(&targets, &bins, 4);
        let mut cache = LearnerCache::for_mode(Mode::Regression);
        let mut out = scratch(1, 1);
        let gain = train_one_dimensional(
            Mode::Regression,
            &ds,
            0,
            &term,
            &BootstrapSample::identity(4),
            3,
            1,
            &mut cache,
            &mut out,
        );
        assert!(gain < 0.0);
        out.expand(&[4]);
        assert_eq!(out.values(), &[-1.0, -1.0, 1.0, 1.0]);
    }

    #[test]
    fn one_dimensional_zero_splits_is_flat() {
        let (ds, term) = regression_ds(&[2.0, 4.0], &[0, 1], 2);
        let mut cache = LearnerCache::for_mode(Mode::Regression);
        let mut out = scratch(1, 1);
        let gain = train_one_dimensional(
            Mode::Regression,
            &ds,
            0,
            &term,
            &BootstrapSample::identity(2),
            0,
            1,
            &mut cache,
            &mut out,
        );
        assert_abs_diff_eq!(gain, 0.0);
        out.expand(&[2]);
        assert_eq!(out.values(), &[3.0, 3.0]);
    }

    #[test]
    fn min_parent_cases_blocks_splitting() {
        let (ds, term) = regression_ds(&[-1.0, 1.0], &[0, 1], 2);
        let mut cache = LearnerCache::for_mode(Mode::Regression);
        let mut out = scratch(1, 1);
        let gain = train_one_dimensional(
            Mode::Regression,
            &ds,
            0,
            &term,
            &BootstrapSample::identity(2),
            4,
            100,
            &mut cache,
            &mut out,
        );
        assert_abs_diff_eq!(gain, 0.0);
        out.expand(&[2]);
        assert_eq!(out.values(), &[0.0, 0.0]);
    }

    #[test]
    fn multi_dimensional_fills_cells() {
        let features = vec![
            Feature::from_spec(0, &FeatureSpec::ordinal(2)),
            Feature::from_spec(1, &FeatureSpec::ordinal(2)),
        ];
        let term = Term::new(0, &[0, 1], &features).unwrap();
        // Cases land in cells 0, 3, 3.
        let bins = [0u64, 0, 1, 1, 1, 1];
        let targets = [2.0, 5.0, 7.0];
        let ds = TermDataset::new(
            SplitRole::Training,
            SplitTargets::Regression(&targets),
            1,
            &bins,
            None,
            &features,
            std::slice::from_ref(&term),
        )
        .unwrap();
        let mut cache = LearnerCache::for_mode(Mode::Regression);
        let mut out = scratch(1, 2);
        train_multi_dimensional(
            Mode::Regression,
            &ds,
            0,
            &term,
            &BootstrapSample::identity(3),
            &mut cache,
            &mut out,
        );
        assert_eq!(out.values(), &[2.0, 0.0, 0.0, 6.0]);
    }
}
