//! Per-split datasets: packed term columns plus residual/score buffers.

use crate::data::{pack_cells, Feature, Term};
use crate::error::BoostError;
use crate::training::stats;

/// Which split a dataset backs; decides which buffers it carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SplitRole {
    Training,
    Validation,
}

/// Targets handed to construction, by learning mode.
#[derive(Clone, Copy, Debug)]
pub(crate) enum SplitTargets<'a> {
    Regression(&'a [f64]),
    Classification {
        targets: &'a [u32],
        n_classes: usize,
        zero_class: Option<usize>,
    },
}

impl SplitTargets<'_> {
    pub(crate) fn n_cases(&self) -> usize {
        match self {
            SplitTargets::Regression(t) => t.len(),
            SplitTargets::Classification { targets, .. } => targets.len(),
        }
    }
}

/// One split of the data, laid out for the boosting passes.
///
/// Buffer policy follows the learning mode:
/// - regression keeps the running `target - score` in `residuals` for both
///   splits, so no score buffer exists;
/// - classification training keeps `scores` and `residuals`;
/// - classification validation keeps only `scores` (the metric needs no
///   residuals).
///
/// All per-case vectors are interleaved: case `i` owns
/// `buffer[i * v .. (i + 1) * v]`.
#[derive(Clone, Debug)]
pub(crate) struct TermDataset {
    pub(crate) n_cases: usize,
    pub(crate) v: usize,
    /// One packed column per term; empty for intercept terms.
    pub(crate) columns: Vec<Vec<u64>>,
    /// Class labels; empty for regression.
    pub(crate) class_targets: Vec<u32>,
    pub(crate) residuals: Vec<f64>,
    pub(crate) scores: Vec<f64>,
}

impl TermDataset {
    pub(crate) fn new(
        role: SplitRole,
        targets: SplitTargets<'_>,
        v: usize,
        bins: &[u64],
        initial_scores: Option<&[f64]>,
        features: &[Feature],
        terms: &[Term],
    ) -> Result<Self, BoostError> {
        let n_cases = targets.n_cases();
        debug_assert!(n_cases > 0);

        validate_bins(bins, n_cases, features)?;
        if let Some(scores) = initial_scores {
            if scores.len() != n_cases * v {
                return Err(BoostError::ScoreLengthMismatch {
                    got: scores.len(),
                    expected: n_cases * v,
                });
            }
        }

        let columns = pack_term_columns(bins, n_cases, features.len(), terms);

        let mut dataset = Self {
            n_cases,
            v,
            columns,
            class_targets: Vec::new(),
            residuals: Vec::new(),
            scores: Vec::new(),
        };

        match targets {
            SplitTargets::Regression(targets) => {
                dataset.residuals = seed_regression_residuals(targets, initial_scores);
            }
            SplitTargets::Classification {
                targets,
                n_classes,
                zero_class,
            } => {
                for (case, &class) in targets.iter().enumerate() {
                    if class as usize >= n_classes {
                        return Err(BoostError::TargetClassOutOfRange {
                            case,
                            class,
                            n_classes,
                        });
                    }
                }
                dataset.class_targets = targets.to_vec();
                dataset.scores = match initial_scores {
                    Some(scores) => scores.to_vec(),
                    None => vec![0.0; n_cases * v],
                };
                if role == SplitRole::Training {
                    dataset.residuals =
                        seed_classification_residuals(targets, &dataset.scores, v, zero_class);
                }
            }
        }

        Ok(dataset)
    }
}

fn validate_bins(bins: &[u64], n_cases: usize, features: &[Feature]) -> Result<(), BoostError> {
    let n_features = features.len();
    if bins.len() != n_cases * n_features {
        return Err(BoostError::BinLengthMismatch {
            got: bins.len(),
            n_cases,
            n_features,
        });
    }
    for case in 0..n_cases {
        for feature in features {
            let bin = bins[case * n_features + feature.index];
            if bin as usize >= feature.n_bins {
                return Err(BoostError::BinOutOfRange {
                    case,
                    feature: feature.index,
                    bin,
                    n_bins: feature.n_bins,
                });
            }
        }
    }
    Ok(())
}

/// Combine each case's per-feature bins into one cell index per term and
/// bit-pack the result. Intercept terms get an empty column.
fn pack_term_columns(
    bins: &[u64],
    n_cases: usize,
    n_features: usize,
    terms: &[Term],
) -> Vec<Vec<u64>> {
    let mut columns = Vec::with_capacity(terms.len());
    let mut cells = Vec::with_capacity(n_cases);
    for term in terms {
        if term.is_intercept() {
            columns.push(Vec::new());
            continue;
        }
        debug_assert!(term.features().iter().all(|&f| f < n_features));
        cells.clear();
        for case in 0..n_cases {
            let row = &bins[case * n_features..(case + 1) * n_features];
            cells.push(term.cell_index(|f| row[f] as usize));
        }
        columns.push(pack_cells(&cells, term.items_per_pack(), term.bits_per_item()));
    }
    columns
}

fn seed_regression_residuals(targets: &[f64], initial_scores: Option<&[f64]>) -> Vec<f64> {
    match initial_scores {
        Some(scores) => targets.iter().zip(scores).map(|(t, s)| t - s).collect(),
        None => targets.to_vec(),
    }
}

fn seed_classification_residuals(
    targets: &[u32],
    scores: &[f64],
    v: usize,
    zero_class: Option<usize>,
) -> Vec<f64> {
    let mut residuals = vec![0.0; targets.len() * v];
    if v == 1 {
        for (case, &class) in targets.iter().enumerate() {
            residuals[case] = stats::binary_residual(class as f64, scores[case]);
        }
    } else {
        for (case, &class) in targets.iter().enumerate() {
            let scores = &scores[case * v..(case + 1) * v];
            let sum_exp: f64 = scores.iter().map(|s| s.exp()).sum();
            let residuals = &mut residuals[case * v..(case + 1) * v];
            for j in 0..v {
                let indicator = (j == class as usize) as u8 as f64;
                residuals[j] = stats::multiclass_residual(indicator, scores[j].exp(), sum_exp);
            }
            if let Some(z) = zero_class {
                residuals[z] = 0.0;
            }
        }
    }
    residuals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FeatureSpec, PackedCells};
    use approx::assert_abs_diff_eq;

    fn features(bins: &[usize]) -> Vec<Feature> {
        bins.iter()
            .enumerate()
            .map(|(i, &b)| Feature::from_spec(i, &FeatureSpec::ordinal(b)))
            .collect()
    }

    #[test]
    fn regression_residuals_seed_to_target_minus_score() {
        let feats = features(&[]);
        let ds = TermDataset::new(
            SplitRole::Training,
            SplitTargets::Regression(&[1.0, 3.0, 5.0]),
            1,
            &[],
            Some(&[0.5, 0.5, 0.5]),
            &feats,
            &[],
        )
        .unwrap();
        assert_eq!(ds.residuals, vec![0.5, 2.5, 4.5]);
        assert!(ds.scores.is_empty());
    }

    #[test]
    fn binary_residuals_seed_through_sigmoid() {
        let feats = features(&[]);
        let ds = TermDataset::new(
            SplitRole::Training,
            SplitTargets::Classification {
                targets: &[0, 1],
                n_classes: 2,
                zero_class: None,
            },
            1,
            &[],
            None,
            &feats,
            &[],
        )
        .unwrap();
        assert_abs_diff_eq!(ds.residuals[0], -0.5);
        assert_abs_diff_eq!(ds.residuals[1], 0.5);
        assert_eq!(ds.scores, vec![0.0, 0.0]);
    }

    #[test]
    fn multiclass_seed_applies_zero_class() {
        let feats = features(&[]);
        let ds = TermDataset::new(
            SplitRole::Training,
            SplitTargets::Classification {
                targets: &[0, 2],
                n_classes: 3,
                zero_class: Some(0),
            },
            3,
            &[],
            None,
            &feats,
            &[],
        )
        .unwrap();
        // Class 0's residual is forced to zero for every case.
        assert_abs_diff_eq!(ds.residuals[0], 0.0);
        assert_abs_diff_eq!(ds.residuals[3], 0.0);
        // The remaining residuals keep the softmax seeding.
        assert_abs_diff_eq!(ds.residuals[1], -1.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ds.residuals[5], 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn validation_classification_has_no_residuals() {
        let feats = features(&[]);
        let ds = TermDataset::new(
            SplitRole::Validation,
            SplitTargets::Classification {
                targets: &[1],
                n_classes: 2,
                zero_class: None,
            },
            1,
            &[],
            None,
            &feats,
            &[],
        )
        .unwrap();
        assert!(ds.residuals.is_empty());
        assert_eq!(ds.scores.len(), 1);
    }

    #[test]
    fn columns_pack_combined_cells() {
        let feats = features(&[3, 2]);
        let term = Term::new(0, &[0, 1], &feats).unwrap();
        // Cases: (0,0) (2,1) (1,1) -> cells 0, 5, 4.
        let bins = [0, 0, 2, 1, 1, 1];
        let ds = TermDataset::new(
            SplitRole::Training,
            SplitTargets::Regression(&[0.0, 0.0, 0.0]),
            1,
            &bins,
            None,
            &feats,
            std::slice::from_ref(&term),
        )
        .unwrap();
        let cells: Vec<usize> = PackedCells::new(
            &ds.columns[0],
            3,
            term.items_per_pack(),
            term.bits_per_item(),
        )
        .collect();
        assert_eq!(cells, vec![0, 5, 4]);
    }

    #[test]
    fn bad_bin_rejected() {
        let feats = features(&[2]);
        let err = TermDataset::new(
            SplitRole::Training,
            SplitTargets::Regression(&[0.0]),
            1,
            &[2],
            None,
            &feats,
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, BoostError::BinOutOfRange { bin: 2, .. }));
    }

    #[test]
    fn class_out_of_range_rejected() {
        let feats = features(&[]);
        let err = TermDataset::new(
            SplitRole::Training,
            SplitTargets::Classification {
                targets: &[3],
                n_classes: 3,
                zero_class: None,
            },
            3,
            &[],
            None,
            &feats,
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, BoostError::TargetClassOutOfRange { class: 3, .. }));
    }
}
