//! Training-set and validation-set passes for one term.
//!
//! One monomorphic loop per learning mode; the mode dispatch happens once
//! at the call site, never inside the per-case loop. Intercept terms take a
//! column-free fast path where every case maps to cell 0.
//!
//! The training pass applies the update to the running scores and
//! recomputes residuals. The validation pass applies the update and
//! accumulates the round metric: RMSE for regression, *total* log loss for
//! classification.

use crate::data::{PackedCells, Term, TermDataset};
use crate::training::stats;

/// Drive `f(case, cell)` over every case in original order.
#[inline]
pub(crate) fn for_each_case(
    term: &Term,
    column: &[u64],
    n_cases: usize,
    mut f: impl FnMut(usize, usize),
) {
    if term.is_intercept() {
        for case in 0..n_cases {
            f(case, 0);
        }
    } else {
        let cells = PackedCells::new(column, n_cases, term.items_per_pack(), term.bits_per_item());
        for (case, cell) in cells.enumerate() {
            f(case, cell);
        }
    }
}

// =============================================================================
// Training-set passes
// =============================================================================

/// Regression: the residual buffer carries `target - score`, so applying an
/// update is a single subtraction per case.
pub(crate) fn train_regression(ds: &mut TermDataset, term_index: usize, term: &Term, update: &[f64]) {
    let TermDataset {
        columns,
        residuals,
        n_cases,
        ..
    } = ds;
    for_each_case(term, &columns[term_index], *n_cases, |case, cell| {
        residuals[case] -= update[cell];
    });
}

/// Binary classification: move the log-odds score, then refresh the
/// residual through the sigmoid.
pub(crate) fn train_binary(ds: &mut TermDataset, term_index: usize, term: &Term, update: &[f64]) {
    let TermDataset {
        columns,
        residuals,
        scores,
        class_targets,
        n_cases,
        ..
    } = ds;
    for_each_case(term, &columns[term_index], *n_cases, |case, cell| {
        let score = scores[case] + update[cell];
        scores[case] = score;
        residuals[case] = stats::binary_residual(class_targets[case] as f64, score);
    });
}

/// Multiclass: move every class score, then refresh the softmax residuals.
///
/// The exponentiated scores are staged in the residual slice so `exp` runs
/// once per class. `zero_class`, when set, absorbs the softmax degree of
/// freedom by pinning that class's residual to zero.
pub(crate) fn train_multiclass(
    ds: &mut TermDataset,
    term_index: usize,
    term: &Term,
    update: &[f64],
    zero_class: Option<usize>,
) {
    let v = ds.v;
    let TermDataset {
        columns,
        residuals,
        scores,
        class_targets,
        n_cases,
        ..
    } = ds;
    for_each_case(term, &columns[term_index], *n_cases, |case, cell| {
        let scores = &mut scores[case * v..(case + 1) * v];
        let residuals = &mut residuals[case * v..(case + 1) * v];
        let update = &update[cell * v..(cell + 1) * v];

        let mut sum_exp = 0.0;
        for j in 0..v {
            scores[j] += update[j];
            let exp_score = scores[j].exp();
            residuals[j] = exp_score;
            sum_exp += exp_score;
        }

        let target = class_targets[case] as usize;
        for j in 0..v {
            let indicator = (j == target) as u8 as f64;
            residuals[j] = stats::multiclass_residual(indicator, residuals[j], sum_exp);
        }
        if let Some(z) = zero_class {
            residuals[z] = 0.0;
        }
    });
}

// =============================================================================
// Validation-set passes
// =============================================================================

/// Regression: apply the update to the running residuals and return RMSE.
pub(crate) fn validate_regression(
    ds: &mut TermDataset,
    term_index: usize,
    term: &Term,
    update: &[f64],
) -> f64 {
    let TermDataset {
        columns,
        residuals,
        n_cases,
        ..
    } = ds;
    let mut sum_of_squares = 0.0;
    for_each_case(term, &columns[term_index], *n_cases, |case, cell| {
        let residual = residuals[case] - update[cell];
        residuals[case] = residual;
        sum_of_squares += residual * residual;
    });
    stats::root_mean_squared(sum_of_squares, *n_cases)
}

/// Binary classification: apply the update to the scores and return the
/// summed log loss.
pub(crate) fn validate_binary(
    ds: &mut TermDataset,
    term_index: usize,
    term: &Term,
    update: &[f64],
) -> f64 {
    let TermDataset {
        columns,
        scores,
        class_targets,
        n_cases,
        ..
    } = ds;
    let mut sum_log_loss = 0.0;
    for_each_case(term, &columns[term_index], *n_cases, |case, cell| {
        let score = scores[case] + update[cell];
        scores[case] = score;
        sum_log_loss += stats::binary_case_log_loss(score, class_targets[case] as f64);
    });
    sum_log_loss
}

/// Multiclass: apply the update to the scores and return the summed
/// log loss. Validation keeps no residuals.
pub(crate) fn validate_multiclass(
    ds: &mut TermDataset,
    term_index: usize,
    term: &Term,
    update: &[f64],
) -> f64 {
    let v = ds.v;
    let TermDataset {
        columns,
        scores,
        class_targets,
        n_cases,
        ..
    } = ds;
    let mut sum_log_loss = 0.0;
    for_each_case(term, &columns[term_index], *n_cases, |case, cell| {
        let scores = &mut scores[case * v..(case + 1) * v];
        let update = &update[cell * v..(cell + 1) * v];

        let mut sum_exp = 0.0;
        for j in 0..v {
            scores[j] += update[j];
            sum_exp += scores[j].exp();
        }
        let target_score = scores[class_targets[case] as usize];
        sum_log_loss += stats::multiclass_case_log_loss(sum_exp, target_score);
    });
    sum_log_loss
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Feature, FeatureSpec, SplitRole, SplitTargets, TermDataset};
    use approx::assert_abs_diff_eq;

    fn intercept() -> Term {
        Term::new(0, &[], &[]).unwrap()
    }

    fn one_feature(n_bins: usize) -> (Vec<Feature>, Term) {
        let features = vec![Feature::from_spec(0, &FeatureSpec::ordinal(n_bins))];
        let term = Term::new(0, &[0], &features).unwrap();
        (features, term)
    }

    #[test]
    fn regression_training_pass_shifts_residuals() {
        let (features, term) = one_feature(2);
        let mut ds = TermDataset::new(
            SplitRole::Training,
            SplitTargets::Regression(&[1.0, 2.0, 3.0]),
            1,
            &[0, 1, 0],
            None,
            &features,
            std::slice::from_ref(&term),
        )
        .unwrap();
        train_regression(&mut ds, 0, &term, &[0.5, 2.0]);
        assert_eq!(ds.residuals, vec![0.5, 0.0, 2.5]);
    }

    #[test]
    fn binary_training_pass_keeps_residuals_in_sync() {
        let term = intercept();
        let mut ds = TermDataset::new(
            SplitRole::Training,
            SplitTargets::Classification {
                targets: &[0, 1],
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
        train_binary(&mut ds, 0, &term, &[1.5]);
        for case in 0..2 {
            assert_abs_diff_eq!(ds.scores[case], 1.5);
            let expected = ds.class_targets[case] as f64 - stats::sigmoid(1.5);
            assert_abs_diff_eq!(ds.residuals[case], expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn multiclass_residuals_sum_to_zero_without_zeroing() {
        let term = intercept();
        let mut ds = TermDataset::new(
            SplitRole::Training,
            SplitTargets::Classification {
                targets: &[0, 1, 2],
                n_classes: 3,
                zero_class: None,
            },
            3,
            &[],
            None,
            &[],
            &[],
        )
        .unwrap();
        train_multiclass(&mut ds, 0, &term, &[0.2, -0.4, 0.9], None);
        for case in 0..3 {
            let total: f64 = ds.residuals[case * 3..(case + 1) * 3].iter().sum();
            assert_abs_diff_eq!(total, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn regression_validation_returns_rmse() {
        let term = intercept();
        let mut ds = TermDataset::new(
            SplitRole::Validation,
            SplitTargets::Regression(&[1.0, 3.0, 5.0, 7.0]),
            1,
            &[],
            None,
            &[],
            &[],
        )
        .unwrap();
        let metric = validate_regression(&mut ds, 0, &term, &[2.0]);
        assert_abs_diff_eq!(metric, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn binary_validation_sums_log_loss() {
        let term = intercept();
        let mut ds = TermDataset::new(
            SplitRole::Validation,
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
        let metric = validate_binary(&mut ds, 0, &term, &[0.0]);
        assert_abs_diff_eq!(metric, 4.0 * 2f64.ln(), epsilon = 1e-12);
    }
}
