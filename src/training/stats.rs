//! Numeric kernels shared by the boosting passes, the learners, and
//! residual seeding.
//!
//! Residual conventions (all `f64`):
//! - regression: `target - score`
//! - binary: `target - sigmoid(score)`
//! - multiclass, class `j`: `1[target == j] - exp(score_j) / sum_exp`
//!
//! Validation losses are per-case and summed by the caller; infinities and
//! NaNs propagate into the metric untouched.

#[inline]
pub(crate) fn sigmoid(score: f64) -> f64 {
    1.0 / (1.0 + (-score).exp())
}

/// Binary residual after a score move.
#[inline]
pub(crate) fn binary_residual(target: f64, score: f64) -> f64 {
    target - sigmoid(score)
}

/// Per-case binary log loss: `softplus(score) - target * score`.
#[inline]
pub(crate) fn binary_case_log_loss(score: f64, target: f64) -> f64 {
    (1.0 + score.exp()).ln() - target * score
}

/// Multiclass residual for one class given its exponentiated score.
#[inline]
pub(crate) fn multiclass_residual(indicator: f64, exp_score: f64, sum_exp: f64) -> f64 {
    indicator - exp_score / sum_exp
}

/// Per-case multiclass log loss: `ln(sum_exp) - score_target`.
#[inline]
pub(crate) fn multiclass_case_log_loss(sum_exp: f64, target_score: f64) -> f64 {
    sum_exp.ln() - target_score
}

/// Newton-step denominator contribution of one classification residual.
///
/// `|r| * (1 - |r|)` equals `p * (1 - p)` for the class probability behind
/// the residual, so summing it gives the Hessian of the per-segment logit.
#[inline]
pub(crate) fn newton_denominator(residual: f64) -> f64 {
    let a = residual.abs();
    a * (1.0 - a)
}

/// Root-mean-square error from a sum of squared residuals.
#[inline]
pub(crate) fn root_mean_squared(sum_of_squares: f64, n_cases: usize) -> f64 {
    (sum_of_squares / n_cases as f64).sqrt()
}
