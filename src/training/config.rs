//! Booster configuration.

use crate::logging::Verbosity;
use crate::utils::Parallelism;

/// How binary-classification updates are scaled.
///
/// `Expanded` treats a binary model as carrying two mirrored logits, so the
/// accumulated update is halved (`learning_rate / (2 * n_bags)` instead of
/// `learning_rate / n_bags`). Regression and multiclass are unaffected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogitPolicy {
    #[default]
    Standard,
    Expanded,
}

/// Construction-time configuration for a [`Booster`](crate::Booster).
#[derive(Clone, Debug)]
pub struct BoosterConfig {
    /// Seed for the bootstrap sampling streams.
    pub seed: u64,
    /// Number of bootstrap bags per update. `0` trains on the full set.
    pub inner_bags: usize,
    /// Binary-logit scaling policy.
    pub logit_policy: LogitPolicy,
    /// Multiclass residual index pinned to zero, absorbing the softmax
    /// degree of freedom. `None` disables zeroing.
    pub zero_residual_class: Option<usize>,
    /// Whether the per-bag loop may run on the rayon pool.
    pub parallelism: Parallelism,
    /// Training output level.
    pub verbosity: Verbosity,
}

impl Default for BoosterConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            inner_bags: 0,
            logit_policy: LogitPolicy::default(),
            zero_residual_class: None,
            parallelism: Parallelism::Sequential,
            verbosity: Verbosity::Silent,
        }
    }
}

/// Per-round parameters for update generation.
#[derive(Clone, Copy, Debug)]
pub struct UpdateParams {
    /// Shrinkage applied to the accumulated update.
    pub learning_rate: f64,
    /// Maximum splits the one-dimensional learner may make.
    pub max_splits: usize,
    /// Minimum bag weight a node needs to be split further.
    pub min_parent_cases: usize,
}

impl Default for UpdateParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            max_splits: 2,
            min_parent_cases: 2,
        }
    }
}

impl UpdateParams {
    /// Params with a given learning rate and the default tree bounds.
    pub fn with_learning_rate(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            ..Self::default()
        }
    }
}
