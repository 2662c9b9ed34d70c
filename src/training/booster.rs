//! The boosting drivers and their training state.

use rayon::prelude::*;

use crate::data::{
    Feature, FeatureSpec, SplitRole, SplitTargets, Term, TermDataset, MAX_DIMENSIONS,
};
use crate::error::BoostError;
use crate::logging::TrainingLogger;
use crate::sampling::{self, BootstrapSample};
use crate::tensor::SegmentedTensor;
use crate::training::config::{BoosterConfig, LogitPolicy, UpdateParams};
use crate::training::learner::{self, LearnerCache};
use crate::training::{passes, Mode};
use crate::utils::Parallelism;

/// One split's boundary data.
///
/// `bins` is case-major: case `i` owns `bins[i * n_features .. (i + 1) *
/// n_features]`, one bin index per feature. `initial_scores`, when present,
/// is `n_cases * vector_len` values in the same interleaved layout as the
/// model outputs. Empty targets mean the split does not exist.
#[derive(Clone, Copy, Debug)]
pub struct SplitData<'a, T> {
    pub targets: &'a [T],
    pub bins: &'a [u64],
    pub initial_scores: Option<&'a [f64]>,
}

impl<'a, T> SplitData<'a, T> {
    pub fn new(targets: &'a [T], bins: &'a [u64]) -> Self {
        Self {
            targets,
            bins,
            initial_scores: None,
        }
    }

    pub fn with_initial_scores(mut self, scores: &'a [f64]) -> Self {
        self.initial_scores = Some(scores);
        self
    }

    /// An absent split.
    pub fn empty() -> Self {
        Self {
            targets: &[],
            bins: &[],
            initial_scores: None,
        }
    }
}

/// One generated update, borrowed from the booster's accumulator.
///
/// The slice is the term's dense value buffer (`n_cells * vector_len`,
/// first feature fastest, `vector_len` values per cell). Any later mutating
/// call on the booster invalidates it; copy it out to synthesize a custom
/// update for [`Booster::apply_update`].
#[derive(Debug)]
pub struct TermUpdate<'a> {
    pub values: &'a [f64],
    /// Mean proposed objective decrease across bags; never positive.
    pub gain: f64,
}

/// Training state for one additive model.
///
/// Created fully initialized by [`Booster::regression`] or
/// [`Booster::classification`]; mutated round by round through
/// [`generate_update`](Self::generate_update),
/// [`apply_update`](Self::apply_update) and
/// [`training_step`](Self::training_step). All buffers, tensors, datasets
/// and sampling sets are owned by the state and freed on drop.
#[derive(Debug)]
pub struct Booster {
    mode: Mode,
    /// Values per model cell: 1 for regression and binary, class count for
    /// multiclass.
    v: usize,
    /// Classification with fewer than two classes: every operation
    /// succeeds trivially and no model exists.
    degenerate: bool,
    logit_policy: LogitPolicy,
    zero_class: Option<usize>,
    parallelism: Parallelism,
    terms: Vec<Term>,
    train: Option<TermDataset>,
    valid: Option<TermDataset>,
    bags: Vec<BootstrapSample>,
    current_model: Vec<SegmentedTensor>,
    best_model: Vec<SegmentedTensor>,
    best_metric: f64,
    /// Per-bag learner output, overwritten each bag.
    overwrite_scratch: SegmentedTensor,
    /// Accumulated update across bags; the buffer handed back to callers.
    accumulator: SegmentedTensor,
    cache: LearnerCache,
    logger: TrainingLogger,
}

impl Booster {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Initialize a regression booster.
    pub fn regression(
        config: BoosterConfig,
        features: &[FeatureSpec],
        terms: &[Vec<usize>],
        train: SplitData<'_, f64>,
        valid: SplitData<'_, f64>,
    ) -> Result<Self, BoostError> {
        if let Some(class) = config.zero_residual_class {
            return Err(BoostError::InvalidZeroResidualClass { class });
        }
        let feature_table = build_features(features);
        let term_table = build_terms(terms, &feature_table)?;

        let train_ds = build_split(
            SplitRole::Training,
            SplitTargets::Regression(train.targets),
            1,
            &train,
            &feature_table,
            &term_table,
        )?;
        let valid_ds = build_split(
            SplitRole::Validation,
            SplitTargets::Regression(valid.targets),
            1,
            &valid,
            &feature_table,
            &term_table,
        )?;

        Self::assemble(Mode::Regression, 1, false, config, term_table, train_ds, valid_ds)
    }

    /// Initialize a classification booster with `n_classes` target classes.
    ///
    /// `n_classes <= 1` is accepted as the degenerate case: construction
    /// succeeds, no model is allocated, and every round operation succeeds
    /// with metric 0.
    pub fn classification(
        config: BoosterConfig,
        features: &[FeatureSpec],
        terms: &[Vec<usize>],
        n_classes: usize,
        train: SplitData<'_, u32>,
        valid: SplitData<'_, u32>,
    ) -> Result<Self, BoostError> {
        let has_cases = !train.targets.is_empty() || !valid.targets.is_empty();
        if n_classes == 0 && has_cases {
            return Err(BoostError::MissingTargetClasses);
        }
        if let Some(class) = config.zero_residual_class {
            if n_classes >= 2 && class >= n_classes {
                return Err(BoostError::InvalidZeroResidualClass { class });
            }
        }

        let degenerate = n_classes <= 1;
        let v = if n_classes > 2 { n_classes } else { 1 };
        let mode = if n_classes == 2 {
            Mode::Binary
        } else {
            Mode::Multiclass
        };
        let zero_class = config.zero_residual_class;

        let feature_table = build_features(features);
        let term_table = build_terms(terms, &feature_table)?;

        let train_ds = build_split(
            SplitRole::Training,
            SplitTargets::Classification {
                targets: train.targets,
                n_classes: n_classes.max(1),
                zero_class,
            },
            v,
            &train,
            &feature_table,
            &term_table,
        )?;
        let valid_ds = build_split(
            SplitRole::Validation,
            SplitTargets::Classification {
                targets: valid.targets,
                n_classes: n_classes.max(1),
                zero_class,
            },
            v,
            &valid,
            &feature_table,
            &term_table,
        )?;

        Self::assemble(mode, v, degenerate, config, term_table, train_ds, valid_ds)
    }

    fn assemble(
        mode: Mode,
        v: usize,
        degenerate: bool,
        config: BoosterConfig,
        terms: Vec<Term>,
        train: Option<TermDataset>,
        valid: Option<TermDataset>,
    ) -> Result<Self, BoostError> {
        let bags = match &train {
            Some(ds) => sampling::generate_samples(config.seed, ds.n_cases, config.inner_bags),
            None => Vec::new(),
        };

        // Models exist only when there is something to learn.
        let (current_model, best_model) = if terms.is_empty() || degenerate {
            (Vec::new(), Vec::new())
        } else {
            let mut current = Vec::with_capacity(terms.len());
            for term in &terms {
                let mut tensor = SegmentedTensor::allocate(MAX_DIMENSIONS, v);
                tensor.set_dimension_count(term.n_dimensions());
                tensor.reset();
                tensor.expand(term.shape());
                current.push(tensor);
            }
            let best = current.clone();
            (current, best)
        };

        let logger = TrainingLogger::new(config.verbosity);
        logger.info(&format!(
            "initialized: {} terms, {} bags, {} train cases, {} validation cases",
            terms.len(),
            bags.len(),
            train.as_ref().map_or(0, |ds| ds.n_cases),
            valid.as_ref().map_or(0, |ds| ds.n_cases),
        ));

        Ok(Self {
            mode,
            v,
            degenerate,
            logit_policy: config.logit_policy,
            zero_class: config.zero_residual_class,
            parallelism: config.parallelism,
            terms,
            train,
            valid,
            bags,
            current_model,
            best_model,
            best_metric: f64::INFINITY,
            overwrite_scratch: SegmentedTensor::allocate(MAX_DIMENSIONS, v),
            accumulator: SegmentedTensor::allocate(MAX_DIMENSIONS, v),
            cache: LearnerCache::for_mode(mode),
            logger,
        })
    }

    // =========================================================================
    // Round operations
    // =========================================================================

    /// Generate an update tensor for one term from the sampling sets.
    ///
    /// Returns `Ok(None)` for degenerate classification. Without training
    /// data the update is all zeros with gain 0.
    pub fn generate_update(
        &mut self,
        term_index: usize,
        params: &UpdateParams,
    ) -> Result<Option<TermUpdate<'_>>, BoostError> {
        self.check_term(term_index)?;
        self.logger.generate_entry(term_index);
        if self.degenerate {
            self.logger.warn("generate_update with fewer than two classes");
            return Ok(None);
        }
        let gain = self.generate_into_accumulator(term_index, params);
        Ok(Some(TermUpdate {
            values: self.accumulator.values(),
            gain,
        }))
    }

    /// Apply an update tensor to one term.
    ///
    /// `update` must be the term's dense buffer (`n_cells * vector_len`
    /// values); `None` is a successful no-op. Adds into the current model,
    /// refreshes training residuals, scores the validation set, and
    /// snapshots the whole current model into the best model on strict
    /// metric improvement. Returns the validation metric, 0 when no
    /// validation set exists.
    pub fn apply_update(
        &mut self,
        term_index: usize,
        update: Option<&[f64]>,
    ) -> Result<f64, BoostError> {
        self.check_term(term_index)?;
        self.logger.apply_entry(term_index);
        let Some(update) = update else {
            return Ok(0.0);
        };
        if self.degenerate {
            return Ok(0.0);
        }
        let expected = self.terms[term_index].n_cells() * self.v;
        if update.len() != expected {
            return Err(BoostError::UpdateLengthMismatch {
                got: update.len(),
                expected,
            });
        }
        Ok(apply_to_state(
            self.mode,
            self.zero_class,
            &self.terms,
            term_index,
            &mut self.current_model,
            &mut self.best_model,
            self.train.as_mut(),
            self.valid.as_mut(),
            &mut self.best_metric,
            &self.logger,
            update,
        ))
    }

    /// Generate and immediately apply an update for one term.
    ///
    /// The gain is discarded. Degenerate classification succeeds with
    /// metric 0.
    pub fn training_step(
        &mut self,
        term_index: usize,
        params: &UpdateParams,
    ) -> Result<f64, BoostError> {
        self.check_term(term_index)?;
        self.logger.generate_entry(term_index);
        self.logger.apply_entry(term_index);
        if self.degenerate {
            self.logger.warn("training_step with fewer than two classes");
            return Ok(0.0);
        }
        self.generate_into_accumulator(term_index, params);

        let Booster {
            mode,
            zero_class,
            terms,
            current_model,
            best_model,
            train,
            valid,
            best_metric,
            accumulator,
            logger,
            ..
        } = self;
        Ok(apply_to_state(
            *mode,
            *zero_class,
            terms,
            term_index,
            current_model,
            best_model,
            train.as_mut(),
            valid.as_mut(),
            best_metric,
            logger,
            accumulator.values(),
        ))
    }

    /// Run the generation driver, leaving the scaled, expanded update in
    /// the accumulator. Returns the mean gain across bags.
    fn generate_into_accumulator(&mut self, term_index: usize, params: &UpdateParams) -> f64 {
        let term = &self.terms[term_index];
        let n_dims = term.n_dimensions();
        self.accumulator.set_dimension_count(n_dims);
        self.accumulator.reset();

        let mut total_gain = 0.0;
        if let Some(train) = &self.train {
            let n_bags = self.bags.len() as f64;

            if self.parallelism.is_parallel() && self.bags.len() > 1 {
                let mode = self.mode;
                let v = self.v;
                let results: Vec<(SegmentedTensor, f64)> = self
                    .bags
                    .par_iter()
                    .map(|bag| {
                        let mut cache = LearnerCache::for_mode(mode);
                        let mut out = SegmentedTensor::allocate(MAX_DIMENSIONS, v);
                        out.set_dimension_count(n_dims);
                        out.reset();
                        let gain =
                            run_learner(mode, train, term_index, term, bag, params, &mut cache, &mut out);
                        (out, gain)
                    })
                    .collect();
                for (out, gain) in &results {
                    total_gain += *gain;
                    self.accumulator.add(out);
                }
            } else {
                for bag in &self.bags {
                    self.overwrite_scratch.set_dimension_count(n_dims);
                    self.overwrite_scratch.reset();
                    let gain = run_learner(
                        self.mode,
                        train,
                        term_index,
                        term,
                        bag,
                        params,
                        &mut self.cache,
                        &mut self.overwrite_scratch,
                    );
                    total_gain += gain;
                    self.accumulator.add(&self.overwrite_scratch);
                }
            }

            total_gain /= n_bags;

            // Average over bags and shrink; expanded binary logits carry the
            // update twice, so each half moves half as far.
            let mut factor = params.learning_rate / n_bags;
            if self.mode == Mode::Binary && self.logit_policy == LogitPolicy::Expanded {
                factor /= 2.0;
            }
            self.accumulator.scale(factor);
        }

        if n_dims > 0 {
            self.accumulator.expand(term.shape());
        }
        total_gain
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Dense value buffer of one term's current model.
    ///
    /// `None` when no model exists (degenerate classification) or the index
    /// is out of range. The slice is invalidated by any mutating call.
    pub fn current_model(&self, term_index: usize) -> Option<&[f64]> {
        self.current_model.get(term_index).map(|t| t.values())
    }

    /// Dense value buffer of one term's best model so far.
    pub fn best_model(&self, term_index: usize) -> Option<&[f64]> {
        self.best_model.get(term_index).map(|t| t.values())
    }

    /// Best validation metric seen so far; `+inf` until the first
    /// improving apply.
    pub fn best_metric(&self) -> f64 {
        self.best_metric
    }

    /// Number of terms in the model.
    pub fn n_terms(&self) -> usize {
        self.terms.len()
    }

    fn check_term(&self, index: usize) -> Result<(), BoostError> {
        if index >= self.terms.len() {
            return Err(BoostError::TermOutOfRange {
                index,
                n_terms: self.terms.len(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Construction helpers
// =============================================================================

fn build_features(specs: &[FeatureSpec]) -> Vec<Feature> {
    specs
        .iter()
        .enumerate()
        .map(|(index, spec)| Feature::from_spec(index, spec))
        .collect()
}

fn build_terms(terms: &[Vec<usize>], features: &[Feature]) -> Result<Vec<Term>, BoostError> {
    terms
        .iter()
        .enumerate()
        .map(|(index, feature_indices)| Term::new(index, feature_indices, features))
        .collect()
}

fn build_split<T>(
    role: SplitRole,
    targets: SplitTargets<'_>,
    v: usize,
    data: &SplitData<'_, T>,
    features: &[Feature],
    terms: &[Term],
) -> Result<Option<TermDataset>, BoostError> {
    if targets.n_cases() == 0 {
        return Ok(None);
    }
    TermDataset::new(
        role,
        targets,
        v,
        data.bins,
        data.initial_scores,
        features,
        terms,
    )
    .map(Some)
}

// =============================================================================
// Driver bodies
// =============================================================================

/// Dispatch one bag to the learner for the term's dimensionality.
#[allow(clippy::too_many_arguments)]
fn run_learner(
    mode: Mode,
    train: &TermDataset,
    term_index: usize,
    term: &Term,
    bag: &BootstrapSample,
    params: &UpdateParams,
    cache: &mut LearnerCache,
    out: &mut SegmentedTensor,
) -> f64 {
    match term.n_dimensions() {
        0 => {
            learner::train_intercept(mode, train, bag, out);
            0.0
        }
        1 => learner::train_one_dimensional(
            mode,
            train,
            term_index,
            term,
            bag,
            params.max_splits,
            params.min_parent_cases,
            cache,
            out,
        ),
        _ => {
            learner::train_multi_dimensional(mode, train, term_index, term, bag, cache, out);
            0.0
        }
    }
}

/// The application driver over borrowed state.
///
/// Free function so `training_step` can feed the accumulator's own buffer
/// while the model tensors and datasets are mutated.
#[allow(clippy::too_many_arguments)]
fn apply_to_state(
    mode: Mode,
    zero_class: Option<usize>,
    terms: &[Term],
    term_index: usize,
    current: &mut [SegmentedTensor],
    best: &mut [SegmentedTensor],
    train: Option<&mut TermDataset>,
    valid: Option<&mut TermDataset>,
    best_metric: &mut f64,
    logger: &TrainingLogger,
    update: &[f64],
) -> f64 {
    let term = &terms[term_index];
    current[term_index].add_expanded(update);

    if let Some(ds) = train {
        match mode {
            Mode::Regression => passes::train_regression(ds, term_index, term, update),
            Mode::Binary => passes::train_binary(ds, term_index, term, update),
            Mode::Multiclass => passes::train_multiclass(ds, term_index, term, update, zero_class),
        }
    }

    let mut metric = 0.0;
    if let Some(ds) = valid {
        metric = match mode {
            Mode::Regression => passes::validate_regression(ds, term_index, term, update),
            Mode::Binary => passes::validate_binary(ds, term_index, term, update),
            Mode::Multiclass => passes::validate_multiclass(ds, term_index, term, update),
        };
        // Strictly-less commit: equal metrics keep the old best, and a NaN
        // metric never displaces it.
        if metric < *best_metric {
            *best_metric = metric;
            for (best, current) in best.iter_mut().zip(current.iter()) {
                best.copy_from(current);
            }
        }
    }

    logger.round_result(term_index, metric);
    metric
}
