//! termboost: cyclic gradient boosting over additive tensor terms.
//!
//! Trains the additive model behind an Explainable Boosting Machine: an
//! ensemble of small dense tensors, each indexed by one or a few binned
//! features (a "term"), grown one boosting round at a time. Every round
//! targets a single term: bootstrapped bags each propose a small update,
//! the averaged and shrunk update is applied to the running model, training
//! residuals are refreshed, and a validation metric (RMSE or total log
//! loss) gates a best-model snapshot.
//!
//! # Key Types
//!
//! - [`Booster`] - Training state with per-round operations
//! - [`BoosterConfig`] / [`UpdateParams`] - Construction and round parameters
//! - [`SplitData`] - Boundary view of one data split
//! - [`FeatureSpec`] / [`FeatureType`] - Feature descriptions
//!
//! # Training
//!
//! Build with [`Booster::regression`] or [`Booster::classification`], then
//! cycle [`Booster::training_step`] over the term indices (or split the
//! round into [`Booster::generate_update`] and [`Booster::apply_update`] to
//! inspect updates in between). Read results back with
//! [`Booster::current_model`] and [`Booster::best_model`].

mod data;
mod error;
mod logging;
mod sampling;
mod tensor;
mod training;
mod utils;

pub use data::{FeatureSpec, FeatureType, MAX_DIMENSIONS};
pub use error::BoostError;
pub use logging::Verbosity;
pub use training::{Booster, BoosterConfig, LogitPolicy, SplitData, TermUpdate, UpdateParams};
pub use utils::Parallelism;
