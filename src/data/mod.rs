//! Data model: features, terms, packed columns, and per-split datasets.

mod dataset;
mod feature;
mod packing;
mod term;

pub use feature::{FeatureSpec, FeatureType};
pub use term::MAX_DIMENSIONS;

pub(crate) use dataset::{SplitRole, SplitTargets, TermDataset};
pub(crate) use feature::Feature;
pub(crate) use packing::{pack_cells, PackedCells};
pub(crate) use term::Term;
