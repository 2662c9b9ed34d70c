//! Additive terms: ordered tuples of significant features.

use crate::data::Feature;
use crate::error::BoostError;
use crate::utils;

/// Maximum number of significant features in one term.
pub const MAX_DIMENSIONS: usize = 64;

/// One additive term: the axes of one model tensor.
///
/// Holds only the *significant* features of the caller's tuple (single-bin
/// features are elided at construction because they cannot change the
/// tensor), the resulting dense shape, and the bit-pack geometry of the
/// term's input column.
///
/// Canonical cell order: the first feature varies fastest, so
/// `cell = bin_0 + shape_0 * (bin_1 + shape_1 * (...))`.
#[derive(Clone, Debug)]
pub(crate) struct Term {
    /// Indices into the feature table, in combination order.
    features: Vec<usize>,
    /// Per-feature bin counts (tensor shape), aligned with `features`.
    shape: Vec<usize>,
    /// Dense cell count, `shape.iter().product()`.
    n_cells: usize,
    /// Cell indices packed per storage word.
    items_per_pack: usize,
    /// Bits consumed per cell index inside a word.
    bits_per_item: usize,
}

impl Term {
    /// Build a term from a caller-supplied feature tuple.
    ///
    /// Elides single-bin features, bounds the dimension count, and checks
    /// the dense cell count for multiplicative overflow.
    pub(crate) fn new(
        term_index: usize,
        feature_indices: &[usize],
        features: &[Feature],
    ) -> Result<Self, BoostError> {
        let mut kept = Vec::new();
        let mut shape = Vec::new();
        let mut n_cells: usize = 1;

        for &index in feature_indices {
            let feature = features.get(index).ok_or(BoostError::FeatureOutOfRange {
                index,
                n_features: features.len(),
            })?;
            if !feature.is_significant() {
                continue;
            }
            kept.push(feature.index);
            shape.push(feature.n_bins);
            n_cells = n_cells
                .checked_mul(feature.n_bins)
                .ok_or(BoostError::TensorShapeOverflow { term: term_index })?;
        }

        if kept.len() > MAX_DIMENSIONS {
            return Err(BoostError::TooManyDimensions {
                term: term_index,
                got: kept.len(),
                limit: MAX_DIMENSIONS,
            });
        }

        let (items_per_pack, bits_per_item) = if kept.is_empty() {
            // Intercept terms have no input column to pack.
            (0, 0)
        } else {
            let bits_min = utils::bits_required(n_cells - 1);
            let items = utils::items_per_pack(bits_min);
            (items, utils::bits_per_item(items))
        };

        Ok(Self {
            features: kept,
            shape,
            n_cells,
            items_per_pack,
            bits_per_item,
        })
    }

    /// Number of tensor dimensions (significant features).
    #[inline]
    pub(crate) fn n_dimensions(&self) -> usize {
        self.features.len()
    }

    /// Whether this term is the zero-dimensional intercept.
    #[inline]
    pub(crate) fn is_intercept(&self) -> bool {
        self.features.is_empty()
    }

    /// Feature table indices, in combination order.
    #[inline]
    pub(crate) fn features(&self) -> &[usize] {
        &self.features
    }

    /// Per-dimension bin counts.
    #[inline]
    pub(crate) fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Dense cell count of the expanded tensor.
    #[inline]
    pub(crate) fn n_cells(&self) -> usize {
        self.n_cells
    }

    #[inline]
    pub(crate) fn items_per_pack(&self) -> usize {
        self.items_per_pack
    }

    #[inline]
    pub(crate) fn bits_per_item(&self) -> usize {
        self.bits_per_item
    }

    /// Combined cell index for one case's per-feature bins.
    ///
    /// `case_bins[f]` is the bin of feature `f` (feature-table index) for
    /// this case; bins of elided features are ignored.
    #[inline]
    pub(crate) fn cell_index(&self, bin_of_feature: impl Fn(usize) -> usize) -> usize {
        let mut cell = 0;
        let mut stride = 1;
        for (dim, &feature) in self.features.iter().enumerate() {
            cell += bin_of_feature(feature) * stride;
            stride *= self.shape[dim];
        }
        cell
    }
}
