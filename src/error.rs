//! Error types for booster construction and round operations.

/// Errors reported by [`Booster`](crate::Booster) construction and the
/// per-round operations.
///
/// Every variant is an argument or shape problem detectable up front; the
/// engine has no runtime failure modes beyond these.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BoostError {
    /// A term referenced a feature index outside the feature table.
    #[error("feature index {index} out of range ({n_features} features)")]
    FeatureOutOfRange { index: usize, n_features: usize },

    /// A term kept more significant features than the engine supports.
    #[error("term {term} has {got} multi-bin features (limit {limit})")]
    TooManyDimensions {
        term: usize,
        got: usize,
        limit: usize,
    },

    /// The product of a term's per-feature bin counts overflowed.
    #[error("tensor shape overflow for term {term}")]
    TensorShapeOverflow { term: usize },

    /// Classification was requested with zero target classes but data present.
    #[error("classification with cases requires at least one target class")]
    MissingTargetClasses,

    /// A classification target was outside `[0, n_classes)`.
    #[error("target class {class} at case {case} out of range ({n_classes} classes)")]
    TargetClassOutOfRange {
        case: usize,
        class: u32,
        n_classes: usize,
    },

    /// The flat bin-index buffer did not match `n_cases * n_features`.
    #[error("bin buffer length {got} does not match {n_cases} cases x {n_features} features")]
    BinLengthMismatch {
        got: usize,
        n_cases: usize,
        n_features: usize,
    },

    /// A bin index exceeded its feature's bin count.
    #[error("bin {bin} at case {case} out of range for feature {feature} ({n_bins} bins)")]
    BinOutOfRange {
        case: usize,
        feature: usize,
        bin: u64,
        n_bins: usize,
    },

    /// The initial-score buffer did not match `n_cases * vector_len`.
    #[error("initial score length {got} does not match {expected}")]
    ScoreLengthMismatch { got: usize, expected: usize },

    /// The residual-zeroing class index was invalid for this task.
    #[error("zero-residual class {class} invalid for this task")]
    InvalidZeroResidualClass { class: usize },

    /// A round operation referenced a term index outside the term list.
    #[error("term index {index} out of range ({n_terms} terms)")]
    TermOutOfRange { index: usize, n_terms: usize },

    /// An update tensor's length did not match the term's dense shape.
    #[error("update length {got} does not match term shape ({expected} values)")]
    UpdateLengthMismatch { got: usize, expected: usize },
}
