//! Piecewise-constant tensors over the bin grid.
//!
//! A [`SegmentedTensor`] carries one value vector of length `v` per cell of
//! a segment grid: each dimension is divided into contiguous segments by a
//! sorted list of interior cut positions. Tree learners write coarse
//! segmentations (a handful of cuts); model tensors are *expanded*, with
//! every bin its own segment, so lookups are direct index arithmetic and
//! stay that way for the tensor's whole lifetime.
//!
//! Cell order is canonical throughout the crate: dimension 0 varies
//! fastest.

/// Piecewise-constant tensor with per-cell value vectors.
#[derive(Clone, Debug)]
pub(crate) struct SegmentedTensor {
    /// Values per cell.
    v: usize,
    /// Active dimension count; set once per round before `reset`.
    n_dims: usize,
    /// Interior segment-start positions per dimension, sorted ascending.
    cuts: Vec<Vec<usize>>,
    /// Cell values, dimension 0 fastest, `v` values per cell.
    values: Vec<f64>,
    /// Whether every dimension is cut at every bin.
    expanded: bool,
}

impl SegmentedTensor {
    /// Allocate with room for `max_dims` dimensions, starting zero-dimensional.
    pub(crate) fn allocate(max_dims: usize, v: usize) -> Self {
        debug_assert!(v >= 1);
        Self {
            v,
            n_dims: 0,
            cuts: Vec::with_capacity(max_dims),
            values: vec![0.0; v],
            expanded: false,
        }
    }

    /// Set the active dimension count for this round.
    pub(crate) fn set_dimension_count(&mut self, n_dims: usize) {
        self.n_dims = n_dims;
        self.cuts.resize_with(n_dims, Vec::new);
    }

    /// Clear to a single all-zero cell over the active dimensions.
    pub(crate) fn reset(&mut self) {
        for cuts in self.cuts.iter_mut() {
            cuts.clear();
        }
        self.values.clear();
        self.values.resize(self.v, 0.0);
        self.expanded = false;
    }

    #[inline]
    pub(crate) fn n_dimensions(&self) -> usize {
        self.n_dims
    }

    #[inline]
    pub(crate) fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub(crate) fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    #[inline]
    fn segment_counts(&self) -> Vec<usize> {
        self.cuts[..self.n_dims]
            .iter()
            .map(|c| c.len() + 1)
            .collect()
    }

    /// Install a learner-produced segmentation.
    ///
    /// `cuts[d]` are interior segment starts; `values` holds one length-`v`
    /// vector per cell in canonical order.
    pub(crate) fn set_segments(&mut self, cuts: Vec<Vec<usize>>, values: Vec<f64>) {
        debug_assert_eq!(cuts.len(), self.n_dims);
        debug_assert_eq!(
            values.len(),
            cuts.iter().map(|c| c.len() + 1).product::<usize>() * self.v
        );
        self.cuts = cuts;
        self.values = values;
        self.expanded = false;
    }

    /// Segment index of `position` along dimension `dim`.
    #[inline]
    fn segment_of(cuts: &[usize], position: usize) -> usize {
        cuts.partition_point(|&c| c <= position)
    }

    /// Remap onto a finer (or equal) segmentation, preserving values.
    ///
    /// Every new segment must lie inside exactly one old segment, which
    /// holds whenever `new_cuts[d]` is a superset of `cuts[d]`.
    fn remap(&mut self, new_cuts: Vec<Vec<usize>>) {
        debug_assert_eq!(new_cuts.len(), self.n_dims);
        if new_cuts[..] == self.cuts[..self.n_dims] {
            return;
        }

        // Per-dimension: old segment index for each new segment.
        let mut maps: Vec<Vec<usize>> = Vec::with_capacity(self.n_dims);
        for dim in 0..self.n_dims {
            let mut map = Vec::with_capacity(new_cuts[dim].len() + 1);
            map.push(Self::segment_of(&self.cuts[dim], 0));
            for &start in &new_cuts[dim] {
                map.push(Self::segment_of(&self.cuts[dim], start));
            }
            maps.push(map);
        }

        let old_counts = self.segment_counts();
        let new_counts: Vec<usize> = new_cuts.iter().map(|c| c.len() + 1).collect();
        let n_new_cells: usize = new_counts.iter().product();

        let mut new_values = vec![0.0; n_new_cells * self.v];
        for cell in 0..n_new_cells {
            let mut rest = cell;
            let mut old_offset = 0;
            let mut old_stride = 1;
            for dim in 0..self.n_dims {
                let coord = rest % new_counts[dim];
                rest /= new_counts[dim];
                old_offset += maps[dim][coord] * old_stride;
                old_stride *= old_counts[dim];
            }
            let src = &self.values[old_offset * self.v..old_offset * self.v + self.v];
            new_values[cell * self.v..cell * self.v + self.v].copy_from_slice(src);
        }

        self.cuts = new_cuts;
        self.values = new_values;
    }

    /// Expand so every bin of `shape` is its own segment.
    ///
    /// Idempotent; marks the tensor expanded. A zero-dimensional tensor is
    /// a single cell and is considered expanded as-is.
    pub(crate) fn expand(&mut self, shape: &[usize]) {
        debug_assert_eq!(shape.len(), self.n_dims);
        if self.n_dims > 0 {
            let full: Vec<Vec<usize>> = shape.iter().map(|&n| (1..n).collect()).collect();
            self.remap(full);
        }
        self.expanded = true;
    }

    /// Add another tensor over the same dimensions, merging segmentations.
    ///
    /// The result's grid is the per-dimension union of both cut lists.
    pub(crate) fn add(&mut self, other: &SegmentedTensor) {
        debug_assert_eq!(self.v, other.v);
        debug_assert_eq!(self.n_dims, other.n_dims);

        if self.cuts[..self.n_dims] == other.cuts[..other.n_dims] {
            for (a, b) in self.values.iter_mut().zip(&other.values) {
                *a += b;
            }
            return;
        }

        let union: Vec<Vec<usize>> = (0..self.n_dims)
            .map(|dim| merge_cuts(&self.cuts[dim], &other.cuts[dim]))
            .collect();
        self.remap(union);

        // Other's segment index for each union segment, per dimension.
        let union_counts = self.segment_counts();
        let other_counts: Vec<usize> = other.cuts[..other.n_dims]
            .iter()
            .map(|c| c.len() + 1)
            .collect();
        let mut maps: Vec<Vec<usize>> = Vec::with_capacity(self.n_dims);
        for dim in 0..self.n_dims {
            let mut map = Vec::with_capacity(union_counts[dim]);
            map.push(Self::segment_of(&other.cuts[dim], 0));
            for &start in &self.cuts[dim] {
                map.push(Self::segment_of(&other.cuts[dim], start));
            }
            maps.push(map);
        }

        let n_cells: usize = union_counts.iter().product();
        for cell in 0..n_cells {
            let mut rest = cell;
            let mut other_offset = 0;
            let mut other_stride = 1;
            for dim in 0..self.n_dims {
                let coord = rest % union_counts[dim];
                rest /= union_counts[dim];
                other_offset += maps[dim][coord] * other_stride;
                other_stride *= other_counts[dim];
            }
            let src = &other.values[other_offset * self.v..other_offset * self.v + self.v];
            let dst = &mut self.values[cell * self.v..cell * self.v + self.v];
            for (a, b) in dst.iter_mut().zip(src) {
                *a += b;
            }
        }
    }

    /// Element-wise add of a dense update into an expanded tensor.
    pub(crate) fn add_expanded(&mut self, update: &[f64]) {
        debug_assert!(self.expanded);
        debug_assert_eq!(update.len(), self.values.len());
        for (a, b) in self.values.iter_mut().zip(update) {
            *a += b;
        }
    }

    /// Become a copy of `other` (same `v`).
    pub(crate) fn copy_from(&mut self, other: &SegmentedTensor) {
        debug_assert_eq!(self.v, other.v);
        self.n_dims = other.n_dims;
        self.cuts.clone_from(&other.cuts);
        self.values.clone_from(&other.values);
        self.expanded = other.expanded;
    }

    /// Multiply every value by `factor`.
    pub(crate) fn scale(&mut self, factor: f64) {
        for value in self.values.iter_mut() {
            *value *= factor;
        }
    }
}

/// Sorted union of two sorted cut lists.
fn merge_cuts(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut merged = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                merged.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                merged.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                merged.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    merged.extend_from_slice(&a[i..]);
    merged.extend_from_slice(&b[j..]);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn reset_is_single_zero_cell() {
        let mut t = SegmentedTensor::allocate(4, 3);
        t.set_dimension_count(2);
        t.reset();
        assert_eq!(t.values(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn expand_replicates_coarse_values() {
        let mut t = SegmentedTensor::allocate(4, 1);
        t.set_dimension_count(1);
        t.reset();
        // Two segments over 5 bins: [0,2) -> 1.0, [2,5) -> 7.0.
        t.set_segments(vec![vec![2]], vec![1.0, 7.0]);
        t.expand(&[5]);
        assert_eq!(t.values(), &[1.0, 1.0, 7.0, 7.0, 7.0]);
    }

    #[test]
    fn expand_is_idempotent() {
        let mut t = SegmentedTensor::allocate(4, 1);
        t.set_dimension_count(1);
        t.reset();
        t.set_segments(vec![vec![1]], vec![2.0, 3.0]);
        t.expand(&[3]);
        let first = t.values().to_vec();
        t.expand(&[3]);
        assert_eq!(t.values(), &first[..]);
    }

    #[test]
    fn add_merges_disjoint_cuts() {
        let mut a = SegmentedTensor::allocate(4, 1);
        a.set_dimension_count(1);
        a.reset();
        a.set_segments(vec![vec![2]], vec![1.0, 10.0]);

        let mut b = SegmentedTensor::allocate(4, 1);
        b.set_dimension_count(1);
        b.reset();
        b.set_segments(vec![vec![3]], vec![100.0, 1000.0]);

        a.add(&b);
        a.expand(&[4]);
        assert_eq!(a.values(), &[101.0, 101.0, 110.0, 1010.0]);
    }

    #[test]
    fn add_zero_dimensional() {
        let mut a = SegmentedTensor::allocate(4, 2);
        a.set_dimension_count(0);
        a.reset();
        a.values_mut().copy_from_slice(&[1.0, 2.0]);

        let mut b = a.clone();
        b.values_mut().copy_from_slice(&[0.5, -2.0]);

        a.add(&b);
        assert_eq!(a.values(), &[1.5, 0.0]);
    }

    #[test]
    fn two_dimensional_expand_order() {
        // 2x2 grid, one segment along dim 0, cut along dim 1.
        let mut t = SegmentedTensor::allocate(4, 1);
        t.set_dimension_count(2);
        t.reset();
        t.set_segments(vec![vec![], vec![1]], vec![5.0, 9.0]);
        t.expand(&[2, 2]);
        // Dimension 0 fastest: cells (0,0) (1,0) (0,1) (1,1).
        assert_eq!(t.values(), &[5.0, 5.0, 9.0, 9.0]);
    }

    #[test]
    fn scale_and_copy() {
        let mut t = SegmentedTensor::allocate(4, 1);
        t.set_dimension_count(0);
        t.reset();
        t.values_mut()[0] = 3.0;
        t.scale(0.5);
        assert_abs_diff_eq!(t.values()[0], 1.5);

        let mut u = SegmentedTensor::allocate(4, 1);
        u.copy_from(&t);
        assert_eq!(u.values(), t.values());
    }

    #[test]
    fn merge_cuts_dedups() {
        assert_eq!(merge_cuts(&[1, 3], &[2, 3, 5]), vec![1, 2, 3, 5]);
        assert_eq!(merge_cuts(&[], &[4]), vec![4]);
    }
}
