//! Bootstrapped sampling sets over the training cases.

use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

/// One with-replacement bootstrap of the training cases, stored as
/// per-case occurrence counts.
#[derive(Clone, Debug)]
pub(crate) struct BootstrapSample {
    counts: Vec<u32>,
}

impl BootstrapSample {
    /// The full training set: every case exactly once.
    pub(crate) fn identity(n_cases: usize) -> Self {
        Self {
            counts: vec![1; n_cases],
        }
    }

    /// Draw `n_cases` cases uniformly with replacement.
    pub(crate) fn bootstrap(rng: &mut Xoshiro256PlusPlus, n_cases: usize) -> Self {
        let mut counts = vec![0u32; n_cases];
        for _ in 0..n_cases {
            counts[rng.gen_range(0..n_cases)] += 1;
        }
        Self { counts }
    }

    /// Occurrence count of one case.
    #[inline]
    pub(crate) fn count(&self, case: usize) -> u32 {
        self.counts[case]
    }
}

/// Generate the booster's sampling sets.
///
/// `inner_bags == 0` means train on the full set: one identity sample, no
/// randomness consumed. Otherwise each bag is an independent bootstrap
/// drawn from one seeded stream, so a seed fixes the whole sequence.
pub(crate) fn generate_samples(seed: u64, n_cases: usize, inner_bags: usize) -> Vec<BootstrapSample> {
    debug_assert!(n_cases > 0);
    if inner_bags == 0 {
        return vec![BootstrapSample::identity(n_cases)];
    }
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    (0..inner_bags)
        .map(|_| BootstrapSample::bootstrap(&mut rng, n_cases))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_counts_all_ones() {
        let sample = BootstrapSample::identity(5);
        assert!((0..5).all(|i| sample.count(i) == 1));
    }

    #[test]
    fn bootstrap_counts_sum_to_case_count() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let sample = BootstrapSample::bootstrap(&mut rng, 100);
        let total: u32 = (0..100).map(|i| sample.count(i)).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn zero_bags_promote_to_one_identity() {
        let samples = generate_samples(1, 8, 0);
        assert_eq!(samples.len(), 1);
        assert!((0..8).all(|i| samples[0].count(i) == 1));
    }

    #[test]
    fn seed_determines_bags() {
        let a = generate_samples(42, 16, 3);
        let b = generate_samples(42, 16, 3);
        for (x, y) in a.iter().zip(&b) {
            assert!((0..16).all(|i| x.count(i) == y.count(i)));
        }
    }

    #[test]
    fn bags_differ_within_a_seed() {
        let samples = generate_samples(3, 64, 2);
        let same = (0..64).all(|i| samples[0].count(i) == samples[1].count(i));
        assert!(!same);
    }
}
