//! Bounded byte-valued observation space

use super::Space;
use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

/// Box space of `u8` elements with per-element inclusive bounds.
///
/// Emulator observations (RAM bytes, screen pixels) all live in such a box.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Box {
    /// Lower bound for each element
    pub low: ArrayD<u8>,
    /// Upper bound for each element
    pub high: ArrayD<u8>,
    shape: Vec<usize>,
}

impl Box {
    /// Create a new box space with given bounds
    pub fn new(low: ArrayD<u8>, high: ArrayD<u8>) -> Self {
        assert_eq!(low.shape(), high.shape(), "Low and high must have same shape");
        assert!(
            low.iter().zip(high.iter()).all(|(l, h)| l <= h),
            "Low must not exceed high"
        );
        let shape = low.shape().to_vec();
        Self { low, high, shape }
    }

    /// Create a box space with uniform bounds
    pub fn uniform(shape: &[usize], low: u8, high: u8) -> Self {
        Self::new(
            ArrayD::from_elem(IxDyn(shape), low),
            ArrayD::from_elem(IxDyn(shape), high),
        )
    }

    /// Full byte range `[0, 255]`
    pub fn bytes(shape: &[usize]) -> Self {
        Self::uniform(shape, u8::MIN, u8::MAX)
    }
}

impl Space for Box {
    type Sample = ArrayD<u8>;

    fn sample<R: Rng>(&self, rng: &mut R) -> Self::Sample {
        let mut result = ArrayD::zeros(IxDyn(&self.shape));
        for ((&l, &h), r) in self.low.iter().zip(self.high.iter()).zip(result.iter_mut()) {
            *r = Uniform::new_inclusive(l, h).sample(rng);
        }
        result
    }

    fn contains(&self, value: &Self::Sample) -> bool {
        value.shape() == self.low.shape()
            && value
                .iter()
                .zip(self.low.iter())
                .zip(self.high.iter())
                .all(|((&v, &l), &h)| v >= l && v <= h)
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }
}
