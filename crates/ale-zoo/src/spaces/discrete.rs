//! Discrete action space

use super::Space;
use rand::Rng;

/// Discrete space over the action indices `{0, 1, ..., n-1}`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Discrete {
    /// Number of possible actions
    pub n: usize,
    shape: Vec<usize>,
}

impl Discrete {
    /// Create a new discrete space with n values
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "Discrete space must have at least 1 element");
        Self { n, shape: vec![] }
    }
}

impl Space for Discrete {
    type Sample = usize;

    fn sample<R: Rng>(&self, rng: &mut R) -> Self::Sample {
        rng.gen_range(0..self.n)
    }

    fn contains(&self, value: &Self::Sample) -> bool {
        *value < self.n
    }

    /// Scalar samples have an empty shape
    fn shape(&self) -> &[usize] {
        &self.shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_minimal_action_space() {
        let space = Discrete::new(6);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for _ in 0..200 {
            assert!(space.sample(&mut rng) < 6);
        }
        assert!(space.contains(&5));
        assert!(!space.contains(&6));
        assert_eq!(space.num_elements(), 1);
    }

    #[test]
    #[should_panic(expected = "at least 1 element")]
    fn test_empty_space_rejected() {
        Discrete::new(0);
    }
}
