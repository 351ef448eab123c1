use nalgebra::DMatrix;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

pub const NULL_PREFIX: &str = "null_";

/// Independent standard normal weights, one column per null replicate.
/// The same seed always gives the same matrix.
pub fn null_weights(n_snps: usize, n_repeat: usize, seed: u64) -> DMatrix<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    DMatrix::from_fn(n_snps, n_repeat, |_, _| StandardNormal.sample(&mut rng))
}

pub fn null_names(n_repeat: usize) -> Vec<String> {
    (0..n_repeat).map(|i| format!("{}{}", NULL_PREFIX, i)).collect()
}
