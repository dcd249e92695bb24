//! Seeded randomness for candidate construction.
//!
//! Every candidate gets its own ChaCha8Rng seeded from `(seed + step)`, so
//! the same configuration always produces the same suite no matter how many
//! candidates earlier steps built.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// A deterministic RNG for a given global seed and step.
pub fn step_rng(global_seed: u64, step: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(global_seed.wrapping_add(step))
}

/// `items` in a random order fixed by `(global_seed, step)`.
pub fn shuffled<T: Clone>(items: &[T], global_seed: u64, step: u64) -> Vec<T> {
    let mut out = items.to_vec();
    out.shuffle(&mut step_rng(global_seed, step));
    out
}
