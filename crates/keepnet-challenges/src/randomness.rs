//! Round seeds and seeded sampling
//!
//! # Entropy model
//!
//! A round seed comes from one of two places:
//!
//! - the commitment carried by the previous round's accepted primary proof. That value
//!   is bound to a verified proof, so the heartbeat caller cannot choose it;
//! - otherwise an external [`EntropySource`] mixed with the previous round randomness.
//!   Whoever controls that source, or the ordering of heartbeat calls, can bias the
//!   next sample. [`OsEntropy`] draws from the operating system RNG; deployments that
//!   replicate the market across nodes must supply a shared beacon instead.
//!
//! Seeds are always reduced into the verifier field before use.

use crate::field::FieldElement;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;

const SEED_DOMAIN: &[u8] = b"keepnet/round-seed/v1";
const SAMPLE_DOMAIN: &[u8] = b"keepnet/sample/v1";
const PICK_DOMAIN: &[u8] = b"keepnet/pick/v1";

/// Upper bound on rejection-sampling attempts before falling back to a plain modulus.
const MAX_REJECTION_ROUNDS: u64 = 64;

pub trait EntropySource: Send + Sync {
    fn next_entropy(&self) -> [u8; 32];
}

/// Operating-system randomness.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn next_entropy(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        bytes
    }
}

/// Where a round seed is derived from.
#[derive(Debug, Clone, Copy)]
pub enum SeedSource {
    /// Commitment of the previous round's accepted primary proof.
    Commitment(FieldElement),
    /// External entropy chained with the previous round randomness.
    Entropy {
        entropy: [u8; 32],
        previous: FieldElement,
    },
}

/// Derive the randomness for round `round_id` opened at `step`.
pub fn derive_round_seed(source: SeedSource, round_id: u64, step: u64) -> FieldElement {
    let mut hasher = blake3::Hasher::new();
    hasher.update(SEED_DOMAIN);
    match source {
        SeedSource::Commitment(commitment) => {
            hasher.update(&[0x01]);
            hasher.update(commitment.as_bytes());
        }
        SeedSource::Entropy { entropy, previous } => {
            hasher.update(&[0x02]);
            hasher.update(&entropy);
            hasher.update(previous.as_bytes());
        }
    }
    hasher.update(&round_id.to_le_bytes());
    hasher.update(&step.to_le_bytes());
    FieldElement::reduce(*hasher.finalize().as_bytes())
}

/// Uniform value in `0..bound` derived from `(seed, domain, salt)`.
fn uniform_below(seed: &FieldElement, domain: &[u8], salt: u64, bound: u64) -> u64 {
    debug_assert!(bound > 0);
    // Largest multiple of `bound` representable in u64; draws at or above it are biased.
    let zone = u64::MAX - (u64::MAX % bound);
    let mut draw = 0u64;
    for attempt in 0..MAX_REJECTION_ROUNDS {
        let mut hasher = blake3::Hasher::new();
        hasher.update(domain);
        hasher.update(seed.as_bytes());
        hasher.update(&salt.to_le_bytes());
        hasher.update(&attempt.to_le_bytes());
        let digest = hasher.finalize();
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest.as_bytes()[..8]);
        draw = u64::from_le_bytes(word);
        if draw < zone {
            break;
        }
    }
    draw % bound
}

/// Sample `count` distinct indices from `0..population`, uniformly and without
/// replacement, with a seeded partial Fisher–Yates shuffle.
///
/// Only the swapped positions are materialised, so the cost is `O(count)` regardless
/// of the population size.
pub fn sample_indices(seed: &FieldElement, population: usize, count: usize) -> Vec<usize> {
    let count = count.min(population);
    let mut swapped: HashMap<usize, usize> = HashMap::with_capacity(count * 2);
    let mut picked = Vec::with_capacity(count);

    for i in 0..count {
        let remaining = (population - i) as u64;
        let j = i + uniform_below(seed, SAMPLE_DOMAIN, i as u64, remaining) as usize;
        let at_i = swapped.get(&i).copied().unwrap_or(i);
        let at_j = swapped.get(&j).copied().unwrap_or(j);
        swapped.insert(j, at_i);
        picked.push(at_j);
    }

    picked
}

/// Pick one index in `0..len` for the given salt (e.g. an order id).
pub fn pick_index(seed: &FieldElement, salt: u64, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    uniform_below(seed, PICK_DOMAIN, salt, len as u64) as usize
}
