pub mod error;
pub mod field;
pub mod randomness;
pub mod round;
pub mod verifier;

pub use error::{ChallengeError, Result};
pub use field::{field_modulus, FieldElement, ProverKey, FIELD_MODULUS_BYTES};
pub use randomness::{
    derive_round_seed, pick_index, sample_indices, EntropySource, OsEntropy, SeedSource,
};
pub use round::{ChallengeRound, ProverDuty, ProverRole, RoundStatus};
pub use verifier::{Proof, ProofVerifier, PublicInputs, PROOF_ELEMENTS};
