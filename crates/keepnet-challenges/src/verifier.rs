use crate::field::{FieldElement, ProverKey};
use serde::{Deserialize, Serialize};

/// Number of field elements in a possession proof.
pub const PROOF_ELEMENTS: usize = 8;

/// Opaque possession proof as produced by the prover circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof(pub [FieldElement; PROOF_ELEMENTS]);

/// Public inputs the verifier checks a proof against, in circuit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicInputs {
    pub randomness: FieldElement,
    pub file_root: FieldElement,
    pub commitment: FieldElement,
    pub key_x: FieldElement,
    pub key_y: FieldElement,
}

impl PublicInputs {
    pub fn new(
        randomness: FieldElement,
        file_root: FieldElement,
        commitment: FieldElement,
        key: ProverKey,
    ) -> Self {
        Self {
            randomness,
            file_root,
            commitment,
            key_x: key.x,
            key_y: key.y,
        }
    }

    pub fn to_array(&self) -> [FieldElement; 5] {
        [
            self.randomness,
            self.file_root,
            self.commitment,
            self.key_x,
            self.key_y,
        ]
    }
}

/// Zero-knowledge possession verifier. Treated as an oracle: `false` rejects the
/// submission outright.
pub trait ProofVerifier: Send + Sync {
    fn verify(&self, proof: &Proof, inputs: &PublicInputs) -> bool;
}
