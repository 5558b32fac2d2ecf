//! Verifier field arithmetic
//!
//! The possession-proof verifier works over the BN254 scalar field. Every value that
//! is fed to it as a public input (round randomness, file roots, commitments, prover
//! key coordinates) must be strictly below the field modulus, otherwise a correct
//! proof can never verify. [`FieldElement`] can only be built in canonical form.

use crate::error::{ChallengeError, Result};
use num_bigint::BigUint;
use num_traits::Zero;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// BN254 scalar field modulus, big-endian.
pub const FIELD_MODULUS_BYTES: [u8; 32] = [
    0x30, 0x64, 0x4e, 0x72, 0xe1, 0x31, 0xa0, 0x29, 0xb8, 0x50, 0x45, 0xb6, 0x81, 0x81, 0x58,
    0x5d, 0x28, 0x33, 0xe8, 0x48, 0x79, 0xb9, 0x70, 0x91, 0x43, 0xe1, 0xf5, 0x93, 0xf0, 0x00,
    0x00, 0x01,
];

static FIELD_MODULUS: Lazy<BigUint> = Lazy::new(|| BigUint::from_bytes_be(&FIELD_MODULUS_BYTES));

/// A canonical element of the verifier field (big-endian, `< FIELD_MODULUS`).
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "[u8; 32]", into = "[u8; 32]")]
pub struct FieldElement([u8; 32]);

impl FieldElement {
    pub const ZERO: Self = Self([0u8; 32]);

    /// Accept `bytes` only if already below the modulus.
    pub fn from_canonical(bytes: [u8; 32]) -> Result<Self> {
        // Big-endian byte arrays of equal length compare numerically.
        if bytes < FIELD_MODULUS_BYTES {
            Ok(Self(bytes))
        } else {
            Err(ChallengeError::NonCanonical(format!("0x{}", hex::encode(bytes))))
        }
    }

    /// Reduce arbitrary 32 bytes modulo the field.
    pub fn reduce(bytes: [u8; 32]) -> Self {
        if bytes < FIELD_MODULUS_BYTES {
            return Self(bytes);
        }
        let value = BigUint::from_bytes_be(&bytes) % &*FIELD_MODULUS;
        Self::from_biguint(&value)
    }

    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Reject the zero element, naming the offending input.
    pub fn require_non_zero(self, what: &str) -> Result<Self> {
        if self.is_zero() {
            Err(ChallengeError::ZeroElement(what.to_string()))
        } else {
            Ok(self)
        }
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }

    fn from_biguint(value: &BigUint) -> Self {
        let mut bytes = [0u8; 32];
        if value.is_zero() {
            return Self(bytes);
        }
        let raw = value.to_bytes_be();
        bytes[32 - raw.len()..].copy_from_slice(&raw);
        Self(bytes)
    }
}

impl TryFrom<[u8; 32]> for FieldElement {
    type Error = ChallengeError;

    fn try_from(bytes: [u8; 32]) -> Result<Self> {
        Self::from_canonical(bytes)
    }
}

impl From<FieldElement> for [u8; 32] {
    fn from(element: FieldElement) -> Self {
        element.0
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldElement(0x{})", hex::encode(&self.0[..8]))
    }
}

pub fn field_modulus() -> &'static BigUint {
    &FIELD_MODULUS
}

/// Public key a prover binds its possession proofs to: two non-zero field elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProverKey {
    pub x: FieldElement,
    pub y: FieldElement,
}

impl ProverKey {
    pub fn from_coordinates(x: [u8; 32], y: [u8; 32]) -> Result<Self> {
        let x = FieldElement::from_canonical(x)
            .and_then(|x| x.require_non_zero("prover key x"))
            .map_err(|e| ChallengeError::InvalidProverKey(e.to_string()))?;
        let y = FieldElement::from_canonical(y)
            .and_then(|y| y.require_non_zero("prover key y"))
            .map_err(|e| ChallengeError::InvalidProverKey(e.to_string()))?;
        Ok(Self { x, y })
    }
}
