use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChallengeError {
    #[error("Value {0} is not below the verifier field modulus")]
    NonCanonical(String),

    #[error("{0} must be a non-zero field element")]
    ZeroElement(String),

    #[error("Invalid prover key: {0}")]
    InvalidProverKey(String),
}

pub type Result<T> = std::result::Result<T, ChallengeError>;
