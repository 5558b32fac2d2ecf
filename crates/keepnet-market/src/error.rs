use crate::types::OrderId;
use keepnet_challenges::ChallengeError;
use keepnet_economics::{AccountAddress, EconomicsError, TokenAmount};
use thiserror::Error;

/// Failure classes every market error falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or zero-valued input, rejected before any state change
    Validation,
    /// Wrong caller for an owner/authority gated operation
    Authorization,
    /// Order, assignment, node or round not in the required phase
    StatePrecondition,
    /// Insufficient payment or capacity, slash exceeding stake, nothing to claim
    Economic,
    /// Nested call into a mutating entry point
    Reentrancy,
    /// The proof verifier rejected a submission
    OracleRejection,
    /// The payout sink refused a transfer
    Payout,
    /// Invalid market configuration
    Config,
}

/// Storage market error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid field element: {0}")]
    Field(#[from] ChallengeError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Node not found: {0}")]
    NodeNotFound(AccountAddress),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Insufficient payment: required {required}, provided {provided}")]
    InsufficientPayment {
        required: TokenAmount,
        provided: TokenAmount,
    },

    #[error("Insufficient capacity on {provider}: requested {requested} bytes, {available} free")]
    InsufficientCapacity {
        provider: AccountAddress,
        requested: u64,
        available: u64,
    },

    #[error("Slash of {amount} exceeds stake {stake}")]
    SlashExceedsStake {
        amount: TokenAmount,
        stake: TokenAmount,
    },

    #[error("Nothing to claim for {0}")]
    NothingToClaim(AccountAddress),

    #[error("Economics error: {0}")]
    Economics(#[from] EconomicsError),

    #[error("Re-entrant call rejected in {0}")]
    Reentrancy(&'static str),

    #[error("Proof rejected: {0}")]
    ProofRejected(String),

    #[error("Payout failed: {0}")]
    PayoutFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MarketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketError::InvalidInput(_) | MarketError::Field(_) => ErrorKind::Validation,
            MarketError::Unauthorized(_) => ErrorKind::Authorization,
            MarketError::OrderNotFound(_)
            | MarketError::NodeNotFound(_)
            | MarketError::InvalidState(_) => ErrorKind::StatePrecondition,
            MarketError::InsufficientPayment { .. }
            | MarketError::InsufficientCapacity { .. }
            | MarketError::SlashExceedsStake { .. }
            | MarketError::NothingToClaim(_) => ErrorKind::Economic,
            MarketError::Economics(EconomicsError::PayoutRefused { .. }) => ErrorKind::Payout,
            MarketError::Economics(_) => ErrorKind::Economic,
            MarketError::Reentrancy(_) => ErrorKind::Reentrancy,
            MarketError::ProofRejected(_) => ErrorKind::OracleRejection,
            MarketError::PayoutFailed(_) => ErrorKind::Payout,
            MarketError::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        MarketError::InvalidInput(msg.into())
    }

    pub(crate) fn state(msg: impl Into<String>) -> Self {
        MarketError::InvalidState(msg.into())
    }
}

/// Result type for storage market operations
pub type Result<T> = std::result::Result<T, MarketError>;
