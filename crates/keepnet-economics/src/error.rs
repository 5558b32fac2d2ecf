use crate::types::AccountAddress;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EconomicsError {
    #[error("Arithmetic overflow in {0}")]
    Overflow(String),

    #[error("Arithmetic underflow in {0}")]
    Underflow(String),

    #[error("Nothing owed to {0}")]
    NothingOwed(AccountAddress),

    #[error("Payout to {recipient} refused: {reason}")]
    PayoutRefused {
        recipient: AccountAddress,
        reason: String,
    },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, EconomicsError>;
