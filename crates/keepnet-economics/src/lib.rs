pub mod error;
pub mod payout;
pub mod refund;
pub mod types;

pub use error::{EconomicsError, Result};
pub use payout::{BalanceBook, PayoutRecord, PayoutSink};
pub use refund::RefundQueue;
pub use types::{AccountAddress, TokenAmount, TransferReason, BPS_DENOMINATOR, KEEP_BASE_UNIT};
