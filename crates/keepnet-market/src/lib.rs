//! # KeepNet Storage Market
//!
//! Settlement and challenge engine for a decentralized storage market.
//!
//! ## Overview
//!
//! Providers stake tokens against the bytes they offer. Clients escrow payment for
//! a file, a number of billing periods and a number of replicas. Providers take
//! replicas onto their capacity and earn per completed period, paid out of the
//! order's escrow. A rolling proof-of-possession protocol samples orders, picks
//! provers and slashes any prover that misses its proof window; whoever triggers
//! the slash gets a share of it.
//!
//! ## Components
//!
//! - **CapacityLedger**: stake, capacity and usage per provider; slashing and forced exits
//! - **EscrowBook**: orders and their escrow; bounded cleanup of expired orders
//! - **AssignmentIndex**: order ↔ provider relation with O(1) removal
//! - **RewardSettlement**: period-based accrual into pending balances
//! - **ChallengeScheduler**: round seeding, prover selection and failure hand-out
//! - **ReporterIncentive**: reporter share of failure slashes
//! - **StorageMarket**: the facade that sequences all of the above
//!
//! Everything is synchronous. [`keeper::HeartbeatKeeper`] is an optional tokio
//! task that drives heartbeats on an interval.

pub mod assignment;
pub mod clock;
pub mod config;
pub mod error;
pub mod escrow;
pub mod events;
pub mod guard;
pub mod indexed_set;
pub mod keeper;
pub mod ledger;
pub mod logging;
pub mod market;
pub mod reporter;
pub mod scheduler;
pub mod settlement;
pub mod types;

pub use assignment::AssignmentIndex;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LoggingConfig, MarketConfig, REPORTER_BPS_CEILING};
pub use error::{ErrorKind, MarketError, Result};
pub use escrow::{EscrowBook, PlacedOrder};
pub use events::{EventLog, EventRecord, MarketEvent};
pub use guard::{GuardToken, ReentrancyGuard};
pub use keeper::{HeartbeatKeeper, KeeperHandle, KeeperStats};
pub use ledger::CapacityLedger;
pub use logging::init_logging;
pub use market::StorageMarket;
pub use reporter::{ReporterIncentive, SlashSplit};
pub use scheduler::{ChallengeScheduler, FailedDuty, Selection};
pub use settlement::{accrued_up_to, RewardSettlement};
pub use types::{
    Assignment, CancelReceipt, CapacityChange, CapacityDelta, FailureReport, FileRef,
    FundsReport, HeartbeatReport, LedgerStats, NodeAccount, Order, OrderId, OrderRequest,
    ProofReceipt, RawPublicKey, SlashOutcome, Tick,
};

pub use keepnet_challenges::{
    ChallengeRound, FieldElement, Proof, ProofVerifier, ProverDuty, ProverRole, ProverKey,
    PublicInputs, RoundStatus,
};
pub use keepnet_economics::{AccountAddress, BalanceBook, PayoutSink, TokenAmount, TransferReason};
