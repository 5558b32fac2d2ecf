use keepnet_challenges::{FieldElement, ProverKey};
use keepnet_economics::{AccountAddress, TokenAmount};
use serde::{Deserialize, Serialize};

pub type OrderId = u64;

/// Content the order pays to keep: the root the proofs are checked against plus
/// a free-form locator (CID, URL, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub root: FieldElement,
    pub locator: String,
}

impl FileRef {
    pub fn new(root: FieldElement, locator: impl Into<String>) -> Self {
        Self {
            root,
            locator: locator.into(),
        }
    }
}

/// What a client asks for when placing an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub file: FileRef,
    /// Upper bound on the stored size in bytes
    pub max_size: u64,
    /// Number of billing periods the order runs for
    pub periods: u64,
    pub replicas: u32,
    pub price_per_byte_period: TokenAmount,
}

impl OrderRequest {
    /// `max_size × periods × price × replicas`, `None` on overflow.
    pub fn total_cost(&self) -> Option<TokenAmount> {
        self.price_per_byte_period
            .checked_mul(self.max_size as u128)?
            .checked_mul(self.periods as u128)?
            .checked_mul(self.replicas as u128)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner: AccountAddress,
    pub file: FileRef,
    pub max_size: u64,
    pub periods: u64,
    pub desired_replicas: u32,
    pub price_per_byte_period: TokenAmount,
    pub filled_replicas: u32,
    pub start_period: u64,
    pub escrow: TokenAmount,
    pub escrow_withdrawn: TokenAmount,
    /// Unix seconds
    pub placed_at: u64,
}

impl Order {
    /// First period in which the order is no longer live.
    pub fn end_period(&self) -> u64 {
        self.start_period.saturating_add(self.periods)
    }

    pub fn is_expired(&self, current_period: u64) -> bool {
        current_period >= self.end_period()
    }

    pub fn remaining_periods(&self, current_period: u64) -> u64 {
        self.end_period().saturating_sub(current_period)
    }

    pub fn remaining_escrow(&self) -> TokenAmount {
        self.escrow.saturating_sub(self.escrow_withdrawn)
    }

    pub fn is_fully_replicated(&self) -> bool {
        self.filled_replicas >= self.desired_replicas
    }

    /// What one replica earns per period, saturating.
    pub fn replica_rate(&self) -> TokenAmount {
        self.price_per_byte_period
            .checked_mul(self.max_size as u128)
            .unwrap_or(TokenAmount::from_base_units(u128::MAX))
    }

    /// `multiplier` periods worth of one replica, saturating.
    pub fn periods_value(&self, multiplier: u64) -> TokenAmount {
        self.replica_rate()
            .checked_mul(multiplier as u128)
            .unwrap_or(TokenAmount::from_base_units(u128::MAX))
    }
}

/// Raw public-key coordinates as submitted by a provider, validated on stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPublicKey {
    pub x: [u8; 32],
    pub y: [u8; 32],
}

impl RawPublicKey {
    pub fn new(x: [u8; 32], y: [u8; 32]) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAccount {
    pub provider: AccountAddress,
    pub stake: TokenAmount,
    /// Bytes the stake backs
    pub capacity: u64,
    /// Bytes currently assigned
    pub used: u64,
    pub public_key: ProverKey,
    pub staked_at_period: u64,
}

impl NodeAccount {
    pub fn free_capacity(&self) -> u64 {
        self.capacity.saturating_sub(self.used)
    }
}

/// One provider holding one replica of one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub order_id: OrderId,
    pub provider: AccountAddress,
    pub start_period: u64,
    /// Unix seconds
    pub started_at: u64,
    pub earned: TokenAmount,
    /// Position of `order_id` in the provider's order list
    pub(crate) provider_slot: usize,
    /// Position of `provider` in the order's provider list
    pub(crate) order_slot: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapacityDelta {
    Grow(u64),
    Shrink(u64),
}

/// Result of a capacity adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityChange {
    pub capacity: u64,
    pub stake: TokenAmount,
    /// Stake released back to the provider
    pub released: TokenAmount,
    pub account_closed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashOutcome {
    /// Capacity fell below usage; the caller must cascade evictions
    pub forced_exit: bool,
    /// Requested amount plus any forced-exit penalty
    pub total_slashed: TokenAmount,
    /// Sub-byte stake remainder burned when the account closed
    pub dust_burned: TokenAmount,
    pub account_closed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub nodes: usize,
    pub total_stake: TokenAmount,
    pub total_capacity: u64,
    pub total_used: u64,
}

/// Time indices derived from one clock reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub now: u64,
    pub period: u64,
    pub epoch: u64,
    pub step: u64,
}

/// Outcome of an owner cancelling an order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CancelReceipt {
    pub providers_released: usize,
    /// Total penalty shared among the released providers
    pub penalty: TokenAmount,
    /// Escrow owed back to the owner
    pub refunded: TokenAmount,
}

/// What one heartbeat did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub round_id: u64,
    pub challenged_orders: usize,
    pub provers: usize,
    pub failures_slashed: usize,
    pub total_slashed: TokenAmount,
    pub reporter_reward: TokenAmount,
    pub orders_completed: usize,
}

/// Outcome of an accepted proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofReceipt {
    pub round_id: u64,
    pub order_id: OrderId,
    pub primary: bool,
    /// Round opened immediately on primary success, if any
    pub next_round: Option<u64>,
}

/// Outcome of a manual failure report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureReport {
    pub provers_slashed: usize,
    pub total_slashed: TokenAmount,
    pub reporter_reward: TokenAmount,
}

impl FailureReport {
    pub(crate) fn absorb(&mut self, other: &FailureReport) {
        self.provers_slashed += other.provers_slashed;
        self.total_slashed = self.total_slashed.saturating_add(other.total_slashed);
        self.reporter_reward = self.reporter_reward.saturating_add(other.reporter_reward);
    }
}

/// Accounting totals; `deposited == held + paid_out + burned` between operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsReport {
    pub deposited: TokenAmount,
    pub paid_out: TokenAmount,
    pub burned: TokenAmount,
    pub stakes: TokenAmount,
    pub escrow: TokenAmount,
    pub pending_rewards: TokenAmount,
    pub reporter_balances: TokenAmount,
    pub refunds_owed: TokenAmount,
}

impl FundsReport {
    pub fn held(&self) -> TokenAmount {
        self.stakes
            .saturating_add(self.escrow)
            .saturating_add(self.pending_rewards)
            .saturating_add(self.reporter_balances)
            .saturating_add(self.refunds_owed)
    }

    pub fn is_conserved(&self) -> bool {
        self.deposited == self.held().saturating_add(self.paid_out).saturating_add(self.burned)
    }
}
