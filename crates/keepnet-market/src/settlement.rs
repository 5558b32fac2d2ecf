//! Reward Settlement
//!
//! Providers earn `max_size × price` per completed period of an assignment,
//! bounded by the order's end and by the escrow it still holds. Settling books
//! the difference between that gross figure and what was already earned, so
//! repeating a settlement for the same or an earlier period is a no-op.

use crate::types::{Assignment, Order};
use keepnet_economics::{AccountAddress, TokenAmount};
use std::collections::HashMap;
use tracing::debug;

/// Unsettled earnings of `assignment` on `order` up to `target_period`.
pub fn accrued_up_to(order: &Order, assignment: &Assignment, target_period: u64) -> TokenAmount {
    let effective_end = target_period.min(order.end_period());
    if effective_end <= assignment.start_period {
        return TokenAmount::ZERO;
    }
    let gross = order.periods_value(effective_end - assignment.start_period);
    gross
        .saturating_sub(assignment.earned)
        .min(order.remaining_escrow())
}

#[derive(Debug, Default)]
pub struct RewardSettlement {
    pending: HashMap<AccountAddress, TokenAmount>,
    lifetime: HashMap<AccountAddress, TokenAmount>,
    total_pending: TokenAmount,
}

impl RewardSettlement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Book earnings of one (order, provider) pair up to `target_period`.
    pub(crate) fn settle(
        &mut self,
        order: &mut Order,
        assignment: &mut Assignment,
        target_period: u64,
    ) -> TokenAmount {
        let amount = accrued_up_to(order, assignment, target_period);
        if amount.is_zero() {
            return amount;
        }

        assignment.earned = assignment.earned.saturating_add(amount);
        order.escrow_withdrawn = order.escrow_withdrawn.saturating_add(amount);
        self.credit(assignment.provider, amount);
        let lifetime = self.lifetime.entry(assignment.provider).or_default();
        *lifetime = lifetime.saturating_add(amount);

        debug!(
            order_id = order.id,
            provider = %assignment.provider,
            amount = %amount,
            target_period,
            "🧮 Earnings settled"
        );
        amount
    }

    /// Add to a provider's pending balance without touching any order.
    pub(crate) fn credit(&mut self, provider: AccountAddress, amount: TokenAmount) {
        if amount.is_zero() {
            return;
        }
        let pending = self.pending.entry(provider).or_default();
        *pending = pending.saturating_add(amount);
        self.total_pending = self.total_pending.saturating_add(amount);
    }

    pub(crate) fn take_pending(&mut self, provider: &AccountAddress) -> TokenAmount {
        let amount = self.pending.remove(provider).unwrap_or_default();
        self.total_pending = self.total_pending.saturating_sub(amount);
        amount
    }

    pub fn pending(&self, provider: &AccountAddress) -> TokenAmount {
        self.pending.get(provider).copied().unwrap_or_default()
    }

    /// Everything ever settled to `provider`, claimed or not.
    pub fn lifetime_earned(&self, provider: &AccountAddress) -> TokenAmount {
        self.lifetime.get(provider).copied().unwrap_or_default()
    }

    pub fn total_pending(&self) -> TokenAmount {
        self.total_pending
    }
}
