//! Pull-payment refund queue
//!
//! Funds owed to clients (overpayments, unused escrow, cancellation refunds) and
//! payouts that a recipient refused are parked here until the recipient withdraws
//! them. Nothing is ever pushed from this queue, so a recipient that cannot receive
//! funds only ever blocks its own withdrawal.

use crate::error::{EconomicsError, Result};
use crate::types::{AccountAddress, TokenAmount, TransferReason};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundQueue {
    owed: HashMap<AccountAddress, TokenAmount>,
    total_owed: TokenAmount,
}

impl RefundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` to what `recipient` can withdraw. Returns the new owed balance.
    pub fn enqueue(
        &mut self,
        recipient: AccountAddress,
        amount: TokenAmount,
        reason: TransferReason,
    ) -> Result<TokenAmount> {
        let current = self.owed(&recipient);
        if amount.is_zero() {
            return Ok(current);
        }

        let updated = current.try_add(amount, "refund balance")?;
        let total = self.total_owed.try_add(amount, "refund queue total")?;
        self.owed.insert(recipient, updated);
        self.total_owed = total;

        debug!(
            recipient = %recipient,
            amount = %amount,
            owed = %updated,
            reason = %reason,
            "📥 Refund queued"
        );

        Ok(updated)
    }

    pub fn owed(&self, recipient: &AccountAddress) -> TokenAmount {
        self.owed.get(recipient).copied().unwrap_or(TokenAmount::ZERO)
    }

    /// Remove and return everything owed to `recipient`.
    pub fn take(&mut self, recipient: &AccountAddress) -> Result<TokenAmount> {
        let amount = self
            .owed
            .remove(recipient)
            .filter(|amount| !amount.is_zero())
            .ok_or(EconomicsError::NothingOwed(*recipient))?;
        self.total_owed = self.total_owed.saturating_sub(amount);
        Ok(amount)
    }

    /// Put back an amount previously returned by [`take`](Self::take) whose payout failed.
    pub fn restore(&mut self, recipient: AccountAddress, amount: TokenAmount) {
        if amount.is_zero() {
            return;
        }
        let entry = self.owed.entry(recipient).or_insert(TokenAmount::ZERO);
        *entry = entry.saturating_add(amount);
        self.total_owed = self.total_owed.saturating_add(amount);
    }

    pub fn total_owed(&self) -> TokenAmount {
        self.total_owed
    }

    pub fn recipients(&self) -> usize {
        self.owed.len()
    }
}
