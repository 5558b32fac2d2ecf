//! Payout seam between the market ledger and whatever actually moves funds.

use crate::error::{EconomicsError, Result};
use crate::types::{AccountAddress, TokenAmount, TransferReason};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Destination for funds leaving the market.
///
/// Implementations may fail (a recipient that cannot receive funds) and may even try
/// to call back into the market; the market treats both as untrusted.
pub trait PayoutSink: Send + Sync {
    fn pay(&self, to: AccountAddress, amount: TokenAmount, reason: TransferReason) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutRecord {
    pub to: AccountAddress,
    pub amount: TokenAmount,
    pub reason: TransferReason,
    pub timestamp: DateTime<Utc>,
    pub tx_hash: String,
}

/// In-memory payout sink that credits account balances and keeps a history.
#[derive(Default)]
pub struct BalanceBook {
    balances: RwLock<HashMap<AccountAddress, TokenAmount>>,
    history: RwLock<Vec<PayoutRecord>>,
    frozen: RwLock<HashSet<AccountAddress>>,
}

impl BalanceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, address: &AccountAddress) -> TokenAmount {
        self.balances
            .read()
            .get(address)
            .copied()
            .unwrap_or(TokenAmount::ZERO)
    }

    /// Refuse every future payout to `address`.
    pub fn freeze(&self, address: AccountAddress) {
        self.frozen.write().insert(address);
    }

    pub fn unfreeze(&self, address: &AccountAddress) {
        self.frozen.write().remove(address);
    }

    pub fn history(&self) -> Vec<PayoutRecord> {
        self.history.read().clone()
    }

    pub fn total_paid(&self) -> TokenAmount {
        self.balances
            .read()
            .values()
            .fold(TokenAmount::ZERO, |acc, amount| acc.saturating_add(*amount))
    }
}

impl PayoutSink for BalanceBook {
    fn pay(&self, to: AccountAddress, amount: TokenAmount, reason: TransferReason) -> Result<()> {
        if self.frozen.read().contains(&to) {
            return Err(EconomicsError::PayoutRefused {
                recipient: to,
                reason: "recipient is frozen".to_string(),
            });
        }

        let new_balance = {
            let mut balances = self.balances.write();
            let entry = balances.entry(to).or_insert(TokenAmount::ZERO);
            *entry = entry.try_add(amount, "recipient balance")?;
            *entry
        };

        let timestamp = Utc::now();
        let mut hasher = blake3::Hasher::new();
        hasher.update(to.as_bytes());
        hasher.update(&amount.to_base_units().to_le_bytes());
        hasher.update(&timestamp.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        hasher.update(reason.to_string().as_bytes());
        let tx_hash = hex::encode(hasher.finalize().as_bytes());

        info!(
            to = %to,
            amount = %amount,
            balance_after = %new_balance,
            reason = %reason,
            tx_hash = %tx_hash,
            "💸 Payout credited"
        );

        self.history.write().push(PayoutRecord {
            to,
            amount,
            reason,
            timestamp,
            tx_hash,
        });

        Ok(())
    }
}
