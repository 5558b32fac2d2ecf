//! Capacity Ledger
//!
//! Provider stake and the storage capacity it backs. The ledger maintains, per
//! account:
//! - `capacity × stake_per_byte ≤ stake`
//! - `used ≤ capacity`
//!
//! Slashes that push capacity below usage report a forced exit; evicting the
//! provider's assignments is left to the caller, which owns the assignment index.

use crate::error::{MarketError, Result};
use crate::types::{CapacityChange, CapacityDelta, LedgerStats, NodeAccount, RawPublicKey, SlashOutcome};
use keepnet_challenges::ProverKey;
use keepnet_economics::{AccountAddress, TokenAmount};
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub struct CapacityLedger {
    nodes: HashMap<AccountAddress, NodeAccount>,
    stake_per_byte: TokenAmount,
    forced_exit_penalty_bps: u32,
    total_stake: TokenAmount,
}

impl CapacityLedger {
    pub fn new(stake_per_byte: TokenAmount, forced_exit_penalty_bps: u32) -> Self {
        Self {
            nodes: HashMap::new(),
            stake_per_byte,
            forced_exit_penalty_bps,
            total_stake: TokenAmount::ZERO,
        }
    }

    pub fn stake_per_byte(&self) -> TokenAmount {
        self.stake_per_byte
    }

    /// Stake required to back `bytes` of capacity.
    pub fn stake_for(&self, bytes: u64) -> Result<TokenAmount> {
        self.stake_per_byte
            .checked_mul(bytes as u128)
            .ok_or_else(|| MarketError::invalid(format!("stake for {} bytes overflows", bytes)))
    }

    fn capacity_for(&self, stake: TokenAmount) -> u64 {
        let bytes = stake.to_base_units() / self.stake_per_byte.to_base_units();
        u64::try_from(bytes).unwrap_or(u64::MAX)
    }

    pub fn stake(
        &mut self,
        provider: AccountAddress,
        capacity: u64,
        public_key: RawPublicKey,
        deposit: TokenAmount,
        period: u64,
    ) -> Result<NodeAccount> {
        if capacity == 0 {
            return Err(MarketError::invalid("capacity must be positive"));
        }
        let required = self.stake_for(capacity)?;
        if deposit != required {
            return Err(MarketError::InsufficientPayment {
                required,
                provided: deposit,
            });
        }
        let public_key = ProverKey::from_coordinates(public_key.x, public_key.y)?;
        if self.nodes.contains_key(&provider) {
            return Err(MarketError::state(format!("{} is already staked", provider)));
        }
        let total_stake = self.total_stake.try_add(deposit, "total stake")?;

        let account = NodeAccount {
            provider,
            stake: deposit,
            capacity,
            used: 0,
            public_key,
            staked_at_period: period,
        };
        self.nodes.insert(provider, account.clone());
        self.total_stake = total_stake;

        info!(
            provider = %provider,
            capacity,
            stake = %deposit,
            "🔒 Node staked"
        );

        Ok(account)
    }

    pub fn adjust_capacity(
        &mut self,
        provider: AccountAddress,
        delta: CapacityDelta,
        deposit: TokenAmount,
    ) -> Result<CapacityChange> {
        let account = self
            .nodes
            .get(&provider)
            .ok_or(MarketError::NodeNotFound(provider))?;

        match delta {
            CapacityDelta::Grow(bytes) => {
                if bytes == 0 {
                    return Err(MarketError::invalid("capacity delta must be positive"));
                }
                let required = self.stake_for(bytes)?;
                if deposit != required {
                    return Err(MarketError::InsufficientPayment {
                        required,
                        provided: deposit,
                    });
                }
                let capacity = account
                    .capacity
                    .checked_add(bytes)
                    .ok_or_else(|| MarketError::invalid("capacity overflows"))?;
                let stake = account.stake.try_add(deposit, "node stake")?;
                let total_stake = self.total_stake.try_add(deposit, "total stake")?;

                self.total_stake = total_stake;
                if let Some(account) = self.nodes.get_mut(&provider) {
                    account.capacity = capacity;
                    account.stake = stake;
                }
                debug!(provider = %provider, bytes, capacity, "📈 Capacity grown");

                Ok(CapacityChange {
                    capacity,
                    stake,
                    released: TokenAmount::ZERO,
                    account_closed: false,
                })
            }
            CapacityDelta::Shrink(bytes) => {
                if bytes == 0 {
                    return Err(MarketError::invalid("capacity delta must be positive"));
                }
                if !deposit.is_zero() {
                    return Err(MarketError::invalid("shrinking capacity takes no deposit"));
                }
                let capacity = account.capacity.checked_sub(bytes).ok_or_else(|| {
                    MarketError::invalid(format!(
                        "cannot shrink {} bytes below zero capacity",
                        bytes
                    ))
                })?;
                if capacity < account.used {
                    return Err(MarketError::InsufficientCapacity {
                        provider,
                        requested: bytes,
                        available: account.free_capacity(),
                    });
                }

                if capacity == 0 {
                    let released = account.stake;
                    self.close(&provider);
                    info!(provider = %provider, returned = %released, "🔓 Node closed by shrink");
                    return Ok(CapacityChange {
                        capacity: 0,
                        stake: TokenAmount::ZERO,
                        released,
                        account_closed: true,
                    });
                }

                let released = self.stake_for(bytes)?.min(account.stake);
                let stake = account.stake.saturating_sub(released);
                self.total_stake = self.total_stake.saturating_sub(released);
                if let Some(account) = self.nodes.get_mut(&provider) {
                    account.capacity = capacity;
                    account.stake = stake;
                }
                debug!(provider = %provider, bytes, capacity, released = %released, "📉 Capacity shrunk");

                Ok(CapacityChange {
                    capacity,
                    stake,
                    released,
                    account_closed: false,
                })
            }
        }
    }

    /// Close an idle account, returning its whole stake.
    pub fn unstake(&mut self, provider: AccountAddress) -> Result<TokenAmount> {
        let account = self
            .nodes
            .get(&provider)
            .ok_or(MarketError::NodeNotFound(provider))?;
        if account.used != 0 {
            return Err(MarketError::state(format!(
                "{} still stores {} bytes",
                provider, account.used
            )));
        }
        let returned = account.stake;
        self.close(&provider);
        info!(provider = %provider, returned = %returned, "🔓 Node unstaked");
        Ok(returned)
    }

    pub(crate) fn set_used(&mut self, provider: &AccountAddress, used: u64) -> Result<()> {
        let account = self
            .nodes
            .get_mut(provider)
            .ok_or(MarketError::NodeNotFound(*provider))?;
        if used > account.capacity {
            return Err(MarketError::InsufficientCapacity {
                provider: *provider,
                requested: used,
                available: account.capacity,
            });
        }
        account.used = used;
        Ok(())
    }

    /// Give back `bytes` of usage, never leaving `used` above capacity. No-op for
    /// closed accounts.
    pub(crate) fn release(&mut self, provider: &AccountAddress, bytes: u64) {
        if let Some(account) = self.nodes.get_mut(provider) {
            account.used = account.used.saturating_sub(bytes).min(account.capacity);
        }
    }

    pub fn slash(&mut self, provider: AccountAddress, amount: TokenAmount) -> Result<SlashOutcome> {
        if amount.is_zero() {
            return Err(MarketError::invalid("slash amount must be positive"));
        }
        let account = self
            .nodes
            .get(&provider)
            .ok_or(MarketError::NodeNotFound(provider))?;
        if amount > account.stake {
            return Err(MarketError::SlashExceedsStake {
                amount,
                stake: account.stake,
            });
        }

        let used = account.used;
        let mut stake = account.stake.saturating_sub(amount);
        let mut capacity = self.capacity_for(stake);
        let mut total_slashed = amount;
        let forced_exit = capacity < used;

        if forced_exit {
            let penalty = stake.mul_bps(self.forced_exit_penalty_bps);
            stake = stake.saturating_sub(penalty);
            total_slashed = total_slashed.saturating_add(penalty);
            capacity = self.capacity_for(stake);
            warn!(
                provider = %provider,
                penalty = %penalty,
                capacity,
                used,
                "⚠️ Slash collapsed capacity below usage; forcing exit"
            );
        }

        self.total_stake = self.total_stake.saturating_sub(total_slashed);

        if capacity == 0 {
            self.nodes.remove(&provider);
            self.total_stake = self.total_stake.saturating_sub(stake);
            warn!(
                provider = %provider,
                slashed = %total_slashed,
                dust = %stake,
                "🔥 Node slashed to zero capacity; account closed"
            );
            return Ok(SlashOutcome {
                forced_exit,
                total_slashed,
                dust_burned: stake,
                account_closed: true,
            });
        }

        if let Some(account) = self.nodes.get_mut(&provider) {
            account.stake = stake;
            account.capacity = capacity;
            if forced_exit {
                account.used = capacity;
            }
        }

        warn!(
            provider = %provider,
            slashed = %total_slashed,
            stake = %stake,
            capacity,
            "⚔️ Node slashed"
        );

        Ok(SlashOutcome {
            forced_exit,
            total_slashed,
            dust_burned: TokenAmount::ZERO,
            account_closed: false,
        })
    }

    fn close(&mut self, provider: &AccountAddress) {
        if let Some(account) = self.nodes.remove(provider) {
            self.total_stake = self.total_stake.saturating_sub(account.stake);
        }
    }

    pub fn get(&self, provider: &AccountAddress) -> Option<&NodeAccount> {
        self.nodes.get(provider)
    }

    pub fn is_valid_node(&self, provider: &AccountAddress) -> bool {
        self.nodes
            .get(provider)
            .map(|account| account.capacity > 0)
            .unwrap_or(false)
    }

    pub fn has_capacity(&self, provider: &AccountAddress, bytes: u64) -> bool {
        self.nodes
            .get(provider)
            .map(|account| account.free_capacity() >= bytes)
            .unwrap_or(false)
    }

    pub fn total_stake(&self) -> TokenAmount {
        self.total_stake
    }

    pub fn stats(&self) -> LedgerStats {
        let mut stats = LedgerStats {
            nodes: self.nodes.len(),
            total_stake: self.total_stake,
            ..LedgerStats::default()
        };
        for account in self.nodes.values() {
            stats.total_capacity = stats.total_capacity.saturating_add(account.capacity);
            stats.total_used = stats.total_used.saturating_add(account.used);
        }
        stats
    }
}
