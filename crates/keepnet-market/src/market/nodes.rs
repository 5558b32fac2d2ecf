use super::state::MarketState;
use super::StorageMarket;
use crate::error::Result;
use crate::events::MarketEvent;
use crate::types::{CapacityChange, CapacityDelta, NodeAccount, RawPublicKey, Tick};
use keepnet_economics::{AccountAddress, TokenAmount, TransferReason};

impl StorageMarket {
    /// Register a provider with `capacity` bytes backed by exactly
    /// `capacity × stake_per_byte` of deposit.
    pub fn stake(
        &self,
        provider: AccountAddress,
        capacity: u64,
        public_key: RawPublicKey,
        deposit: TokenAmount,
    ) -> Result<NodeAccount> {
        self.execute("stake", |state, tick| {
            state.stake(provider, capacity, public_key, deposit, tick)
        })
    }

    /// Grow capacity with a matching deposit or shrink it and get stake back.
    /// Shrinking to zero closes the account.
    pub fn adjust_capacity(
        &self,
        provider: AccountAddress,
        delta: CapacityDelta,
        deposit: TokenAmount,
    ) -> Result<CapacityChange> {
        self.execute("adjust_capacity", |state, _| {
            state.adjust_capacity(provider, delta, deposit)
        })
    }

    /// Close an account that stores nothing and return its stake.
    pub fn unstake(&self, provider: AccountAddress) -> Result<TokenAmount> {
        self.execute("unstake", |state, _| state.unstake(provider))
    }
}

impl MarketState {
    fn stake(
        &mut self,
        provider: AccountAddress,
        capacity: u64,
        public_key: RawPublicKey,
        deposit: TokenAmount,
        tick: Tick,
    ) -> Result<NodeAccount> {
        let account = self
            .ledger
            .stake(provider, capacity, public_key, deposit, tick.period)?;
        self.deposit(deposit);
        self.emit(MarketEvent::NodeStaked {
            provider,
            capacity,
            stake: account.stake,
        });
        Ok(account)
    }

    fn adjust_capacity(
        &mut self,
        provider: AccountAddress,
        delta: CapacityDelta,
        deposit: TokenAmount,
    ) -> Result<CapacityChange> {
        let change = self.ledger.adjust_capacity(provider, delta, deposit)?;
        if let CapacityDelta::Grow(_) = delta {
            self.deposit(deposit);
        }
        self.pay(provider, change.released, TransferReason::StakeReturn);

        if change.account_closed {
            self.emit(MarketEvent::NodeUnstaked {
                provider,
                returned: change.released,
            });
        } else {
            self.emit(MarketEvent::NodeCapacityAdjusted {
                provider,
                capacity: change.capacity,
                stake: change.stake,
            });
        }
        Ok(change)
    }

    fn unstake(&mut self, provider: AccountAddress) -> Result<TokenAmount> {
        let returned = self.ledger.unstake(provider)?;
        self.pay(provider, returned, TransferReason::StakeReturn);
        self.emit(MarketEvent::NodeUnstaked { provider, returned });
        Ok(returned)
    }
}
