use super::state::MarketState;
use super::StorageMarket;
use crate::error::{MarketError, Result};
use crate::events::MarketEvent;
use crate::settlement::accrued_up_to;
use crate::types::Tick;
use keepnet_economics::{AccountAddress, TokenAmount, TransferReason};
use tracing::{info, warn};

impl StorageMarket {
    /// Settle every assignment of `provider` to the current period and pay out
    /// everything pending.
    pub fn claim_rewards(&self, provider: AccountAddress) -> Result<TokenAmount> {
        self.execute("claim_rewards", |state, tick| state.claim_rewards(provider, tick))
    }

    pub fn claim_reporter_reward(&self, reporter: AccountAddress) -> Result<TokenAmount> {
        self.execute("claim_reporter_reward", |state, _| {
            let amount = state.reporter.take(&reporter)?;
            state.pay(reporter, amount, TransferReason::ReporterReward);
            state.emit(MarketEvent::ReporterRewardClaimed { reporter, amount });
            Ok(amount)
        })
    }

    /// Pull everything the market owes `recipient`.
    ///
    /// Unlike the other payouts this one is made inside the operation: if the
    /// sink refuses, the entry is restored and the call fails.
    pub fn withdraw_refund(&self, recipient: AccountAddress) -> Result<TokenAmount> {
        let _token = self.guard.enter("withdraw_refund")?;
        let tick = self.current_tick();

        let amount = self.state.write().refunds.take(&recipient)?;
        if let Err(err) = self
            .payouts
            .pay(recipient, amount, TransferReason::RefundWithdrawal)
        {
            warn!(recipient = %recipient, amount = %amount, error = %err, "↩️ Refund withdrawal refused");
            self.state.write().refunds.restore(recipient, amount);
            return Err(MarketError::PayoutFailed(err.to_string()));
        }

        {
            let mut state = self.state.write();
            state.funds.paid_out = state.funds.paid_out.saturating_add(amount);
        }
        info!(recipient = %recipient, amount = %amount, "💸 Refund withdrawn");
        self.events
            .publish(tick.now, MarketEvent::RefundWithdrawn { recipient, amount });
        Ok(amount)
    }
}

impl MarketState {
    fn claim_rewards(&mut self, provider: AccountAddress, tick: Tick) -> Result<TokenAmount> {
        let orders = self.assignments.orders_of(&provider).to_vec();
        let accrued = orders.iter().fold(TokenAmount::ZERO, |acc, order_id| {
            let unsettled = match (
                self.escrow.get(*order_id),
                self.assignments.get(*order_id, &provider),
            ) {
                (Some(order), Some(assignment)) => accrued_up_to(order, assignment, tick.period),
                _ => TokenAmount::ZERO,
            };
            acc.saturating_add(unsettled)
        });
        if accrued.is_zero() && self.settlement.pending(&provider).is_zero() {
            return Err(MarketError::NothingToClaim(provider));
        }

        for order_id in orders {
            self.settle_pair(order_id, &provider, tick.period);
        }
        let amount = self.settlement.take_pending(&provider);
        self.pay(provider, amount, TransferReason::RewardClaim);

        info!(provider = %provider, amount = %amount, "💰 Rewards claimed");
        self.emit(MarketEvent::RewardClaimed { provider, amount });
        Ok(amount)
    }
}
