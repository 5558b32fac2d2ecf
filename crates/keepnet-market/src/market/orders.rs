use super::state::MarketState;
use super::StorageMarket;
use crate::error::{MarketError, Result};
use crate::events::MarketEvent;
use crate::types::{CancelReceipt, OrderId, OrderRequest, SlashOutcome, Tick};
use keepnet_economics::{AccountAddress, TokenAmount, TransferReason};
use tracing::{info, warn};

impl StorageMarket {
    /// Escrow a storage order. Payment above the exact cost is returned.
    pub fn place_order(
        &self,
        owner: AccountAddress,
        request: OrderRequest,
        payment: TokenAmount,
    ) -> Result<OrderId> {
        self.execute("place_order", |state, tick| {
            state.place_order(owner, request, payment, tick)
        })
    }

    /// Take one replica of an order onto `provider`'s staked capacity.
    pub fn execute_order(&self, order_id: OrderId, provider: AccountAddress) -> Result<()> {
        self.execute("execute_order", |state, tick| {
            state.execute_order(order_id, provider, tick)
        })
    }

    /// Owner cancellation of a live order.
    ///
    /// Every provider is settled to now and released. A penalty of
    /// `cancel_penalty_bps` of the remaining escrow is shared equally among them;
    /// the rest is refunded to the owner.
    pub fn cancel_order(&self, order_id: OrderId, caller: AccountAddress) -> Result<CancelReceipt> {
        self.execute("cancel_order", |state, tick| {
            state.cancel_order(order_id, caller, tick)
        })
    }

    /// Close an order past its end, paying providers to the end and refunding
    /// whatever escrow is left. Anyone may call this.
    pub fn complete_expired_order(&self, order_id: OrderId) -> Result<TokenAmount> {
        self.execute("complete_expired_order", |state, tick| {
            let order = state.escrow.require(order_id)?;
            if !order.is_expired(tick.period) {
                return Err(MarketError::state(format!(
                    "order {} runs until period {}",
                    order_id,
                    order.end_period()
                )));
            }
            state
                .complete_order(order_id)
                .ok_or(MarketError::OrderNotFound(order_id))
        })
    }

    /// Provider walks away from one replica early and is slashed for it.
    pub fn quit_order(&self, order_id: OrderId, provider: AccountAddress) -> Result<SlashOutcome> {
        self.execute("quit_order", |state, tick| {
            state.quit_order(order_id, provider, tick)
        })
    }
}

impl MarketState {
    fn place_order(
        &mut self,
        owner: AccountAddress,
        request: OrderRequest,
        payment: TokenAmount,
        tick: Tick,
    ) -> Result<OrderId> {
        let placed = self
            .escrow
            .place(owner, request, payment, tick.period, tick.now)?;
        let order = placed.order;

        self.deposit(payment);
        self.queue_refund(owner, placed.overpayment, TransferReason::OrderOverpayment);
        self.emit(MarketEvent::OrderPlaced {
            order_id: order.id,
            owner,
            max_size: order.max_size,
            periods: order.periods,
            replicas: order.desired_replicas,
            escrow: order.escrow,
        });
        Ok(order.id)
    }

    fn execute_order(&mut self, order_id: OrderId, provider: AccountAddress, tick: Tick) -> Result<()> {
        let order = self.escrow.require_live(order_id, tick.period)?;
        if order.is_fully_replicated() {
            return Err(MarketError::state(format!(
                "order {} already has {} of {} replicas",
                order_id, order.filled_replicas, order.desired_replicas
            )));
        }
        let max_size = order.max_size;

        let account = self
            .ledger
            .get(&provider)
            .ok_or(MarketError::NodeNotFound(provider))?;
        if self.assignments.contains(order_id, &provider) {
            return Err(MarketError::state(format!(
                "{} already holds a replica of order {}",
                provider, order_id
            )));
        }
        if self.assignments.count_for(&provider) >= self.config.max_orders_per_node {
            return Err(MarketError::state(format!(
                "{} already serves the maximum of {} orders",
                provider, self.config.max_orders_per_node
            )));
        }
        if account.free_capacity() < max_size {
            return Err(MarketError::InsufficientCapacity {
                provider,
                requested: max_size,
                available: account.free_capacity(),
            });
        }
        let used = account.used + max_size;

        self.ledger.set_used(&provider, used)?;
        self.assignments
            .insert(order_id, provider, tick.period, tick.now);
        let filled_replicas = match self.escrow.get_mut(order_id) {
            Some(order) => {
                order.filled_replicas += 1;
                order.filled_replicas
            }
            None => 0,
        };

        info!(order_id, provider = %provider, filled_replicas, "🧩 Replica filled");
        self.emit(MarketEvent::OrderFilled {
            order_id,
            provider,
            filled_replicas,
        });
        Ok(())
    }

    fn cancel_order(&mut self, order_id: OrderId, caller: AccountAddress, tick: Tick) -> Result<CancelReceipt> {
        let order = self.escrow.require(order_id)?;
        if order.owner != caller {
            return Err(MarketError::Unauthorized(format!(
                "only the owner may cancel order {}",
                order_id
            )));
        }
        if order.is_expired(tick.period) {
            return Err(MarketError::state(format!(
                "order {} has expired; complete it instead",
                order_id
            )));
        }
        let owner = order.owner;

        let mut released = Vec::new();
        for provider in self.assignments.providers_of(order_id).to_vec() {
            if let Some(bytes) = self.release_assignment(order_id, &provider, tick.period) {
                self.ledger.release(&provider, bytes);
                released.push(provider);
            }
        }
        let order = self
            .escrow
            .remove(order_id)
            .ok_or(MarketError::OrderNotFound(order_id))?;
        let remaining = order.remaining_escrow();

        // Shares follow replica size, which every provider of one order has in common.
        let share = remaining
            .mul_bps(self.config.cancel_penalty_bps)
            .checked_div(released.len() as u128)
            .unwrap_or(TokenAmount::ZERO);
        let mut penalty = TokenAmount::ZERO;
        for provider in &released {
            self.settlement.credit(*provider, share);
            penalty = penalty.saturating_add(share);
        }
        let refunded = remaining.saturating_sub(penalty);
        self.queue_refund(owner, refunded, TransferReason::CancellationRefund);

        info!(
            order_id,
            providers = released.len(),
            penalty = %penalty,
            refunded = %refunded,
            "🛑 Order cancelled"
        );
        self.emit(MarketEvent::OrderCancelled {
            order_id,
            penalty,
            refunded,
        });

        Ok(CancelReceipt {
            providers_released: released.len(),
            penalty,
            refunded,
        })
    }

    fn quit_order(&mut self, order_id: OrderId, provider: AccountAddress, tick: Tick) -> Result<SlashOutcome> {
        let order = self.escrow.require_live(order_id, tick.period)?;
        if !self.assignments.contains(order_id, &provider) {
            return Err(MarketError::state(format!(
                "{} holds no replica of order {}",
                provider, order_id
            )));
        }
        let stake = self
            .ledger
            .get(&provider)
            .map(|account| account.stake)
            .ok_or(MarketError::NodeNotFound(provider))?;
        let slash_periods = self
            .config
            .quit_slash_periods
            .min(order.remaining_periods(tick.period));
        let amount = order.periods_value(slash_periods).min(stake);

        self.settle_pair(order_id, &provider, tick.period);
        let outcome = if amount.is_zero() {
            SlashOutcome::default()
        } else {
            self.slash_node(provider, amount, tick, None)?.0
        };
        if !outcome.forced_exit {
            if let Some(bytes) = self.release_assignment(order_id, &provider, tick.period) {
                self.ledger.release(&provider, bytes);
            }
        }

        warn!(
            order_id,
            provider = %provider,
            slashed = %outcome.total_slashed,
            forced_exit = outcome.forced_exit,
            "🏃 Provider quit order"
        );
        self.emit(MarketEvent::ReplicaReleased {
            order_id,
            provider,
            slashed: outcome.total_slashed,
        });
        Ok(outcome)
    }
}
