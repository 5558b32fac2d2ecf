//! Storage Market
//!
//! The public entry point. Every mutating operation runs through
//! [`StorageMarket::execute`]:
//!
//! 1. enter the re-entrancy guard (one mutating operation at a time)
//! 2. read the clock once and derive the [`Tick`]
//! 3. apply the operation under the state write lock
//! 4. release the lock, publish the events, then make the payouts
//!
//! Payouts happen last and outside the lock. A refused payout never unwinds the
//! operation: the amount is owed through the refund queue instead and can be
//! pulled later with [`StorageMarket::withdraw_refund`].

mod admin;
mod challenges;
mod nodes;
mod orders;
mod payouts;
mod state;

use crate::clock::Clock;
use crate::config::MarketConfig;
use crate::error::{MarketError, Result};
use crate::events::{EventLog, EventRecord, MarketEvent};
use crate::guard::ReentrancyGuard;
use crate::settlement::accrued_up_to;
use crate::types::{Assignment, FundsReport, LedgerStats, NodeAccount, Order, OrderId, Tick};
use keepnet_challenges::{ChallengeRound, EntropySource, OsEntropy, ProofVerifier, RoundStatus};
use keepnet_economics::{AccountAddress, PayoutSink, TokenAmount};
use parking_lot::RwLock;
use state::{MarketState, Payout};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub struct StorageMarket {
    config: MarketConfig,
    state: RwLock<MarketState>,
    guard: ReentrancyGuard,
    events: EventLog,
    verifier: Arc<dyn ProofVerifier>,
    payouts: Arc<dyn PayoutSink>,
    clock: Arc<dyn Clock>,
    entropy: Arc<dyn EntropySource>,
}

impl StorageMarket {
    pub fn new(
        owner: AccountAddress,
        config: MarketConfig,
        verifier: Arc<dyn ProofVerifier>,
        payouts: Arc<dyn PayoutSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            owner = %owner,
            period_secs = config.period_secs,
            step_secs = config.step_secs,
            proof_window_steps = config.proof_window_steps,
            "🏪 Storage market created"
        );

        Ok(Self {
            state: RwLock::new(MarketState::new(owner, config.clone())),
            guard: ReentrancyGuard::new(),
            events: EventLog::new(config.event_history),
            verifier,
            payouts,
            clock,
            entropy: Arc::new(OsEntropy),
            config,
        })
    }

    /// Replace the entropy used to seed rounds that follow no primary proof.
    pub fn with_entropy(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn current_tick(&self) -> Tick {
        Tick::at(self.clock.now(), &self.config)
    }

    pub fn current_period(&self) -> u64 {
        self.current_tick().period
    }

    pub fn current_step(&self) -> u64 {
        self.current_tick().step
    }

    /// Run one mutating operation with the guard held.
    fn execute<T>(
        &self,
        operation: &'static str,
        apply: impl FnOnce(&mut MarketState, Tick) -> Result<T>,
    ) -> Result<T> {
        let _token = self.guard.enter(operation)?;
        let tick = self.current_tick();

        let (result, outbox) = {
            let mut state = self.state.write();
            let result = apply(&mut state, tick);
            (result, state.take_outbox())
        };

        match result {
            Ok(value) => {
                self.publish(tick, outbox.events);
                self.flush_payouts(tick, outbox.payouts);
                Ok(value)
            }
            Err(err) => {
                debug_assert!(outbox.is_empty(), "{} mutated state before failing", operation);
                debug!(operation, error = %err, kind = ?err.kind(), "Operation rejected");
                Err(err)
            }
        }
    }

    fn publish(&self, tick: Tick, events: Vec<MarketEvent>) {
        for event in events {
            self.events.publish(tick.now, event);
        }
    }

    fn flush_payouts(&self, tick: Tick, payouts: Vec<Payout>) {
        for payout in payouts {
            match self.payouts.pay(payout.to, payout.amount, payout.reason) {
                Ok(()) => {
                    let mut state = self.state.write();
                    state.funds.paid_out = state.funds.paid_out.saturating_add(payout.amount);
                }
                Err(err) => {
                    warn!(
                        recipient = %payout.to,
                        amount = %payout.amount,
                        reason = ?payout.reason,
                        error = %err,
                        "↩️ Payout refused, amount queued for withdrawal"
                    );
                    let events = {
                        let mut state = self.state.write();
                        state.queue_refund(payout.to, payout.amount, payout.reason);
                        state.take_outbox().events
                    };
                    self.publish(tick, events);
                }
            }
        }
    }

    // ========== Queries ==========

    pub fn owner(&self) -> AccountAddress {
        self.state.read().owner
    }

    pub fn authority(&self) -> Option<AccountAddress> {
        self.state.read().authority
    }

    pub fn reporter_bps(&self) -> u32 {
        self.state.read().reporter.reporter_bps()
    }

    pub fn node(&self, provider: &AccountAddress) -> Option<NodeAccount> {
        self.state.read().ledger.get(provider).cloned()
    }

    pub fn is_valid_node(&self, provider: &AccountAddress) -> bool {
        self.state.read().ledger.is_valid_node(provider)
    }

    pub fn has_capacity(&self, provider: &AccountAddress, bytes: u64) -> bool {
        self.state.read().ledger.has_capacity(provider, bytes)
    }

    pub fn ledger_stats(&self) -> LedgerStats {
        self.state.read().ledger.stats()
    }

    pub fn order(&self, order_id: OrderId) -> Option<Order> {
        self.state.read().escrow.get(order_id).cloned()
    }

    pub fn active_orders(&self) -> Vec<OrderId> {
        self.state.read().escrow.active_orders().to_vec()
    }

    pub fn assignment(&self, order_id: OrderId, provider: &AccountAddress) -> Option<Assignment> {
        self.state.read().assignments.get(order_id, provider).cloned()
    }

    pub fn orders_of(&self, provider: &AccountAddress) -> Vec<OrderId> {
        self.state.read().assignments.orders_of(provider).to_vec()
    }

    pub fn providers_of(&self, order_id: OrderId) -> Vec<AccountAddress> {
        self.state.read().assignments.providers_of(order_id).to_vec()
    }

    pub fn challengeable_orders(&self) -> Vec<OrderId> {
        self.state.read().assignments.challengeable().to_vec()
    }

    /// Unsettled earnings of one pair up to `target_period`.
    pub fn accrued_up_to(
        &self,
        order_id: OrderId,
        provider: &AccountAddress,
        target_period: u64,
    ) -> Result<TokenAmount> {
        let state = self.state.read();
        let order = state.escrow.require(order_id)?;
        let assignment = state.assignments.get(order_id, provider).ok_or_else(|| {
            MarketError::state(format!("{} holds no replica of order {}", provider, order_id))
        })?;
        Ok(accrued_up_to(order, assignment, target_period))
    }

    pub fn pending_rewards(&self, provider: &AccountAddress) -> TokenAmount {
        self.state.read().settlement.pending(provider)
    }

    pub fn lifetime_earned(&self, provider: &AccountAddress) -> TokenAmount {
        self.state.read().settlement.lifetime_earned(provider)
    }

    pub fn reporter_balance(&self, reporter: &AccountAddress) -> TokenAmount {
        self.state.read().reporter.balance(reporter)
    }

    pub fn refund_owed(&self, recipient: &AccountAddress) -> TokenAmount {
        self.state.read().refunds.owed(recipient)
    }

    pub fn current_round(&self) -> Option<ChallengeRound> {
        self.state.read().scheduler.current().cloned()
    }

    /// Superseded rounds that still have secondary duties open or unprocessed.
    pub fn lingering_rounds(&self) -> Vec<ChallengeRound> {
        self.state.read().scheduler.lingering().cloned().collect()
    }

    pub fn round_status(&self) -> RoundStatus {
        let step = self.current_step();
        self.state.read().scheduler.status(step)
    }

    pub fn rounds_issued(&self) -> u64 {
        self.state.read().scheduler.rounds_issued()
    }

    pub fn funds_report(&self) -> FundsReport {
        self.state.read().funds_report()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }
}
