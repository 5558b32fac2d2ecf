//! Market state and the cross-component steps every operation shares.
//!
//! Operations validate first and mutate second. The helpers here run in the
//! mutation half and never fail; they record events and outgoing payouts in the
//! outbox, which the facade flushes after releasing the state lock.

use crate::assignment::AssignmentIndex;
use crate::config::MarketConfig;
use crate::error::Result;
use crate::escrow::EscrowBook;
use crate::events::MarketEvent;
use crate::ledger::CapacityLedger;
use crate::reporter::{ReporterIncentive, SlashSplit};
use crate::scheduler::{ChallengeScheduler, FailedDuty};
use crate::settlement::RewardSettlement;
use crate::types::{FailureReport, FundsReport, OrderId, SlashOutcome, Tick};
use keepnet_challenges::{ChallengeRound, EntropySource, ProverRole};
use keepnet_economics::{AccountAddress, RefundQueue, TokenAmount, TransferReason};
use tracing::{error, info, warn};

/// A transfer out of the market, made after the state lock is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Payout {
    pub to: AccountAddress,
    pub amount: TokenAmount,
    pub reason: TransferReason,
}

#[derive(Debug, Default)]
pub(crate) struct Outbox {
    pub events: Vec<MarketEvent>,
    pub payouts: Vec<Payout>,
}

impl Outbox {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.payouts.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Funds {
    pub deposited: TokenAmount,
    pub paid_out: TokenAmount,
    pub burned: TokenAmount,
}

pub(crate) struct MarketState {
    pub config: MarketConfig,
    pub ledger: CapacityLedger,
    pub escrow: EscrowBook,
    pub assignments: AssignmentIndex,
    pub settlement: RewardSettlement,
    pub scheduler: ChallengeScheduler,
    pub reporter: ReporterIncentive,
    pub refunds: RefundQueue,
    pub funds: Funds,
    pub owner: AccountAddress,
    pub authority: Option<AccountAddress>,
    pub outbox: Outbox,
}

impl MarketState {
    pub fn new(owner: AccountAddress, config: MarketConfig) -> Self {
        Self {
            ledger: CapacityLedger::new(config.stake_per_byte(), config.forced_exit_penalty_bps),
            escrow: EscrowBook::new(config.max_replicas_per_order),
            assignments: AssignmentIndex::new(),
            settlement: RewardSettlement::new(),
            scheduler: ChallengeScheduler::new(&config),
            reporter: ReporterIncentive::new(config.reporter_bps, config.max_reporter_bps),
            refunds: RefundQueue::new(),
            funds: Funds::default(),
            owner,
            authority: None,
            outbox: Outbox::default(),
            config,
        }
    }

    pub fn emit(&mut self, event: MarketEvent) {
        self.outbox.events.push(event);
    }

    pub fn take_outbox(&mut self) -> Outbox {
        std::mem::take(&mut self.outbox)
    }

    pub fn deposit(&mut self, amount: TokenAmount) {
        self.funds.deposited = self.funds.deposited.saturating_add(amount);
    }

    /// Schedule a transfer out of the market.
    pub fn pay(&mut self, to: AccountAddress, amount: TokenAmount, reason: TransferReason) {
        if amount.is_zero() {
            return;
        }
        self.outbox.payouts.push(Payout { to, amount, reason });
    }

    /// Owe `amount` to `to` until they withdraw it.
    pub fn queue_refund(&mut self, to: AccountAddress, amount: TokenAmount, reason: TransferReason) {
        if amount.is_zero() {
            return;
        }
        if let Err(err) = self.refunds.enqueue(to, amount, reason) {
            error!(recipient = %to, amount = %amount, error = %err, "❌ Refund queue overflow; saturating");
            self.refunds.restore(to, amount);
        }
        self.emit(MarketEvent::RefundQueued {
            recipient: to,
            amount,
            reason,
        });
    }

    pub fn funds_report(&self) -> FundsReport {
        FundsReport {
            deposited: self.funds.deposited,
            paid_out: self.funds.paid_out,
            burned: self.funds.burned,
            stakes: self.ledger.total_stake(),
            escrow: self.escrow.total_held(),
            pending_rewards: self.settlement.total_pending(),
            reporter_balances: self.reporter.total_owed(),
            refunds_owed: self.refunds.total_owed(),
        }
    }

    /// Book a pair's earnings up to `target_period`; zero if either side is gone.
    pub fn settle_pair(&mut self, order_id: OrderId, provider: &AccountAddress, target_period: u64) -> TokenAmount {
        match (
            self.escrow.get_mut(order_id),
            self.assignments.get_mut(order_id, provider),
        ) {
            (Some(order), Some(assignment)) => self.settlement.settle(order, assignment, target_period),
            _ => TokenAmount::ZERO,
        }
    }

    /// Settle and drop one assignment, returning the bytes it occupied. The
    /// provider's `used` is left to the caller.
    pub fn release_assignment(
        &mut self,
        order_id: OrderId,
        provider: &AccountAddress,
        target_period: u64,
    ) -> Option<u64> {
        self.settle_pair(order_id, provider, target_period);
        self.assignments.remove(order_id, provider)?;
        let order = self.escrow.get_mut(order_id)?;
        order.filled_replicas = order.filled_replicas.saturating_sub(1);
        Some(order.max_size)
    }

    /// Evict `provider` from its orders, back to front, settling each first.
    pub fn forced_exit(&mut self, provider: AccountAddress, tick: Tick) {
        let orders = self.assignments.orders_of(&provider).to_vec();
        let mut released = 0usize;
        let mut freed = 0u64;

        for &order_id in orders.iter().rev().take(self.config.max_orders_per_node) {
            let Some(bytes) = self.release_assignment(order_id, &provider, tick.period) else {
                continue;
            };
            released += 1;
            freed = freed.saturating_add(bytes);

            let under_replicated = self
                .escrow
                .get(order_id)
                .filter(|order| !order.is_expired(tick.period))
                .filter(|order| order.filled_replicas < order.desired_replicas)
                .map(|order| (order.filled_replicas, order.desired_replicas));
            if let Some((filled_replicas, desired_replicas)) = under_replicated {
                self.emit(MarketEvent::OrderUnderReplicated {
                    order_id,
                    filled_replicas,
                    desired_replicas,
                });
            }
        }
        self.ledger.release(&provider, freed);

        warn!(
            provider = %provider,
            orders_released = released,
            bytes_freed = freed,
            remaining = self.assignments.count_for(&provider),
            "🚪 Forced exit"
        );
        self.emit(MarketEvent::NodeForcedExit {
            provider,
            orders_released: released,
            bytes_freed: freed,
        });
    }

    /// Slash a node and cascade a forced exit if its capacity collapsed.
    ///
    /// With a `reporter`, the reporter share of the slash is credited to it and the
    /// rest burned; without one everything is burned.
    pub fn slash_node(
        &mut self,
        provider: AccountAddress,
        amount: TokenAmount,
        tick: Tick,
        reporter: Option<AccountAddress>,
    ) -> Result<(SlashOutcome, SlashSplit)> {
        let outcome = self.ledger.slash(provider, amount)?;

        let split = match reporter {
            Some(reporter) => {
                let split = self.reporter.split(outcome.total_slashed);
                if !split.reporter_reward.is_zero() {
                    self.reporter.credit(reporter, split.reporter_reward);
                    self.emit(MarketEvent::ReporterRewarded {
                        reporter,
                        amount: split.reporter_reward,
                    });
                }
                split
            }
            None => SlashSplit {
                reporter_reward: TokenAmount::ZERO,
                burned: outcome.total_slashed,
            },
        };

        let burned = split.burned.saturating_add(outcome.dust_burned);
        self.funds.burned = self.funds.burned.saturating_add(burned);
        self.emit(MarketEvent::NodeSlashed {
            provider,
            amount: outcome.total_slashed,
            burned,
            forced_exit: outcome.forced_exit,
        });

        if outcome.forced_exit {
            self.forced_exit(provider, tick);
        }
        Ok((outcome, split))
    }

    /// Slash one missing proof. Duties whose assignment or node is gone, or whose
    /// order has run out, are void.
    pub fn process_failure(&mut self, failed: &FailedDuty, reporter: AccountAddress, tick: Tick) -> FailureReport {
        let multiplier = match failed.role {
            ProverRole::Primary => self.config.primary_failure_slash_periods,
            ProverRole::Secondary => self.config.secondary_failure_slash_periods,
        };

        let amount = match (
            self.escrow.get(failed.order_id),
            self.ledger.get(&failed.provider),
        ) {
            (Some(order), Some(account))
                if !order.is_expired(tick.period)
                    && self.assignments.contains(failed.order_id, &failed.provider) =>
            {
                order.periods_value(multiplier).min(account.stake)
            }
            _ => {
                info!(
                    round_id = failed.round_id,
                    provider = %failed.provider,
                    order_id = failed.order_id,
                    "🕳️ Missed proof voided; order expired or assignment gone"
                );
                return FailureReport::default();
            }
        };
        if amount.is_zero() {
            return FailureReport::default();
        }

        // Reporting your own failure earns nothing back.
        let rewarded = Some(reporter).filter(|r| *r != failed.provider);
        match self.slash_node(failed.provider, amount, tick, rewarded) {
            Ok((outcome, split)) => {
                warn!(
                    round_id = failed.round_id,
                    provider = %failed.provider,
                    order_id = failed.order_id,
                    role = ?failed.role,
                    slashed = %outcome.total_slashed,
                    reporter = %reporter,
                    "⏰ Prover missed its proof window"
                );
                self.emit(MarketEvent::ProverFailed {
                    round_id: failed.round_id,
                    provider: failed.provider,
                    order_id: failed.order_id,
                    primary: failed.role == ProverRole::Primary,
                    slashed: outcome.total_slashed,
                });
                FailureReport {
                    provers_slashed: 1,
                    total_slashed: outcome.total_slashed,
                    reporter_reward: split.reporter_reward,
                }
            }
            Err(err) => {
                error!(provider = %failed.provider, error = %err, "❌ Failure slash could not be applied");
                FailureReport::default()
            }
        }
    }

    pub fn process_failures(&mut self, failed: &[FailedDuty], reporter: AccountAddress, tick: Tick) -> FailureReport {
        let mut report = FailureReport::default();
        for duty in failed {
            report.absorb(&self.process_failure(duty, reporter, tick));
        }
        report
    }

    /// Release every provider of an order at its natural end and refund the owner.
    pub fn complete_order(&mut self, order_id: OrderId) -> Option<TokenAmount> {
        let end_period = self.escrow.get(order_id)?.end_period();
        for provider in self.assignments.providers_of(order_id).to_vec() {
            if let Some(bytes) = self.release_assignment(order_id, &provider, end_period) {
                self.ledger.release(&provider, bytes);
            }
        }

        let order = self.escrow.remove(order_id)?;
        let refunded = order.remaining_escrow();
        self.queue_refund(order.owner, refunded, TransferReason::OrderRefund);

        info!(order_id, owner = %order.owner, refunded = %refunded, "✅ Order completed");
        self.emit(MarketEvent::OrderCompleted { order_id, refunded });
        Some(refunded)
    }

    /// Seed, sample and install the next challenge round.
    pub fn open_round(&mut self, tick: Tick, entropy: &dyn EntropySource) -> u64 {
        let (round_id, seed) = self.scheduler.next_seed(entropy, tick.step);
        let escrow = &self.escrow;
        let selection = self.scheduler.select(&seed, &self.assignments, |order_id| {
            escrow
                .get(order_id)
                .is_some_and(|order| !order.is_expired(tick.period))
        });
        let round = ChallengeRound::new(
            round_id,
            seed,
            tick.step,
            selection.orders,
            selection.primary,
            selection.secondaries,
        );

        self.emit(MarketEvent::ChallengeIssued {
            round_id,
            step: tick.step,
            primary: round.primary.as_ref().map(|duty| duty.provider),
            secondaries: round.secondaries.len(),
            orders: round.challenged_orders.clone(),
        });
        self.scheduler.install(round);
        round_id
    }
}
