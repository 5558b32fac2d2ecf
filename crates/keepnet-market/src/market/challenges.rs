use super::state::MarketState;
use super::StorageMarket;
use crate::error::{MarketError, Result};
use crate::events::MarketEvent;
use crate::types::{FailureReport, HeartbeatReport, ProofReceipt, Tick};
use keepnet_challenges::{
    EntropySource, FieldElement, Proof, ProofVerifier, ProverRole, PublicInputs,
};
use keepnet_economics::AccountAddress;
use tracing::{debug, info, warn};

impl StorageMarket {
    /// Advance the challenge protocol. Callable by anyone once the current
    /// round's proof window has closed.
    ///
    /// Missing proofs of closed rounds are slashed (the caller collects the
    /// reporter share), a bounded batch of expired orders is completed, and a new
    /// round is issued.
    pub fn trigger_heartbeat(&self, caller: AccountAddress) -> Result<HeartbeatReport> {
        let entropy = self.entropy.clone();
        self.execute("trigger_heartbeat", |state, tick| {
            state.trigger_heartbeat(caller, tick, entropy.as_ref())
        })
    }

    /// Submit a possession proof for the duty `provider` holds in an open round.
    ///
    /// A rejected proof changes nothing. An accepted primary proof seeds the next
    /// round with `commitment` and opens it immediately when the lingering
    /// backlog has room.
    pub fn submit_proof(
        &self,
        provider: AccountAddress,
        proof: Proof,
        commitment: FieldElement,
    ) -> Result<ProofReceipt> {
        let verifier = self.verifier.clone();
        let entropy = self.entropy.clone();
        self.execute("submit_proof", |state, tick| {
            state.submit_proof(
                provider,
                &proof,
                commitment,
                tick,
                verifier.as_ref(),
                entropy.as_ref(),
            )
        })
    }

    /// Slash the current round's primary prover for a missed proof.
    pub fn report_primary_failure(&self, caller: AccountAddress) -> Result<FailureReport> {
        self.execute("report_primary_failure", |state, tick| {
            let failed = state.scheduler.claim_primary_failure(tick.step)?;
            Ok(state.process_failure(&failed, caller, tick))
        })
    }

    /// Slash every secondary prover that missed its proof in a closed round.
    pub fn slash_secondary_failures(&self, caller: AccountAddress) -> Result<FailureReport> {
        self.execute("slash_secondary_failures", |state, tick| {
            let failed = state.scheduler.claim_secondary_failures(tick.step)?;
            Ok(state.process_failures(&failed, caller, tick))
        })
    }
}

impl MarketState {
    fn trigger_heartbeat(
        &mut self,
        caller: AccountAddress,
        tick: Tick,
        entropy: &dyn EntropySource,
    ) -> Result<HeartbeatReport> {
        self.scheduler.ensure_heartbeat_allowed(tick.step)?;

        let failed = self.scheduler.claim_all_failures(tick.step);
        let failures = self.process_failures(&failed, caller, tick);

        let expired = self.escrow.expired_batch(
            tick.period,
            self.config.cleanup_scan_limit,
            self.config.max_cleanup_per_heartbeat,
        );
        let orders_completed = expired
            .into_iter()
            .filter_map(|order_id| self.complete_order(order_id))
            .count();

        let round_id = self.open_round(tick, entropy);
        let (challenged_orders, provers) = self
            .scheduler
            .current()
            .map(|round| {
                (
                    round.challenged_orders.len(),
                    round.primary.iter().count() + round.secondaries.len(),
                )
            })
            .unwrap_or_default();

        info!(
            round_id,
            caller = %caller,
            step = tick.step,
            failures_slashed = failures.provers_slashed,
            orders_completed,
            "💓 Heartbeat"
        );

        Ok(HeartbeatReport {
            round_id,
            challenged_orders,
            provers,
            failures_slashed: failures.provers_slashed,
            total_slashed: failures.total_slashed,
            reporter_reward: failures.reporter_reward,
            orders_completed,
        })
    }

    fn submit_proof(
        &mut self,
        provider: AccountAddress,
        proof: &Proof,
        commitment: FieldElement,
        tick: Tick,
        verifier: &dyn ProofVerifier,
        entropy: &dyn EntropySource,
    ) -> Result<ProofReceipt> {
        let target = self.scheduler.locate_duty(&provider, tick.step)?;
        let account = self
            .ledger
            .get(&provider)
            .ok_or(MarketError::NodeNotFound(provider))?;
        let order = self
            .escrow
            .get(target.order_id)
            .filter(|_| self.assignments.contains(target.order_id, &provider))
            .ok_or_else(|| {
                MarketError::state(format!(
                    "{} no longer holds a replica of order {}",
                    provider, target.order_id
                ))
            })?;

        let inputs = PublicInputs::new(target.randomness, order.file.root, commitment, account.public_key);
        if !verifier.verify(proof, &inputs) {
            warn!(
                round_id = target.round_id,
                provider = %provider,
                order_id = target.order_id,
                "❌ Proof rejected"
            );
            return Err(MarketError::ProofRejected(format!(
                "proof from {} for order {} in round {}",
                provider, target.order_id, target.round_id
            )));
        }

        let primary = target.role == ProverRole::Primary;
        self.scheduler
            .mark_submitted(target.location, &provider, commitment);
        info!(
            round_id = target.round_id,
            provider = %provider,
            order_id = target.order_id,
            primary,
            "🧾 Proof accepted"
        );
        self.emit(MarketEvent::ProofSubmitted {
            round_id: target.round_id,
            provider,
            order_id: target.order_id,
            primary,
        });

        let next_round = if primary && self.scheduler.can_rotate() {
            Some(self.open_round(tick, entropy))
        } else {
            if primary {
                debug!(round_id = target.round_id, "Lingering backlog full, next round waits for a heartbeat");
            }
            None
        };

        Ok(ProofReceipt {
            round_id: target.round_id,
            order_id: target.order_id,
            primary,
            next_round,
        })
    }
}
