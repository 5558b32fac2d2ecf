//! Challenge Scheduler
//!
//! Runs the rolling proof-of-possession protocol:
//!
//! ```text
//! Idle → ChallengeActive → (ProofPhaseComplete | ExpiredUnresolved) → Idle
//! ```
//!
//! There is exactly one current round. A heartbeat may replace it once its proof
//! window has elapsed; an accepted primary proof replaces it immediately. In the
//! second case the superseded round may still have secondaries with open
//! windows, so it is kept as a *lingering* round until those duties are proven
//! or slashed. The lingering backlog is bounded; when it is full, rotation waits
//! for the next heartbeat.
//!
//! The scheduler never slashes anything itself. It hands out each failed duty
//! exactly once (the per-round processed flags guard that) and the market applies
//! the slash.

use crate::assignment::AssignmentIndex;
use crate::config::MarketConfig;
use crate::error::{MarketError, Result};
use crate::types::OrderId;
use keepnet_challenges::{
    derive_round_seed, pick_index, sample_indices, ChallengeRound, EntropySource, FieldElement,
    ProverDuty, ProverRole, RoundStatus, SeedSource,
};
use keepnet_economics::AccountAddress;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info};

/// Which round a duty lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RoundRef {
    Current,
    Lingering(usize),
}

/// An open duty located for a proof submission.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DutyTarget {
    pub location: RoundRef,
    pub round_id: u64,
    pub randomness: FieldElement,
    pub order_id: OrderId,
    pub role: ProverRole,
}

/// A missing proof handed out for slashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedDuty {
    pub round_id: u64,
    pub provider: AccountAddress,
    pub order_id: OrderId,
    pub role: ProverRole,
}

impl FailedDuty {
    fn new(round_id: u64, duty: &ProverDuty) -> Self {
        Self {
            round_id,
            provider: duty.provider,
            order_id: duty.order_id,
            role: duty.role,
        }
    }
}

/// Provers drawn for a new round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub orders: Vec<OrderId>,
    pub primary: Option<ProverDuty>,
    pub secondaries: Vec<ProverDuty>,
}

pub struct ChallengeScheduler {
    current: Option<ChallengeRound>,
    lingering: VecDeque<ChallengeRound>,
    next_round_id: u64,
    last_randomness: FieldElement,
    /// Commitment of the last accepted primary proof, consumed by the next seed
    pending_commitment: Option<FieldElement>,
    proof_window_steps: u64,
    sample_size: usize,
    max_lingering: usize,
}

impl ChallengeScheduler {
    pub fn new(config: &MarketConfig) -> Self {
        Self {
            current: None,
            lingering: VecDeque::new(),
            next_round_id: 1,
            last_randomness: FieldElement::ZERO,
            pending_commitment: None,
            proof_window_steps: config.proof_window_steps,
            sample_size: config.challenge_sample_size,
            max_lingering: config.max_lingering_rounds,
        }
    }

    pub fn current(&self) -> Option<&ChallengeRound> {
        self.current.as_ref()
    }

    pub fn lingering(&self) -> impl Iterator<Item = &ChallengeRound> {
        self.lingering.iter()
    }

    pub fn rounds_issued(&self) -> u64 {
        self.next_round_id - 1
    }

    pub fn last_randomness(&self) -> FieldElement {
        self.last_randomness
    }

    pub fn has_pending_commitment(&self) -> bool {
        self.pending_commitment.is_some()
    }

    pub fn proof_window_steps(&self) -> u64 {
        self.proof_window_steps
    }

    pub fn status(&self, step: u64) -> RoundStatus {
        self.current
            .as_ref()
            .map(|round| round.status(step, self.proof_window_steps))
            .unwrap_or(RoundStatus::Idle)
    }

    /// Heartbeats are refused while the current round's window is open.
    pub fn ensure_heartbeat_allowed(&self, step: u64) -> Result<()> {
        match &self.current {
            Some(round) if round.is_window_open(step, self.proof_window_steps) => {
                Err(MarketError::state(format!(
                    "round {} accepts proofs until step {}",
                    round.round_id,
                    round.window_end(self.proof_window_steps)
                )))
            }
            _ => Ok(()),
        }
    }

    fn rounds(&self) -> impl Iterator<Item = (RoundRef, &ChallengeRound)> {
        self.current
            .iter()
            .map(|round| (RoundRef::Current, round))
            .chain(
                self.lingering
                    .iter()
                    .enumerate()
                    .map(|(i, round)| (RoundRef::Lingering(i), round)),
            )
    }

    fn round_mut(&mut self, location: RoundRef) -> Option<&mut ChallengeRound> {
        match location {
            RoundRef::Current => self.current.as_mut(),
            RoundRef::Lingering(i) => self.lingering.get_mut(i),
        }
    }

    /// Find the open duty `provider` may prove right now.
    pub(crate) fn locate_duty(&self, provider: &AccountAddress, step: u64) -> Result<DutyTarget> {
        if self.current.is_none() {
            return Err(MarketError::state("no challenge round is active"));
        }

        let open = self.rounds().find_map(|(location, round)| {
            round
                .duty(provider)
                .filter(|_| round.has_open_duty(provider))
                .map(|duty| (location, round, duty))
        });

        if let Some((location, round, duty)) = open {
            if !round.is_window_open(step, self.proof_window_steps) {
                return Err(MarketError::state(format!(
                    "proof window of round {} closed at step {}",
                    round.round_id,
                    round.window_end(self.proof_window_steps)
                )));
            }
            return Ok(DutyTarget {
                location,
                round_id: round.round_id,
                randomness: round.randomness,
                order_id: duty.order_id,
                role: duty.role,
            });
        }

        match self.rounds().find_map(|(_, round)| round.duty(provider).map(|d| (round, d))) {
            Some((round, duty)) if duty.submitted => Err(MarketError::state(format!(
                "proof for round {} already submitted",
                round.round_id
            ))),
            Some((round, _)) => Err(MarketError::state(format!(
                "failure in round {} was already processed",
                round.round_id
            ))),
            None => Err(MarketError::Unauthorized(format!(
                "{} is not a prover in any open round",
                provider
            ))),
        }
    }

    /// Record an accepted proof. A primary proof's commitment seeds the next round.
    pub(crate) fn mark_submitted(
        &mut self,
        location: RoundRef,
        provider: &AccountAddress,
        commitment: FieldElement,
    ) {
        let Some(round) = self.round_mut(location) else {
            return;
        };
        let Some(duty) = round.duty_mut(provider) else {
            return;
        };
        duty.submitted = true;
        let primary = duty.role == ProverRole::Primary;
        if primary {
            round.primary_proof_received = true;
            self.pending_commitment = Some(commitment);
        }
        self.prune_lingering();
    }

    /// Whether the current round can be superseded without overflowing the backlog.
    pub(crate) fn can_rotate(&self) -> bool {
        match &self.current {
            Some(round) => {
                let has_open = round
                    .secondaries
                    .iter()
                    .any(|duty| round.has_open_duty(&duty.provider));
                !has_open || self.lingering.len() < self.max_lingering
            }
            None => true,
        }
    }

    fn closed_rounds(&self, step: u64) -> Vec<RoundRef> {
        self.rounds()
            .filter(|(_, round)| !round.is_window_open(step, self.proof_window_steps))
            .map(|(location, _)| location)
            .collect()
    }

    /// Hand out the current round's missing primary proof, once.
    pub(crate) fn claim_primary_failure(&mut self, step: u64) -> Result<FailedDuty> {
        let window = self.proof_window_steps;
        let round = self
            .current
            .as_mut()
            .ok_or_else(|| MarketError::state("no challenge round has been issued"))?;
        if round.is_window_open(step, window) {
            return Err(MarketError::state(format!(
                "round {} accepts proofs until step {}",
                round.round_id,
                round.window_end(window)
            )));
        }
        if round.primary_failure_processed {
            return Err(MarketError::state(format!(
                "primary failure of round {} already processed",
                round.round_id
            )));
        }
        let failed = round
            .unresolved_primary()
            .map(|duty| FailedDuty::new(round.round_id, duty))
            .ok_or_else(|| {
                MarketError::state(format!("round {} has no missing primary proof", round.round_id))
            })?;
        round.primary_failure_processed = true;
        Ok(failed)
    }

    /// Hand out every missing secondary proof of rounds whose window closed, once.
    pub(crate) fn claim_secondary_failures(&mut self, step: u64) -> Result<Vec<FailedDuty>> {
        let closed = self.closed_rounds(step);
        let pending = closed.iter().any(|location| {
            let round = match location {
                RoundRef::Current => self.current.as_ref(),
                RoundRef::Lingering(i) => self.lingering.get(*i),
            };
            round
                .map(|round| round.unresolved_secondaries().next().is_some())
                .unwrap_or(false)
        });
        if !pending {
            return Err(MarketError::state("no unprocessed secondary failures"));
        }

        let mut failed = Vec::new();
        for location in closed {
            if let Some(round) = self.round_mut(location) {
                let round_id = round.round_id;
                failed.extend(
                    round
                        .unresolved_secondaries()
                        .map(|duty| FailedDuty::new(round_id, duty)),
                );
                round.secondary_failures_processed = true;
            }
        }
        self.prune_lingering();
        Ok(failed)
    }

    /// Hand out every missing proof of every closed round, once.
    pub(crate) fn claim_all_failures(&mut self, step: u64) -> Vec<FailedDuty> {
        let mut failed = Vec::new();
        for location in self.closed_rounds(step) {
            if let Some(round) = self.round_mut(location) {
                let round_id = round.round_id;
                if let Some(duty) = round.unresolved_primary() {
                    failed.push(FailedDuty::new(round_id, duty));
                }
                failed.extend(
                    round
                        .unresolved_secondaries()
                        .map(|duty| FailedDuty::new(round_id, duty)),
                );
                round.primary_failure_processed = true;
                round.secondary_failures_processed = true;
            }
        }
        self.prune_lingering();
        failed
    }

    fn prune_lingering(&mut self) {
        self.lingering.retain(|round| !round.is_settled());
    }

    /// Allocate the next round id and derive its seed.
    pub(crate) fn next_seed(&mut self, entropy: &dyn EntropySource, step: u64) -> (u64, FieldElement) {
        let round_id = self.next_round_id;
        self.next_round_id += 1;

        let source = match self.pending_commitment.take() {
            Some(commitment) => SeedSource::Commitment(commitment),
            None => SeedSource::Entropy {
                entropy: entropy.next_entropy(),
                previous: self.last_randomness,
            },
        };
        let seed = derive_round_seed(source, round_id, step);
        self.last_randomness = seed;
        (round_id, seed)
    }

    /// Draw the provers of a new round from the challengeable orders that `is_live`
    /// accepts. Expired orders awaiting cleanup must be filtered out by the caller.
    ///
    /// The first sampled order supplies the primary (its first provider without an
    /// open duty elsewhere); every other sampled order supplies one seed-chosen
    /// secondary not already selected and not busy in an earlier round.
    pub fn select(
        &self,
        seed: &FieldElement,
        assignments: &AssignmentIndex,
        is_live: impl Fn(OrderId) -> bool,
    ) -> Selection {
        let challengeable: Vec<OrderId> = assignments
            .challengeable()
            .iter()
            .copied()
            .filter(|order_id| is_live(*order_id))
            .collect();
        let picks = sample_indices(seed, challengeable.len(), self.sample_size);

        let busy: HashSet<AccountAddress> = self
            .rounds()
            .flat_map(|(_, round)| {
                round
                    .primary
                    .iter()
                    .chain(round.secondaries.iter())
                    .filter(|duty| round.has_open_duty(&duty.provider))
                    .map(|duty| duty.provider)
            })
            .collect();

        let mut selection = Selection::default();
        let mut chosen: HashSet<AccountAddress> = HashSet::new();

        for index in picks {
            let Some(&order_id) = challengeable.get(index) else {
                continue;
            };
            selection.orders.push(order_id);
            let providers = assignments.providers_of(order_id);
            if providers.is_empty() {
                continue;
            }

            if selection.primary.is_none() {
                if let Some(provider) = providers.iter().find(|p| !busy.contains(*p)) {
                    chosen.insert(*provider);
                    selection.primary =
                        Some(ProverDuty::new(*provider, order_id, ProverRole::Primary));
                }
                continue;
            }

            let offset = pick_index(seed, order_id, providers.len());
            let candidate = (0..providers.len())
                .map(|k| providers[(offset + k) % providers.len()])
                .find(|p| !chosen.contains(p) && !busy.contains(p));
            if let Some(provider) = candidate {
                chosen.insert(provider);
                selection
                    .secondaries
                    .push(ProverDuty::new(provider, order_id, ProverRole::Secondary));
            }
        }

        selection
    }

    /// Make `round` current; the old one lingers if it still has open duties.
    pub(crate) fn install(&mut self, round: ChallengeRound) {
        if let Some(previous) = self.current.take() {
            if !previous.is_settled() {
                debug!(round_id = previous.round_id, "⏳ Round lingers with open secondary duties");
                self.lingering.push_back(previous);
            }
        }
        self.prune_lingering();

        info!(
            round_id = round.round_id,
            step = round.step_index,
            orders = round.challenged_orders.len(),
            primary = ?round.primary.as_ref().map(|duty| duty.provider.short()),
            secondaries = round.secondaries.len(),
            "🎲 Challenge round issued"
        );
        self.current = Some(round);
    }
}
