use crate::field::FieldElement;
use keepnet_economics::AccountAddress;
use serde::{Deserialize, Serialize};

/// Phase of a challenge round relative to a given step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundStatus {
    /// Nothing outstanding: no provers were selected, or every failure was resolved
    Idle,
    /// Proof window open, some duties not yet met
    ChallengeActive,
    /// Every selected prover submitted a valid proof
    ProofPhaseComplete,
    /// Window elapsed with missing proofs that have not been slashed yet
    ExpiredUnresolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProverRole {
    Primary,
    Secondary,
}

/// One provider's obligation to prove possession of one order within a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProverDuty {
    pub provider: AccountAddress,
    pub order_id: u64,
    pub role: ProverRole,
    pub submitted: bool,
}

impl ProverDuty {
    pub fn new(provider: AccountAddress, order_id: u64, role: ProverRole) -> Self {
        Self {
            provider,
            order_id,
            role,
            submitted: false,
        }
    }
}

/// A sampled proof-of-possession round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeRound {
    pub round_id: u64,
    pub randomness: FieldElement,
    pub step_index: u64,
    pub challenged_orders: Vec<u64>,
    pub primary: Option<ProverDuty>,
    pub secondaries: Vec<ProverDuty>,
    pub primary_proof_received: bool,
    pub primary_failure_processed: bool,
    pub secondary_failures_processed: bool,
}

impl ChallengeRound {
    pub fn new(
        round_id: u64,
        randomness: FieldElement,
        step_index: u64,
        challenged_orders: Vec<u64>,
        primary: Option<ProverDuty>,
        secondaries: Vec<ProverDuty>,
    ) -> Self {
        Self {
            round_id,
            randomness,
            step_index,
            challenged_orders,
            primary,
            secondaries,
            primary_proof_received: false,
            primary_failure_processed: false,
            secondary_failures_processed: false,
        }
    }

    /// Last step at which proofs are still accepted.
    pub fn window_end(&self, window_steps: u64) -> u64 {
        self.step_index.saturating_add(window_steps)
    }

    pub fn is_window_open(&self, current_step: u64, window_steps: u64) -> bool {
        current_step <= self.window_end(window_steps)
    }

    pub fn has_provers(&self) -> bool {
        self.primary.is_some() || !self.secondaries.is_empty()
    }

    pub fn duty(&self, provider: &AccountAddress) -> Option<&ProverDuty> {
        self.primary
            .iter()
            .chain(self.secondaries.iter())
            .find(|duty| duty.provider == *provider)
    }

    pub fn duty_mut(&mut self, provider: &AccountAddress) -> Option<&mut ProverDuty> {
        self.primary
            .iter_mut()
            .chain(self.secondaries.iter_mut())
            .find(|duty| duty.provider == *provider)
    }

    /// Primary duty whose proof is missing and has not been slashed yet.
    pub fn unresolved_primary(&self) -> Option<&ProverDuty> {
        if self.primary_failure_processed {
            return None;
        }
        self.primary.as_ref().filter(|duty| !duty.submitted)
    }

    /// Secondary duties whose proof is missing and have not been slashed yet.
    pub fn unresolved_secondaries(&self) -> impl Iterator<Item = &ProverDuty> {
        let processed = self.secondary_failures_processed;
        self.secondaries
            .iter()
            .filter(move |duty| !processed && !duty.submitted)
    }

    /// Whether `provider` still owes a proof (or a slash) in this round.
    pub fn has_open_duty(&self, provider: &AccountAddress) -> bool {
        match self.duty(provider) {
            Some(duty) if duty.submitted => false,
            Some(duty) => match duty.role {
                ProverRole::Primary => !self.primary_failure_processed,
                ProverRole::Secondary => !self.secondary_failures_processed,
            },
            None => false,
        }
    }

    pub fn all_submitted(&self) -> bool {
        self.primary.iter().all(|duty| duty.submitted)
            && self.secondaries.iter().all(|duty| duty.submitted)
    }

    pub fn is_settled(&self) -> bool {
        self.unresolved_primary().is_none() && self.unresolved_secondaries().next().is_none()
    }

    pub fn status(&self, current_step: u64, window_steps: u64) -> RoundStatus {
        if !self.has_provers() {
            return RoundStatus::Idle;
        }
        if self.all_submitted() {
            return RoundStatus::ProofPhaseComplete;
        }
        if self.is_window_open(current_step, window_steps) {
            return RoundStatus::ChallengeActive;
        }
        if self.is_settled() {
            RoundStatus::Idle
        } else {
            RoundStatus::ExpiredUnresolved
        }
    }
}
