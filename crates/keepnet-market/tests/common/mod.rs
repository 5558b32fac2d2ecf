#![allow(dead_code)]

use keepnet_challenges::{EntropySource, PROOF_ELEMENTS};
use keepnet_market::{
    AccountAddress, BalanceBook, FieldElement, FileRef, ManualClock, MarketConfig, MarketEvent,
    NodeAccount, OrderId, OrderRequest, PayoutSink, Proof, ProofVerifier, PublicInputs,
    RawPublicKey, StorageMarket, TokenAmount,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub const PERIOD: u64 = 604_800;
pub const STEP: u64 = 30;
/// Start of period 100, aligned to a step boundary.
pub const GENESIS: u64 = 100 * PERIOD;
pub const PRICE: u128 = 1_000_000_000_000;
/// Large enough that a primary failure slash on a 1 KiB order leaves capacity.
pub const STAKE_PER_BYTE: u64 = 10_000_000_000_000;

pub fn addr(byte: u8) -> AccountAddress {
    AccountAddress::from_bytes([byte; 32])
}

pub fn key(byte: u8) -> RawPublicKey {
    RawPublicKey::new(
        FieldElement::from_u64(byte as u64).to_bytes(),
        FieldElement::from_u64(byte as u64 + 1_000).to_bytes(),
    )
}

pub fn units(value: u128) -> TokenAmount {
    TokenAmount::from_base_units(value)
}

pub fn proof() -> Proof {
    Proof([FieldElement::from_u64(1); PROOF_ELEMENTS])
}

pub fn request(max_size: u64, periods: u64, replicas: u32) -> OrderRequest {
    OrderRequest {
        file: FileRef::new(FieldElement::from_u64(0xF11E), "bafy-fixture"),
        max_size,
        periods,
        replicas,
        price_per_byte_period: units(PRICE),
    }
}

/// Verifier whose verdict the test controls.
#[derive(Default)]
pub struct ScriptedVerifier {
    reject: AtomicBool,
    calls: AtomicU64,
    last: Mutex<Option<PublicInputs>>,
}

impl ScriptedVerifier {
    pub fn reject_all(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_inputs(&self) -> Option<PublicInputs> {
        *self.last.lock()
    }
}

impl ProofVerifier for ScriptedVerifier {
    fn verify(&self, _proof: &Proof, inputs: &PublicInputs) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock() = Some(*inputs);
        !self.reject.load(Ordering::SeqCst)
    }
}

/// Deterministic entropy: a counter spread over 32 bytes.
#[derive(Default)]
pub struct CountingEntropy(AtomicU64);

impl EntropySource for CountingEntropy {
    fn next_entropy(&self) -> [u8; 32] {
        let n = self.0.fetch_add(1, Ordering::SeqCst);
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&n.to_le_bytes());
        bytes
    }
}

pub fn config() -> MarketConfig {
    MarketConfig {
        period_secs: PERIOD,
        step_secs: STEP,
        stake_per_byte: STAKE_PER_BYTE,
        ..MarketConfig::default()
    }
}

pub struct MarketFixture {
    pub market: Arc<StorageMarket>,
    pub clock: ManualClock,
    pub verifier: Arc<ScriptedVerifier>,
    pub book: Arc<BalanceBook>,
    pub owner: AccountAddress,
}

impl MarketFixture {
    pub fn new() -> Self {
        Self::build(config(), |book| book as Arc<dyn PayoutSink>)
    }

    pub fn with_config(config: MarketConfig) -> Self {
        Self::build(config, |book| book as Arc<dyn PayoutSink>)
    }

    /// Route payouts through a custom sink built around the fixture's book.
    pub fn build(
        config: MarketConfig,
        make_sink: impl FnOnce(Arc<BalanceBook>) -> Arc<dyn PayoutSink>,
    ) -> Self {
        let clock = ManualClock::new(GENESIS);
        let verifier = Arc::new(ScriptedVerifier::default());
        let book = Arc::new(BalanceBook::new());
        let owner = addr(0xAA);
        let market = StorageMarket::new(
            owner,
            config,
            verifier.clone(),
            make_sink(book.clone()),
            Arc::new(clock.clone()),
        )
        .expect("fixture config is valid")
        .with_entropy(Arc::new(CountingEntropy::default()));

        Self {
            market: Arc::new(market),
            clock,
            verifier,
            book,
            owner,
        }
    }

    pub fn stake_for(&self, capacity: u64) -> TokenAmount {
        units(self.market.config().stake_per_byte as u128 * capacity as u128)
    }

    pub fn stake(&self, provider: u8, capacity: u64) -> NodeAccount {
        self.market
            .stake(addr(provider), capacity, key(provider), self.stake_for(capacity))
            .expect("stake succeeds")
    }

    pub fn place(&self, client: u8, max_size: u64, periods: u64, replicas: u32) -> OrderId {
        let request = request(max_size, periods, replicas);
        let cost = request.total_cost().expect("cost fits");
        self.market
            .place_order(addr(client), request, cost)
            .expect("order placed")
    }

    pub fn advance_periods(&self, periods: u64) {
        self.clock.advance(periods * PERIOD);
    }

    /// Move past the current round's proof window.
    pub fn close_window(&self) {
        let steps = self.market.config().proof_window_steps + 1;
        self.clock.advance(steps * STEP);
    }

    pub fn events_of(&self, event_type: &str) -> Vec<MarketEvent> {
        self.market
            .events()
            .history()
            .into_iter()
            .map(|record| record.event)
            .filter(|event| event.event_type() == event_type)
            .collect()
    }

    pub fn assert_conserved(&self) {
        let report = self.market.funds_report();
        assert!(report.is_conserved(), "funds not conserved: {:?}", report);
    }

    /// `used ≤ capacity` and `capacity × stakePerByte ≤ stake` for every node.
    pub fn assert_node_invariants(&self, provider: &AccountAddress) {
        if let Some(node) = self.market.node(provider) {
            assert!(node.used <= node.capacity, "{:?}", node);
            let backing = node.capacity as u128 * self.market.config().stake_per_byte as u128;
            assert!(backing <= node.stake.to_base_units(), "{:?}", node);
        } else {
            assert!(self.market.orders_of(provider).is_empty());
        }
    }
}
