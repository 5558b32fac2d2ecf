use crate::config::MarketConfig;
use crate::types::Tick;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of unix time for period/step arithmetic.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// Clock moved explicitly; clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) -> u64 {
        self.now.fetch_add(secs, Ordering::SeqCst) + secs
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl Tick {
    pub fn at(now: u64, config: &MarketConfig) -> Self {
        let period = now / config.period_secs;
        Self {
            now,
            period,
            epoch: period / config.periods_per_epoch,
            step: now / config.step_secs,
        }
    }
}
