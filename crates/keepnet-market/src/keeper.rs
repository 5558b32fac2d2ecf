//! Background task that keeps the challenge protocol moving by calling
//! [`StorageMarket::trigger_heartbeat`] on a fixed interval.

use crate::error::ErrorKind;
use crate::market::StorageMarket;
use keepnet_economics::AccountAddress;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeeperStats {
    pub ticks: u64,
    pub heartbeats: u64,
    /// Ticks that found the proof window still open
    pub skipped: u64,
    pub errors: u64,
    pub failures_slashed: u64,
    pub orders_completed: u64,
}

pub struct HeartbeatKeeper {
    market: Arc<StorageMarket>,
    caller: AccountAddress,
    interval: Duration,
}

pub struct KeeperHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<KeeperStats>,
}

impl KeeperHandle {
    /// Stop the loop and return what it did.
    pub async fn stop(self) -> KeeperStats {
        let _ = self.shutdown.send(());
        match self.task.await {
            Ok(stats) => stats,
            Err(err) => {
                warn!(error = %err, "Heartbeat keeper task ended abnormally");
                KeeperStats::default()
            }
        }
    }
}

impl HeartbeatKeeper {
    /// `caller` collects the reporter share of every slash the keeper triggers.
    pub fn new(market: Arc<StorageMarket>, caller: AccountAddress, interval: Duration) -> Self {
        Self {
            market,
            caller,
            interval,
        }
    }

    pub fn spawn(self) -> KeeperHandle {
        let (shutdown, mut stop) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut stats = KeeperStats::default();

            info!(caller = %self.caller, interval_ms = self.interval.as_millis() as u64, "🫀 Heartbeat keeper started");
            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = interval.tick() => {
                        stats.ticks += 1;
                        self.beat(&mut stats);
                    }
                }
            }
            info!(
                ticks = stats.ticks,
                heartbeats = stats.heartbeats,
                errors = stats.errors,
                "🫀 Heartbeat keeper stopped"
            );
            stats
        });

        KeeperHandle { shutdown, task }
    }

    fn beat(&self, stats: &mut KeeperStats) {
        match self.market.trigger_heartbeat(self.caller) {
            Ok(report) => {
                stats.heartbeats += 1;
                stats.failures_slashed += report.failures_slashed as u64;
                stats.orders_completed += report.orders_completed as u64;
            }
            Err(err) if err.kind() == ErrorKind::StatePrecondition => {
                stats.skipped += 1;
                debug!(reason = %err, "Heartbeat not due");
            }
            Err(err) => {
                stats.errors += 1;
                warn!(error = %err, kind = ?err.kind(), "Heartbeat failed");
            }
        }
    }
}
