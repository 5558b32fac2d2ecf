//! Market event log
//!
//! Every state transition produces a [`MarketEvent`]. Events are appended to a
//! bounded in-memory history and fanned out to subscribers over a broadcast
//! channel for external indexers. Nothing inside the market reads them back.

use crate::types::OrderId;
use keepnet_economics::{AccountAddress, TokenAmount, TransferReason};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MarketEvent {
    NodeStaked {
        provider: AccountAddress,
        capacity: u64,
        stake: TokenAmount,
    },
    NodeCapacityAdjusted {
        provider: AccountAddress,
        capacity: u64,
        stake: TokenAmount,
    },
    NodeUnstaked {
        provider: AccountAddress,
        returned: TokenAmount,
    },
    NodeSlashed {
        provider: AccountAddress,
        amount: TokenAmount,
        burned: TokenAmount,
        forced_exit: bool,
    },
    NodeForcedExit {
        provider: AccountAddress,
        orders_released: usize,
        bytes_freed: u64,
    },
    OrderPlaced {
        order_id: OrderId,
        owner: AccountAddress,
        max_size: u64,
        periods: u64,
        replicas: u32,
        escrow: TokenAmount,
    },
    OrderFilled {
        order_id: OrderId,
        provider: AccountAddress,
        filled_replicas: u32,
    },
    ReplicaReleased {
        order_id: OrderId,
        provider: AccountAddress,
        slashed: TokenAmount,
    },
    OrderUnderReplicated {
        order_id: OrderId,
        filled_replicas: u32,
        desired_replicas: u32,
    },
    OrderCompleted {
        order_id: OrderId,
        refunded: TokenAmount,
    },
    OrderCancelled {
        order_id: OrderId,
        penalty: TokenAmount,
        refunded: TokenAmount,
    },
    RewardClaimed {
        provider: AccountAddress,
        amount: TokenAmount,
    },
    ChallengeIssued {
        round_id: u64,
        step: u64,
        primary: Option<AccountAddress>,
        secondaries: usize,
        orders: Vec<OrderId>,
    },
    ProofSubmitted {
        round_id: u64,
        provider: AccountAddress,
        order_id: OrderId,
        primary: bool,
    },
    ProverFailed {
        round_id: u64,
        provider: AccountAddress,
        order_id: OrderId,
        primary: bool,
        slashed: TokenAmount,
    },
    ReporterRewarded {
        reporter: AccountAddress,
        amount: TokenAmount,
    },
    ReporterRewardClaimed {
        reporter: AccountAddress,
        amount: TokenAmount,
    },
    RefundQueued {
        recipient: AccountAddress,
        amount: TokenAmount,
        reason: TransferReason,
    },
    RefundWithdrawn {
        recipient: AccountAddress,
        amount: TokenAmount,
    },
    AuthorityChanged {
        authority: Option<AccountAddress>,
    },
    ReporterBpsChanged {
        bps: u32,
    },
    OwnershipTransferred {
        previous: AccountAddress,
        owner: AccountAddress,
    },
}

impl MarketEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            MarketEvent::NodeStaked { .. } => "NodeStaked",
            MarketEvent::NodeCapacityAdjusted { .. } => "NodeCapacityAdjusted",
            MarketEvent::NodeUnstaked { .. } => "NodeUnstaked",
            MarketEvent::NodeSlashed { .. } => "NodeSlashed",
            MarketEvent::NodeForcedExit { .. } => "NodeForcedExit",
            MarketEvent::OrderPlaced { .. } => "OrderPlaced",
            MarketEvent::OrderFilled { .. } => "OrderFilled",
            MarketEvent::ReplicaReleased { .. } => "ReplicaReleased",
            MarketEvent::OrderUnderReplicated { .. } => "OrderUnderReplicated",
            MarketEvent::OrderCompleted { .. } => "OrderCompleted",
            MarketEvent::OrderCancelled { .. } => "OrderCancelled",
            MarketEvent::RewardClaimed { .. } => "RewardClaimed",
            MarketEvent::ChallengeIssued { .. } => "ChallengeIssued",
            MarketEvent::ProofSubmitted { .. } => "ProofSubmitted",
            MarketEvent::ProverFailed { .. } => "ProverFailed",
            MarketEvent::ReporterRewarded { .. } => "ReporterRewarded",
            MarketEvent::ReporterRewardClaimed { .. } => "ReporterRewardClaimed",
            MarketEvent::RefundQueued { .. } => "RefundQueued",
            MarketEvent::RefundWithdrawn { .. } => "RefundWithdrawn",
            MarketEvent::AuthorityChanged { .. } => "AuthorityChanged",
            MarketEvent::ReporterBpsChanged { .. } => "ReporterBpsChanged",
            MarketEvent::OwnershipTransferred { .. } => "OwnershipTransferred",
        }
    }
}

/// An event stamped with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,
    /// Unix seconds
    pub timestamp: u64,
    pub event: MarketEvent,
}

struct LogInner {
    history: VecDeque<EventRecord>,
    next_sequence: u64,
}

/// Append-only market event log with a bounded history.
pub struct EventLog {
    inner: Mutex<LogInner>,
    capacity: usize,
    sender: broadcast::Sender<EventRecord>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            inner: Mutex::new(LogInner {
                history: VecDeque::with_capacity(capacity),
                next_sequence: 0,
            }),
            capacity,
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    pub fn publish(&self, timestamp: u64, event: MarketEvent) -> u64 {
        let record = {
            let mut inner = self.inner.lock();
            let record = EventRecord {
                sequence: inner.next_sequence,
                timestamp,
                event,
            };
            inner.next_sequence += 1;
            if inner.history.len() == self.capacity {
                inner.history.pop_front();
            }
            inner.history.push_back(record.clone());
            record
        };

        let sequence = record.sequence;
        let event_type = record.event.event_type();
        // No subscribers is the normal case.
        let subscribers = self.sender.send(record).unwrap_or(0);
        debug!(sequence, event_type, subscribers, "📣 Event emitted");
        sequence
    }

    /// Total events ever published.
    pub fn published(&self) -> u64 {
        self.inner.lock().next_sequence
    }

    pub fn history(&self) -> Vec<EventRecord> {
        self.inner.lock().history.iter().cloned().collect()
    }

    /// The last `n` retained events, oldest first.
    pub fn recent(&self, n: usize) -> Vec<EventRecord> {
        let inner = self.inner.lock();
        let skip = inner.history.len().saturating_sub(n);
        inner.history.iter().skip(skip).cloned().collect()
    }

    pub fn count_of(&self, event_type: &str) -> usize {
        self.inner
            .lock()
            .history
            .iter()
            .filter(|record| record.event.event_type() == event_type)
            .count()
    }
}
