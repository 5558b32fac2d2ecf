use crate::error::{MarketError, Result};
use crate::indexed_set::IndexedSet;
use crate::types::{Order, OrderId, OrderRequest};
use keepnet_economics::{AccountAddress, TokenAmount};
use std::collections::HashMap;
use tracing::{debug, info};

/// A freshly placed order and what the client overpaid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order: Order,
    pub overpayment: TokenAmount,
}

/// Owns every live order and its escrow.
pub struct EscrowBook {
    orders: HashMap<OrderId, Order>,
    active: IndexedSet<OrderId>,
    next_id: OrderId,
    max_replicas_per_order: u32,
    cleanup_cursor: usize,
}

impl EscrowBook {
    pub fn new(max_replicas_per_order: u32) -> Self {
        Self {
            orders: HashMap::new(),
            active: IndexedSet::new(),
            next_id: 1,
            max_replicas_per_order,
            cleanup_cursor: 0,
        }
    }

    /// Validate a request and return its total cost.
    pub fn quote(&self, request: &OrderRequest) -> Result<TokenAmount> {
        if request.max_size == 0 {
            return Err(MarketError::invalid("max_size must be positive"));
        }
        if request.periods == 0 {
            return Err(MarketError::invalid("periods must be positive"));
        }
        if request.replicas == 0 {
            return Err(MarketError::invalid("replicas must be positive"));
        }
        if request.replicas > self.max_replicas_per_order {
            return Err(MarketError::invalid(format!(
                "{} replicas exceeds the cap of {}",
                request.replicas, self.max_replicas_per_order
            )));
        }
        if request.price_per_byte_period.is_zero() {
            return Err(MarketError::invalid("price must be positive"));
        }
        request.file.root.require_non_zero("file root")?;

        request
            .total_cost()
            .ok_or_else(|| MarketError::invalid("order cost overflows"))
    }

    pub fn place(
        &mut self,
        owner: AccountAddress,
        request: OrderRequest,
        payment: TokenAmount,
        period: u64,
        now: u64,
    ) -> Result<PlacedOrder> {
        let total_cost = self.quote(&request)?;
        if payment < total_cost {
            return Err(MarketError::InsufficientPayment {
                required: total_cost,
                provided: payment,
            });
        }

        let id = self.next_id;
        self.next_id += 1;

        let order = Order {
            id,
            owner,
            file: request.file,
            max_size: request.max_size,
            periods: request.periods,
            desired_replicas: request.replicas,
            price_per_byte_period: request.price_per_byte_period,
            filled_replicas: 0,
            start_period: period,
            escrow: total_cost,
            escrow_withdrawn: TokenAmount::ZERO,
            placed_at: now,
        };
        self.orders.insert(id, order.clone());
        self.active.insert(id);

        info!(
            order_id = id,
            owner = %owner,
            max_size = order.max_size,
            periods = order.periods,
            replicas = order.desired_replicas,
            escrow = %total_cost,
            "📦 Order placed"
        );

        Ok(PlacedOrder {
            order,
            overpayment: payment.saturating_sub(total_cost),
        })
    }

    pub fn get(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    pub(crate) fn get_mut(&mut self, order_id: OrderId) -> Option<&mut Order> {
        self.orders.get_mut(&order_id)
    }

    pub fn require(&self, order_id: OrderId) -> Result<&Order> {
        self.orders
            .get(&order_id)
            .ok_or(MarketError::OrderNotFound(order_id))
    }

    /// Order that exists and has not reached its end period.
    pub fn require_live(&self, order_id: OrderId, period: u64) -> Result<&Order> {
        let order = self.require(order_id)?;
        if order.is_expired(period) {
            return Err(MarketError::state(format!("order {} has expired", order_id)));
        }
        Ok(order)
    }

    /// Drop an order, returning it with whatever escrow it still holds.
    pub(crate) fn remove(&mut self, order_id: OrderId) -> Option<Order> {
        let order = self.orders.remove(&order_id)?;
        self.active.remove(&order_id);
        debug!(order_id, remaining = %order.remaining_escrow(), "🗑️ Order removed");
        Some(order)
    }

    /// Expired orders found by scanning at most `scan_limit` active entries from a
    /// rotating cursor, stopping after `max`.
    pub(crate) fn expired_batch(&mut self, period: u64, scan_limit: usize, max: usize) -> Vec<OrderId> {
        let len = self.active.len();
        if len == 0 {
            self.cleanup_cursor = 0;
            return Vec::new();
        }

        let mut expired = Vec::new();
        let start = self.cleanup_cursor % len;
        let mut scanned = 0;
        while scanned < scan_limit.min(len) && expired.len() < max {
            let index = (start + scanned) % len;
            if let Some(order) = self.active.get(index).and_then(|id| self.orders.get(id)) {
                if order.is_expired(period) {
                    expired.push(order.id);
                }
            }
            scanned += 1;
        }
        self.cleanup_cursor = (start + scanned) % len;
        expired
    }

    pub fn active_orders(&self) -> &[OrderId] {
        self.active.as_slice()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Σ (escrow − withdrawn) over live orders.
    pub fn total_held(&self) -> TokenAmount {
        self.orders
            .values()
            .fold(TokenAmount::ZERO, |acc, order| acc.saturating_add(order.remaining_escrow()))
    }
}
