//! Assignment Index
//!
//! The many-to-many relation between orders and the providers holding their
//! replicas. Each assignment records its position in both membership lists so a
//! removal is a swap-remove on each side plus one slot fix-up for whichever entry
//! moved. The challengeable set holds exactly the orders with at least one
//! assignment.

use crate::indexed_set::IndexedSet;
use crate::types::{Assignment, OrderId};
use keepnet_economics::{AccountAddress, TokenAmount};
use std::collections::HashMap;
use tracing::debug;

#[derive(Default)]
pub struct AssignmentIndex {
    pairs: HashMap<(OrderId, AccountAddress), Assignment>,
    provider_orders: HashMap<AccountAddress, Vec<OrderId>>,
    order_providers: HashMap<OrderId, Vec<AccountAddress>>,
    challengeable: IndexedSet<OrderId>,
}

impl AssignmentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` (and changes nothing) if the pair already exists.
    pub(crate) fn insert(
        &mut self,
        order_id: OrderId,
        provider: AccountAddress,
        start_period: u64,
        started_at: u64,
    ) -> bool {
        if self.pairs.contains_key(&(order_id, provider)) {
            return false;
        }

        let orders = self.provider_orders.entry(provider).or_default();
        let provider_slot = orders.len();
        orders.push(order_id);

        let providers = self.order_providers.entry(order_id).or_default();
        let order_slot = providers.len();
        providers.push(provider);

        self.pairs.insert(
            (order_id, provider),
            Assignment {
                order_id,
                provider,
                start_period,
                started_at,
                earned: TokenAmount::ZERO,
                provider_slot,
                order_slot,
            },
        );
        self.challengeable.insert(order_id);

        debug!(order_id, provider = %provider, provider_slot, order_slot, "🔗 Assignment added");
        true
    }

    pub(crate) fn remove(&mut self, order_id: OrderId, provider: &AccountAddress) -> Option<Assignment> {
        let assignment = self.pairs.remove(&(order_id, *provider))?;

        if let Some(orders) = self.provider_orders.get_mut(provider) {
            orders.swap_remove(assignment.provider_slot);
            if let Some(&moved) = orders.get(assignment.provider_slot) {
                if let Some(entry) = self.pairs.get_mut(&(moved, *provider)) {
                    entry.provider_slot = assignment.provider_slot;
                }
            }
            if orders.is_empty() {
                self.provider_orders.remove(provider);
            }
        }

        if let Some(providers) = self.order_providers.get_mut(&order_id) {
            providers.swap_remove(assignment.order_slot);
            if let Some(&moved) = providers.get(assignment.order_slot) {
                if let Some(entry) = self.pairs.get_mut(&(order_id, moved)) {
                    entry.order_slot = assignment.order_slot;
                }
            }
            if providers.is_empty() {
                self.order_providers.remove(&order_id);
                self.challengeable.remove(&order_id);
            }
        }

        debug!(order_id, provider = %provider, "✂️ Assignment removed");
        Some(assignment)
    }

    pub fn get(&self, order_id: OrderId, provider: &AccountAddress) -> Option<&Assignment> {
        self.pairs.get(&(order_id, *provider))
    }

    pub(crate) fn get_mut(&mut self, order_id: OrderId, provider: &AccountAddress) -> Option<&mut Assignment> {
        self.pairs.get_mut(&(order_id, *provider))
    }

    pub fn contains(&self, order_id: OrderId, provider: &AccountAddress) -> bool {
        self.pairs.contains_key(&(order_id, *provider))
    }

    pub fn orders_of(&self, provider: &AccountAddress) -> &[OrderId] {
        self.provider_orders
            .get(provider)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn providers_of(&self, order_id: OrderId) -> &[AccountAddress] {
        self.order_providers
            .get(&order_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn count_for(&self, provider: &AccountAddress) -> usize {
        self.orders_of(provider).len()
    }

    pub fn challengeable(&self) -> &[OrderId] {
        self.challengeable.as_slice()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Every stored slot points back at its own list entry.
    #[cfg(test)]
    pub(crate) fn slots_consistent(&self) -> bool {
        self.pairs.values().all(|a| {
            self.orders_of(&a.provider).get(a.provider_slot) == Some(&a.order_id)
                && self.providers_of(a.order_id).get(a.order_slot) == Some(&a.provider)
        }) && self
            .challengeable
            .as_slice()
            .iter()
            .all(|id| !self.providers_of(*id).is_empty())
            && self.order_providers.keys().all(|id| self.challengeable.contains(id))
    }
}
