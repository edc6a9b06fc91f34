//! Callback-slot table.
//!
//! One-shot slots are keyed by call instance, not by channel name, so any
//! number of requests can be pending at once and each resolves on its own.
//! Persistent listeners are keyed by subscription and grouped by channel.

use crate::actions::{ListenerChannel, SubscriptionId};
use billing_bridge_core::{CallbackTarget, ProductId, ProductKind, RequestId};
use std::collections::BTreeMap;

/// Identifier of one pending request.
///
/// Allocated in increasing order, so iteration order over pending slots is
/// submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallId(pub u64);

/// What a pending one-shot slot is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingCall {
    /// A catalog response echoing this call's request id.
    Load {
        /// Kind recorded on the returned products.
        kind: ProductKind,
    },
    /// A transaction event for this product.
    Purchase {
        /// Product being purchased.
        product_id: ProductId,
    },
    /// The restore flow's terminal signal.
    Restore,
}

#[derive(Debug, Clone)]
struct PendingSlot {
    call: PendingCall,
    target: CallbackTarget,
}

#[derive(Debug, Clone)]
struct Listener {
    channel: ListenerChannel,
    target: CallbackTarget,
}

/// Pending one-shot slots and persistent listeners.
#[derive(Debug, Clone, Default)]
pub struct CallbackSlots {
    next_call: u64,
    pending: BTreeMap<CallId, PendingSlot>,
    listeners: BTreeMap<SubscriptionId, Listener>,
}

impl CallbackSlots {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // One-shot slots
    // ═══════════════════════════════════════════════════════════════════════

    fn open(&mut self, call: PendingCall, target: CallbackTarget) -> CallId {
        self.next_call += 1;
        let id = CallId(self.next_call);
        self.pending.insert(id, PendingSlot { call, target });
        id
    }

    /// Register a catalog load; the returned request id correlates the response.
    pub fn open_load(&mut self, kind: ProductKind, target: CallbackTarget) -> RequestId {
        let CallId(id) = self.open(PendingCall::Load { kind }, target);
        RequestId(id)
    }

    /// Register a purchase for `product_id`.
    pub fn open_purchase(&mut self, product_id: ProductId, target: CallbackTarget) -> CallId {
        self.open(PendingCall::Purchase { product_id }, target)
    }

    /// Register a restore.
    pub fn open_restore(&mut self, target: CallbackTarget) -> CallId {
        self.open(PendingCall::Restore, target)
    }

    /// Clear and return the load slot for `request`, with the kind it asked for.
    pub fn take_load(&mut self, request: RequestId) -> Option<(ProductKind, CallbackTarget)> {
        let id = CallId(request.0);
        match self.pending.get(&id) {
            Some(PendingSlot {
                call: PendingCall::Load { .. },
                ..
            }) => {},
            _ => return None,
        }
        self.pending.remove(&id).and_then(|slot| match slot.call {
            PendingCall::Load { kind } => Some((kind, slot.target)),
            _ => None,
        })
    }

    /// Clear and return the oldest pending purchase slot for `product_id`.
    pub fn take_purchase(&mut self, product_id: &str) -> Option<CallbackTarget> {
        let id = self.pending.iter().find_map(|(id, slot)| match &slot.call {
            PendingCall::Purchase { product_id: pending } if pending == product_id => Some(*id),
            _ => None,
        })?;
        self.pending.remove(&id).map(|slot| slot.target)
    }

    /// Returns `true` if a purchase for `product_id` is awaiting resolution.
    #[must_use]
    pub fn has_pending_purchase(&self, product_id: &str) -> bool {
        self.pending.values().any(|slot| {
            matches!(&slot.call, PendingCall::Purchase { product_id: pending } if pending == product_id)
        })
    }

    /// Clear and return every pending restore slot, oldest first.
    pub fn take_restores(&mut self) -> Vec<CallbackTarget> {
        let ids: Vec<CallId> = self
            .pending
            .iter()
            .filter(|(_, slot)| slot.call == PendingCall::Restore)
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.pending.remove(&id))
            .map(|slot| slot.target)
            .collect()
    }

    /// Clear and return every pending slot, oldest first.
    pub fn take_all_pending(&mut self) -> Vec<CallbackTarget> {
        std::mem::take(&mut self.pending)
            .into_values()
            .map(|slot| slot.target)
            .collect()
    }

    /// Number of one-shot slots awaiting resolution.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Calls awaiting resolution, in submission order.
    pub fn pending_calls(&self) -> impl Iterator<Item = (CallId, &PendingCall)> {
        self.pending.iter().map(|(id, slot)| (*id, &slot.call))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Persistent listeners
    // ═══════════════════════════════════════════════════════════════════════

    /// Register (or replace) a persistent listener.
    pub fn subscribe(
        &mut self,
        channel: ListenerChannel,
        subscription: SubscriptionId,
        target: CallbackTarget,
    ) {
        self.listeners
            .insert(subscription, Listener { channel, target });
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, subscription: SubscriptionId) -> bool {
        self.listeners.remove(&subscription).is_some()
    }

    /// Live listeners on `channel`, in subscription order.
    ///
    /// Listeners whose receiving side has gone away are pruned first.
    pub fn listeners(&mut self, channel: ListenerChannel) -> Vec<CallbackTarget> {
        self.listeners.retain(|subscription, listener| {
            let alive = listener.target.is_alive();
            if !alive {
                tracing::debug!(%subscription, channel = %listener.channel, "Pruning dead listener");
            }
            alive
        });
        self.listeners
            .values()
            .filter(|listener| listener.channel == channel)
            .map(|listener| listener.target.clone())
            .collect()
    }

    /// Number of registered listeners, live or not.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Drop every listener.
    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }
}
