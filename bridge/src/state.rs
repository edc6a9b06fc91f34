//! Router state.

use crate::registry::TransactionRegistry;
use crate::slots::CallbackSlots;

/// Everything the router owns.
///
/// Held by the store and mutated only by the reducer on the store's worker.
#[derive(Debug, Clone, Default)]
pub struct BillingState {
    /// Product and transaction caches.
    pub registry: TransactionRegistry,
    /// Pending one-shot slots and persistent listeners.
    pub slots: CallbackSlots,
    /// Set once the bridge stops accepting requests.
    pub closed: bool,
}

impl BillingState {
    /// Fresh state: empty caches, no slots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
