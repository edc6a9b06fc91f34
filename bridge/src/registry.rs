//! Transaction Registry.
//!
//! Authoritative cache of the most recently observed transaction per product
//! and of the product catalog, plus the working set of the restore flow in
//! progress. Owned by the router's state; nothing else writes to it.

use billing_bridge_core::{Product, ProductId, Transaction, TransactionState};
use std::collections::{HashMap, HashSet};

/// Product and transaction caches.
///
/// Entries are never removed: finalizing a transaction is a backend-side
/// operation and a client may look the transaction up again afterwards.
#[derive(Debug, Clone, Default)]
pub struct TransactionRegistry {
    transactions: HashMap<ProductId, Transaction>,
    products: HashMap<ProductId, Product>,
    restoring: Vec<Transaction>,
    /// Backend ids of transactions already routed past `Purchasing`.
    settled: HashSet<String>,
}

impl TransactionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current entry for the transaction's product.
    ///
    /// A later event wins regardless of state ordering. Restored
    /// transactions are also appended to the restore working set. A
    /// redelivery of a transaction already in the set (same backend id, or
    /// same product when the backend gave no id) replaces it in place.
    pub fn upsert(&mut self, transaction: Transaction) {
        if transaction.state == TransactionState::Restored {
            match self
                .restoring
                .iter_mut()
                .find(|t| Self::same_transaction(t, &transaction))
            {
                Some(existing) => *existing = transaction.clone(),
                None => self.restoring.push(transaction.clone()),
            }
        }
        if transaction.state != TransactionState::Purchasing {
            if let Some(id) = &transaction.transaction_id {
                self.settled.insert(id.clone());
            }
        }
        self.transactions
            .insert(transaction.product_id.clone(), transaction);
    }

    fn same_transaction(a: &Transaction, b: &Transaction) -> bool {
        match (&a.transaction_id, &b.transaction_id) {
            (Some(a), Some(b)) => a == b,
            (None, None) => a.product_id == b.product_id,
            _ => false,
        }
    }

    /// Forget a transaction the backend removed from its queue.
    ///
    /// Returns `true` if it had already been routed past `Purchasing`, in
    /// which case its outcome was delivered and the removal is only
    /// housekeeping.
    pub fn forget_settled(&mut self, transaction: &Transaction) -> bool {
        transaction
            .transaction_id
            .as_ref()
            .is_some_and(|id| self.settled.remove(id))
    }

    /// Current transaction for `product_id`, if one was ever observed.
    #[must_use]
    pub fn lookup(&self, product_id: &str) -> Option<&Transaction> {
        self.transactions.get(product_id)
    }

    /// Insert or replace a catalog entry.
    pub fn upsert_product(&mut self, product: Product) {
        self.products.insert(product.id.clone(), product);
    }

    /// Catalog entry for `product_id`.
    #[must_use]
    pub fn lookup_product(&self, product_id: &str) -> Option<&Product> {
        self.products.get(product_id)
    }

    /// Start a new restore flow: forget whatever the previous one collected.
    pub fn begin_restore(&mut self) {
        self.restoring.clear();
    }

    /// Take the restore working set, in accumulation order.
    pub fn drain_restored(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.restoring)
    }

    /// The restore working set, in accumulation order.
    #[must_use]
    pub fn restoring(&self) -> &[Transaction] {
        &self.restoring
    }

    /// Number of products with a cached transaction.
    #[must_use]
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Number of cached catalog entries.
    #[must_use]
    pub fn product_count(&self) -> usize {
        self.products.len()
    }
}
