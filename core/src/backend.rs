//! Purchasing backend collaborator.
//!
//! The backend is opaque: it accepts a handful of operations and reports
//! everything that happens through a single observer installed once at
//! startup. Operations are fire-and-forget; outcomes come back as
//! [`BackendEvent`]s, possibly out of order, possibly more than once.

use std::sync::Arc;

use crate::model::{Product, ProductId, ProductKind, RequestId, Transaction};

/// Callback the backend invokes for every event it emits.
///
/// Implementations must not block; the bridge's observer only enqueues.
pub type TransactionObserver = Arc<dyn Fn(BackendEvent) + Send + Sync>;

/// Purchasing backend.
///
/// This trait abstracts over platform billing services (a payment queue,
/// a billing client). Every method must return promptly.
pub trait PurchaseBackend: Send + Sync {
    /// Request catalog metadata. The response echoes `request`.
    fn request_products(&self, request: RequestId, ids: &[ProductId], kind: ProductKind);

    /// Submit a purchase for a catalog product.
    fn submit_purchase(&self, product: &Product);

    /// Start recovering previously completed transactions.
    fn restore_completed_transactions(&self);

    /// Mark a transaction as fully processed.
    fn finish_transaction(&self, transaction: &Transaction);

    /// Purchasing-capability flag.
    fn can_make_payments(&self) -> bool;

    /// Install the event observer. Called exactly once, at startup.
    fn set_observer(&self, observer: TransactionObserver);
}

/// Proof-of-purchase provider.
pub trait ReceiptProvider: Send + Sync {
    /// App-level receipt blob, if one exists.
    fn app_receipt(&self) -> Option<Vec<u8>>;
}

/// Opens external surfaces (e.g. the subscription management page).
pub trait UrlOpener: Send + Sync {
    /// Whether the platform can open `url`.
    fn can_open(&self, url: &str) -> bool;

    /// Open `url`.
    fn open(&self, url: &str);
}

/// An operation for the backend, as described by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    /// Catalog metadata request.
    RequestProducts {
        /// Correlation id echoed on the response.
        request: RequestId,
        /// Requested identifiers.
        ids: Vec<ProductId>,
        /// Requested kind.
        kind: ProductKind,
    },
    /// Purchase submission.
    SubmitPurchase(Product),
    /// Restore of completed transactions.
    RestoreCompletedTransactions,
    /// Finalization of a transaction.
    FinishTransaction(Transaction),
}

impl BackendCall {
    /// Issue this call to `backend`.
    pub fn dispatch(&self, backend: &dyn PurchaseBackend) {
        match self {
            Self::RequestProducts { request, ids, kind } => backend.request_products(*request, ids, *kind),
            Self::SubmitPurchase(product) => backend.submit_purchase(product),
            Self::RestoreCompletedTransactions => backend.restore_completed_transactions(),
            Self::FinishTransaction(transaction) => backend.finish_transaction(transaction),
        }
    }

    /// Short name for logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RequestProducts { .. } => "request_products",
            Self::SubmitPurchase(_) => "submit_purchase",
            Self::RestoreCompletedTransactions => "restore_completed_transactions",
            Self::FinishTransaction(_) => "finish_transaction",
        }
    }
}

/// Everything the backend can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// A batch of transaction state changes.
    TransactionsUpdated(Vec<Transaction>),

    /// Transactions removed from the backend queue.
    TransactionsRemoved(Vec<Transaction>),

    /// Restore flow completed; every restored transaction has been reported.
    RestoreFinished,

    /// Restore flow failed.
    RestoreFailed {
        /// Backend error description.
        message: Option<String>,
    },

    /// Catalog response.
    ProductsReceived {
        /// Correlation id of the request.
        request: RequestId,
        /// Products the storefront knows about.
        products: Vec<Product>,
        /// Requested ids the storefront did not recognize.
        invalid_ids: Vec<ProductId>,
    },

    /// Catalog request failed.
    ProductsRequestFailed {
        /// Correlation id of the request.
        request: RequestId,
        /// Backend response code.
        code: i64,
        /// Backend error description.
        message: Option<String>,
    },
}

impl BackendEvent {
    /// Short name for logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TransactionsUpdated(_) => "transactions_updated",
            Self::TransactionsRemoved(_) => "transactions_removed",
            Self::RestoreFinished => "restore_finished",
            Self::RestoreFailed { .. } => "restore_failed",
            Self::ProductsReceived { .. } => "products_received",
            Self::ProductsRequestFailed { .. } => "products_request_failed",
        }
    }
}
