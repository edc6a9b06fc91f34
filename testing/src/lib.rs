//! # Billing Bridge Testing
//!
//! Testing utilities and helpers for the billing bridge.
//!
//! This crate provides:
//! - Mock implementations of the backend collaborator traits
//! - Reply capture helpers for callback targets
//! - Fixtures and property-based testing strategies
//! - The [`ReducerTest`] given/when/then harness
//!
//! ## Example
//!
//! ```ignore
//! use billing_bridge_testing::{mocks::MockBackend, fixtures};
//!
//! #[tokio::test]
//! async fn test_purchase_flow() {
//!     let backend = MockBackend::new();
//!     let bridge = BillingBridge::start(environment(&backend), BridgeConfig::default());
//!
//!     backend.emit(BackendEvent::TransactionsUpdated(vec![
//!         fixtures::transaction("gems_100", TransactionState::Purchased, 1),
//!     ]));
//! }
//! ```

use billing_bridge_core::{CallbackTarget, Reply, ReplyReceiver};


pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations of the backend collaborators
///
/// Every mock records what it was asked to do behind an
/// `Arc<Mutex<..>>`, so clones share the same record and tests can inspect
/// it after handing a clone to the code under test.
pub mod mocks {
    use billing_bridge_core::{
        BackendCall, BackendEvent, Product, ProductId, ProductKind, PurchaseBackend,
        ReceiptProvider, RequestId, Transaction, TransactionObserver, UrlOpener,
        environment::EffectEnvironment,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// Mock purchasing backend.
    ///
    /// Records every call and lets tests emit synthetic events through the
    /// observer the bridge installed.
    #[derive(Clone)]
    pub struct MockBackend {
        calls: Arc<Mutex<Vec<BackendCall>>>,
        observer: Arc<Mutex<Option<TransactionObserver>>>,
        observers_installed: Arc<Mutex<usize>>,
        can_pay: Arc<AtomicBool>,
    }

    impl MockBackend {
        /// Creates a new mock backend that accepts payments.
        #[must_use]
        pub fn new() -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                observer: Arc::new(Mutex::new(None)),
                observers_installed: Arc::new(Mutex::new(0)),
                can_pay: Arc::new(AtomicBool::new(true)),
            }
        }

        /// Creates a mock backend whose capability flag is off.
        #[must_use]
        pub fn with_payments_disabled() -> Self {
            let backend = Self::new();
            backend.set_can_make_payments(false);
            backend
        }

        /// Flip the purchasing-capability flag.
        pub fn set_can_make_payments(&self, enabled: bool) {
            self.can_pay.store(enabled, Ordering::SeqCst);
        }

        /// Emit an event through the installed observer.
        ///
        /// Returns `false` if no observer has been installed yet.
        pub fn emit(&self, event: BackendEvent) -> bool {
            let observer = self.observer.lock().ok().and_then(|guard| guard.clone());
            match observer {
                Some(observer) => {
                    observer(event);
                    true
                },
                None => false,
            }
        }

        /// All calls so far, in order.
        #[must_use]
        pub fn calls(&self) -> Vec<BackendCall> {
            self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
        }

        /// Drain the recorded calls.
        #[must_use]
        pub fn take_calls(&self) -> Vec<BackendCall> {
            self.calls
                .lock()
                .map(|mut calls| std::mem::take(&mut *calls))
                .unwrap_or_default()
        }

        /// Product ids of finalized transactions, in finalize order.
        #[must_use]
        pub fn finished_product_ids(&self) -> Vec<ProductId> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    BackendCall::FinishTransaction(transaction) => Some(transaction.product_id),
                    _ => None,
                })
                .collect()
        }

        /// Request ids of catalog requests, in order.
        #[must_use]
        pub fn product_requests(&self) -> Vec<RequestId> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    BackendCall::RequestProducts { request, .. } => Some(request),
                    _ => None,
                })
                .collect()
        }

        /// How many times an observer was installed.
        #[must_use]
        pub fn observers_installed(&self) -> usize {
            self.observers_installed.lock().map(|n| *n).unwrap_or_default()
        }

        fn record(&self, call: BackendCall) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call);
            }
        }
    }

    impl Default for MockBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    impl std::fmt::Debug for MockBackend {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockBackend")
                .field("calls", &self.calls())
                .field("can_pay", &self.can_pay.load(Ordering::SeqCst))
                .finish_non_exhaustive()
        }
    }

    impl PurchaseBackend for MockBackend {
        fn request_products(&self, request: RequestId, ids: &[ProductId], kind: ProductKind) {
            self.record(BackendCall::RequestProducts {
                request,
                ids: ids.to_vec(),
                kind,
            });
        }

        fn submit_purchase(&self, product: &Product) {
            self.record(BackendCall::SubmitPurchase(product.clone()));
        }

        fn restore_completed_transactions(&self) {
            self.record(BackendCall::RestoreCompletedTransactions);
        }

        fn finish_transaction(&self, transaction: &Transaction) {
            self.record(BackendCall::FinishTransaction(transaction.clone()));
        }

        fn can_make_payments(&self) -> bool {
            self.can_pay.load(Ordering::SeqCst)
        }

        fn set_observer(&self, observer: TransactionObserver) {
            if let Ok(mut slot) = self.observer.lock() {
                *slot = Some(observer);
            }
            if let Ok(mut n) = self.observers_installed.lock() {
                *n += 1;
            }
        }
    }

    /// Mock receipt provider.
    ///
    /// Returns a fixed app-level receipt (or none).
    #[derive(Debug, Clone, Default)]
    pub struct MockReceiptProvider {
        receipt: Option<Vec<u8>>,
    }

    impl MockReceiptProvider {
        /// Provider without an app receipt.
        #[must_use]
        pub const fn new() -> Self {
            Self { receipt: None }
        }

        /// Provider returning `receipt`.
        #[must_use]
        pub const fn with_receipt(receipt: Vec<u8>) -> Self {
            Self {
                receipt: Some(receipt),
            }
        }
    }

    impl ReceiptProvider for MockReceiptProvider {
        fn app_receipt(&self) -> Option<Vec<u8>> {
            self.receipt.clone()
        }
    }

    /// Mock URL opener.
    ///
    /// Records opened URLs; whether a URL can be opened is a single flag.
    #[derive(Debug, Clone)]
    pub struct MockUrlOpener {
        openable: Arc<AtomicBool>,
        opened: Arc<Mutex<Vec<String>>>,
    }

    impl MockUrlOpener {
        /// Opener that accepts every URL.
        #[must_use]
        pub fn new() -> Self {
            Self {
                openable: Arc::new(AtomicBool::new(true)),
                opened: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Opener that refuses every URL.
        #[must_use]
        pub fn refusing() -> Self {
            let opener = Self::new();
            opener.openable.store(false, Ordering::SeqCst);
            opener
        }

        /// URLs opened so far.
        #[must_use]
        pub fn opened(&self) -> Vec<String> {
            self.opened.lock().map(|urls| urls.clone()).unwrap_or_default()
        }
    }

    impl Default for MockUrlOpener {
        fn default() -> Self {
            Self::new()
        }
    }

    impl UrlOpener for MockUrlOpener {
        fn can_open(&self, _url: &str) -> bool {
            self.openable.load(Ordering::SeqCst)
        }

        fn open(&self, url: &str) {
            if let Ok(mut urls) = self.opened.lock() {
                urls.push(url.to_string());
            }
        }
    }

    /// Effect environment over the mocks.
    ///
    /// Enough to drive a runtime store without the bridge crate.
    #[derive(Debug, Clone, Default)]
    pub struct MockEffectEnvironment {
        /// Backend mock.
        pub backend: MockBackend,
        /// URL opener mock.
        pub url_opener: MockUrlOpener,
    }

    impl MockEffectEnvironment {
        /// Creates a new environment over fresh mocks.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl EffectEnvironment for MockEffectEnvironment {
        fn backend(&self) -> &dyn PurchaseBackend {
            &self.backend
        }

        fn url_opener(&self) -> &dyn UrlOpener {
            &self.url_opener
        }
    }
}

/// Test fixtures
///
/// Timestamps are whole seconds after a fixed epoch
/// (2025-01-01 00:00:00 UTC) so batches can be ordered deterministically.
pub mod fixtures {
    use billing_bridge_core::{Amount, DateTime, Product, Transaction, TransactionState, Utc};
    use chrono::TimeDelta;

    /// The fixed epoch every fixture timestamp is relative to.
    #[must_use]
    pub fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(1_735_689_600)
    }

    /// `epoch() + seconds`.
    #[must_use]
    pub fn at(seconds: i64) -> DateTime<Utc> {
        epoch() + TimeDelta::seconds(seconds)
    }

    /// A `$0.99` product with title and description derived from `id`.
    #[must_use]
    pub fn product(id: &str) -> Product {
        Product::new(id, format!("{id} title"), format!("{id} description"), Amount::new(99, 2))
            .with_currency_symbol("$")
    }

    /// A transaction for `product_id` created `seconds` after the epoch.
    ///
    /// Transactions past `Purchasing` carry a backend id.
    #[must_use]
    pub fn transaction(product_id: &str, state: TransactionState, seconds: i64) -> Transaction {
        let transaction = Transaction::new(product_id, state, at(seconds));
        if state == TransactionState::Purchasing {
            transaction
        } else {
            transaction.with_id(format!("txn-{product_id}-{seconds}"))
        }
    }
}

/// Property-based testing strategies
pub mod properties {
    use billing_bridge_core::{Transaction, TransactionState};
    use proptest::prelude::*;

    /// Product identifiers as storefronts use them: `[a-z][a-z0-9_.]{0,15}`.
    pub fn product_id() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_.]{0,15}"
    }

    /// Any state, including unmodelled codes.
    pub fn transaction_state() -> impl Strategy<Value = TransactionState> {
        prop_oneof![
            Just(TransactionState::Purchasing),
            Just(TransactionState::Purchased),
            Just(TransactionState::Failed),
            Just(TransactionState::Restored),
            Just(TransactionState::Deferred),
            (5_i64..100).prop_map(TransactionState::Unknown),
        ]
    }

    /// A transaction with an arbitrary product, state and timestamp.
    pub fn transaction() -> impl Strategy<Value = Transaction> {
        (product_id(), transaction_state(), 0_i64..10_000).prop_map(|(id, state, seconds)| {
            super::fixtures::transaction(&id, state, seconds)
        })
    }
}

/// Install a test `tracing` subscriber honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Receiver side of a callback target, with helpers to inspect what arrived.
#[derive(Debug)]
pub struct ReplyCapture {
    rx: ReplyReceiver,
}

impl ReplyCapture {
    /// Create a target and its capture.
    #[must_use]
    pub fn channel() -> (CallbackTarget, Self) {
        let (target, rx) = CallbackTarget::channel();
        (target, Self { rx })
    }

    /// Wrap an existing receiver.
    #[must_use]
    pub const fn from_receiver(rx: ReplyReceiver) -> Self {
        Self { rx }
    }

    /// Next reply if one is already queued.
    pub fn try_next(&mut self) -> Option<Reply> {
        self.rx.try_recv().ok()
    }

    /// Every reply queued so far.
    pub fn drain(&mut self) -> Vec<Reply> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    /// Wait for the next reply, up to `timeout`.
    pub async fn next_within(&mut self, timeout: std::time::Duration) -> Option<Reply> {
        tokio::time::timeout(timeout, self.rx.recv()).await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use billing_bridge_core::{BackendEvent, Payload, PurchaseBackend, TransactionState};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_mock_backend_records_calls() {
        let backend = mocks::MockBackend::new();
        backend.restore_completed_transactions();
        backend.finish_transaction(&fixtures::transaction("a", TransactionState::Failed, 1));

        assert_eq!(backend.calls().len(), 2);
        assert_eq!(backend.finished_product_ids(), vec!["a".to_string()]);
        assert_eq!(backend.take_calls().len(), 2);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_mock_backend_emit_requires_observer() {
        let backend = mocks::MockBackend::new();
        assert!(!backend.emit(BackendEvent::RestoreFinished));

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        backend.set_observer(Arc::new(move |_event| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(backend.emit(BackendEvent::RestoreFinished));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(backend.observers_installed(), 1);
    }

    #[test]
    fn test_payments_disabled() {
        let backend = mocks::MockBackend::with_payments_disabled();
        assert!(!backend.can_make_payments());
    }

    #[test]
    fn test_reply_capture_drain() {
        let (target, mut capture) = ReplyCapture::channel();
        target.deliver(Ok(Payload::Empty));
        target.deliver(Ok(Payload::Products(vec![])));

        let replies = capture.drain();
        assert_eq!(replies.len(), 2);
        assert!(capture.try_next().is_none());
    }

    #[test]
    fn test_reply_capture_waits() {
        let (target, mut capture) = ReplyCapture::channel();
        target.deliver(Ok(Payload::Empty));
        let reply = tokio_test::block_on(capture.next_within(std::time::Duration::from_millis(50)));
        assert_eq!(reply, Some(Ok(Payload::Empty)));
    }

    #[test]
    fn test_fixture_timestamps_are_ordered() {
        assert!(fixtures::at(2) > fixtures::at(1));
        let purchasing = fixtures::transaction("a", TransactionState::Purchasing, 0);
        assert!(purchasing.transaction_id.is_none());
    }
}
