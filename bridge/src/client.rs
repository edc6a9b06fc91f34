//! Client facade.
//!
//! [`BillingBridge`] owns the store, installs the backend observer, and turns
//! every client operation into an action plus a one-shot reply channel.

use crate::actions::{BillingAction, ListenerChannel, SubscriptionId};
use crate::{BillingEnvironment, BillingReducer, BillingState, BridgeConfig};
use billing_bridge_core::{
    BillingError, CallbackTarget, Payload, Product, ProductView, PurchaseResultView, Reply,
    ReplyReceiver, Transaction,
};
use billing_bridge_runtime::{Store, StoreError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A persistent subscription.
///
/// Dropping it is enough to stop deliveries; the router prunes the listener
/// on its next delivery attempt. [`BillingBridge::unsubscribe`] removes it
/// eagerly.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    channel: ListenerChannel,
    rx: ReplyReceiver,
}

impl Subscription {
    /// Handle to pass to [`BillingBridge::unsubscribe`].
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Channel this subscription listens on.
    #[must_use]
    pub const fn channel(&self) -> ListenerChannel {
        self.channel
    }

    /// Wait for the next delivery.
    ///
    /// Returns `None` once the bridge has shut down or the subscription was
    /// removed.
    pub async fn next(&mut self) -> Option<Reply> {
        self.rx.recv().await
    }

    /// Next delivery if one is already queued.
    pub fn try_next(&mut self) -> Option<Reply> {
        self.rx.try_recv().ok()
    }

    /// The underlying receiver.
    #[must_use]
    pub fn into_receiver(self) -> ReplyReceiver {
        self.rx
    }
}

/// Client handle of a running bridge.
///
/// Cheap to clone; all clones talk to the same router.
///
/// # Example
///
/// ```ignore
/// let bridge = BillingBridge::start(environment, BridgeConfig::default());
///
/// let products = bridge.load_products(vec!["gems_100".into()], None).await?;
/// let result = bridge.purchase("gems_100").await?;
/// bridge.consume("gems_100").await?;
/// ```
#[derive(Clone)]
pub struct BillingBridge {
    store: Store<BillingState, BillingAction>,
    next_subscription: Arc<AtomicU64>,
}

impl BillingBridge {
    /// Start the router and install the backend observer.
    ///
    /// Must be called from within a Tokio runtime. The observer only
    /// enqueues; the backend may call it from any thread.
    #[must_use]
    pub fn start(environment: BillingEnvironment, config: BridgeConfig) -> Self {
        let backend = Arc::clone(&environment.backend);
        let reducer = BillingReducer::new(&config);
        let store = Store::with_config(BillingState::new(), reducer, environment, config.store);

        let sender = store.sender();
        backend.set_observer(Arc::new(move |event| {
            let name = event.name();
            if let Err(error) = sender.send(BillingAction::Backend(event)) {
                tracing::warn!(event = name, %error, "Dropping backend event");
            }
        }));
        tracing::info!("Billing bridge started");

        Self {
            store,
            next_subscription: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Enqueue a raw action.
    ///
    /// For transport adapters that manage their own callback targets.
    ///
    /// # Errors
    ///
    /// [`BillingError::Unavailable`] once the bridge has shut down.
    pub fn send(&self, action: BillingAction) -> Result<(), BillingError> {
        self.store.send(action).map_err(|error| {
            tracing::debug!(%error, "Bridge unavailable");
            BillingError::Unavailable
        })
    }

    async fn call(&self, build: impl FnOnce(CallbackTarget) -> BillingAction) -> Reply {
        let (reply, mut rx) = CallbackTarget::channel();
        self.send(build(reply))?;
        rx.recv().await.unwrap_or(Err(BillingError::Unavailable))
    }

    /// Load catalog metadata for `ids`.
    ///
    /// `kind` is `inapp` or `subs`; the configured default when `None`.
    ///
    /// # Errors
    ///
    /// - [`BillingError::InvalidProductIdentifiers`] for an empty or blank id list
    /// - [`BillingError::InvalidProductKind`] for an unrecognized kind
    /// - [`BillingError::ProductsRequestFailed`] if the backend rejects the request
    pub async fn load_products(
        &self,
        ids: Vec<String>,
        kind: Option<&str>,
    ) -> Result<Vec<ProductView>, BillingError> {
        let kind = kind.map(str::to_string);
        match self
            .call(|reply| BillingAction::LoadProducts { ids, kind, reply })
            .await?
        {
            Payload::Products(products) => Ok(products),
            other => Err(unexpected("load_products", &other)),
        }
    }

    /// Purchase a product previously returned by [`load_products`](Self::load_products).
    ///
    /// # Errors
    ///
    /// - [`BillingError::ProductNotFound`] if the product is not in the catalog
    /// - [`BillingError::PaymentsDisabled`] if the backend cannot take payments
    /// - [`BillingError::PaymentFailed`], [`BillingError::PaymentDeferred`],
    ///   [`BillingError::PaymentCanceled`] or [`BillingError::UnknownState`]
    ///   as reported by the backend
    pub async fn purchase(&self, product_id: impl Into<String>) -> Result<PurchaseResultView, BillingError> {
        let product_id = product_id.into();
        match self
            .call(|reply| BillingAction::Purchase { product_id, reply })
            .await?
        {
            Payload::Purchase(result) => Ok(result),
            other => Err(unexpected("purchase", &other)),
        }
    }

    /// Restore completed transactions.
    ///
    /// Zero restored transactions is a successful, empty result.
    ///
    /// # Errors
    ///
    /// [`BillingError::RestoreFailed`] if the backend reports a failure.
    pub async fn restore(&self) -> Result<Vec<PurchaseResultView>, BillingError> {
        match self.call(|reply| BillingAction::Restore { reply }).await? {
            Payload::Purchases(results) => Ok(results),
            other => Err(unexpected("restore", &other)),
        }
    }

    /// Finalize the cached transaction of a non-consumable or subscription.
    ///
    /// # Errors
    ///
    /// [`BillingError::TransactionNotFound`] if no transaction is cached for the product.
    pub async fn acknowledge(&self, product_id: impl Into<String>) -> Result<(), BillingError> {
        let product_id = product_id.into();
        self.call(|reply| BillingAction::Acknowledge { product_id, reply })
            .await
            .map(drop)
    }

    /// Finalize the cached transaction of a consumable.
    ///
    /// # Errors
    ///
    /// [`BillingError::TransactionNotFound`] if no transaction is cached for the product.
    pub async fn consume(&self, product_id: impl Into<String>) -> Result<(), BillingError> {
        let product_id = product_id.into();
        self.call(|reply| BillingAction::Consume { product_id, reply })
            .await
            .map(drop)
    }

    /// Open the subscription management surface.
    ///
    /// # Errors
    ///
    /// [`BillingError::ManagementUnavailable`] if the platform cannot open it.
    pub async fn manage_subscriptions(&self) -> Result<(), BillingError> {
        self.call(|reply| BillingAction::ManageSubscriptions { reply })
            .await
            .map(drop)
    }

    /// Listen on `channel` until the subscription is dropped or removed.
    ///
    /// # Errors
    ///
    /// [`BillingError::Unavailable`] once the bridge has shut down.
    pub fn subscribe(&self, channel: ListenerChannel) -> Result<Subscription, BillingError> {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let (target, rx) = CallbackTarget::channel();
        self.send(BillingAction::Subscribe {
            channel,
            subscription: id,
            target,
        })?;
        Ok(Subscription { id, channel, rx })
    }

    /// Every catalog response.
    ///
    /// # Errors
    ///
    /// [`BillingError::Unavailable`] once the bridge has shut down.
    pub fn on_products_loaded(&self) -> Result<Subscription, BillingError> {
        self.subscribe(ListenerChannel::ProductsLoaded)
    }

    /// Every purchase state change.
    ///
    /// # Errors
    ///
    /// [`BillingError::Unavailable`] once the bridge has shut down.
    pub fn on_purchase_updated(&self) -> Result<Subscription, BillingError> {
        self.subscribe(ListenerChannel::PurchaseUpdated)
    }

    /// Every completed restore batch.
    ///
    /// # Errors
    ///
    /// [`BillingError::Unavailable`] once the bridge has shut down.
    pub fn on_purchase_restored(&self) -> Result<Subscription, BillingError> {
        self.subscribe(ListenerChannel::PurchaseRestored)
    }

    /// Remove a persistent subscription.
    ///
    /// # Errors
    ///
    /// [`BillingError::Unavailable`] once the bridge has shut down.
    pub fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), BillingError> {
        self.send(BillingAction::Unsubscribe { subscription })
    }

    /// Wait until everything enqueued so far (including backend events) has
    /// been routed and delivered.
    ///
    /// # Errors
    ///
    /// [`BillingError::Unavailable`] once the bridge has shut down.
    pub async fn settle(&self) -> Result<(), BillingError> {
        self.store
            .settle()
            .await
            .map_err(|_| BillingError::Unavailable)
    }

    /// Cached transaction for `product_id`.
    pub async fn lookup(&self, product_id: &str) -> Option<Transaction> {
        self.store
            .state(|state| state.registry.lookup(product_id).cloned())
            .await
    }

    /// Cached catalog entry for `product_id`.
    pub async fn lookup_product(&self, product_id: &str) -> Option<Product> {
        self.store
            .state(|state| state.registry.lookup_product(product_id).cloned())
            .await
    }

    /// Stop the bridge.
    ///
    /// Requests already queued are still routed; pending callers and later
    /// calls receive [`BillingError::Unavailable`], and every subscription
    /// ends.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the worker does not stop within `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        if self.store.send(BillingAction::Close).is_err() {
            tracing::debug!("Bridge already closing");
        }
        self.store.shutdown(timeout).await
    }
}

impl std::fmt::Debug for BillingBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingBridge").finish_non_exhaustive()
    }
}

fn unexpected(operation: &'static str, payload: &Payload) -> BillingError {
    tracing::error!(operation, ?payload, "Reply payload does not match the request");
    BillingError::UnknownState
}
