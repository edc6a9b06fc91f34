//! # Billing Bridge
//!
//! Bridges an event-sourced purchasing backend to a client API with one
//! terminal answer per call and persistent listeners for passive
//! notifications.
//!
//! The bridge is two tightly coupled pieces:
//!
//! - **Transaction Registry** ([`registry`]): the latest transaction per
//!   product, the product catalog, and the restore working set.
//! - **Callback Router** ([`reducers`]): classifies every backend event,
//!   updates the registry, and fans replies out to one-shot slots and
//!   persistent listeners ([`slots`]).
//!
//! Both live in [`BillingState`], owned by a single sequential store worker.
//! Client calls and backend events are actions on the same queue, so batches
//! are never routed concurrently.
//!
//! ## Example
//!
//! ```ignore
//! use billing_bridge::{BillingBridge, BillingEnvironment, BridgeConfig};
//!
//! let bridge = BillingBridge::start(
//!     BillingEnvironment::new(backend, receipts, url_opener),
//!     BridgeConfig::default(),
//! );
//!
//! let mut updates = bridge.on_purchase_updated()?;
//! bridge.load_products(vec!["gems_100".into()], None).await?;
//! let result = bridge.purchase("gems_100").await?;
//! ```

pub mod actions;
pub mod client;
pub mod config;
pub mod environment;
pub mod reducers;
pub mod registry;
pub mod slots;
pub mod state;

// Re-exports
pub use actions::{BillingAction, ListenerChannel, SubscriptionId};
pub use client::{BillingBridge, Subscription};
pub use config::BridgeConfig;
pub use environment::BillingEnvironment;
pub use reducers::BillingReducer;
pub use registry::TransactionRegistry;
pub use slots::{CallId, CallbackSlots, PendingCall};
pub use state::BillingState;

pub use billing_bridge_core::{
    BillingError, ErrorKind, Payload, ProductView, PurchaseResultView, Reply, Response,
};
pub use billing_bridge_runtime::StoreError;
