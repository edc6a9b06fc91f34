//! Bridge actions.
//!
//! Client requests and backend events share one action type so both flow
//! through the same sequential queue.

use billing_bridge_core::{BackendEvent, CallbackTarget, ProductId};
use std::fmt;

/// Persistent notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerChannel {
    /// Every catalog response.
    ProductsLoaded,
    /// Every purchase state change (purchased, failed, deferred, unknown).
    PurchaseUpdated,
    /// Every completed restore batch.
    PurchaseRestored,
}

impl ListenerChannel {
    /// Channel name as used by transports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProductsLoaded => "productsLoaded",
            Self::PurchaseUpdated => "purchaseUpdated",
            Self::PurchaseRestored => "purchaseRestored",
        }
    }
}

impl fmt::Display for ListenerChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle of a persistent subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Everything the router reacts to.
#[derive(Debug, Clone)]
pub enum BillingAction {
    // ═══════════════════════════════════════════════════════════════════════
    // Client requests
    // ═══════════════════════════════════════════════════════════════════════
    /// Load catalog metadata.
    LoadProducts {
        /// Requested identifiers; must be non-empty and contain no blank id.
        ids: Vec<String>,
        /// `inapp` or `subs`; the configured default when absent.
        kind: Option<String>,
        /// One-shot reply target.
        reply: CallbackTarget,
    },

    /// Purchase a product already in the catalog.
    Purchase {
        /// Product to buy.
        product_id: ProductId,
        /// One-shot reply target.
        reply: CallbackTarget,
    },

    /// Restore completed transactions.
    Restore {
        /// One-shot reply target.
        reply: CallbackTarget,
    },

    /// Finalize the cached transaction of a non-consumable or subscription.
    Acknowledge {
        /// Product whose cached transaction is finalized.
        product_id: ProductId,
        /// One-shot reply target.
        reply: CallbackTarget,
    },

    /// Finalize the cached transaction of a consumable.
    Consume {
        /// Product whose cached transaction is finalized.
        product_id: ProductId,
        /// One-shot reply target.
        reply: CallbackTarget,
    },

    /// Open the subscription management surface.
    ManageSubscriptions {
        /// One-shot reply target.
        reply: CallbackTarget,
    },

    /// Register a persistent listener.
    Subscribe {
        /// Channel to listen on.
        channel: ListenerChannel,
        /// Caller-allocated handle.
        subscription: SubscriptionId,
        /// Listener target.
        target: CallbackTarget,
    },

    /// Remove a persistent listener.
    Unsubscribe {
        /// Handle returned on subscribe.
        subscription: SubscriptionId,
    },

    /// Stop accepting requests; pending callers receive `Unavailable`.
    Close,

    // ═══════════════════════════════════════════════════════════════════════
    // Backend events
    // ═══════════════════════════════════════════════════════════════════════
    /// An event reported by the purchasing backend.
    Backend(BackendEvent),
}

impl BillingAction {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LoadProducts { .. } => "load_products",
            Self::Purchase { .. } => "purchase",
            Self::Restore { .. } => "restore",
            Self::Acknowledge { .. } => "acknowledge",
            Self::Consume { .. } => "consume",
            Self::ManageSubscriptions { .. } => "manage_subscriptions",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Close => "close",
            Self::Backend(event) => event.name(),
        }
    }

    /// The one-shot reply target of a client request.
    #[must_use]
    pub fn reply_target(&self) -> Option<&CallbackTarget> {
        match self {
            Self::LoadProducts { reply, .. }
            | Self::Purchase { reply, .. }
            | Self::Restore { reply }
            | Self::Acknowledge { reply, .. }
            | Self::Consume { reply, .. }
            | Self::ManageSubscriptions { reply } => Some(reply),
            Self::Subscribe { .. } | Self::Unsubscribe { .. } | Self::Close | Self::Backend(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_target() {
        let (target, _rx) = CallbackTarget::channel();
        let action = BillingAction::Restore {
            reply: target.clone(),
        };
        assert_eq!(action.reply_target(), Some(&target));
        assert!(BillingAction::Close.reply_target().is_none());
        assert_eq!(
            BillingAction::Backend(BackendEvent::RestoreFinished).name(),
            "restore_finished"
        );
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(ListenerChannel::ProductsLoaded.to_string(), "productsLoaded");
        assert_eq!(SubscriptionId(3).to_string(), "sub-3");
    }
}
