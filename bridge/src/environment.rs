//! Bridge environment.
//!
//! The backend collaborators, injected as trait objects so tests can
//! substitute mocks.

use billing_bridge_core::{
    PurchaseBackend, ReceiptProvider, UrlOpener, environment::EffectEnvironment,
};
use std::fmt;
use std::sync::Arc;

/// Collaborators the router reads from and the runtime executes against.
#[derive(Clone)]
pub struct BillingEnvironment {
    /// Purchasing backend.
    pub backend: Arc<dyn PurchaseBackend>,
    /// App-level receipt provider.
    pub receipts: Arc<dyn ReceiptProvider>,
    /// External URL opener.
    pub url_opener: Arc<dyn UrlOpener>,
}

impl BillingEnvironment {
    /// Create a new environment.
    #[must_use]
    pub fn new(
        backend: Arc<dyn PurchaseBackend>,
        receipts: Arc<dyn ReceiptProvider>,
        url_opener: Arc<dyn UrlOpener>,
    ) -> Self {
        Self {
            backend,
            receipts,
            url_opener,
        }
    }
}

impl fmt::Debug for BillingEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BillingEnvironment").finish_non_exhaustive()
    }
}

impl EffectEnvironment for BillingEnvironment {
    fn backend(&self) -> &dyn PurchaseBackend {
        self.backend.as_ref()
    }

    fn url_opener(&self) -> &dyn UrlOpener {
        self.url_opener.as_ref()
    }
}
