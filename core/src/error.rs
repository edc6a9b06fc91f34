//! Error types reported to bridge callers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a [`BillingError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or empty input, rejected before any backend interaction.
    Validation,
    /// Referenced product is not in the catalog.
    NotFound,
    /// The backend cannot take payments right now.
    Capability,
    /// The backend rejected, deferred or cancelled the operation.
    BackendRejected,
    /// No cached transaction exists for the product.
    TransactionNotFound,
    /// The platform does not support the operation.
    Unsupported,
    /// The bridge is not running.
    Unavailable,
}

/// Every failure a caller can observe.
///
/// Errors travel through the same channel that would have carried success;
/// none is thrown past the bridge boundary. The type is `Clone` because a
/// single backend event fans out to several targets.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BillingError {
    // ═══════════════════════════════════════════════════════════
    // Synchronous (rejected before the backend is contacted)
    // ═══════════════════════════════════════════════════════════

    /// Product identifier collection was empty or contained blank ids.
    #[error("invalid product identifiers")]
    InvalidProductIdentifiers,

    /// Product kind was neither `inapp` nor `subs`; carries the rejected input.
    #[error("invalid product type")]
    InvalidProductKind(String),

    /// Purchase requested for a product missing from the catalog.
    #[error("product not found")]
    ProductNotFound,

    /// Backend purchasing-capability flag is off.
    #[error("unable to make payments")]
    PaymentsDisabled,

    /// Acknowledge/consume for a product with no cached transaction.
    #[error("transaction not found")]
    TransactionNotFound,

    /// Management URL cannot be opened on this platform.
    #[error("invalid subscriptions management URL")]
    ManagementUnavailable,

    // ═══════════════════════════════════════════════════════════
    // Asynchronous (backend-supplied outcome)
    // ═══════════════════════════════════════════════════════════

    /// Payment awaits external approval.
    #[error("payment deferred")]
    PaymentDeferred,

    /// Payment failed; carries the backend message when there is one.
    #[error("{}", .0.as_deref().unwrap_or("payment failed"))]
    PaymentFailed(Option<String>),

    /// Transaction was removed from the backend queue before resolving.
    #[error("payment canceled")]
    PaymentCanceled,

    /// Backend reported a state this core does not model.
    #[error("unknown error")]
    UnknownState,

    /// Restore flow failed.
    #[error("unable to restore purchases")]
    RestoreFailed,

    /// Catalog request failed; carries the backend message when there is one.
    #[error("{}", .0.as_deref().unwrap_or("unable to load products"))]
    ProductsRequestFailed(Option<String>),

    // ═══════════════════════════════════════════════════════════
    // Bridge lifecycle
    // ═══════════════════════════════════════════════════════════

    /// Bridge has shut down or dropped the call.
    #[error("billing bridge is not running")]
    Unavailable,
}

impl BillingError {
    /// Classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidProductIdentifiers | Self::InvalidProductKind(_) => ErrorKind::Validation,
            Self::ProductNotFound => ErrorKind::NotFound,
            Self::PaymentsDisabled => ErrorKind::Capability,
            Self::TransactionNotFound => ErrorKind::TransactionNotFound,
            Self::ManagementUnavailable => ErrorKind::Unsupported,
            Self::PaymentDeferred
            | Self::PaymentFailed(_)
            | Self::PaymentCanceled
            | Self::UnknownState
            | Self::RestoreFailed
            | Self::ProductsRequestFailed(_) => ErrorKind::BackendRejected,
            Self::Unavailable => ErrorKind::Unavailable,
        }
    }

    /// Returns `true` if the error was raised without contacting the backend.
    ///
    /// # Examples
    ///
    /// ```
    /// # use billing_bridge_core::BillingError;
    /// assert!(BillingError::ProductNotFound.is_synchronous());
    /// assert!(!BillingError::PaymentDeferred.is_synchronous());
    /// ```
    #[must_use]
    pub const fn is_synchronous(&self) -> bool {
        matches!(
            self,
            Self::InvalidProductIdentifiers
                | Self::InvalidProductKind(_)
                | Self::ProductNotFound
                | Self::PaymentsDisabled
                | Self::TransactionNotFound
                | Self::ManagementUnavailable
        )
    }
}
