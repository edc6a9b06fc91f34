//! Domain model types.
//!
//! Products and transactions are received from the backend and cached by the
//! registry. Neither is ever destroyed by the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BillingError;

/// Backend product identifier.
pub type ProductId = String;

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

/// Identifier of one client call instance.
///
/// Catalog requests echo it back on the response, which is how a response
/// finds the load slot that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Catalog
// ═══════════════════════════════════════════════════════════════════════

/// Kind of product requested from the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    /// One-off in-app product (consumable or not).
    #[default]
    #[serde(rename = "inapp")]
    InApp,
    /// Auto-renewing subscription.
    Subs,
}

impl ProductKind {
    /// Wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InApp => "inapp",
            Self::Subs => "subs",
        }
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductKind {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inapp" => Ok(Self::InApp),
            "subs" => Ok(Self::Subs),
            other => Err(BillingError::InvalidProductKind(other.to_string())),
        }
    }
}

/// Exact decimal amount, stored as integer minor units and a scale.
///
/// `Amount::new(499, 2)` is `4.99`. The bridge never does arithmetic on
/// prices; it only passes them through and renders them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Amount {
    minor_units: i64,
    scale: u32,
}

impl Amount {
    /// Create an amount from minor units and a decimal scale.
    #[must_use]
    pub const fn new(minor_units: i64, scale: u32) -> Self {
        Self { minor_units, scale }
    }

    /// Raw minor units.
    #[must_use]
    pub const fn minor_units(self) -> i64 {
        self.minor_units
    }

    /// Number of decimal places.
    #[must_use]
    pub const fn scale(self) -> u32 {
        self.scale
    }

    /// Lossy conversion for JSON number output.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64(self) -> f64 {
        self.minor_units as f64 / 10f64.powi(i32::try_from(self.scale).unwrap_or(i32::MAX))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.minor_units < 0 { "-" } else { "" };
        let digits = self.minor_units.unsigned_abs();
        if self.scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let divisor = 10u64.checked_pow(self.scale).unwrap_or(u64::MAX);
        let width = self.scale as usize;
        write!(f, "{sign}{}.{:0width$}", digits / divisor, digits % divisor)
    }
}

impl Serialize for Amount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

/// Introductory offer attached to a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntroductoryPrice {
    /// Offer price.
    pub amount: Amount,
    /// Number of billing periods the offer lasts.
    pub cycles: u32,
}

/// A catalog entry as reported by the backend.
///
/// Immutable once received; a later response with the same id replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    /// Unique product identifier.
    pub id: ProductId,
    /// Localized display title.
    pub title: String,
    /// Localized description.
    pub description: String,
    /// Price in the storefront currency.
    pub price: Amount,
    /// Currency symbol of the storefront locale, if the backend knows it.
    pub currency_symbol: Option<String>,
    /// Introductory offer, if any.
    pub introductory_price: Option<IntroductoryPrice>,
    /// Kind the product was requested as.
    pub kind: ProductKind,
}

impl Product {
    /// Create a product with no introductory offer and no currency symbol.
    #[must_use]
    pub fn new(
        id: impl Into<ProductId>,
        title: impl Into<String>,
        description: impl Into<String>,
        price: Amount,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            price,
            currency_symbol: None,
            introductory_price: None,
            kind: ProductKind::default(),
        }
    }

    /// Set the storefront currency symbol.
    #[must_use]
    pub fn with_currency_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.currency_symbol = Some(symbol.into());
        self
    }

    /// Attach an introductory offer.
    #[must_use]
    pub const fn with_introductory_price(mut self, amount: Amount, cycles: u32) -> Self {
        self.introductory_price = Some(IntroductoryPrice { amount, cycles });
        self
    }

    /// Set the product kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: ProductKind) -> Self {
        self.kind = kind;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Transactions
// ═══════════════════════════════════════════════════════════════════════

/// Backend-reported state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Attempt in flight.
    Purchasing,
    /// Attempt succeeded.
    Purchased,
    /// Attempt rejected or cancelled.
    Failed,
    /// Recovered during a restore flow.
    Restored,
    /// Awaiting external approval.
    Deferred,
    /// A state code this core does not model.
    Unknown(i64),
}

impl TransactionState {
    /// Integer state code reported to clients.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Purchasing => 0,
            Self::Purchased => 1,
            Self::Failed => 2,
            Self::Restored => 3,
            Self::Deferred => 4,
            Self::Unknown(code) => code,
        }
    }

    /// Map a raw backend state code.
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Purchasing,
            1 => Self::Purchased,
            2 => Self::Failed,
            3 => Self::Restored,
            4 => Self::Deferred,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Purchasing => f.write_str("purchasing"),
            Self::Purchased => f.write_str("purchased"),
            Self::Failed => f.write_str("failed"),
            Self::Restored => f.write_str("restored"),
            Self::Deferred => f.write_str("deferred"),
            Self::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

/// The most recently observed state of one purchase attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Product the transaction is for. Not required to be in the catalog.
    pub product_id: ProductId,
    /// Current state.
    pub state: TransactionState,
    /// Backend-assigned identifier, present once past `Purchasing`.
    pub transaction_id: Option<String>,
    /// When the backend created the transaction.
    pub created_at: DateTime<Utc>,
    /// Backend-supplied error description (failed transactions).
    pub error: Option<String>,
    /// Transaction-level proof of purchase, if the backend provides one.
    pub receipt: Option<Vec<u8>>,
}

impl Transaction {
    /// Create a transaction with no id, error or receipt.
    #[must_use]
    pub fn new(product_id: impl Into<ProductId>, state: TransactionState, created_at: DateTime<Utc>) -> Self {
        Self {
            product_id: product_id.into(),
            state,
            transaction_id: None,
            created_at,
            error: None,
            receipt: None,
        }
    }

    /// Set the backend-assigned identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.transaction_id = Some(id.into());
        self
    }

    /// Set the backend error description.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attach a transaction-level receipt.
    #[must_use]
    pub fn with_receipt(mut self, receipt: Vec<u8>) -> Self {
        self.receipt = Some(receipt);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_amount_display() {
        assert_eq!(Amount::new(499, 2).to_string(), "4.99");
        assert_eq!(Amount::new(5, 2).to_string(), "0.05");
        assert_eq!(Amount::new(-1250, 3).to_string(), "-1.250");
        assert_eq!(Amount::new(7, 0).to_string(), "7");
    }

    #[test]
    fn test_product_kind_parse_is_case_insensitive() {
        assert_eq!("INAPP".parse::<ProductKind>(), Ok(ProductKind::InApp));
        assert_eq!(" subs ".parse::<ProductKind>(), Ok(ProductKind::Subs));
        assert_eq!(
            "bundle".parse::<ProductKind>(),
            Err(BillingError::InvalidProductKind("bundle".to_string()))
        );
    }

    #[test]
    fn test_unknown_state_keeps_raw_code() {
        let state = TransactionState::from_code(42);
        assert_eq!(state, TransactionState::Unknown(42));
        assert_eq!(state.code(), 42);
    }

    proptest! {
        #[test]
        fn prop_state_code_round_trips(code in -10i64..10) {
            prop_assert_eq!(TransactionState::from_code(code).code(), code);
        }

        #[test]
        fn prop_amount_display_parses_back(minor in -1_000_000i64..1_000_000, scale in 0u32..6) {
            let rendered = Amount::new(minor, scale).to_string();
            let digits: String = rendered.chars().filter(|c| *c != '.').collect();
            prop_assert_eq!(digits.parse::<i64>().ok(), Some(minor));
        }
    }
}
