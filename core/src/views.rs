//! Boundary views.
//!
//! These are the typed results handed to callers. Serialization to JSON
//! happens only here, at the transport boundary.

use base64::Engine;
use serde::Serialize;

use crate::error::{BillingError, ErrorKind};
use crate::model::{Amount, Product, Transaction};

/// Terminal (or persistent) answer delivered to a callback target.
pub type Reply = Result<Payload, BillingError>;

/// Catalog entry as shown to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    /// Product identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Price formatted with the currency symbol, e.g. `$4.99`.
    pub price: String,
    /// Price as a decimal number.
    pub price_decimal: Amount,
    /// Introductory offer price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introductory_price: Option<Amount>,
    /// Introductory offer length in billing periods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introductory_price_cycles: Option<u32>,
}

impl ProductView {
    /// Format a product, using `fallback_symbol` when the storefront locale has none.
    #[must_use]
    pub fn from_product(product: &Product, fallback_symbol: &str) -> Self {
        let symbol = product.currency_symbol.as_deref().unwrap_or(fallback_symbol);
        Self {
            id: product.id.clone(),
            title: product.title.clone(),
            description: product.description.clone(),
            price: format!("{symbol}{}", product.price),
            price_decimal: product.price,
            introductory_price: product.introductory_price.as_ref().map(|p| p.amount),
            introductory_price_cycles: product.introductory_price.as_ref().map(|p| p.cycles),
        }
    }
}

/// Proof of purchase attached to a purchase result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptView {
    /// Base64 receipt blob.
    pub data: String,
    /// Backend transaction identifier.
    pub transaction_identifier: String,
}

/// Transaction as shown to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseResultView {
    /// Product identifier.
    pub id: String,
    /// Platform label, e.g. `iOS`.
    pub platform: String,
    /// Receipt data.
    pub receipt: ReceiptView,
    /// Integer state code.
    pub state: i64,
}

impl PurchaseResultView {
    /// Format a transaction.
    ///
    /// The transaction's own receipt wins over the app-level one; with
    /// neither, the receipt data is empty.
    #[must_use]
    pub fn from_transaction(transaction: &Transaction, platform: &str, app_receipt: Option<&[u8]>) -> Self {
        let data = transaction
            .receipt
            .as_deref()
            .or(app_receipt)
            .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes))
            .unwrap_or_default();

        Self {
            id: transaction.product_id.clone(),
            platform: platform.to_string(),
            receipt: ReceiptView {
                data,
                transaction_identifier: transaction.transaction_id.clone().unwrap_or_default(),
            },
            state: transaction.state.code(),
        }
    }
}

/// Success payload of a [`Reply`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    /// Operation completed with nothing to report.
    Empty,
    /// Catalog load result.
    Products(Vec<ProductView>),
    /// One transaction update.
    Purchase(PurchaseResultView),
    /// Restore batch.
    Purchases(Vec<PurchaseResultView>),
}

/// Serialized form of a [`BillingError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorView {
    /// Error classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl From<&BillingError> for ErrorView {
    fn from(error: &BillingError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Transport status of a [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Success.
    Ok,
    /// Failure.
    Error,
}

/// Result envelope handed to the request/response transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// OK or ERROR.
    pub status: Status,
    /// Payload or error view, as JSON.
    pub message: serde_json::Value,
    /// Whether the transport should keep the callback registered.
    pub keep_callback: bool,
}

impl Response {
    /// Build the envelope for a reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be represented as JSON.
    pub fn from_reply(reply: &Reply, keep_callback: bool) -> Result<Self, serde_json::Error> {
        let (status, message) = match reply {
            Ok(payload) => (Status::Ok, serde_json::to_value(payload)?),
            Err(error) => (Status::Error, serde_json::to_value(ErrorView::from(error))?),
        };
        Ok(Self {
            status,
            message,
            keep_callback,
        })
    }
}
