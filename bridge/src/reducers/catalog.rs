//! Catalog load reducer.
//!
//! Validates load requests, issues correlated catalog requests, and fans
//! catalog responses out to the requesting slot and to `productsLoaded`
//! listeners.

use super::{Effects, fan_out, reply_now};
use crate::actions::ListenerChannel;
use crate::{BillingAction, BillingEnvironment, BillingState, BridgeConfig};
use billing_bridge_core::{
    BackendCall, BackendEvent, BillingError, CallbackTarget, Payload, Product, ProductKind,
    ProductView, RequestId, SlotMode, SmallVec, effect::Effect, reducer::Reducer, smallvec,
};

/// Catalog reducer.
#[derive(Debug, Clone)]
pub struct CatalogReducer {
    default_kind: ProductKind,
    fallback_currency_symbol: String,
}

impl CatalogReducer {
    /// Create a catalog reducer for `config`.
    #[must_use]
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            default_kind: config.default_product_kind,
            fallback_currency_symbol: config.fallback_currency_symbol.clone(),
        }
    }

    fn load_products(
        &self,
        state: &mut BillingState,
        ids: Vec<String>,
        kind: Option<String>,
        reply: CallbackTarget,
    ) -> Effects {
        if ids.is_empty() || ids.iter().any(|id| id.trim().is_empty()) {
            return reply_now(reply, Err(BillingError::InvalidProductIdentifiers));
        }

        let kind = match kind.as_deref().map(str::parse::<ProductKind>) {
            None => self.default_kind,
            Some(Ok(kind)) => kind,
            Some(Err(error)) => return reply_now(reply, Err(error)),
        };

        // The backend takes a set
        let mut unique = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }

        let request = state.slots.open_load(kind, reply);
        tracing::debug!(%request, %kind, count = unique.len(), "Requesting products");

        smallvec![Effect::backend(BackendCall::RequestProducts {
            request,
            ids: unique,
            kind,
        })]
    }

    fn products_received(
        &self,
        state: &mut BillingState,
        request: RequestId,
        products: Vec<Product>,
        invalid_ids: &[String],
    ) -> Effects {
        let slot = state.slots.take_load(request);
        if slot.is_none() {
            tracing::warn!(%request, "Catalog response for unknown request");
        }
        if !invalid_ids.is_empty() {
            tracing::debug!(%request, ?invalid_ids, "Storefront did not recognize identifiers");
        }

        let mut views = Vec::with_capacity(products.len());
        for mut product in products {
            if let Some((kind, _)) = &slot {
                product.kind = *kind;
            }
            views.push(ProductView::from_product(&product, &self.fallback_currency_symbol));
            state.registry.upsert_product(product);
        }

        let listeners = state.slots.listeners(ListenerChannel::ProductsLoaded);
        tracing::debug!(
            %request,
            products = views.len(),
            listeners = listeners.len(),
            "Delivering catalog"
        );

        let mut effects = SmallVec::new();
        fan_out(
            &mut effects,
            listeners,
            slot.map(|(_, target)| target),
            Ok(Payload::Products(views)),
        );
        effects
    }

    fn products_request_failed(
        state: &mut BillingState,
        request: RequestId,
        code: i64,
        message: Option<String>,
    ) -> Effects {
        match state.slots.take_load(request) {
            Some((_, target)) => {
                tracing::debug!(%request, code, ?message, "Catalog request failed");
                smallvec![Effect::deliver(
                    target,
                    Err(BillingError::ProductsRequestFailed(message)),
                    SlotMode::OneShot,
                )]
            },
            None => {
                tracing::warn!(%request, code, "Catalog failure for unknown request");
                SmallVec::new()
            },
        }
    }
}

impl Reducer for CatalogReducer {
    type State = BillingState;
    type Action = BillingAction;
    type Environment = BillingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> Effects {
        match action {
            BillingAction::LoadProducts { ids, kind, reply } => self.load_products(state, ids, kind, reply),
            BillingAction::Backend(BackendEvent::ProductsReceived {
                request,
                products,
                invalid_ids,
            }) => self.products_received(state, request, products, &invalid_ids),
            BillingAction::Backend(BackendEvent::ProductsRequestFailed {
                request,
                code,
                message,
            }) => Self::products_request_failed(state, request, code, message),
            _ => SmallVec::new(),
        }
    }
}
