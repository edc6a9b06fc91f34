//! Purchase reducer.
//!
//! Submits purchases and classifies transaction batches. Each batch is
//! processed newest first; every transaction updates the registry before
//! anything is delivered for it.

use super::{Effects, fan_out, reply_now};
use crate::actions::ListenerChannel;
use crate::{BillingAction, BillingEnvironment, BillingState, BridgeConfig};
use billing_bridge_core::{
    BackendCall, BackendEvent, BillingError, CallbackTarget, Payload, ProductId,
    PurchaseResultView, Reply, SlotMode, SmallVec, Transaction, TransactionState, effect::Effect,
    reducer::Reducer, smallvec,
};

/// Format a transaction for clients.
///
/// The app-level receipt is only fetched when the transaction carries none.
pub(crate) fn format_transaction(
    transaction: &Transaction,
    platform: &str,
    env: &BillingEnvironment,
) -> PurchaseResultView {
    let app_receipt = if transaction.receipt.is_some() {
        None
    } else {
        env.receipts.app_receipt()
    };
    PurchaseResultView::from_transaction(transaction, platform, app_receipt.as_deref())
}

/// Purchase reducer.
#[derive(Debug, Clone)]
pub struct PurchaseReducer {
    platform: String,
}

impl PurchaseReducer {
    /// Create a purchase reducer for `config`.
    #[must_use]
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            platform: config.platform.clone(),
        }
    }

    fn purchase(
        state: &mut BillingState,
        product_id: ProductId,
        reply: CallbackTarget,
        env: &BillingEnvironment,
    ) -> Effects {
        let Some(product) = state.registry.lookup_product(&product_id).cloned() else {
            return reply_now(reply, Err(BillingError::ProductNotFound));
        };

        if !env.backend.can_make_payments() {
            return reply_now(reply, Err(BillingError::PaymentsDisabled));
        }

        let call = state.slots.open_purchase(product_id, reply);
        tracing::debug!(product = %product.id, ?call, "Submitting purchase");

        smallvec![Effect::backend(BackendCall::SubmitPurchase(product))]
    }

    fn transactions_updated(
        &self,
        state: &mut BillingState,
        mut batch: Vec<Transaction>,
        env: &BillingEnvironment,
    ) -> Effects {
        // Newest first; ties keep arrival order
        batch.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut effects = SmallVec::new();
        for transaction in batch {
            state.registry.upsert(transaction.clone());

            let reply: Reply = match transaction.state {
                TransactionState::Purchasing => {
                    tracing::trace!(product = %transaction.product_id, "Purchase in flight");
                    continue;
                },
                TransactionState::Restored => {
                    tracing::debug!(product = %transaction.product_id, "Restored transaction collected");
                    effects.push(Effect::backend(BackendCall::FinishTransaction(transaction)));
                    continue;
                },
                TransactionState::Deferred => Err(BillingError::PaymentDeferred),
                TransactionState::Failed => {
                    let error = BillingError::PaymentFailed(transaction.error.clone());
                    effects.push(Effect::backend(BackendCall::FinishTransaction(transaction.clone())));
                    Err(error)
                },
                TransactionState::Purchased => Ok(Payload::Purchase(format_transaction(
                    &transaction,
                    &self.platform,
                    env,
                ))),
                TransactionState::Unknown(code) => {
                    tracing::warn!(product = %transaction.product_id, code, "Unrecognized transaction state");
                    Err(BillingError::UnknownState)
                },
            };

            let listeners = state.slots.listeners(ListenerChannel::PurchaseUpdated);
            let pending = state.slots.take_purchase(&transaction.product_id);
            tracing::debug!(
                product = %transaction.product_id,
                state = %transaction.state,
                listeners = listeners.len(),
                resolves_call = pending.is_some(),
                "Routing transaction update"
            );

            fan_out(&mut effects, listeners, pending, reply);
        }
        effects
    }

    /// A removal cancels a pending purchase only if the removed transaction
    /// was never routed past `Purchasing`.
    fn transactions_removed(state: &mut BillingState, removed: Vec<Transaction>) -> Effects {
        let mut effects = SmallVec::new();
        for transaction in removed {
            if state.registry.forget_settled(&transaction) {
                tracing::trace!(
                    product = %transaction.product_id,
                    transaction = ?transaction.transaction_id,
                    "Removal of a settled transaction"
                );
                continue;
            }
            match state.slots.take_purchase(&transaction.product_id) {
                Some(target) => {
                    tracing::debug!(product = %transaction.product_id, "Pending purchase canceled");
                    effects.push(Effect::deliver(
                        target,
                        Err(BillingError::PaymentCanceled),
                        SlotMode::OneShot,
                    ));
                },
                None => {
                    tracing::trace!(product = %transaction.product_id, "Removal with no pending purchase");
                },
            }
        }
        effects
    }
}

impl Reducer for PurchaseReducer {
    type State = BillingState;
    type Action = BillingAction;
    type Environment = BillingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects {
        match action {
            BillingAction::Purchase { product_id, reply } => Self::purchase(state, product_id, reply, env),
            BillingAction::Backend(BackendEvent::TransactionsUpdated(batch)) => {
                self.transactions_updated(state, batch, env)
            },
            BillingAction::Backend(BackendEvent::TransactionsRemoved(removed)) => {
                Self::transactions_removed(state, removed)
            },
            _ => SmallVec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::actions::SubscriptionId;
    use crate::reducers::tests::test_env;
    use billing_bridge_core::ReplyReceiver;
    use billing_bridge_testing::{
        ReducerTest, assertions, fixtures,
        mocks::{MockBackend, MockReceiptProvider, MockUrlOpener},
    };
    use std::sync::Arc;

    fn reducer() -> PurchaseReducer {
        PurchaseReducer::new(&BridgeConfig::default())
    }

    fn state_with_pending(product: &str) -> (BillingState, CallbackTarget, ReplyReceiver) {
        let mut state = BillingState::new();
        state.registry.upsert_product(fixtures::product(product));
        let (target, rx) = CallbackTarget::channel();
        state.slots.open_purchase(product.into(), target.clone());
        (state, target, rx)
    }

    #[test]
    fn test_unknown_product_is_not_found() {
        ReducerTest::new(reducer())
            .with_env(test_env(&MockBackend::new()))
            .given_state(BillingState::new())
            .when_action(BillingAction::Purchase {
                product_id: "unknown-id".into(),
                reply: CallbackTarget::unset(),
            })
            .then_state(|state| assert_eq!(state.slots.pending_count(), 0))
            .then_effects(|effects| {
                assertions::assert_no_backend_calls(effects);
                assert_eq!(
                    assertions::deliveries(effects)[0].reply,
                    Err(BillingError::ProductNotFound)
                );
            })
            .run();
    }

    #[test]
    fn test_payments_disabled() {
        let mut state = BillingState::new();
        state.registry.upsert_product(fixtures::product("gems"));

        ReducerTest::new(reducer())
            .with_env(test_env(&MockBackend::with_payments_disabled()))
            .given_state(state)
            .when_action(BillingAction::Purchase {
                product_id: "gems".into(),
                reply: CallbackTarget::unset(),
            })
            .then_effects(|effects| {
                assertions::assert_no_backend_calls(effects);
                assert_eq!(
                    assertions::deliveries(effects)[0].reply,
                    Err(BillingError::PaymentsDisabled)
                );
            })
            .run();
    }

    #[test]
    fn test_purchase_submits_and_registers_slot() {
        let mut state = BillingState::new();
        state.registry.upsert_product(fixtures::product("gems"));

        ReducerTest::new(reducer())
            .with_env(test_env(&MockBackend::new()))
            .given_state(state)
            .when_action(BillingAction::Purchase {
                product_id: "gems".into(),
                reply: CallbackTarget::unset(),
            })
            .then_state(|state| assert!(state.slots.has_pending_purchase("gems")))
            .then_effects(|effects| {
                assert_eq!(
                    assertions::backend_calls(effects),
                    vec![&BackendCall::SubmitPurchase(fixtures::product("gems"))]
                );
            })
            .run();
    }

    #[test]
    fn test_purchasing_is_suppressed() {
        let (state, _target, _rx) = state_with_pending("gems");

        ReducerTest::new(reducer())
            .with_env(test_env(&MockBackend::new()))
            .given_state(state)
            .when_action(BillingAction::Backend(BackendEvent::TransactionsUpdated(vec![
                fixtures::transaction("gems", TransactionState::Purchasing, 1),
            ])))
            .then_state(|state| {
                assert!(state.slots.has_pending_purchase("gems"));
                assert_eq!(
                    state.registry.lookup("gems").map(|t| t.state),
                    Some(TransactionState::Purchasing)
                );
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_purchased_resolves_slot_and_listener_without_finalizing() {
        let (mut state, target, _rx) = state_with_pending("gems");
        let (listener, _listener_rx) = CallbackTarget::channel();
        state
            .slots
            .subscribe(ListenerChannel::PurchaseUpdated, SubscriptionId(1), listener);

        ReducerTest::new(reducer())
            .with_env(test_env(&MockBackend::new()))
            .given_state(state)
            .when_action(BillingAction::Backend(BackendEvent::TransactionsUpdated(vec![
                fixtures::transaction("gems", TransactionState::Purchased, 1),
            ])))
            .then_state(|state| assert!(!state.slots.has_pending_purchase("gems")))
            .then_effects(move |effects| {
                assertions::assert_no_backend_calls(effects);
                assertions::assert_delivery_modes(effects, 1, 1);
                let one_shot = assertions::deliveries(effects)[1];
                assert_eq!(one_shot.target, target);
                match &one_shot.reply {
                    Ok(Payload::Purchase(view)) => {
                        assert_eq!(view.id, "gems");
                        assert_eq!(view.platform, "iOS");
                        assert_eq!(view.state, 1);
                        assert_eq!(view.receipt.transaction_identifier, "txn-gems-1");
                    },
                    other => panic!("unexpected reply {other:?}"),
                }
            })
            .run();
    }

    #[test]
    fn test_failed_finalizes_and_uses_backend_message() {
        let (state, _target, _rx) = state_with_pending("gems");
        let failed = fixtures::transaction("gems", TransactionState::Failed, 1).with_error("card declined");

        ReducerTest::new(reducer())
            .with_env(test_env(&MockBackend::new()))
            .given_state(state)
            .when_action(BillingAction::Backend(BackendEvent::TransactionsUpdated(vec![failed.clone()])))
            .then_effects(move |effects| {
                assert_eq!(
                    assertions::backend_calls(effects),
                    vec![&BackendCall::FinishTransaction(failed)]
                );
                let reply = &assertions::deliveries(effects)[0].reply;
                assert_eq!(reply.as_ref().unwrap_err().to_string(), "card declined");
            })
            .run();
    }

    #[test]
    fn test_failed_without_message_falls_back() {
        let (state, _target, _rx) = state_with_pending("gems");

        ReducerTest::new(reducer())
            .with_env(test_env(&MockBackend::new()))
            .given_state(state)
            .when_action(BillingAction::Backend(BackendEvent::TransactionsUpdated(vec![
                fixtures::transaction("gems", TransactionState::Failed, 1),
            ])))
            .then_effects(|effects| {
                let reply = &assertions::deliveries(effects)[0].reply;
                assert_eq!(reply.as_ref().unwrap_err().to_string(), "payment failed");
            })
            .run();
    }

    #[test]
    fn test_deferred_and_unknown_are_errors() {
        for (state_code, message) in [
            (TransactionState::Deferred, "payment deferred"),
            (TransactionState::Unknown(42), "unknown error"),
        ] {
            let (state, _target, _rx) = state_with_pending("gems");
            ReducerTest::new(reducer())
                .with_env(test_env(&MockBackend::new()))
                .given_state(state)
                .when_action(BillingAction::Backend(BackendEvent::TransactionsUpdated(vec![
                    fixtures::transaction("gems", state_code, 1),
                ])))
                .then_state(|state| assert_eq!(state.slots.pending_count(), 0))
                .then_effects(move |effects| {
                    assertions::assert_no_backend_calls(effects);
                    let reply = &assertions::deliveries(effects)[0].reply;
                    assert_eq!(reply.as_ref().unwrap_err().to_string(), message);
                })
                .run();
        }
    }

    #[test]
    fn test_batch_is_routed_newest_first() {
        let (state, _target, _rx) = state_with_pending("gems");
        let older = fixtures::transaction("gems", TransactionState::Failed, 1);
        let newer = fixtures::transaction("gems", TransactionState::Purchased, 2);

        ReducerTest::new(reducer())
            .with_env(test_env(&MockBackend::new()))
            .given_state(state)
            .when_action(BillingAction::Backend(BackendEvent::TransactionsUpdated(vec![older, newer])))
            .then_state(|state| {
                // The older one was processed last and is what the cache holds
                assert_eq!(
                    state.registry.lookup("gems").map(|t| t.state),
                    Some(TransactionState::Failed)
                );
            })
            .then_effects(|effects| {
                let deliveries = assertions::deliveries(effects);
                assert_eq!(deliveries.len(), 1);
                assert!(matches!(deliveries[0].reply, Ok(Payload::Purchase(_))));
            })
            .run();
    }

    #[test]
    fn test_redelivered_purchase_does_not_resolve_twice() {
        let (state, _target, _rx) = state_with_pending("gems");
        let purchased = fixtures::transaction("gems", TransactionState::Purchased, 1);

        ReducerTest::new(reducer())
            .with_env(test_env(&MockBackend::new()))
            .given_state(state)
            .when_action(BillingAction::Backend(BackendEvent::TransactionsUpdated(vec![
                purchased.clone(),
            ])))
            .when_action(BillingAction::Backend(BackendEvent::TransactionsUpdated(vec![
                purchased.clone(),
            ])))
            .then_state(move |state| assert_eq!(state.registry.lookup("gems"), Some(&purchased)))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_removal_cancels_only_pending_slot() {
        let (state, _target, _rx) = state_with_pending("gems");
        let removed = fixtures::transaction("gems", TransactionState::Failed, 1);

        ReducerTest::new(reducer())
            .with_env(test_env(&MockBackend::new()))
            .given_state(state.clone())
            .when_action(BillingAction::Backend(BackendEvent::TransactionsRemoved(vec![removed.clone()])))
            .then_effects(|effects| {
                assert_eq!(
                    assertions::deliveries(effects)[0].reply,
                    Err(BillingError::PaymentCanceled)
                );
            })
            .run();

        ReducerTest::new(reducer())
            .with_env(test_env(&MockBackend::new()))
            .given_state(state)
            .when_action(BillingAction::Backend(BackendEvent::TransactionsRemoved(vec![removed.clone()])))
            .when_action(BillingAction::Backend(BackendEvent::TransactionsRemoved(vec![removed])))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_removal_of_settled_transaction_keeps_newer_slot() {
        let (state, _first, _first_rx) = state_with_pending("gems");
        let consumed = fixtures::transaction("gems", TransactionState::Purchased, 1);
        let (second, _second_rx) = CallbackTarget::channel();
        let expected = second.clone();

        ReducerTest::new(reducer())
            .with_env(test_env(&MockBackend::new()))
            .given_state(state)
            .when_action(BillingAction::Backend(BackendEvent::TransactionsUpdated(vec![
                consumed.clone(),
            ])))
            .when_action(BillingAction::Purchase {
                product_id: "gems".into(),
                reply: second,
            })
            .when_action(BillingAction::Backend(BackendEvent::TransactionsRemoved(vec![consumed])))
            .when_action(BillingAction::Backend(BackendEvent::TransactionsUpdated(vec![
                fixtures::transaction("gems", TransactionState::Purchased, 5),
            ])))
            .then_state(|state| assert!(!state.slots.has_pending_purchase("gems")))
            .then_effects(move |effects| {
                let deliveries = assertions::deliveries(effects);
                assert_eq!(deliveries.len(), 1);
                assert_eq!(deliveries[0].target, expected);
                assert!(matches!(
                    &deliveries[0].reply,
                    Ok(Payload::Purchase(view)) if view.receipt.transaction_identifier == "txn-gems-5"
                ));
            })
            .run();
    }

    #[test]
    fn test_receipt_fallback_order() {
        let env = BillingEnvironment::new(
            Arc::new(MockBackend::new()),
            Arc::new(MockReceiptProvider::with_receipt(b"app".to_vec())),
            Arc::new(MockUrlOpener::new()),
        );
        let bare = fixtures::transaction("gems", TransactionState::Purchased, 1);
        let own = bare.clone().with_receipt(b"own".to_vec());

        assert_eq!(format_transaction(&bare, "iOS", &env).receipt.data, "YXBw");
        assert_eq!(format_transaction(&own, "iOS", &env).receipt.data, "b3du");

        let none = test_env(&MockBackend::new());
        assert_eq!(format_transaction(&bare, "iOS", &none).receipt.data, "");
    }
}
