//! Finalization and account reducer.
//!
//! `acknowledge`, `consume` and `manage subscriptions` resolve in the
//! reduction that receives them; none of them waits for a backend event.

use super::{Effects, reply_now};
use crate::{BillingAction, BillingEnvironment, BillingState, BridgeConfig};
use billing_bridge_core::{
    BackendCall, BillingError, CallbackTarget, Payload, SlotMode, SmallVec,
    effect::Effect, reducer::Reducer, smallvec,
};

/// Account reducer.
#[derive(Debug, Clone)]
pub struct AccountReducer {
    management_url: String,
}

impl AccountReducer {
    /// Create an account reducer for `config`.
    #[must_use]
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            management_url: config.management_url.clone(),
        }
    }

    /// Finalize the cached transaction for `product_id`.
    ///
    /// The cache entry is kept; only the backend forgets the transaction.
    fn finalize(
        state: &BillingState,
        product_id: &str,
        reply: CallbackTarget,
        operation: &'static str,
    ) -> Effects {
        let Some(transaction) = state.registry.lookup(product_id) else {
            tracing::debug!(product = product_id, operation, "No cached transaction");
            return reply_now(reply, Err(BillingError::TransactionNotFound));
        };

        tracing::debug!(product = product_id, operation, "Finalizing transaction");
        smallvec![
            Effect::backend(BackendCall::FinishTransaction(transaction.clone())),
            Effect::deliver(reply, Ok(Payload::Empty), SlotMode::OneShot),
        ]
    }

    fn manage_subscriptions(&self, reply: CallbackTarget, env: &BillingEnvironment) -> Effects {
        if !env.url_opener.can_open(&self.management_url) {
            tracing::debug!(url = %self.management_url, "Management URL cannot be opened");
            return reply_now(reply, Err(BillingError::ManagementUnavailable));
        }

        smallvec![
            Effect::OpenUrl(self.management_url.clone()),
            Effect::deliver(reply, Ok(Payload::Empty), SlotMode::OneShot),
        ]
    }
}

impl Reducer for AccountReducer {
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
            BillingAction::Acknowledge { product_id, reply } => {
                Self::finalize(state, &product_id, reply, "acknowledge")
            },
            BillingAction::Consume { product_id, reply } => {
                Self::finalize(state, &product_id, reply, "consume")
            },
            BillingAction::ManageSubscriptions { reply } => self.manage_subscriptions(reply, env),
            _ => SmallVec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MANAGEMENT_URL;
    use crate::reducers::tests::test_env;
    use billing_bridge_core::{ErrorKind, TransactionState};
    use billing_bridge_testing::{
        ReducerTest, assertions, fixtures,
        mocks::{MockBackend, MockReceiptProvider, MockUrlOpener},
    };
    use std::sync::Arc;

    fn reducer() -> AccountReducer {
        AccountReducer::new(&BridgeConfig::default())
    }

    #[test]
    fn test_acknowledge_missing_is_synchronous_not_found() {
        ReducerTest::new(reducer())
            .with_env(test_env(&MockBackend::new()))
            .given_state(BillingState::new())
            .when_action(BillingAction::Acknowledge {
                product_id: "missing-id".into(),
                reply: CallbackTarget::unset(),
            })
            .then_effects(|effects| {
                assertions::assert_no_backend_calls(effects);
                let reply = &assertions::deliveries(effects)[0].reply;
                assert_eq!(reply, &Err(BillingError::TransactionNotFound));
                assert_eq!(BillingError::TransactionNotFound.kind(), ErrorKind::TransactionNotFound);
            })
            .run();
    }

    #[test]
    fn test_consume_finalizes_and_keeps_cache() {
        let purchased = fixtures::transaction("gems", TransactionState::Purchased, 1);
        let mut state = BillingState::new();
        state.registry.upsert(purchased.clone());

        ReducerTest::new(reducer())
            .with_env(test_env(&MockBackend::new()))
            .given_state(state)
            .when_action(BillingAction::Consume {
                product_id: "gems".into(),
                reply: CallbackTarget::unset(),
            })
            .then_state(|state| assert!(state.registry.lookup("gems").is_some()))
            .then_effects(move |effects| {
                assert_eq!(
                    assertions::backend_calls(effects),
                    vec![&BackendCall::FinishTransaction(purchased)]
                );
                assert_eq!(assertions::deliveries(effects)[0].reply, Ok(Payload::Empty));
            })
            .run();
    }

    #[test]
    fn test_manage_opens_url() {
        ReducerTest::new(reducer())
            .with_env(test_env(&MockBackend::new()))
            .given_state(BillingState::new())
            .when_action(BillingAction::ManageSubscriptions {
                reply: CallbackTarget::unset(),
            })
            .then_effects(|effects| {
                assert!(matches!(&effects[0], Effect::OpenUrl(url) if url == DEFAULT_MANAGEMENT_URL));
                assertions::assert_delivery_modes(effects, 1, 0);
            })
            .run();
    }

    #[test]
    fn test_manage_unsupported() {
        let env = BillingEnvironment::new(
            Arc::new(MockBackend::new()),
            Arc::new(MockReceiptProvider::new()),
            Arc::new(MockUrlOpener::refusing()),
        );

        ReducerTest::new(reducer())
            .with_env(env)
            .given_state(BillingState::new())
            .when_action(BillingAction::ManageSubscriptions {
                reply: CallbackTarget::unset(),
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                let reply = &assertions::deliveries(effects)[0].reply;
                assert_eq!(reply.as_ref().map_err(BillingError::kind), Err(ErrorKind::Unsupported));
            })
            .run();
    }
}
