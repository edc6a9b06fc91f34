//! Restore flow reducer.
//!
//! A restore starts by clearing the registry's working set. Restored
//! transactions are collected (and finalized) as they arrive in update
//! batches; the flow's terminal signal delivers the whole working set as one
//! batch, or an error if the backend gave up.

use super::purchase::format_transaction;
use super::{Effects, fan_out};
use crate::actions::ListenerChannel;
use crate::{BillingAction, BillingEnvironment, BillingState, BridgeConfig};
use billing_bridge_core::{
    BackendCall, BackendEvent, BillingError, CallbackTarget, Payload, SlotMode, SmallVec,
    effect::Effect, reducer::Reducer, smallvec,
};

/// Restore reducer.
#[derive(Debug, Clone)]
pub struct RestoreReducer {
    platform: String,
}

impl RestoreReducer {
    /// Create a restore reducer for `config`.
    #[must_use]
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            platform: config.platform.clone(),
        }
    }

    fn restore(state: &mut BillingState, reply: CallbackTarget) -> Effects {
        state.registry.begin_restore();
        let call = state.slots.open_restore(reply);
        tracing::debug!(?call, "Restoring completed transactions");

        smallvec![Effect::backend(BackendCall::RestoreCompletedTransactions)]
    }

    fn finished(&self, state: &mut BillingState, env: &BillingEnvironment) -> Effects {
        let restored = state.registry.drain_restored();
        let views = restored
            .iter()
            .map(|transaction| format_transaction(transaction, &self.platform, env))
            .collect::<Vec<_>>();

        let listeners = state.slots.listeners(ListenerChannel::PurchaseRestored);
        let pending = state.slots.take_restores();
        tracing::debug!(
            restored = views.len(),
            listeners = listeners.len(),
            calls = pending.len(),
            "Restore finished"
        );

        let reply = Ok(Payload::Purchases(views));
        let mut effects = SmallVec::new();
        fan_out(&mut effects, listeners, None, reply.clone());
        for target in pending {
            effects.push(Effect::deliver(target, reply.clone(), SlotMode::OneShot));
        }
        effects
    }

    fn failed(state: &mut BillingState, message: Option<&str>) -> Effects {
        let discarded = state.registry.drain_restored();
        let pending = state.slots.take_restores();
        tracing::warn!(
            ?message,
            discarded = discarded.len(),
            calls = pending.len(),
            "Restore failed"
        );

        pending
            .into_iter()
            .map(|target| Effect::deliver(target, Err(BillingError::RestoreFailed), SlotMode::OneShot))
            .collect()
    }
}

impl Reducer for RestoreReducer {
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
            BillingAction::Restore { reply } => Self::restore(state, reply),
            BillingAction::Backend(BackendEvent::RestoreFinished) => self.finished(state, env),
            BillingAction::Backend(BackendEvent::RestoreFailed { message }) => {
                Self::failed(state, message.as_deref())
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
    use crate::reducers::BillingReducer;
    use crate::reducers::tests::test_env;
    use billing_bridge_core::TransactionState;
    use billing_bridge_testing::{ReducerTest, assertions, fixtures, mocks::MockBackend};

    fn reducer() -> RestoreReducer {
        RestoreReducer::new(&BridgeConfig::default())
    }

    #[test]
    fn test_restore_clears_working_set_and_calls_backend() {
        let mut state = BillingState::new();
        state
            .registry
            .upsert(fixtures::transaction("stale", TransactionState::Restored, 1));

        ReducerTest::new(reducer())
            .with_env(test_env(&MockBackend::new()))
            .given_state(state)
            .when_action(BillingAction::Restore {
                reply: CallbackTarget::unset(),
            })
            .then_state(|state| {
                assert!(state.registry.restoring().is_empty());
                assert_eq!(state.slots.pending_count(), 1);
            })
            .then_effects(|effects| {
                assert_eq!(
                    assertions::backend_calls(effects),
                    vec![&BackendCall::RestoreCompletedTransactions]
                );
            })
            .run();
    }

    #[test]
    fn test_zero_restored_is_ok_and_empty() {
        ReducerTest::new(reducer())
            .with_env(test_env(&MockBackend::new()))
            .given_state(BillingState::new())
            .when_action(BillingAction::Restore {
                reply: CallbackTarget::unset(),
            })
            .when_action(BillingAction::Backend(BackendEvent::RestoreFinished))
            .then_state(|state| assert_eq!(state.slots.pending_count(), 0))
            .then_effects(|effects| {
                let deliveries = assertions::deliveries(effects);
                assert_eq!(deliveries.len(), 1);
                assert_eq!(deliveries[0].reply, Ok(Payload::Purchases(vec![])));
            })
            .run();
    }

    #[test]
    fn test_batch_delivered_once_in_accumulation_order() {
        let (listener, _rx) = CallbackTarget::channel();

        ReducerTest::new(BillingReducer::default())
            .with_env(test_env(&MockBackend::new()))
            .given_state(BillingState::new())
            .when_action(BillingAction::Subscribe {
                channel: ListenerChannel::PurchaseRestored,
                subscription: SubscriptionId(1),
                target: listener,
            })
            .when_action(BillingAction::Restore {
                reply: CallbackTarget::unset(),
            })
            .when_action(BillingAction::Backend(BackendEvent::TransactionsUpdated(vec![
                fixtures::transaction("a", TransactionState::Restored, 2),
                fixtures::transaction("b", TransactionState::Restored, 1),
            ])))
            // Redelivery of a transaction already collected
            .when_action(BillingAction::Backend(BackendEvent::TransactionsUpdated(vec![
                fixtures::transaction("a", TransactionState::Restored, 2),
            ])))
            .when_action(BillingAction::Backend(BackendEvent::RestoreFinished))
            .then_state(|state| assert!(state.registry.restoring().is_empty()))
            .then_effects(|effects| {
                // Restored transactions were finalized on arrival, not again here
                assertions::assert_no_backend_calls(effects);
                assertions::assert_delivery_modes(effects, 1, 1);
                for delivery in assertions::deliveries(effects) {
                    match &delivery.reply {
                        Ok(Payload::Purchases(views)) => {
                            let ids: Vec<_> = views.iter().map(|v| v.id.as_str()).collect();
                            assert_eq!(ids, vec!["a", "b"]);
                            assert!(views.iter().all(|v| v.state == 3));
                        },
                        other => panic!("unexpected reply {other:?}"),
                    }
                }
            })
            .run();
    }

    #[test]
    fn test_failure_resolves_every_pending_restore() {
        let mut state = BillingState::new();
        state.slots.open_restore(CallbackTarget::unset());
        state.slots.open_restore(CallbackTarget::unset());

        ReducerTest::new(reducer())
            .with_env(test_env(&MockBackend::new()))
            .given_state(state)
            .when_action(BillingAction::Backend(BackendEvent::RestoreFailed {
                message: Some("network".into()),
            }))
            .then_state(|state| assert_eq!(state.slots.pending_count(), 0))
            .then_effects(|effects| {
                assertions::assert_delivery_modes(effects, 2, 0);
                for delivery in assertions::deliveries(effects) {
                    let error = delivery.reply.as_ref().unwrap_err();
                    assert_eq!(error.to_string(), "unable to restore purchases");
                }
            })
            .run();
    }
}
