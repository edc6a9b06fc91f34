//! Callback Router reducers.
//!
//! This module contains the pure reducer functions that route client
//! requests to the backend and backend events to callback targets.
//!
//! Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.

pub mod account;
pub mod catalog;
pub mod purchase;
pub mod restore;

use crate::{BillingAction, BillingEnvironment, BillingState, BridgeConfig};
use billing_bridge_core::{
    BackendEvent, BillingError, CallbackTarget, Reply, SlotMode, SmallVec, effect::Effect,
    reducer::Reducer, smallvec,
};

// Re-export
pub use account::AccountReducer;
pub use catalog::CatalogReducer;
pub use purchase::PurchaseReducer;
pub use restore::RestoreReducer;

/// Effects returned by every reducer in this module.
pub type Effects = SmallVec<[Effect; 4]>;

/// Fan one reply out to every persistent listener, then to the one-shot target.
pub(crate) fn fan_out(
    effects: &mut Effects,
    listeners: Vec<CallbackTarget>,
    one_shot: Option<CallbackTarget>,
    reply: Reply,
) {
    for listener in listeners {
        effects.push(Effect::deliver(listener, reply.clone(), SlotMode::Persistent));
    }
    if let Some(target) = one_shot {
        effects.push(Effect::deliver(target, reply, SlotMode::OneShot));
    }
}

/// Resolve a request within the reduction that received it.
pub(crate) fn reply_now(target: CallbackTarget, reply: Reply) -> Effects {
    smallvec![Effect::deliver(target, reply, SlotMode::OneShot)]
}

/// Unified billing reducer.
///
/// Routes each action to the sub-reducer that owns it and handles
/// subscriptions and shutdown itself.
#[derive(Debug, Clone)]
pub struct BillingReducer {
    catalog: CatalogReducer,
    purchase: PurchaseReducer,
    restore: RestoreReducer,
    account: AccountReducer,
}

impl BillingReducer {
    /// Create the router for `config`.
    #[must_use]
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            catalog: CatalogReducer::new(config),
            purchase: PurchaseReducer::new(config),
            restore: RestoreReducer::new(config),
            account: AccountReducer::new(config),
        }
    }

    fn close(state: &mut BillingState) -> Effects {
        state.closed = true;
        state.slots.clear_listeners();

        let pending = state.slots.take_all_pending();
        tracing::info!(abandoned = pending.len(), "Router closed");

        pending
            .into_iter()
            .map(|target| Effect::deliver(target, Err(BillingError::Unavailable), SlotMode::OneShot))
            .collect()
    }

    fn reject_closed(action: BillingAction) -> Effects {
        match action.reply_target() {
            Some(target) => {
                tracing::debug!(action = action.name(), "Router closed, rejecting request");
                reply_now(target.clone(), Err(BillingError::Unavailable))
            },
            None => {
                tracing::debug!(action = action.name(), "Router closed, ignoring");
                SmallVec::new()
            },
        }
    }
}

impl Default for BillingReducer {
    fn default() -> Self {
        Self::new(&BridgeConfig::default())
    }
}

impl Reducer for BillingReducer {
    type State = BillingState;
    type Action = BillingAction;
    type Environment = BillingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects {
        if state.closed {
            return Self::reject_closed(action);
        }

        match action {
            // Catalog
            BillingAction::LoadProducts { .. }
            | BillingAction::Backend(
                BackendEvent::ProductsReceived { .. } | BackendEvent::ProductsRequestFailed { .. },
            ) => self.catalog.reduce(state, action, env),

            // Purchases
            BillingAction::Purchase { .. }
            | BillingAction::Backend(
                BackendEvent::TransactionsUpdated(_) | BackendEvent::TransactionsRemoved(_),
            ) => self.purchase.reduce(state, action, env),

            // Restore flow
            BillingAction::Restore { .. }
            | BillingAction::Backend(BackendEvent::RestoreFinished | BackendEvent::RestoreFailed { .. }) => {
                self.restore.reduce(state, action, env)
            },

            // Finalization and account surfaces
            BillingAction::Acknowledge { .. }
            | BillingAction::Consume { .. }
            | BillingAction::ManageSubscriptions { .. } => self.account.reduce(state, action, env),

            // Persistent listeners
            BillingAction::Subscribe {
                channel,
                subscription,
                target,
            } => {
                tracing::debug!(%channel, %subscription, "Listener subscribed");
                state.slots.subscribe(channel, subscription, target);
                SmallVec::new()
            },
            BillingAction::Unsubscribe { subscription } => {
                if !state.slots.unsubscribe(subscription) {
                    tracing::debug!(%subscription, "Unsubscribe for unknown listener");
                }
                SmallVec::new()
            },

            BillingAction::Close => Self::close(state),
        }
    }
}
