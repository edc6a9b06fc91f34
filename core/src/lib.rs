//! # Billing Bridge Core
//!
//! Core traits and types for the billing bridge.
//!
//! The bridge reconciles an event-sourced purchasing backend (a transaction queue
//! that reports state changes asynchronously, out of order and sometimes twice)
//! with a client API that expects exactly one terminal answer per call, plus
//! persistent listeners for passive notifications.
//!
//! ## Core Concepts
//!
//! - **State**: The transaction registry and the callback-slot table
//! - **Action**: Client requests and backend events, unified
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Description of a backend call or a delivery (not execution)
//! - **Environment**: Backend collaborators injected via traits
//!
//! ## Example
//!
//! ```ignore
//! use billing_bridge_core::*;
//!
//! impl Reducer for BillingReducer {
//!     type State = BillingState;
//!     type Action = BillingAction;
//!     type Environment = BillingEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut BillingState,
//!         action: BillingAction,
//!         env: &BillingEnvironment,
//!     ) -> SmallVec<[Effect; 4]> {
//!         // Routing logic goes here
//!         smallvec![Effect::None]
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};

/// Backend collaborator traits, backend calls and backend events
pub mod backend;

/// Callback targets (the opaque handles replies are delivered to)
pub mod callback;

/// Caller-visible error taxonomy
pub mod error;

/// Domain model: products, transactions, amounts
pub mod model;

/// Boundary views: the only place loosely-typed data appears
pub mod views;

pub use backend::{BackendCall, BackendEvent, PurchaseBackend, ReceiptProvider, TransactionObserver, UrlOpener};
pub use callback::{CallbackTarget, DeliveryOutcome, ReplyReceiver, SlotMode};
pub use error::{BillingError, ErrorKind};
pub use model::{Amount, IntroductoryPrice, Product, ProductId, ProductKind, RequestId, Transaction, TransactionState};
pub use views::{ErrorView, Payload, ProductView, PurchaseResultView, ReceiptView, Reply, Response, Status};

/// Reducer module - The core trait for routing logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// They may read from the environment (capability flags, receipts) but never
/// perform I/O themselves; every side effect is returned as an [`Effect`](super::effect::Effect).
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for routing logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// State is updated in place *before* any effect runs, so a target
        /// reacting to a delivery already observes the new state.
        ///
        /// # Returns
        ///
        /// Effects to be executed by the runtime, strictly in order
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects are values. The runtime executes them in the order the reducer
/// returned them, on the same sequential worker that ran the reducer.
pub mod effect {
    use crate::backend::BackendCall;
    use crate::callback::{CallbackTarget, DeliveryOutcome, SlotMode};
    use crate::views::Reply;

    /// Effect type - describes a side effect to be executed
    #[derive(Debug, Clone)]
    pub enum Effect {
        /// No-op effect
        None,

        /// Issue an operation to the purchasing backend
        Backend(BackendCall),

        /// Deliver a reply to a registered callback target
        Deliver(Delivery),

        /// Open an external URL (subscription management surface)
        OpenUrl(String),
    }

    impl Effect {
        /// Build a delivery effect
        #[must_use]
        pub const fn deliver(target: CallbackTarget, reply: Reply, mode: SlotMode) -> Self {
            Self::Deliver(Delivery {
                target,
                reply,
                mode,
            })
        }

        /// Build a backend effect
        #[must_use]
        pub const fn backend(call: BackendCall) -> Self {
            Self::Backend(call)
        }
    }

    /// A reply bound for one callback target
    #[derive(Debug, Clone)]
    pub struct Delivery {
        /// Where the reply goes
        pub target: CallbackTarget,
        /// The reply itself
        pub reply: Reply,
        /// Whether the slot the target came from is retained after this delivery
        pub mode: SlotMode,
    }

    impl Delivery {
        /// Hand the reply to its target
        pub fn send(self) -> DeliveryOutcome {
            self.target.deliver(self.reply)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external collaborators are abstracted behind traits and injected via
/// the Environment parameter.
pub mod environment {
    use crate::backend::{PurchaseBackend, UrlOpener};

    /// Collaborators the runtime needs to execute effects
    ///
    /// The runtime only ever calls the backend and the URL opener; replies
    /// carry their own target.
    pub trait EffectEnvironment: Send + Sync {
        /// The purchasing backend
        fn backend(&self) -> &dyn PurchaseBackend;

        /// The platform's external URL opener
        fn url_opener(&self) -> &dyn UrlOpener;
    }
}
