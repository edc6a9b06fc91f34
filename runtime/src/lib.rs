//! # Billing Bridge Runtime
//!
//! Runtime implementation for the billing bridge.
//!
//! This crate provides the [`Store`](store::Store): a single sequential worker
//! that owns the bridge state, drains an action queue one action at a time,
//! runs the reducer, and executes the returned effects in order.
//!
//! ## Core Components
//!
//! - **Store**: Owns state and the worker task
//! - **Action queue**: Unbounded FIFO; backend observers and client calls both enqueue
//! - **Effect executor**: Runs backend calls and deliveries on the worker, in order
//!
//! ## Why one worker
//!
//! A batch of backend events must be routed atomically and in order: two
//! batches are never reduced concurrently, and the effects of one batch are
//! fully executed before the next batch is reduced.
//!
//! ## Example
//!
//! ```ignore
//! use billing_bridge_runtime::Store;
//!
//! let store = Store::new(BillingState::default(), BillingReducer::new(), environment);
//!
//! store.send(BillingAction::Restore { reply })?;
//! store.settle().await?;
//!
//! let cached = store.state(|s| s.registry.transaction_count()).await;
//! ```

use billing_bridge_core::{
    DeliveryOutcome, effect::Effect, environment::EffectEnvironment, reducer::Reducer,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};

/// Metric names and descriptions
pub mod metrics;

/// Error types for the Store runtime
pub mod error {
    use std::time::Duration;
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// The worker is gone and the action queue is closed
        #[error("Action queue closed")]
        ChannelClosed,

        /// Shutdown timed out waiting for queued actions to drain
        #[error("Shutdown timed out after {0:?}")]
        ShutdownTimeout(Duration),

        /// The worker task panicked
        #[error("Store worker failed: {0}")]
        WorkerFailed(#[from] tokio::task::JoinError),
    }
}

pub use error::StoreError;
pub use store::{ActionSender, Store};

/// Configuration for Store instances
///
/// # Example
///
/// ```
/// use billing_bridge_runtime::StoreConfig;
/// use std::time::Duration;
///
/// let config = StoreConfig::default().with_shutdown_timeout(Duration::from_secs(5));
/// assert_eq!(config.default_shutdown_timeout, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Default timeout for graceful shutdown
    pub default_shutdown_timeout: Duration,
}

impl StoreConfig {
    /// Create a new configuration with custom values
    #[must_use]
    pub const fn new(default_shutdown_timeout: Duration) -> Self {
        Self {
            default_shutdown_timeout,
        }
    }

    /// Set the default shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.default_shutdown_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Internal: what travels through the action queue
enum Envelope<A> {
    /// An action for the reducer
    Action(A),
    /// Signalled once everything queued before it has been processed
    Barrier(oneshot::Sender<()>),
    /// Stop the worker after draining everything queued before it
    Stop,
}

/// Execute one effect against the environment
///
/// Runs on the worker. Backend calls and URL opening must not block; a
/// delivery to a dropped receiver is logged and counted, never retried.
#[allow(clippy::needless_pass_by_value)] // effects are consumed by execution
pub fn execute_effect<E>(effect: Effect, environment: &E)
where
    E: EffectEnvironment + ?Sized,
{
    match effect {
        Effect::None => {
            tracing::trace!("Executing Effect::None (no-op)");
            ::metrics::counter!(metrics::EFFECTS_EXECUTED, "type" => "none").increment(1);
        },
        Effect::Backend(call) => {
            tracing::debug!(call = call.name(), "Issuing backend call");
            ::metrics::counter!(metrics::EFFECTS_EXECUTED, "type" => "backend").increment(1);
            call.dispatch(environment.backend());
        },
        Effect::Deliver(delivery) => {
            let mode = delivery.mode;
            let target = delivery.target.id();
            ::metrics::counter!(metrics::EFFECTS_EXECUTED, "type" => "deliver").increment(1);
            match delivery.send() {
                DeliveryOutcome::Delivered => {
                    tracing::trace!(target, ?mode, "Reply delivered");
                },
                DeliveryOutcome::Skipped => {
                    tracing::trace!(?mode, "Target unset, delivery skipped");
                },
                DeliveryOutcome::Dead => {
                    tracing::warn!(target, ?mode, "Target receiver dropped, reply lost");
                    ::metrics::counter!(metrics::DELIVERIES_DROPPED).increment(1);
                },
            }
        },
        Effect::OpenUrl(url) => {
            tracing::debug!(%url, "Opening external URL");
            ::metrics::counter!(metrics::EFFECTS_EXECUTED, "type" => "open_url").increment(1);
            environment.url_opener().open(&url);
        },
    }
}

/// Store module - The runtime for the bridge reducer
pub mod store {
    use super::{
        Arc, AtomicBool, Duration, EffectEnvironment, Envelope, Mutex, Ordering, Reducer, RwLock,
        StoreConfig, StoreError, execute_effect, mpsc, oneshot,
    };
    use tokio::task::JoinHandle;

    /// Cloneable handle that enqueues actions
    ///
    /// This is what backend observers hold: enqueueing never blocks and never
    /// runs the reducer on the caller's thread.
    pub struct ActionSender<A> {
        tx: mpsc::UnboundedSender<Envelope<A>>,
        shutdown: Arc<AtomicBool>,
    }

    impl<A> ActionSender<A> {
        /// Enqueue an action
        ///
        /// # Errors
        ///
        /// - [`StoreError::ShutdownInProgress`] once shutdown has begun
        /// - [`StoreError::ChannelClosed`] if the worker is gone
        pub fn send(&self, action: A) -> Result<(), StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                ::metrics::counter!(super::metrics::ACTIONS_REJECTED).increment(1);
                return Err(StoreError::ShutdownInProgress);
            }
            self.tx
                .send(Envelope::Action(action))
                .map_err(|_| StoreError::ChannelClosed)
        }

        /// Returns `true` once shutdown has begun
        #[must_use]
        pub fn is_shutting_down(&self) -> bool {
            self.shutdown.load(Ordering::Acquire)
        }
    }

    impl<A> Clone for ActionSender<A> {
        fn clone(&self) -> Self {
            Self {
                tx: self.tx.clone(),
                shutdown: Arc::clone(&self.shutdown),
            }
        }
    }

    impl<A> std::fmt::Debug for ActionSender<A> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("ActionSender")
                .field("shutting_down", &self.is_shutting_down())
                .finish_non_exhaustive()
        }
    }

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` so readers can observe it between actions)
    /// 2. A worker task that exclusively owns the reducer and environment
    /// 3. The FIFO action queue feeding that worker
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    pub struct Store<S, A> {
        state: Arc<RwLock<S>>,
        sender: ActionSender<A>,
        worker: Arc<Mutex<Option<JoinHandle<()>>>>,
        config: StoreConfig,
    }

    impl<S, A> Store<S, A>
    where
        S: Send + Sync + 'static,
        A: Send + 'static,
    {
        /// Create a store with default configuration and start its worker
        ///
        /// Must be called from within a Tokio runtime.
        #[must_use]
        pub fn new<R, E>(initial_state: S, reducer: R, environment: E) -> Self
        where
            R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
            E: EffectEnvironment + 'static,
        {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a store with custom configuration and start its worker
        ///
        /// Must be called from within a Tokio runtime.
        #[must_use]
        pub fn with_config<R, E>(initial_state: S, reducer: R, environment: E, config: StoreConfig) -> Self
        where
            R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
            E: EffectEnvironment + 'static,
        {
            let (tx, rx) = mpsc::unbounded_channel();
            let state = Arc::new(RwLock::new(initial_state));
            let shutdown = Arc::new(AtomicBool::new(false));

            let handle = tokio::spawn(run_worker(Arc::clone(&state), reducer, environment, rx));

            Self {
                state,
                sender: ActionSender { tx, shutdown },
                worker: Arc::new(Mutex::new(Some(handle))),
                config,
            }
        }

        /// Enqueue an action
        ///
        /// Returns as soon as the action is queued; the reducer runs later on
        /// the worker.
        ///
        /// # Errors
        ///
        /// - [`StoreError::ShutdownInProgress`] once shutdown has begun
        /// - [`StoreError::ChannelClosed`] if the worker is gone
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub fn send(&self, action: A) -> Result<(), StoreError> {
            self.sender.send(action)
        }

        /// A cloneable enqueue handle (for backend observers)
        #[must_use]
        pub fn sender(&self) -> ActionSender<A> {
            self.sender.clone()
        }

        /// Wait until every action queued before this call has been reduced
        /// and its effects executed
        ///
        /// # Errors
        ///
        /// - [`StoreError::ShutdownInProgress`] once shutdown has begun
        /// - [`StoreError::ChannelClosed`] if the worker is gone
        pub async fn settle(&self) -> Result<(), StoreError> {
            if self.sender.is_shutting_down() {
                return Err(StoreError::ShutdownInProgress);
            }
            let (done_tx, done_rx) = oneshot::channel();
            self.sender
                .tx
                .send(Envelope::Barrier(done_tx))
                .map_err(|_| StoreError::ChannelClosed)?;
            done_rx.await.map_err(|_| StoreError::ChannelClosed)
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let cached = store.state(|s| s.registry.lookup("gems_100").cloned()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Default shutdown timeout from the store's configuration
        #[must_use]
        pub const fn default_shutdown_timeout(&self) -> Duration {
            self.config.default_shutdown_timeout
        }

        /// Gracefully shut down the store
        ///
        /// New actions are rejected immediately; actions already queued are
        /// drained before the worker exits.
        ///
        /// # Errors
        ///
        /// - [`StoreError::ShutdownTimeout`] if draining takes longer than `timeout`
        /// - [`StoreError::WorkerFailed`] if the worker panicked
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating store shutdown");
            ::metrics::counter!(super::metrics::SHUTDOWNS).increment(1);

            self.sender.shutdown.store(true, Ordering::Release);
            let _ = self.sender.tx.send(Envelope::Stop);

            let Some(handle) = self.worker.lock().await.take() else {
                tracing::debug!("Store already shut down");
                return Ok(());
            };

            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => {
                    tracing::info!("Store shut down cleanly");
                    Ok(())
                },
                Ok(Err(join_error)) => {
                    tracing::error!(error = %join_error, "Store worker failed");
                    Err(StoreError::WorkerFailed(join_error))
                },
                Err(_) => {
                    tracing::error!(?timeout, "Store shutdown timed out");
                    Err(StoreError::ShutdownTimeout(timeout))
                },
            }
        }
    }

    impl<S, A> Clone for Store<S, A> {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                sender: self.sender.clone(),
                worker: Arc::clone(&self.worker),
                config: self.config.clone(),
            }
        }
    }

    /// Worker loop: drain the queue strictly one envelope at a time
    async fn run_worker<S, A, R, E>(
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        mut rx: mpsc::UnboundedReceiver<Envelope<A>>,
    ) where
        R: Reducer<State = S, Action = A, Environment = E>,
        E: EffectEnvironment,
    {
        tracing::info!("Store worker started");
        while let Some(envelope) = rx.recv().await {
            match envelope {
                Envelope::Action(action) => {
                    ::metrics::counter!(super::metrics::ACTIONS_TOTAL).increment(1);

                    let effects = {
                        let mut guard = state.write().await;
                        let span = tracing::debug_span!("reducer_execution");
                        let _enter = span.enter();

                        let start = std::time::Instant::now();
                        let effects = reducer.reduce(&mut *guard, action, &environment);
                        ::metrics::histogram!(super::metrics::REDUCER_DURATION)
                            .record(start.elapsed().as_secs_f64());

                        tracing::trace!("Reducer completed, returned {} effects", effects.len());
                        effects
                    };

                    for effect in effects {
                        execute_effect(effect, &environment);
                    }
                },
                Envelope::Barrier(done) => {
                    let _ = done.send(());
                },
                Envelope::Stop => break,
            }
        }
        tracing::info!("Store worker stopped");
    }
}
