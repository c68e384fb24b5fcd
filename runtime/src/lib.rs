//! # Tripflow Runtime
//!
//! Runtime implementation for the tripflow booking workflow.
//!
//! This crate provides the Store that coordinates reducer execution and effect
//! handling. The Store is the only shared mutable state of a booking session:
//! every change goes through [`Store::send`], reducer calls are serialized by a
//! write lock, and effect results are fed back in as new actions.
//!
//! ## Core Components
//!
//! - **Store**: Owns state and executes effects
//! - **Effect Handle**: Await the direct effects of one action
//! - **Action Stream**: Observe every action produced by effects (progress UI)
//! - **Retry**: Manual-only retry policy and attempt ledger
//!
//! ## Example
//!
//! ```ignore
//! use tripflow_runtime::Store;
//!
//! let store = Store::new(BookingFlowState::default(), BookingFlowReducer::new(), env);
//!
//! store.send(FlowAction::Submit { .. }).await?;
//! store.settled(Duration::from_secs(60)).await?;
//!
//! let stage = store.state(|s| s.stage).await;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tripflow_core::{effect::Effect, reducer::Reducer};

/// Manual-only retry policy and attempt bookkeeping
pub mod retry;

pub use retry::{RetryLedger, RetryPolicy, RetryRejected};
pub use store::Store;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for an action or for effects to settle
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Configuration for Store instances
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Number of actions buffered for slow observers
    pub broadcast_capacity: usize,
    /// Default timeout for graceful shutdown
    pub default_shutdown_timeout: Duration,
}

impl StoreConfig {
    /// Set the action broadcast capacity
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
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
            broadcast_capacity: 256,
            default_shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Counter of running effects that wakes waiters when it drops to zero
#[derive(Clone)]
struct EffectCounter(Arc<watch::Sender<usize>>);

impl EffectCounter {
    fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self(Arc::new(tx))
    }

    fn increment(&self) {
        self.0.send_modify(|n| *n += 1);
    }

    fn decrement(&self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }

    fn current(&self) -> usize {
        *self.0.borrow()
    }

    async fn wait_for_zero(&self) {
        let mut rx = self.0.subscribe();
        // The sender lives as long as `self`, so this can only fail if it
        // is dropped, which cannot happen while we borrow it.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    fn guard(&self) -> CounterGuard {
        self.increment();
        CounterGuard(self.clone())
    }
}

/// Decrements an [`EffectCounter`] on drop, even if the effect panics
struct CounterGuard(EffectCounter);

impl Drop for CounterGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Handle for tracking effect completion
///
/// Returned by [`Store::send`]. Tracks the effects spawned directly by that
/// action; effects of follow-up actions are tracked by the Store as a whole
/// (see [`Store::settled`]).
#[derive(Clone)]
pub struct EffectHandle {
    effects: EffectCounter,
}

impl EffectHandle {
    fn new() -> Self {
        Self {
            effects: EffectCounter::new(),
        }
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        Self::new()
    }

    /// Number of direct effects still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.current()
    }

    /// Wait for all direct effects to complete
    pub async fn wait(&self) {
        self.effects.wait_for_zero().await;
    }

    /// Wait for all direct effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires first.
    pub async fn wait_with_timeout(&self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.pending())
            .finish()
    }
}

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicBool, Duration, Effect, EffectCounter, EffectHandle, Ordering, Reducer,
        RwLock, StoreConfig, StoreError,
    };
    use futures::Stream;
    use tokio::sync::broadcast;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    ///
    /// Cloning a Store yields another handle onto the same state.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        shutdown: Arc<AtomicBool>,
        pending_effects: EffectCounter,
        /// Every action produced by an effect is broadcast here.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: self.pending_effects.clone(),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new Store with custom configuration
        #[must_use]
        pub fn with_config(
            initial_state: S,
            reducer: R,
            environment: E,
            config: StoreConfig,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(config.broadcast_capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: EffectCounter::new(),
                action_broadcast,
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Starts the returned effects asynchronously
        ///
        /// `send()` returns after starting effect execution, not completion.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.actions.total").increment(1);
            let handle = EffectHandle::new();

            let effects = {
                let mut state = self.state.write().await;

                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                tracing::trace!("Reducer completed, returned {} effects", effects.len());
                effects
            };

            for effect in effects {
                self.execute_effect(effect, &handle.effects);
            }

            Ok(handle)
        }

        /// Send an action and wait for a matching action produced by effects
        ///
        /// Subscribes before sending, so a fast effect cannot be missed.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: no matching action before the timeout
        /// - [`StoreError::ChannelClosed`]: action broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to all actions produced by effects
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Stream of all actions produced by effects
        ///
        /// Lagging consumers skip the actions they missed and keep going; the
        /// stream ends when the store is dropped.
        pub fn actions(&self) -> impl Stream<Item = A> + Send + 'static {
            let mut rx = self.action_broadcast.subscribe();
            async_stream::stream! {
                loop {
                    match rx.recv().await {
                        Ok(action) => yield action,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action stream lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let failures = store.state(|s| s.allocation.failed.len()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Number of effects currently running across the store
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.current()
        }

        /// Wait until no effect is running anywhere in the store
        ///
        /// Follow-up actions are reduced before the effect that produced them
        /// is counted as finished, so a chain of effects keeps the store busy
        /// until its last link completes.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::Timeout`] if effects are still running when
        /// the timeout expires.
        pub async fn settled(&self, timeout: Duration) -> Result<(), StoreError> {
            tokio::time::timeout(timeout, self.pending_effects.wait_for_zero())
                .await
                .map_err(|_| StoreError::Timeout)
        }

        /// Initiate graceful shutdown of the store
        ///
        /// Rejects new actions and waits for running effects.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before
        /// all pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            self.shutdown.store(true, Ordering::Release);

            match self.settled(timeout).await {
                Ok(()) => {
                    tracing::info!("All effects completed, shutdown successful");
                    Ok(())
                },
                Err(_) => {
                    let pending = self.pending_effects();
                    tracing::error!(pending_effects = pending, "Shutdown timeout");
                    Err(StoreError::ShutdownTimeout(pending))
                },
            }
        }

        /// Feed an effect-produced action back into the store
        async fn feedback(&self, action: A) {
            let _ = self.action_broadcast.send(action.clone());
            if let Err(error) = self.send(action).await {
                tracing::warn!(%error, "Dropped action produced by effect");
            }
        }

        /// Execute an effect, counting it on both the action's handle and the store
        ///
        /// - `None`: No-op
        /// - `Future`: Executes async computation, sends resulting action if `Some`
        /// - `Delay`: Waits for duration, then sends action
        /// - `Parallel`: Executes effects concurrently
        /// - `Sequential`: Executes effects in order, waiting for each to complete
        fn execute_effect(&self, effect: Effect<A>, handle: &EffectCounter) {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    let handle_guard = handle.guard();
                    let store_guard = self.pending_effects.guard();
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _handle_guard = handle_guard;
                        let _store_guard = store_guard;

                        if let Some(action) = fut.await {
                            store.feedback(action).await;
                        }
                    });
                },
                Effect::Delay { duration, action } => {
                    metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                    let handle_guard = handle.guard();
                    let store_guard = self.pending_effects.guard();
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _handle_guard = handle_guard;
                        let _store_guard = store_guard;

                        tokio::time::sleep(duration).await;
                        store.feedback(*action).await;
                    });
                },
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    for effect in effects {
                        self.execute_effect(effect, handle);
                    }
                },
                Effect::Sequential(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "sequential")
                        .increment(1);
                    let handle_guard = handle.guard();
                    let store_guard = self.pending_effects.guard();
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _handle_guard = handle_guard;
                        let _store_guard = store_guard;

                        for effect in effects {
                            let step = EffectCounter::new();
                            store.execute_effect(effect, &step);
                            step.wait_for_zero().await;
                        }
                    });
                },
            }
        }
    }
}
