//! Single-writer state store.
//!
//! Callers on any task enqueue mutations and reads; one drain loop per store
//! executes them. Before every read the loop applies every mutation that is
//! queued at that instant, including mutations enqueued by the reducers and
//! read callbacks it has just run, so nested operations resolve depth first:
//!
//! ```text
//! loop:
//!     if a mutation is queued: apply it, publish if the state changed
//!     else if a read is queued: run it against the current state
//!     else: idle until new work arrives or the scope is torn down
//! ```

use crate::broadcast::{StateBroadcaster, StateSubscription};
use crate::config::StoreConfig;
use crate::error::{ErrorCode, Result, StoreError};
use crate::purity::PurityValidator;
use crate::scope::Scope;
use crate::state::State;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

type Reducer<S> = Box<dyn Fn(&S) -> S + Send>;
type ReadCallback<S> = Box<dyn FnOnce(&Arc<S>) + Send>;

enum PendingOp<S> {
    Mutate(Reducer<S>),
    Read(ReadCallback<S>),
}

struct Queues<S> {
    mutations: VecDeque<Reducer<S>>,
    reads: VecDeque<ReadCallback<S>>,
    closed: bool,
}

struct Shared<S: State> {
    label: String,
    queues: Mutex<Queues<S>>,
    wake: Notify,
    state: RwLock<Arc<S>>,
    broadcaster: StateBroadcaster<S>,
    purity: Option<PurityValidator>,
    scope: Scope,
    config: StoreConfig,
    commits: AtomicU64,
    drain: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl<S: State> Shared<S> {
    fn queues(&self) -> MutexGuard<'_, Queues<S>> {
        // Queue updates are single push/pop calls, so a poisoned lock still
        // guards consistent data.
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn snapshot(&self) -> Arc<S> {
        Arc::clone(&self.state.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn enqueue(&self, op: PendingOp<S>) {
        {
            let mut queues = self.queues();
            if queues.closed {
                trace!("{}: store closed, discarding operation", self.label);
                return;
            }
            match op {
                PendingOp::Mutate(reducer) => queues.mutations.push_back(reducer),
                PendingOp::Read(callback) => queues.reads.push_back(callback),
            }
        }
        self.wake.notify_one();
    }

    fn next_op(&self) -> Option<PendingOp<S>> {
        let mut queues = self.queues();
        if let Some(reducer) = queues.mutations.pop_front() {
            return Some(PendingOp::Mutate(reducer));
        }
        queues.reads.pop_front().map(PendingOp::Read)
    }

    /// Run a reducer against the current state, committing a changed result.
    fn reduce(&self, reducer: &Reducer<S>) -> Result<Option<Arc<S>>> {
        let current = self.snapshot();
        let next = match &self.purity {
            Some(validator) => validator.apply(current.as_ref(), |state| reducer(state))?,
            None => reducer(current.as_ref()),
        };
        if next == *current {
            trace!("{}: reducer produced an equal state, skipping", self.label);
            return Ok(None);
        }

        let next = Arc::new(next);
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = Arc::clone(&next);
        let commits = self.commits.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("{}: committed state #{}", self.label, commits);
        Ok(Some(next))
    }

    fn close(&self) {
        let (mutations, reads) = {
            let mut queues = self.queues();
            queues.closed = true;
            (
                std::mem::take(&mut queues.mutations),
                std::mem::take(&mut queues.reads),
            )
        };
        if !mutations.is_empty() || !reads.is_empty() {
            debug!(
                "{}: discarding {} queued mutations and {} queued reads",
                self.label,
                mutations.len(),
                reads.len()
            );
        }
        self.broadcaster.close();
    }
}

/// Closes the store when the drain loop exits, including by panic.
struct DrainGuard<S: State>(Arc<Shared<S>>);

impl<S: State> Drop for DrainGuard<S> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("{}: drain loop panicked, closing store", self.0.label);
        }
        self.0.close();
    }
}

async fn drain<S: State>(shared: Arc<Shared<S>>) -> Result<()> {
    let _guard = DrainGuard(Arc::clone(&shared));
    debug!("{}: drain loop started", shared.label);

    loop {
        if shared.scope.is_cancelled() {
            break;
        }
        match shared.next_op() {
            Some(PendingOp::Mutate(reducer)) => {
                let committed = shared.reduce(&reducer).map_err(|e| {
                    error!("{}: {}", shared.label, e);
                    e
                })?;
                drop(reducer);
                if let Some(state) = committed {
                    tokio::select! {
                        biased;
                        _ = shared.scope.cancelled() => break,
                        _ = shared.broadcaster.publish(state) => {}
                    }
                }
            }
            Some(PendingOp::Read(callback)) => {
                let snapshot = shared.snapshot();
                callback(&snapshot);
            }
            None => {
                tokio::select! {
                    biased;
                    _ = shared.scope.cancelled() => break,
                    _ = shared.wake.notified() => {}
                }
                continue;
            }
        }
        tokio::task::yield_now().await;
    }

    info!(
        "{}: drain loop stopped after {} commits",
        shared.label,
        shared.commits.load(Ordering::Relaxed)
    );
    Ok(())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle to a single-writer state store. Clones share the same store.
///
/// Constructors spawn the drain loop and must be called inside a Tokio
/// runtime. The loop runs until the store's scope is torn down, either
/// through [`StateStore::close`] or by cancelling the host [`Scope`] passed to
/// [`StateStore::with_scope`].
pub struct StateStore<S: State> {
    shared: Arc<Shared<S>>,
}

impl<S: State> Clone for StateStore<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: State> StateStore<S> {
    /// Create a store with default configuration and its own scope.
    pub fn new(initial: S) -> Self {
        Self::with_config(initial, StoreConfig::default())
    }

    /// A zero `subscriber_capacity` is treated as one.
    pub fn with_config(initial: S, config: StoreConfig) -> Self {
        Self::spawn(initial, Scope::new(), config)
    }

    /// Create a store that is torn down together with `scope`.
    pub fn with_scope(initial: S, scope: &Scope, config: StoreConfig) -> Self {
        Self::spawn(initial, scope.child(), config)
    }

    fn spawn(initial: S, scope: Scope, config: StoreConfig) -> Self {
        let label = config.label::<S>();
        let initial = Arc::new(initial);
        let purity = config
            .debug_mode
            .then(|| PurityValidator::new(label.clone()));
        let shared = Arc::new(Shared {
            queues: Mutex::new(Queues {
                mutations: VecDeque::new(),
                reads: VecDeque::new(),
                closed: false,
            }),
            wake: Notify::new(),
            state: RwLock::new(Arc::clone(&initial)),
            broadcaster: StateBroadcaster::new(
                initial,
                config.subscriber_capacity,
                config.overflow,
            ),
            purity,
            scope,
            label,
            config,
            commits: AtomicU64::new(0),
            drain: Mutex::new(None),
        });

        let handle = tokio::spawn(drain(Arc::clone(&shared)));
        *shared.drain.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Self { shared }
    }

    /// Enqueue a reducer. Returns immediately.
    ///
    /// The reducer runs after every operation enqueued before it. It must be a
    /// pure function of its input; in debug mode it runs twice and differing
    /// outputs stop the store with [`StoreError::ImpureReducer`].
    pub fn mutate<F>(&self, reducer: F)
    where
        F: Fn(&S) -> S + Send + 'static,
    {
        self.shared.enqueue(PendingOp::Mutate(Box::new(reducer)));
    }

    /// Enqueue a read. Returns immediately.
    ///
    /// The callback observes every mutation enqueued before this call, plus
    /// any mutations those enqueue in turn.
    pub fn read<F>(&self, callback: F)
    where
        F: FnOnce(&S) + Send + 'static,
    {
        self.shared
            .enqueue(PendingOp::Read(Box::new(move |state: &Arc<S>| {
                callback(state.as_ref())
            })));
    }

    /// Wait for every previously enqueued mutation and return the resulting state.
    pub async fn await_state(&self) -> Result<Arc<S>> {
        let (tx, rx) = oneshot::channel();
        self.shared
            .enqueue(PendingOp::Read(Box::new(move |state: &Arc<S>| {
                let _ = tx.send(Arc::clone(state));
            })));
        rx.await.map_err(|_| {
            StoreError::closed(format!(
                "{} closed before the state could be read",
                self.shared.label
            ))
        })
    }

    /// Latest committed state, without waiting for queued mutations.
    pub fn current_state_unsafe(&self) -> Arc<S> {
        self.shared.snapshot()
    }

    /// Raw stream of committed states, starting with the current one.
    ///
    /// Consecutive equal states are never published. The stream completes
    /// when the store is torn down.
    pub fn subscribe(&self) -> StateSubscription<S> {
        self.shared.broadcaster.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.broadcaster.subscriber_count()
    }

    /// Tear down this store. Queued and later operations are discarded.
    pub fn close(&self) {
        self.shared.scope.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.scope.is_cancelled() || self.shared.queues().closed
    }

    /// Wait for the drain loop to stop.
    ///
    /// Returns the error that stopped it, if any. Only the first caller
    /// observes the outcome; later calls return `Ok(())`.
    pub async fn join(&self) -> Result<()> {
        let handle = self
            .shared
            .drain
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(handle) = handle else {
            return Ok(());
        };
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(StoreError::reducer_panicked(panic_message(
                e.into_panic(),
            ))
            .with_context(&self.shared.label)),
            Err(e) => Err(StoreError::Other {
                code: ErrorCode::SCHEDULER_TASK_ABORTED,
                message: format!("{}: drain loop aborted: {}", self.shared.label, e),
                source: None,
            }),
        }
    }

    /// Scope owned by this store. Child of the host scope, if one was given.
    pub fn scope(&self) -> &Scope {
        &self.shared.scope
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Number of state changes committed so far.
    pub fn commit_count(&self) -> u64 {
        self.shared.commits.load(Ordering::Relaxed)
    }
}

impl<S: State> fmt::Debug for StateStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("label", &self.shared.label)
            .field("state", &self.shared.snapshot())
            .field("closed", &self.is_closed())
            .finish()
    }
}
