//! Async pipelines that fold a producer's progress into state.
//!
//! A pipeline immediately enqueues `Loading`, then `Success` for each value the
//! producer yields, or `Fail` if it errors. Each step is an ordinary
//! mutation, so pipeline updates interleave with other mutations in enqueue
//! order. Cancelling the pipeline, or tearing down its store, stops further
//! mutations without touching states already committed.

use crate::async_result::{AsyncResult, ProducerError};
use crate::scope::Scope;
use crate::state::State;
use crate::store::StateStore;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Whether pipelines run their producers. Hosts use this to freeze a store
/// in a known state, e.g. for screenshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockExecutions {
    /// Run producers normally.
    #[default]
    No,
    /// Never run producers and never touch state.
    Completely,
    /// Never run producers but still enqueue `Loading`.
    WithLoading,
}

type RetainFn<S, T> = Arc<dyn Fn(&S) -> Option<T> + Send + Sync>;

/// Optional behaviour for [`execute`] and [`execute_stream`].
pub struct ExecuteOptions<S, T> {
    retain_value: Option<RetainFn<S, T>>,
    block_executions: Option<BlockExecutions>,
}

impl<S, T> Default for ExecuteOptions<S, T> {
    fn default() -> Self {
        Self {
            retain_value: None,
            block_executions: None,
        }
    }
}

impl<S, T> ExecuteOptions<S, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep a previous value in `Loading` and `Fail`. The selector reads it
    /// from the state current when each of those mutations runs.
    pub fn retain_value<F>(mut self, selector: F) -> Self
    where
        F: Fn(&S) -> Option<T> + Send + Sync + 'static,
    {
        self.retain_value = Some(Arc::new(selector));
        self
    }

    /// Override the store's configured [`BlockExecutions`] for this pipeline.
    pub fn block_executions(mut self, block: BlockExecutions) -> Self {
        self.block_executions = Some(block);
        self
    }
}

/// Handle to a running pipeline.
///
/// Dropping the handle leaves the pipeline running; it stops with its store.
/// A pipeline whose work has finished reports itself as cancelled.
pub struct PipelineHandle {
    scope: Scope,
    task: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Stop the pipeline. No further mutations are enqueued.
    pub fn cancel(&self) {
        self.scope.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait until the pipeline has enqueued its last mutation or was cancelled.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

fn spawn_in<F>(scope: Scope, work: F) -> PipelineHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let task_scope = scope.clone();
    let task = tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = task_scope.cancelled() => debug!("Pipeline cancelled"),
            _ = work => {}
        }
        // Ends the scope's link to the store scope once the work is done.
        task_scope.cancel();
    });
    PipelineHandle {
        scope,
        task: Some(task),
    }
}

/// A blocked pipeline never completes on its own, like a request that never returns.
fn blocked(scope: Scope) -> PipelineHandle {
    spawn_in(scope, std::future::pending())
}

fn enqueue_loading<S, T, R>(
    store: &StateStore<S>,
    retain: Option<RetainFn<S, T>>,
    reducer: Arc<R>,
) where
    S: State,
    T: Send + 'static,
    R: Fn(&S, AsyncResult<T>) -> S + Send + Sync + 'static,
{
    store.mutate(move |state| {
        let value = retain.as_ref().and_then(|selector| selector(state));
        reducer(state, AsyncResult::Loading { value })
    });
}

fn enqueue_fail<S, T, R>(
    store: &StateStore<S>,
    retain: Option<RetainFn<S, T>>,
    reducer: Arc<R>,
    error: ProducerError,
) where
    S: State,
    T: Send + 'static,
    R: Fn(&S, AsyncResult<T>) -> S + Send + Sync + 'static,
{
    debug!("{}: producer failed: {}", store.label(), error);
    store.mutate(move |state| {
        let value = retain.as_ref().and_then(|selector| selector(state));
        reducer(
            state,
            AsyncResult::Fail {
                error: error.clone(),
                value,
            },
        )
    });
}

fn enqueue_success<S, T, R>(store: &StateStore<S>, reducer: Arc<R>, value: T)
where
    S: State,
    T: Clone + Send + Sync + 'static,
    R: Fn(&S, AsyncResult<T>) -> S + Send + Sync + 'static,
{
    store.mutate(move |state| reducer(state, AsyncResult::success(value.clone())));
}

/// Returns the pipeline scope, or a handle to return right away when the
/// producer must not run.
fn start<S, T, R>(
    store: &StateStore<S>,
    options: &ExecuteOptions<S, T>,
    reducer: &Arc<R>,
) -> Result<Scope, PipelineHandle>
where
    S: State,
    T: Send + 'static,
    R: Fn(&S, AsyncResult<T>) -> S + Send + Sync + 'static,
{
    let scope = store.scope().child();
    let block = options
        .block_executions
        .unwrap_or(store.config().block_executions);
    match block {
        BlockExecutions::No => {
            enqueue_loading(store, options.retain_value.clone(), Arc::clone(reducer));
            Ok(scope)
        }
        BlockExecutions::WithLoading => {
            debug!("{}: pipeline blocked after Loading", store.label());
            enqueue_loading(store, options.retain_value.clone(), Arc::clone(reducer));
            Err(blocked(scope))
        }
        BlockExecutions::Completely => {
            debug!("{}: pipeline blocked", store.label());
            Err(blocked(scope))
        }
    }
}

/// Run a one-shot producer, folding its progress into state through `reducer`.
pub fn execute<S, T, E, Fut, R>(
    store: &StateStore<S>,
    producer: Fut,
    options: ExecuteOptions<S, T>,
    reducer: R,
) -> PipelineHandle
where
    S: State,
    T: Clone + Send + Sync + 'static,
    E: Into<ProducerError> + Send + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    R: Fn(&S, AsyncResult<T>) -> S + Send + Sync + 'static,
{
    let reducer = Arc::new(reducer);
    let scope = match start(store, &options, &reducer) {
        Ok(scope) => scope,
        Err(handle) => return handle,
    };

    let store = store.clone();
    let guard = scope.clone();
    let retain = options.retain_value;
    spawn_in(scope, async move {
        let outcome = producer.await;
        if guard.is_cancelled() {
            return;
        }
        match outcome {
            Ok(value) => enqueue_success(&store, reducer, value),
            Err(error) => enqueue_fail(&store, retain, reducer, error.into()),
        }
    })
}

/// Run a streaming producer: `Success` per item, `Fail` on the first error,
/// after which the stream is not polled again.
pub fn execute_stream<S, T, E, St, R>(
    store: &StateStore<S>,
    producer: St,
    options: ExecuteOptions<S, T>,
    reducer: R,
) -> PipelineHandle
where
    S: State,
    T: Clone + Send + Sync + 'static,
    E: Into<ProducerError> + Send + 'static,
    St: Stream<Item = std::result::Result<T, E>> + Send + 'static,
    R: Fn(&S, AsyncResult<T>) -> S + Send + Sync + 'static,
{
    let reducer = Arc::new(reducer);
    let scope = match start(store, &options, &reducer) {
        Ok(scope) => scope,
        Err(handle) => return handle,
    };

    let store = store.clone();
    let guard = scope.clone();
    let retain = options.retain_value;
    spawn_in(scope, async move {
        let mut producer = std::pin::pin!(producer);
        while let Some(item) = producer.next().await {
            if guard.is_cancelled() {
                return;
            }
            match item {
                Ok(value) => enqueue_success(&store, Arc::clone(&reducer), value),
                Err(error) => {
                    enqueue_fail(&store, retain, reducer, error.into());
                    return;
                }
            }
        }
    })
}

/// Fold every item of `values` into state through `reducer`.
pub fn set_on_each<S, T, St, R>(store: &StateStore<S>, values: St, reducer: R) -> PipelineHandle
where
    S: State,
    T: Clone + Send + Sync + 'static,
    St: Stream<Item = T> + Send + 'static,
    R: Fn(&S, T) -> S + Send + Sync + 'static,
{
    let scope = store.scope().child();
    if store.config().block_executions != BlockExecutions::No {
        debug!("{}: set_on_each blocked", store.label());
        return blocked(scope);
    }

    let store = store.clone();
    let guard = scope.clone();
    let reducer = Arc::new(reducer);
    spawn_in(scope, async move {
        let mut values = std::pin::pin!(values);
        while let Some(value) = values.next().await {
            if guard.is_cancelled() {
                return;
            }
            let reducer = Arc::clone(&reducer);
            store.mutate(move |state| reducer(state, value.clone()));
        }
    })
}
