//! Host-facing state container.
//!
//! [`Repository`] bundles a [`StateStore`] with the subscription registry of
//! its unique-only ids, and exposes selectors, gated delivery and async
//! pipelines on top of the raw mutate/read interface.

use crate::async_result::{AsyncResult, ProducerError};
use crate::broadcast::StateSubscription;
use crate::config::StoreConfig;
use crate::delivery::{
    gate_stream, gate_unclaimed, ActiveSignal, DeliveryMode, GatedSubscription,
    SubscriptionRegistry,
};
use crate::error::Result;
use crate::pipeline::{self, ExecuteOptions, PipelineHandle};
use crate::scope::Scope;
use crate::state::State;
use crate::store::StateStore;
use futures::future;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::future::Future;
use std::sync::Arc;

pub struct Repository<S: State> {
    store: StateStore<S>,
    registry: Arc<SubscriptionRegistry>,
}

impl<S: State> Clone for Repository<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

/// Map states through `selector`, skipping values equal to the previous one.
fn select_distinct<S, T, Sel>(subscription: StateSubscription<S>, selector: Sel) -> BoxStream<'static, T>
where
    S: State,
    T: Clone + PartialEq + Send + 'static,
    Sel: Fn(&S) -> T + Send + 'static,
{
    let mut previous: Option<T> = None;
    subscription
        .into_stream()
        .filter_map(move |state| {
            let value = selector(&state);
            let changed = previous.as_ref() != Some(&value);
            if changed {
                previous = Some(value.clone());
            }
            future::ready(changed.then_some(value))
        })
        .boxed()
}

impl<S: State> Repository<S> {
    pub fn new(initial: S) -> Self {
        Self::from_store(StateStore::new(initial))
    }

    pub fn with_config(initial: S, config: StoreConfig) -> Self {
        Self::from_store(StateStore::with_config(initial, config))
    }

    pub fn with_scope(initial: S, scope: &Scope, config: StoreConfig) -> Self {
        Self::from_store(StateStore::with_scope(initial, scope, config))
    }

    pub fn from_store(store: StateStore<S>) -> Self {
        Self {
            store,
            registry: SubscriptionRegistry::new(),
        }
    }

    pub fn store(&self) -> &StateStore<S> {
        &self.store
    }

    pub fn mutate<F>(&self, reducer: F)
    where
        F: Fn(&S) -> S + Send + 'static,
    {
        self.store.mutate(reducer);
    }

    pub fn read<F>(&self, callback: F)
    where
        F: FnOnce(&S) + Send + 'static,
    {
        self.store.read(callback);
    }

    pub async fn await_state(&self) -> Result<Arc<S>> {
        self.store.await_state().await
    }

    pub fn current_state_unsafe(&self) -> Arc<S> {
        self.store.current_state_unsafe()
    }

    pub fn subscribe(&self) -> StateSubscription<S> {
        self.store.subscribe()
    }

    /// Raw, ungated stream of committed states starting with the current one.
    pub fn state_stream(&self) -> impl Stream<Item = Arc<S>> + Send + 'static {
        self.store.subscribe().into_stream()
    }

    /// Deliver whole states to `callback` while `signal` is active.
    pub fn subscribe_gated<F>(
        &self,
        mode: DeliveryMode,
        signal: &ActiveSignal,
        callback: F,
    ) -> Result<GatedSubscription>
    where
        F: FnMut(Arc<S>) + Send + 'static,
    {
        gate_stream(
            self.state_stream().boxed(),
            mode,
            signal,
            &self.registry,
            self.store.scope(),
            callback,
        )
    }

    /// Call `action` with each distinct value of `selector`, starting with the current one.
    pub fn on_each<T, Sel, F>(&self, selector: Sel, action: F) -> GatedSubscription
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        Sel: Fn(&S) -> T + Send + 'static,
        F: FnMut(T) + Send + 'static,
    {
        let values = select_distinct(self.store.subscribe(), selector);
        gate_unclaimed(values, &ActiveSignal::new(true), self.store.scope(), action)
    }

    /// Like [`Repository::on_each`], but delivered only while `signal` is active.
    pub fn on_each_gated<T, Sel, F>(
        &self,
        selector: Sel,
        mode: DeliveryMode,
        signal: &ActiveSignal,
        action: F,
    ) -> Result<GatedSubscription>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        Sel: Fn(&S) -> T + Send + 'static,
        F: FnMut(T) + Send + 'static,
    {
        let values = select_distinct(self.store.subscribe(), selector);
        gate_stream(
            values,
            mode,
            signal,
            &self.registry,
            self.store.scope(),
            action,
        )
    }

    /// Watch an async field, calling `on_success` or `on_fail` as it completes.
    pub fn on_async<T, Sel, FailFn, SuccessFn>(
        &self,
        selector: Sel,
        mut on_fail: FailFn,
        mut on_success: SuccessFn,
    ) -> GatedSubscription
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        Sel: Fn(&S) -> AsyncResult<T> + Send + 'static,
        FailFn: FnMut(ProducerError) + Send + 'static,
        SuccessFn: FnMut(T) + Send + 'static,
    {
        self.on_each(selector, move |result| match result {
            AsyncResult::Success { value } => on_success(value),
            AsyncResult::Fail { error, .. } => on_fail(error),
            AsyncResult::Uninitialized | AsyncResult::Loading { .. } => {}
        })
    }

    pub fn execute<T, E, Fut, R>(
        &self,
        producer: Fut,
        options: ExecuteOptions<S, T>,
        reducer: R,
    ) -> PipelineHandle
    where
        T: Clone + Send + Sync + 'static,
        E: Into<ProducerError> + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        R: Fn(&S, AsyncResult<T>) -> S + Send + Sync + 'static,
    {
        pipeline::execute(&self.store, producer, options, reducer)
    }

    pub fn execute_stream<T, E, St, R>(
        &self,
        producer: St,
        options: ExecuteOptions<S, T>,
        reducer: R,
    ) -> PipelineHandle
    where
        T: Clone + Send + Sync + 'static,
        E: Into<ProducerError> + Send + 'static,
        St: Stream<Item = std::result::Result<T, E>> + Send + 'static,
        R: Fn(&S, AsyncResult<T>) -> S + Send + Sync + 'static,
    {
        pipeline::execute_stream(&self.store, producer, options, reducer)
    }

    pub fn set_on_each<T, St, R>(&self, values: St, reducer: R) -> PipelineHandle
    where
        T: Clone + Send + Sync + 'static,
        St: Stream<Item = T> + Send + 'static,
        R: Fn(&S, T) -> S + Send + Sync + 'static,
    {
        pipeline::set_on_each(&self.store, values, reducer)
    }

    /// Tear down the underlying store.
    pub fn close(&self) {
        self.store.close();
    }

    pub async fn join(&self) -> Result<()> {
        self.store.join().await
    }
}
