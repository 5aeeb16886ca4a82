//! Common test utilities and helpers

#![allow(dead_code)]

use stateflow::{impl_state, AsyncResult, Repository, StoreConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CounterState {
    pub count: u64,
}

impl_state!(CounterState { count });

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderingState {
    pub count: u32,
}

impl_state!(OrderingState { count });

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProfileState {
    pub name: String,
    pub user: AsyncResult<String>,
    pub score: AsyncResult<u32>,
}

impl_state!(ProfileState { name, user, score });

#[derive(Debug, thiserror::Error)]
#[error("service unavailable")]
pub struct ServiceUnavailable;

/// Config for stores whose reducers record side effects and so must run once.
pub fn single_run_config() -> StoreConfig {
    StoreConfig::new().with_debug_mode(false)
}

pub fn ordering_repo() -> Repository<OrderingState> {
    Repository::with_config(OrderingState::default(), single_run_config())
}

pub fn increment(state: &CounterState) -> CounterState {
    CounterState {
        count: state.count + 1,
    }
}

/// Give spawned delivery tasks time to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}

/// Thread-safe append-only log of callback names.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<&'static str>>>);

impl CallLog {
    pub fn push(&self, call: &'static str) {
        self.0.lock().unwrap().push(call);
    }

    pub fn snapshot(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }

    /// Wait until `expected.len()` calls were logged, then compare.
    pub async fn assert_matches(&self, expected: &[&'static str]) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.0.lock().unwrap().len() < expected.len() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {:?}, got {:?}", expected, self.snapshot()));
        assert_eq!(self.snapshot(), expected);
    }
}

/// Collects values passed to a callback.
#[derive(Debug)]
pub struct Recorder<T>(Arc<Mutex<Vec<T>>>);

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn sink(&self) -> impl FnMut(T) + Send + 'static {
        let values = Arc::clone(&self.0);
        move |value| values.lock().unwrap().push(value)
    }

    pub fn values(&self) -> Vec<T> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}
