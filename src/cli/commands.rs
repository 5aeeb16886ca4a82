//! Demo command implementations

use super::args::Commands;
use crate::{
    impl_state, AsyncResult, BufferOverflow, ExecuteOptions, Repository, StoreConfig,
};
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Default)]
struct CounterState {
    count: u64,
}

impl_state!(CounterState { count });

#[derive(Debug, Clone, PartialEq, Default)]
struct OrderingState {
    count: u32,
}

impl_state!(OrderingState { count });

#[derive(Debug, Clone, PartialEq, Default)]
struct ProfileState {
    user: AsyncResult<String>,
}

impl_state!(ProfileState { user });

#[derive(Debug, thiserror::Error)]
#[error("profile service unavailable")]
struct ServiceUnavailable;

/// Load the store configuration: defaults, then the file if given, then the environment.
pub fn load_config(path: Option<&Path>) -> Result<StoreConfig> {
    let config = match path {
        Some(path) => StoreConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => StoreConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

pub async fn execute_command(command: Commands, config: StoreConfig) -> Result<()> {
    match command {
        Commands::Counter {
            writers,
            increments,
        } => run_counter(config, writers, increments).await,
        Commands::Ordering => run_ordering(config).await,
        Commands::Fetch {
            fail,
            retain,
            latency_ms,
        } => run_fetch(config, fail, retain, Duration::from_millis(latency_ms)).await,
    }
}

/// Concurrent `+1` mutations from many tasks; the observer must see every
/// intermediate count exactly once unless the store drops states for slow
/// subscribers.
pub async fn run_counter(config: StoreConfig, writers: usize, increments: u32) -> Result<()> {
    let overflow = config.overflow;
    let repo = Repository::with_config(CounterState::default(), config.with_name("counter"));
    let expected = writers as u64 * u64::from(increments);

    let mut subscription = repo.subscribe();
    let observer = tokio::spawn(async move {
        let mut observed = 0_u64;
        let mut gaps = 0_u64;
        let mut previous: Option<u64> = None;
        while let Some(state) = subscription.recv().await {
            if let Some(previous) = previous {
                if state.count != previous + 1 {
                    gaps += 1;
                }
            }
            previous = Some(state.count);
            observed += 1;
            if state.count == expected {
                break;
            }
        }
        (observed, gaps)
    });

    let tasks: Vec<_> = (0..writers)
        .map(|_| {
            let repo = repo.clone();
            tokio::spawn(async move {
                for _ in 0..increments {
                    repo.mutate(|s| CounterState { count: s.count + 1 });
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.context("Writer task failed")?;
    }

    let state = repo.await_state().await?;
    let (observed, gaps) = observer.await.context("Observer task failed")?;
    repo.close();
    repo.join().await?;

    println!("writers:        {}", writers);
    println!("increments:     {}", increments);
    println!("final count:    {}", state.count);
    println!("states seen:    {}", observed);
    println!("gaps observed:  {}", gaps);

    if state.count != expected {
        bail!("Expected final count {}, got {}", expected, state.count);
    }
    if gaps > 0 {
        if overflow == BufferOverflow::Suspend {
            bail!("Observer saw {} gaps with backpressured delivery", gaps);
        }
        warn!("Observer skipped {} states under drop-oldest delivery", gaps);
    }
    Ok(())
}

const ORDERING_CALLS: usize = 7;
const ORDERING_ROUNDS: usize = 10;

/// Nested reads and mutations; mutations always drain before the next read.
pub async fn run_ordering(config: StoreConfig) -> Result<()> {
    // Reducers below record side effects, so they must run exactly once.
    let repo = Repository::with_config(
        OrderingState::default(),
        config.with_name("ordering").with_debug_mode(false),
    );
    let calls = Arc::new(Mutex::new(Vec::new()));
    let log = |calls: &Arc<Mutex<Vec<&'static str>>>, entry| {
        if let Ok(mut calls) = calls.lock() {
            calls.push(entry);
        }
    };

    {
        let (r, c) = (repo.clone(), Arc::clone(&calls));
        repo.read(move |_| {
            log(&c, "w1");
            let (r4, c4) = (r.clone(), Arc::clone(&c));
            r.read(move |_| {
                let (r5, c5) = (r4.clone(), Arc::clone(&c4));
                r4.mutate(move |_| {
                    log(&c5, "s4");
                    let c6 = Arc::clone(&c5);
                    r5.read(move |_| log(&c6, "w3"));
                    OrderingState { count: 4 }
                });
                log(&c4, "w2");
            });
            let (r1, c1) = (r.clone(), Arc::clone(&c));
            r.mutate(move |_| {
                log(&c1, "s1");
                let (r2, c2) = (r1.clone(), Arc::clone(&c1));
                r1.mutate(move |_| {
                    log(&c2, "s2");
                    let c3 = Arc::clone(&c2);
                    r2.mutate(move |_| {
                        log(&c3, "s3");
                        OrderingState { count: 3 }
                    });
                    OrderingState { count: 2 }
                });
                OrderingState { count: 1 }
            });
        });
    }

    // Nested reads are queued behind each await, so wait until every entry is in.
    for _ in 0..ORDERING_ROUNDS {
        repo.await_state().await?;
        if calls.lock().map(|calls| calls.len()).unwrap_or_default() >= ORDERING_CALLS {
            break;
        }
    }
    let calls = calls
        .lock()
        .map(|calls| calls.clone())
        .unwrap_or_default();
    info!("Observed order: {}", calls.join(", "));
    println!("[{}]", calls.join(", "));
    Ok(())
}

/// Two fetches through the async pipeline, printing every committed state.
pub async fn run_fetch(
    config: StoreConfig,
    fail: bool,
    retain: bool,
    latency: Duration,
) -> Result<()> {
    let repo = Repository::with_config(ProfileState::default(), config.with_name("profile"));
    let mut subscription = repo.subscribe();
    let printer = tokio::spawn(async move {
        let mut completed = 0;
        while let Some(state) = subscription.recv().await {
            println!("{}", describe(&state.user));
            if state.user.is_complete() {
                completed += 1;
                if completed == 2 {
                    break;
                }
            }
        }
    });
    let set_user = |s: &ProfileState, user: AsyncResult<String>| ProfileState {
        user,
        ..s.clone()
    };
    let options = || {
        let options = ExecuteOptions::new();
        if retain {
            options.retain_value(|s: &ProfileState| s.user.value().cloned())
        } else {
            options
        }
    };

    repo.execute(
        async move {
            tokio::time::sleep(latency).await;
            Ok::<_, ServiceUnavailable>("ada".to_string())
        },
        options(),
        set_user,
    )
    .join()
    .await;

    repo.execute(
        async move {
            tokio::time::sleep(latency).await;
            if fail {
                Err(ServiceUnavailable)
            } else {
                Ok("grace".to_string())
            }
        },
        options(),
        set_user,
    )
    .join()
    .await;

    let final_state = repo.await_state().await?;
    printer.await.context("Printer task failed")?;
    debug!("Final state: {:?}", final_state);

    repo.close();
    repo.join().await?;
    Ok(())
}

fn describe(user: &AsyncResult<String>) -> String {
    match user {
        AsyncResult::Uninitialized => "Uninitialized".to_string(),
        AsyncResult::Loading { value: None } => "Loading".to_string(),
        AsyncResult::Loading { value: Some(v) } => format!("Loading(retained={})", v),
        AsyncResult::Success { value } => format!("Success({})", value),
        AsyncResult::Fail { error, value: None } => format!("Fail({})", error),
        AsyncResult::Fail {
            error,
            value: Some(v),
        } => format!("Fail({}, retained={})", error, v),
    }
}
