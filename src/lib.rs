//! # Stateflow
//!
//! A single-writer, ordered, reactive state container.
//!
//! Any number of tasks enqueue pure reducers (`mutate`) and read callbacks
//! (`read`); one drain loop per store executes them, applying every queued
//! mutation before each read. Committed states fan out to subscribers,
//! optionally gated by a host-owned activity signal, and async producers fold
//! their progress into state as [`AsyncResult`] values.
//!
//! ## Usage
//!
//! ```no_run
//! use stateflow::{impl_state, Repository};
//!
//! #[derive(Debug, Clone, PartialEq, Default)]
//! struct Counter {
//!     count: u32,
//! }
//!
//! impl_state!(Counter { count });
//!
//! # async fn demo() -> stateflow::Result<()> {
//! let repo = Repository::new(Counter::default());
//! repo.mutate(|s| Counter { count: s.count + 1 });
//! assert_eq!(repo.await_state().await?.count, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - `store` - The single-writer scheduler and its drain loop
//! - `broadcast` - Replay-one fan-out of committed states
//! - `delivery` - Activity-gated subscriptions and redelivery policies
//! - `pipeline` - Async producers folded into state
//! - `repository` - Host-facing container combining the above
//! - `purity` - Debug-mode detection of impure reducers
//! - `config` - Store configuration from TOML and environment
//! - `cli` - Demo command line
pub mod async_result;
pub mod broadcast;
pub mod cli;
pub mod config;
pub mod delivery;
pub mod error;
pub mod pipeline;
pub mod purity;
pub mod repository;
pub mod scope;
pub mod state;
pub mod store;

pub use async_result::{AsyncResult, ProducerError};
pub use broadcast::{BufferOverflow, StateSubscription, SubscriptionId, DEFAULT_SUBSCRIBER_CAPACITY};
pub use config::StoreConfig;
pub use delivery::{ActiveSignal, DeliveryMode, GatedSubscription};
pub use error::{ErrorCode, Result, StoreError};
pub use pipeline::{BlockExecutions, ExecuteOptions, PipelineHandle};
pub use repository::Repository;
pub use scope::Scope;
pub use state::{FieldChange, State};
pub use store::StateStore;
