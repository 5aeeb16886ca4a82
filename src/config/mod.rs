//! Store configuration.
//!
//! Configuration is layered with the following precedence (lowest first):
//!
//! 1. Hardcoded defaults
//! 2. A TOML file (`StoreConfig::from_file`)
//! 3. Environment variables (`STATEFLOW_*` prefix)
//!
//! ```ignore
//! let config = StoreConfig::from_file("stateflow.toml")?.with_env_overrides()?;
//! let store = StateStore::with_config(CounterState::default(), config);
//! ```

use crate::broadcast::{BufferOverflow, DEFAULT_SUBSCRIBER_CAPACITY};
use crate::error::{ErrorCode, Result, StoreError};
use crate::pipeline::BlockExecutions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Environment variable toggling reducer purity checks
pub const ENV_DEBUG_MODE: &str = "STATEFLOW_DEBUG_MODE";
/// Environment variable overriding the per-subscriber buffer capacity
pub const ENV_SUBSCRIBER_CAPACITY: &str = "STATEFLOW_SUBSCRIBER_CAPACITY";
/// Environment variable overriding the overflow policy
pub const ENV_OVERFLOW: &str = "STATEFLOW_OVERFLOW";

/// Configuration for a single state store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Label used in log records and error messages.
    pub name: Option<String>,

    /// Run every reducer twice and fail on differing outputs.
    pub debug_mode: bool,

    /// Number of pending states each subscriber may buffer.
    pub subscriber_capacity: usize,

    /// What publishing does when a subscriber buffer is full.
    pub overflow: BufferOverflow,

    /// Whether async pipelines actually run their producers.
    pub block_executions: BlockExecutions,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: None,
            debug_mode: cfg!(debug_assertions),
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            overflow: BufferOverflow::default(),
            block_executions: BlockExecutions::default(),
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: StoreConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            let code = if e.kind() == std::io::ErrorKind::NotFound {
                ErrorCode::CONFIG_NOT_FOUND
            } else {
                ErrorCode::CONFIG_GENERIC
            };
            StoreError::config_with_code(
                code,
                format!("Could not read configuration file {}", path.display()),
            )
            .with_source(e)
        })?;
        debug!("Loaded store configuration from {}", path.display());
        Self::from_toml_str(&text).map_err(|e| e.with_context(path.display()))
    }

    /// Apply `STATEFLOW_*` environment overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides using a custom lookup, for testing.
    pub fn with_env_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_DEBUG_MODE) {
            self.debug_mode = parse_bool(&raw).ok_or_else(|| invalid_env(ENV_DEBUG_MODE, &raw))?;
        }
        if let Some(raw) = lookup(ENV_SUBSCRIBER_CAPACITY) {
            self.subscriber_capacity = raw
                .trim()
                .parse()
                .map_err(|_| invalid_env(ENV_SUBSCRIBER_CAPACITY, &raw))?;
        }
        if let Some(raw) = lookup(ENV_OVERFLOW) {
            self.overflow = match raw.trim().to_ascii_lowercase().as_str() {
                "suspend" => BufferOverflow::Suspend,
                "drop_oldest" | "drop-oldest" => BufferOverflow::DropOldest,
                _ => return Err(invalid_env(ENV_OVERFLOW, &raw)),
            };
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values the store cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.subscriber_capacity == 0 {
            return Err(StoreError::config_with_code(
                ErrorCode::CONFIG_INVALID_VALUE,
                "subscriber_capacity must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = debug_mode;
        self
    }

    pub fn with_subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = capacity;
        self
    }

    pub fn with_overflow(mut self, overflow: BufferOverflow) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn with_block_executions(mut self, block_executions: BlockExecutions) -> Self {
        self.block_executions = block_executions;
        self
    }

    /// Name used for logging, falling back to the state type name.
    pub(crate) fn label<S>(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| short_type_name::<S>().to_string())
    }
}

/// Last path segment of a type name, e.g. `CounterState` for `my_app::CounterState`.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn invalid_env(key: &str, raw: &str) -> StoreError {
    StoreError::config_with_code(
        ErrorCode::CONFIG_INVALID_ENV,
        format!("Invalid value '{}' for {}", raw, key),
    )
}
