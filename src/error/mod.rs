use std::fmt::Display;
use thiserror::Error;

pub mod codes;

pub use codes::{describe_error_code, ErrorCode};

/// The unified error type for stateflow
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("[E{code:04}] Impure reducer on {state_type}: {message}")]
    ImpureReducer {
        code: u16,
        state_type: String,
        field: Option<String>,
        message: String,
    },

    #[error("[E{code:04}] Duplicate unique-only subscription id: {subscription_id}")]
    DuplicateSubscription { code: u16, subscription_id: String },

    #[error("[E{code:04}] Drain loop stopped after a panic: {message}")]
    ReducerPanicked { code: u16, message: String },

    #[error("[E{code:04}] State store closed: {message}")]
    Closed { code: u16, message: String },

    #[error("[E{code:04}] Configuration error: {message}")]
    Config {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] {message}")]
    Other {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StoreError {
    /// Create an impure reducer error
    pub fn impure_reducer(
        state_type: impl Into<String>,
        field: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ImpureReducer {
            code: ErrorCode::SCHEDULER_IMPURE_REDUCER,
            state_type: state_type.into(),
            field,
            message: message.into(),
        }
    }

    /// Create a duplicate subscription error
    pub fn duplicate_subscription(subscription_id: impl Into<String>) -> Self {
        Self::DuplicateSubscription {
            code: ErrorCode::SUBSCRIPTION_DUPLICATE_ID,
            subscription_id: subscription_id.into(),
        }
    }

    /// Create an error describing a panic on the drain loop
    pub fn reducer_panicked(message: impl Into<String>) -> Self {
        Self::ReducerPanicked {
            code: ErrorCode::SCHEDULER_REDUCER_PANICKED,
            message: message.into(),
        }
    }

    /// Create a closed-store error
    pub fn closed(message: impl Into<String>) -> Self {
        Self::Closed {
            code: ErrorCode::SCHEDULER_CLOSED,
            message: message.into(),
        }
    }

    /// Create a configuration error with default code
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            code: ErrorCode::CONFIG_GENERIC,
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with specific code
    pub fn config_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create a generic other error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            code: ErrorCode::OTHER_GENERIC,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error to this error
    ///
    /// Only configuration and other errors carry a source; the rest are
    /// returned unchanged.
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        match &mut self {
            Self::Config { source: src, .. } | Self::Other { source: src, .. } => {
                *src = Some(source.into());
            }
            _ => {}
        }
        self
    }

    /// Add context to the error message
    pub fn with_context(mut self, context: impl Display) -> Self {
        match &mut self {
            Self::ImpureReducer { message, .. }
            | Self::ReducerPanicked { message, .. }
            | Self::Closed { message, .. }
            | Self::Config { message, .. }
            | Self::Other { message, .. } => {
                *message = format!("{}: {}", message, context);
            }
            Self::DuplicateSubscription {
                subscription_id, ..
            } => {
                *subscription_id = format!("{} ({})", subscription_id, context);
            }
        }
        self
    }

    /// Get the error code
    pub fn code(&self) -> u16 {
        match self {
            Self::ImpureReducer { code, .. }
            | Self::DuplicateSubscription { code, .. }
            | Self::ReducerPanicked { code, .. }
            | Self::Closed { code, .. }
            | Self::Config { code, .. }
            | Self::Other { code, .. } => *code,
        }
    }

    /// Errors that terminate the drain loop of the store that raised them
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ImpureReducer { .. } | Self::ReducerPanicked { .. }
        )
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::ImpureReducer {
                state_type,
                field: Some(field),
                ..
            } => format!(
                "A reducer for {} is not pure: field '{}' differs between two runs on the same input",
                state_type, field
            ),
            Self::ImpureReducer { state_type, .. } => format!(
                "A reducer for {} is not pure: it produced different states for the same input",
                state_type
            ),
            Self::DuplicateSubscription {
                subscription_id, ..
            } => format!(
                "Subscription id '{}' is already in use; give each unique-only subscription its own id",
                subscription_id
            ),
            Self::ReducerPanicked { message, .. } => {
                format!("The state store stopped after a panic: {}", message)
            }
            Self::Closed { message, .. } => format!("The state store is closed: {}", message),
            Self::Config { message, .. } => format!("Configuration problem: {}", message),
            Self::Other { message, .. } => message.clone(),
        }
    }

    /// Get a developer-friendly error message with full chain
    pub fn developer_message(&self) -> String {
        format!("{:#}", self)
    }
}

/// Type alias for Results using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<toml::de::Error> for StoreError {
    fn from(err: toml::de::Error) -> Self {
        StoreError::config_with_code(ErrorCode::CONFIG_INVALID_TOML, "Invalid TOML syntax")
            .with_source(err)
    }
}
