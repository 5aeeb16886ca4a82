//! Lifecycle of an asynchronous value.
//!
//! [`AsyncResult`] models a value produced by some asynchronous computation:
//!
//! - `Uninitialized`: nothing has been requested yet
//! - `Loading`: a request is in flight, optionally retaining a previous value
//! - `Success`: the request produced a value
//! - `Fail`: the request failed, optionally retaining a previous value
//!
//! "Complete" means Success or Fail. "Should load" means Uninitialized or Fail.

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// A failure captured from an async producer.
///
/// Two errors compare equal when their kind, message and origin match. The
/// wrapped source error itself is not compared, so logically identical
/// failures stay equal regardless of what they carry.
#[derive(Clone)]
pub struct ProducerError {
    kind: &'static str,
    message: String,
    origin: Option<&'static Location<'static>>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl ProducerError {
    /// Wrap an error, recording the caller as the origin.
    #[track_caller]
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind: std::any::type_name::<E>(),
            message: error.to_string(),
            origin: Some(Location::caller()),
            source: Some(Arc::new(error)),
        }
    }

    /// An error with only a message, recording the caller as the origin.
    #[track_caller]
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            kind: "message",
            message: message.into(),
            origin: Some(Location::caller()),
            source: None,
        }
    }

    /// Wrap an `anyhow::Error`, keeping its full chain in the message.
    #[track_caller]
    pub fn from_anyhow(error: anyhow::Error) -> Self {
        Self {
            kind: "anyhow::Error",
            message: format!("{:#}", error),
            origin: Some(Location::caller()),
            source: Some(Arc::from(Box::<dyn std::error::Error + Send + Sync>::from(
                error,
            ))),
        }
    }

    /// Drop the origin so that equality only considers kind and message.
    pub fn without_origin(mut self) -> Self {
        self.origin = None;
        self
    }

    /// Type name of the wrapped error.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Where this error was first captured.
    pub fn origin(&self) -> Option<&'static Location<'static>> {
        self.origin
    }

    pub fn source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Downcast the wrapped error to a concrete type.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.as_deref().and_then(|e| e.downcast_ref::<E>())
    }
}

impl<E> From<E> for ProducerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[track_caller]
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl PartialEq for ProducerError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message && self.origin == other.origin
    }
}

impl Eq for ProducerError {}

impl fmt::Debug for ProducerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("origin", &self.origin.map(|l| l.to_string()))
            .finish()
    }
}

impl fmt::Display for ProducerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// The lifecycle of an asynchronous value of type `T`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncResult<T> {
    Uninitialized,
    Loading {
        value: Option<T>,
    },
    Success {
        value: T,
    },
    Fail {
        error: ProducerError,
        value: Option<T>,
    },
}

impl<T> Default for AsyncResult<T> {
    fn default() -> Self {
        Self::Uninitialized
    }
}

impl<T> AsyncResult<T> {
    pub fn loading() -> Self {
        Self::Loading { value: None }
    }

    pub fn success(value: T) -> Self {
        Self::Success { value }
    }

    pub fn fail(error: ProducerError) -> Self {
        Self::Fail { error, value: None }
    }

    /// The success value, or the retained value while loading or failed.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Uninitialized => None,
            Self::Loading { value } | Self::Fail { value, .. } => value.as_ref(),
            Self::Success { value } => Some(value),
        }
    }

    /// Consume the result, returning the same value as [`AsyncResult::value`].
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Uninitialized => None,
            Self::Loading { value } | Self::Fail { value, .. } => value,
            Self::Success { value } => Some(value),
        }
    }

    pub fn error(&self) -> Option<&ProducerError> {
        match self {
            Self::Fail { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_uninitialized(&self) -> bool {
        matches!(self, Self::Uninitialized)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail { .. })
    }

    /// Success or Fail.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Fail { .. })
    }

    /// Uninitialized or Loading.
    pub fn is_incomplete(&self) -> bool {
        !self.is_complete()
    }

    /// Uninitialized or Fail: a new request is warranted.
    pub fn should_load(&self) -> bool {
        matches!(self, Self::Uninitialized | Self::Fail { .. })
    }

    /// Map the success value, preserving the variant.
    ///
    /// Retained values on Loading and Fail belong to the old type and are
    /// dropped.
    pub fn map<U, F>(self, f: F) -> AsyncResult<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Uninitialized => AsyncResult::Uninitialized,
            Self::Loading { .. } => AsyncResult::Loading { value: None },
            Self::Success { value } => AsyncResult::Success { value: f(value) },
            Self::Fail { error, .. } => AsyncResult::Fail { error, value: None },
        }
    }

    /// Collapse the four variants, treating Uninitialized and Loading alike.
    pub fn fold<V>(
        &self,
        on_incomplete: impl FnOnce() -> V,
        on_fail: impl FnOnce(&ProducerError) -> V,
        on_success: impl FnOnce(&T) -> V,
    ) -> V {
        match self {
            Self::Uninitialized | Self::Loading { .. } => on_incomplete(),
            Self::Success { value } => on_success(value),
            Self::Fail { error, .. } => on_fail(error),
        }
    }

    /// Like [`AsyncResult::fold`] with separate values for Uninitialized and Loading.
    pub fn pick<V>(
        &self,
        uninitialized: V,
        loading: V,
        on_fail: impl FnOnce(&ProducerError) -> V,
        on_success: impl FnOnce(&T) -> V,
    ) -> V {
        match self {
            Self::Uninitialized => uninitialized,
            Self::Loading { .. } => loading,
            Self::Success { value } => on_success(value),
            Self::Fail { error, .. } => on_fail(error),
        }
    }
}

impl<T, E> From<Result<T, E>> for AsyncResult<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[track_caller]
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Success { value },
            Err(error) => Self::Fail {
                error: ProducerError::new(error),
                value: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct FetchError(String);

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct ParseError(String);

    fn same_site(message: &str) -> ProducerError {
        ProducerError::new(FetchError(message.to_string()))
    }

    #[test]
    fn test_values_by_variant() {
        assert_eq!(AsyncResult::<i32>::Uninitialized.value(), None);
        assert_eq!(AsyncResult::<i32>::loading().value(), None);
        assert_eq!(AsyncResult::success(5).value(), Some(&5));
        assert_eq!(AsyncResult::<i32>::fail(ProducerError::msg("x")).value(), None);
        assert_eq!(AsyncResult::Loading { value: Some(3) }.value(), Some(&3));
    }

    #[test]
    fn test_flags() {
        let fail = AsyncResult::<i32>::fail(ProducerError::msg("x"));
        assert!(fail.is_complete() && fail.should_load());
        assert!(AsyncResult::success(1).is_complete());
        assert!(!AsyncResult::success(1).should_load());
        assert!(AsyncResult::<i32>::Uninitialized.should_load());
        assert!(AsyncResult::<i32>::loading().is_incomplete());
        assert!(!AsyncResult::<i32>::loading().should_load());
    }

    #[test]
    fn test_map_success() {
        assert_eq!(
            AsyncResult::success(2).map(|v| v * 10),
            AsyncResult::success(20)
        );
    }

    #[test]
    fn test_map_drops_retained_values() {
        let loading = AsyncResult::Loading { value: Some(2) }.map(|v| v.to_string());
        assert_eq!(loading, AsyncResult::Loading { value: None });

        let error = ProducerError::msg("offline");
        let fail = AsyncResult::Fail {
            error: error.clone(),
            value: Some(2),
        }
        .map(|v| v.to_string());
        assert_eq!(fail, AsyncResult::Fail { error, value: None });
    }

    #[test]
    fn test_fold_and_pick() {
        let describe = |r: &AsyncResult<i32>| {
            r.fold(
                || "incomplete".to_string(),
                |e| format!("fail: {}", e),
                |v| format!("ok: {}", v),
            )
        };
        assert_eq!(describe(&AsyncResult::Uninitialized), "incomplete");
        assert_eq!(describe(&AsyncResult::loading()), "incomplete");
        assert_eq!(describe(&AsyncResult::success(1)), "ok: 1");
        assert_eq!(
            describe(&AsyncResult::fail(ProducerError::msg("down"))),
            "fail: down"
        );

        assert_eq!(AsyncResult::<i32>::loading().pick(0, 1, |_| 2, |_| 3), 1);
        assert_eq!(AsyncResult::<i32>::Uninitialized.pick(0, 1, |_| 2, |_| 3), 0);
    }

    #[test]
    fn test_fail_equal_with_same_kind_message_and_origin() {
        let errors: Vec<_> = (0..2).map(|_| same_site("foo")).collect();
        assert_eq!(errors[0], errors[1]);
        assert_eq!(
            AsyncResult::<i32>::fail(errors[0].clone()),
            AsyncResult::<i32>::fail(errors[1].clone())
        );
    }

    #[test]
    fn test_fail_not_equal_with_different_message() {
        assert_ne!(same_site("foo"), same_site("foo2"));
    }

    #[test]
    fn test_fail_not_equal_with_different_kind() {
        let a = ProducerError::new(FetchError("foo".into())).without_origin();
        let b = ProducerError::new(ParseError("foo".into())).without_origin();
        assert_ne!(a, b);
    }

    #[test]
    fn test_fail_not_equal_with_different_origin() {
        let a = ProducerError::new(FetchError("foo".into()));
        let b = ProducerError::new(FetchError("foo".into()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_fail_not_equal_when_one_has_no_origin() {
        let a = ProducerError::new(FetchError("foo".into()));
        let b = a.clone().without_origin();
        assert_ne!(a, b);
    }

    #[test]
    fn test_fail_equal_when_neither_has_origin() {
        let a = ProducerError::new(FetchError("foo".into())).without_origin();
        let b = ProducerError::new(FetchError("foo".into())).without_origin();
        assert_eq!(a, b);
    }

    #[test]
    fn test_downcast_source() {
        let error = ProducerError::new(FetchError("timeout".into()));
        assert_eq!(error.downcast_ref::<FetchError>().unwrap().0, "timeout");
        assert!(error.downcast_ref::<ParseError>().is_none());
        assert!(error.kind().ends_with("FetchError"));
    }

    #[test]
    fn test_from_anyhow_keeps_chain() {
        let error = ProducerError::from_anyhow(
            anyhow::anyhow!("connection reset").context("fetching dogs"),
        );
        assert!(error.message().contains("fetching dogs"));
        assert!(error.message().contains("connection reset"));
    }

    #[test]
    fn test_from_result() {
        let ok: Result<i32, FetchError> = Ok(4);
        assert_eq!(AsyncResult::from(ok), AsyncResult::success(4));

        let err: Result<i32, FetchError> = Err(FetchError("nope".into()));
        let result = AsyncResult::from(err);
        assert_eq!(result.error().map(|e| e.message()), Some("nope"));
    }

    fn any_result() -> impl Strategy<Value = AsyncResult<i32>> {
        prop_oneof![
            Just(AsyncResult::Uninitialized),
            proptest::option::of(any::<i32>()).prop_map(|value| AsyncResult::Loading { value }),
            any::<i32>().prop_map(|value| AsyncResult::Success { value }),
            (".*", proptest::option::of(any::<i32>())).prop_map(|(m, value)| {
                AsyncResult::Fail {
                    error: ProducerError::msg(m).without_origin(),
                    value,
                }
            }),
        ]
    }

    proptest! {
        #[test]
        fn prop_map_preserves_variant(result in any_result()) {
            let mapped = result.clone().map(|v| v as i64 * 2);
            prop_assert_eq!(result.is_uninitialized(), mapped.is_uninitialized());
            prop_assert_eq!(result.is_loading(), mapped.is_loading());
            prop_assert_eq!(result.is_success(), mapped.is_success());
            prop_assert_eq!(result.is_fail(), mapped.is_fail());
            prop_assert_eq!(result.error(), mapped.error());
        }

        #[test]
        fn prop_fold_agrees_with_flags(result in any_result()) {
            let tag = result.fold(|| 0, |_| 1, |_| 2);
            let expected = if result.is_success() { 2 } else if result.is_fail() { 1 } else { 0 };
            prop_assert_eq!(tag, expected);
        }
    }
}
