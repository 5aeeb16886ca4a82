//! Debug-mode detection of impure reducers.
//!
//! A reducer must derive its output from its input alone. The validator runs
//! it twice against the same input and compares the two outputs; a reducer
//! that reads or mutates outside state will usually disagree with itself.

use crate::error::{Result, StoreError};
use crate::state::State;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

pub struct PurityValidator {
    label: String,
    checked: AtomicU64,
}

impl PurityValidator {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            checked: AtomicU64::new(0),
        }
    }

    /// Run `reducer` twice on `input` and return the first output if both agree.
    pub fn apply<S, F>(&self, input: &S, reducer: F) -> Result<S>
    where
        S: State,
        F: Fn(&S) -> S,
    {
        let first = reducer(input);
        let second = reducer(input);
        let checked = self.checked.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("{}: purity check #{}", self.label, checked);

        if first == second {
            return Ok(first);
        }
        Err(self.violation(&first, &second))
    }

    /// Number of reducers checked so far.
    pub fn checked_count(&self) -> u64 {
        self.checked.load(Ordering::Relaxed)
    }

    fn violation<S: State>(&self, first: &S, second: &S) -> StoreError {
        match first.first_difference(second) {
            Some(change) => StoreError::impure_reducer(
                &self.label,
                Some(change.field.clone()),
                format!(
                    "{}. Ensure the reducer only depends on its input and that state fields implement PartialEq consistently",
                    change
                ),
            ),
            None => StoreError::impure_reducer(
                &self.label,
                None,
                format!(
                    "Differing states were produced by the same reducer. First state: {:?} -> Second state: {:?}",
                    first, second
                ),
            ),
        }
    }
}
