use std::fmt;

/// A value that can live inside a state store.
///
/// States are immutable snapshots compared by structural equality. Implement
/// it with [`impl_state!`](crate::impl_state), which can also generate
/// [`State::first_difference`] so that purity violations name the field that
/// changed.
pub trait State: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// The first field that differs between `self` and `other`, when the type
    /// knows how to enumerate its fields.
    fn first_difference(&self, _other: &Self) -> Option<FieldChange> {
        None
    }
}

/// A single field that differs between two states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: String,
    pub before: String,
    pub after: String,
}

impl FieldChange {
    pub fn new(field: impl Into<String>, before: &dyn fmt::Debug, after: &dyn fmt::Debug) -> Self {
        Self {
            field: field.into(),
            before: format!("{:?}", before),
            after: format!("{:?}", after),
        }
    }
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} changed from {} to {}",
            self.field, self.before, self.after
        )
    }
}

/// Implement [`State`] for a type.
///
/// ```
/// use stateflow::impl_state;
///
/// #[derive(Debug, Clone, PartialEq, Default)]
/// struct CounterState {
///     count: u32,
///     label: String,
/// }
///
/// // Field-aware: impure reducers report which field differed.
/// impl_state!(CounterState { count, label });
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Opaque(u8);
///
/// // Opaque: impure reducers report both full values.
/// impl_state!(Opaque);
/// ```
#[macro_export]
macro_rules! impl_state {
    ($ty:ty { $($field:ident),+ $(,)? }) => {
        impl $crate::State for $ty {
            fn first_difference(&self, other: &Self) -> Option<$crate::FieldChange> {
                $(
                    if self.$field != other.$field {
                        return Some($crate::FieldChange::new(
                            stringify!($field),
                            &self.$field,
                            &other.$field,
                        ));
                    }
                )+
                None
            }
        }
    };
    ($ty:ty) => {
        impl $crate::State for $ty {}
    };
}
