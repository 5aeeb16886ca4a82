//! Locked/unlocked delivery state machine.
//!
//! The gate does no I/O and never waits; the driver in the parent module
//! feeds it values and activity changes and forwards whatever it returns.

/// Redelivery policy applied when a gate unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redelivery {
    /// Deliver the last value seen, whether or not it changed while locked.
    Always,
    /// Deliver only a value that arrived while locked and differs from the
    /// last one delivered.
    UniqueOnly,
}

#[derive(Debug, Clone)]
pub struct DeliveryGate<T> {
    redelivery: Redelivery,
    active: bool,
    last_seen: Option<T>,
    undelivered: Option<T>,
    last_delivered: Option<T>,
}

impl<T: Clone + PartialEq> DeliveryGate<T> {
    pub fn new(redelivery: Redelivery, active: bool) -> Self {
        Self {
            redelivery,
            active,
            last_seen: None,
            undelivered: None,
            last_delivered: None,
        }
    }

    /// Seed the value considered delivered before this gate existed.
    pub fn with_last_delivered(mut self, value: Option<T>) -> Self {
        self.last_delivered = value;
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn last_delivered(&self) -> Option<&T> {
        self.last_delivered.as_ref()
    }

    /// Offer a new upstream value. Returns it if it should be delivered now.
    pub fn on_value(&mut self, value: T) -> Option<T> {
        self.last_seen = Some(value.clone());
        if !self.active {
            self.undelivered = Some(value);
            return None;
        }
        self.deliver(value)
    }

    /// Apply an activity change. Returns the value to deliver on unlock, if any.
    pub fn set_active(&mut self, active: bool) -> Option<T> {
        if active == self.active {
            return None;
        }
        self.active = active;
        if !active {
            return None;
        }

        match self.redelivery {
            Redelivery::Always => {
                let value = self
                    .undelivered
                    .take()
                    .or_else(|| self.last_seen.clone())?;
                self.last_delivered = Some(value.clone());
                Some(value)
            }
            Redelivery::UniqueOnly => {
                let value = self.undelivered.take()?;
                self.deliver(value)
            }
        }
    }

    fn deliver(&mut self, value: T) -> Option<T> {
        if self.redelivery == Redelivery::UniqueOnly
            && self.last_delivered.as_ref() == Some(&value)
        {
            return None;
        }
        self.last_delivered = Some(value.clone());
        Some(value)
    }
}
