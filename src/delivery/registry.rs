use crate::error::{Result, StoreError};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

#[derive(Default)]
struct Entries {
    active: HashSet<String>,
    last_delivered: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

/// Unique-only subscription ids of one container.
///
/// Tracks which ids are held by a live subscription and the last value each
/// id delivered. The delivered values outlive the subscriptions, so a
/// subscription re-created under the same id does not repeat a delivery.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: Mutex<Entries>,
}

impl SubscriptionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reserve `id` for a live subscription.
    pub fn claim(self: &Arc<Self>, id: &str) -> Result<SubscriptionClaim> {
        if !self.lock().active.insert(id.to_string()) {
            return Err(StoreError::duplicate_subscription(id));
        }
        trace!("Claimed subscription id {}", id);
        Ok(SubscriptionClaim {
            registry: Arc::clone(self),
            id: id.to_string(),
        })
    }

    pub fn is_claimed(&self, id: &str) -> bool {
        self.lock().active.contains(id)
    }

    pub fn last_delivered<T: Clone + 'static>(&self, id: &str) -> Option<T> {
        self.lock()
            .last_delivered
            .get(id)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    pub fn record_delivery<T: Send + Sync + 'static>(&self, id: &str, value: T) {
        self.lock()
            .last_delivered
            .insert(id.to_string(), Arc::new(value));
    }

    fn release(&self, id: &str) {
        if self.lock().active.remove(id) {
            trace!("Released subscription id {}", id);
        }
    }
}

/// A held subscription id. Dropping it releases the id.
pub struct SubscriptionClaim {
    registry: Arc<SubscriptionRegistry>,
    id: String,
}

impl SubscriptionClaim {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn record_delivery<T: Send + Sync + 'static>(&self, value: T) {
        self.registry.record_delivery(&self.id, value);
    }
}

impl Drop for SubscriptionClaim {
    fn drop(&mut self) {
        self.registry.release(&self.id);
    }
}
