//! Replay-one fan-out of committed states.
//!
//! Every subscriber owns a bounded buffer. A new subscriber is seeded with the
//! latest committed state under the same lock the publisher takes to advance
//! `latest`, so it sees either the old value followed by the new one or only
//! the new one, never a duplicate and never a gap.

mod slot;

use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use slot::{PushOutcome, Slot};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};
use uuid::Uuid;

/// Per-subscriber buffer size when none is configured.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

/// What the publisher does when a subscriber's buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferOverflow {
    /// Wait for the subscriber to make room. This backpressures the drain loop.
    #[default]
    Suspend,
    /// Evict the oldest pending state for that subscriber.
    DropOldest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Registry<S> {
    latest: Arc<S>,
    slots: Vec<Arc<Slot<S>>>,
    closed: bool,
}

pub struct StateBroadcaster<S> {
    registry: Mutex<Registry<S>>,
    capacity: usize,
    overflow: BufferOverflow,
}

impl<S: Send + Sync + 'static> StateBroadcaster<S> {
    pub fn new(initial: Arc<S>, capacity: usize, overflow: BufferOverflow) -> Self {
        Self {
            registry: Mutex::new(Registry {
                latest: initial,
                slots: Vec::new(),
                closed: false,
            }),
            capacity,
            overflow,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry<S>> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Subscribe, receiving the latest state first and every later publish in order.
    pub fn subscribe(&self) -> StateSubscription<S> {
        let slot = Arc::new(Slot::new(
            SubscriptionId::new(),
            self.capacity,
            self.overflow,
        ));
        let mut registry = self.lock();
        if registry.closed {
            slot.close();
        } else {
            slot.seed(Arc::clone(&registry.latest));
            registry.slots.push(Arc::clone(&slot));
            trace!(
                "Subscriber {} attached ({} active)",
                slot.id(),
                registry.slots.len()
            );
        }
        StateSubscription { slot }
    }

    /// Make `state` the latest value and deliver it to every subscriber.
    ///
    /// Under [`BufferOverflow::Suspend`] this waits until every subscriber has
    /// room. Returns the number of subscribers that accepted the value.
    pub async fn publish(&self, state: Arc<S>) -> usize {
        let targets = {
            let mut registry = self.lock();
            if registry.closed {
                return 0;
            }
            registry.latest = Arc::clone(&state);
            registry.slots.retain(|slot| !slot.is_detached());
            registry.slots.clone()
        };

        let mut delivered = 0;
        for slot in targets {
            match slot.push(Arc::clone(&state)).await {
                PushOutcome::Buffered | PushOutcome::Evicted => delivered += 1,
                PushOutcome::Rejected => {}
            }
        }
        delivered
    }

    /// Complete every subscription. Later subscribers complete immediately.
    pub fn close(&self) {
        let slots = {
            let mut registry = self.lock();
            if registry.closed {
                return;
            }
            registry.closed = true;
            std::mem::take(&mut registry.slots)
        };
        debug!("Closing broadcaster with {} subscribers", slots.len());
        for slot in slots {
            slot.close();
        }
    }

    pub fn latest(&self) -> Arc<S> {
        Arc::clone(&self.lock().latest)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock()
            .slots
            .iter()
            .filter(|slot| !slot.is_detached())
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// Receiving end of a [`StateBroadcaster`].
///
/// Dropping it detaches the buffer, releasing a publisher that may be
/// suspended on it.
pub struct StateSubscription<S> {
    slot: Arc<Slot<S>>,
}

impl<S: Send + Sync + 'static> StateSubscription<S> {
    pub fn id(&self) -> SubscriptionId {
        self.slot.id()
    }

    /// Next state, or `None` once the broadcaster has been closed.
    pub async fn recv(&mut self) -> Option<Arc<S>> {
        self.slot.pop().await
    }

    /// Next state if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Arc<S>> {
        self.slot.try_pop().flatten()
    }

    /// Number of states buffered but not yet received.
    pub fn pending(&self) -> usize {
        self.slot.pending()
    }

    /// States evicted from this subscription under [`BufferOverflow::DropOldest`].
    pub fn dropped(&self) -> u64 {
        self.slot.dropped()
    }

    pub fn into_stream(self) -> impl Stream<Item = Arc<S>> + Send + 'static {
        stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|state| (state, subscription))
        })
    }
}

impl<S> Drop for StateSubscription<S> {
    fn drop(&mut self) {
        self.slot.detach();
    }
}

impl<S> fmt::Debug for StateSubscription<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSubscription")
            .field("id", &self.slot.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    fn broadcaster(capacity: usize, overflow: BufferOverflow) -> Arc<StateBroadcaster<u32>> {
        Arc::new(StateBroadcaster::new(Arc::new(0), capacity, overflow))
    }

    #[tokio::test]
    async fn test_new_subscriber_receives_latest_first() {
        let bus = broadcaster(8, BufferOverflow::Suspend);
        bus.publish(Arc::new(1)).await;
        bus.publish(Arc::new(2)).await;

        let mut sub = bus.subscribe();
        assert_eq!(*sub.recv().await.unwrap(), 2);
        assert!(sub.try_recv().is_none());

        bus.publish(Arc::new(3)).await;
        assert_eq!(*sub.recv().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_publish_order_is_preserved_per_subscriber() {
        let bus = broadcaster(8, BufferOverflow::Suspend);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        for n in 1..=5 {
            bus.publish(Arc::new(n)).await;
        }

        for sub in [&mut a, &mut b] {
            let mut seen = Vec::new();
            while let Some(v) = sub.try_recv() {
                seen.push(*v);
            }
            assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
        }
    }

    #[tokio::test]
    async fn test_drop_oldest_evicts_for_slow_subscriber() {
        let bus = broadcaster(2, BufferOverflow::DropOldest);
        let mut sub = bus.subscribe();

        for n in 1..=4 {
            bus.publish(Arc::new(n)).await;
        }

        assert_eq!(sub.dropped(), 3);
        assert_eq!(*sub.recv().await.unwrap(), 3);
        assert_eq!(*sub.recv().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_suspend_waits_for_slow_subscriber() {
        let bus = broadcaster(1, BufferOverflow::Suspend);
        let mut sub = bus.subscribe();

        let publisher = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move { bus.publish(Arc::new(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!publisher.is_finished());

        assert_eq!(*sub.recv().await.unwrap(), 0);
        let delivered = tokio::time::timeout(Duration::from_secs(1), publisher)
            .await
            .expect("publisher should resume")
            .unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(*sub.recv().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dropping_subscription_releases_publisher() {
        let bus = broadcaster(1, BufferOverflow::Suspend);
        let sub = bus.subscribe();

        let publisher = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move { bus.publish(Arc::new(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(sub);

        let delivered = tokio::time::timeout(Duration::from_secs(1), publisher)
            .await
            .expect("publisher should resume")
            .unwrap();
        assert_eq!(delivered, 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_close_completes_streams() {
        let bus = broadcaster(8, BufferOverflow::Suspend);
        let stream = bus.subscribe().into_stream();
        bus.close();

        let collected: Vec<_> = stream.collect().await;
        assert!(collected.is_empty());

        let mut late = bus.subscribe();
        assert!(late.recv().await.is_none());
        assert!(bus.is_closed());
        assert_eq!(bus.publish(Arc::new(9)).await, 0);
    }

    #[tokio::test]
    async fn test_latest_tracks_publishes() {
        let bus = broadcaster(8, BufferOverflow::Suspend);
        assert_eq!(*bus.latest(), 0);
        bus.publish(Arc::new(7)).await;
        assert_eq!(*bus.latest(), 7);
    }

    #[test]
    fn test_overflow_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            overflow: BufferOverflow,
        }
        let parsed: Wrapper = toml::from_str("overflow = \"drop_oldest\"").unwrap();
        assert_eq!(parsed.overflow, BufferOverflow::DropOldest);
        assert_eq!(BufferOverflow::default(), BufferOverflow::Suspend);
    }
}
