//! Per-subscriber bounded buffer.
//!
//! Each slot has exactly one producer (the drain loop publishing committed
//! states) and one consumer (the subscription). `Notify` permits make the
//! check-then-wait sequences below race free for that pairing.

use super::{BufferOverflow, SubscriptionId};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{trace, warn};

struct Buffer<S> {
    queue: VecDeque<Arc<S>>,
    /// Broadcaster torn down; the consumer sees completion.
    closed: bool,
    /// Consumer gone; the producer stops delivering.
    detached: bool,
    dropped: u64,
}

/// After the first eviction, only every this many evictions are logged at warn level.
const EVICTION_WARN_INTERVAL: u64 = 1000;

fn eviction_is_notable(dropped: u64) -> bool {
    dropped == 1 || dropped % EVICTION_WARN_INTERVAL == 0
}

pub(crate) struct Slot<S> {
    id: SubscriptionId,
    capacity: usize,
    overflow: BufferOverflow,
    buffer: Mutex<Buffer<S>>,
    readable: Notify,
    writable: Notify,
}

/// What happened to a value handed to [`Slot::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    Buffered,
    /// Buffered after evicting the oldest pending value.
    Evicted,
    /// The slot no longer accepts values.
    Rejected,
}

impl<S> Slot<S> {
    pub(crate) fn new(id: SubscriptionId, capacity: usize, overflow: BufferOverflow) -> Self {
        Self {
            id,
            capacity: capacity.max(1),
            overflow,
            buffer: Mutex::new(Buffer {
                queue: VecDeque::with_capacity(capacity.clamp(1, 64)),
                closed: false,
                detached: false,
                dropped: 0,
            }),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, Buffer<S>> {
        // A panic while holding this lock cannot leave the queue half-updated,
        // so a poisoned lock is still safe to use.
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Buffer a value without waiting. Used to seed a fresh slot with the
    /// replayed latest state, when the buffer is known to be empty.
    pub(crate) fn seed(&self, value: Arc<S>) {
        self.lock().queue.push_back(value);
        self.readable.notify_one();
    }

    /// Buffer a value, waiting for space under [`BufferOverflow::Suspend`].
    pub(crate) async fn push(&self, value: Arc<S>) -> PushOutcome {
        loop {
            {
                let mut buffer = self.lock();
                if buffer.closed || buffer.detached {
                    return PushOutcome::Rejected;
                }
                if buffer.queue.len() < self.capacity {
                    buffer.queue.push_back(value);
                    drop(buffer);
                    self.readable.notify_one();
                    return PushOutcome::Buffered;
                }
                if self.overflow == BufferOverflow::DropOldest {
                    buffer.queue.pop_front();
                    buffer.queue.push_back(value);
                    buffer.dropped += 1;
                    let dropped = buffer.dropped;
                    drop(buffer);
                    if eviction_is_notable(dropped) {
                        warn!(
                            "Subscriber {} is slow; dropped oldest pending state ({} dropped so far)",
                            self.id, dropped
                        );
                    } else {
                        trace!("Subscriber {} dropped pending state #{}", self.id, dropped);
                    }
                    self.readable.notify_one();
                    return PushOutcome::Evicted;
                }
            }
            self.writable.notified().await;
        }
    }

    /// Next buffered value, or `None` once the slot is closed.
    pub(crate) async fn pop(&self) -> Option<Arc<S>> {
        loop {
            if let Some(next) = self.try_pop() {
                return next;
            }
            self.readable.notified().await;
        }
    }

    /// `Some(Some(v))` for a value, `Some(None)` for completion, `None` when
    /// nothing is ready yet.
    pub(crate) fn try_pop(&self) -> Option<Option<Arc<S>>> {
        let mut buffer = self.lock();
        if buffer.closed {
            return Some(None);
        }
        match buffer.queue.pop_front() {
            Some(value) => {
                drop(buffer);
                self.writable.notify_one();
                Some(Some(value))
            }
            None => None,
        }
    }

    pub(crate) fn close(&self) {
        {
            let mut buffer = self.lock();
            buffer.closed = true;
            buffer.queue.clear();
        }
        self.readable.notify_one();
        self.writable.notify_one();
    }

    pub(crate) fn detach(&self) {
        {
            let mut buffer = self.lock();
            buffer.detached = true;
            buffer.queue.clear();
        }
        self.writable.notify_one();
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.lock().detached
    }

    pub(crate) fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}
