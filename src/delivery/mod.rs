//! Activity-gated delivery of state changes.
//!
//! A gated subscription forwards values to its callback only while the
//! host's [`ActiveSignal`] is on. What happens when the signal comes back on
//! is chosen by the [`DeliveryMode`].

mod gate;
mod registry;

pub use gate::{DeliveryGate, Redelivery};
pub use registry::{SubscriptionClaim, SubscriptionRegistry};

use crate::error::Result;
use crate::scope::Scope;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum DeliveryMode {
    /// Redeliver the latest value every time the subscription reactivates.
    #[default]
    RedeliverOnStart,
    /// Redeliver on reactivation only if the value changed while inactive.
    /// The id must not be shared by two live subscriptions on one container.
    UniqueOnly(String),
}

impl DeliveryMode {
    pub fn unique(id: impl Into<String>) -> Self {
        Self::UniqueOnly(id.into())
    }

    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            Self::RedeliverOnStart => None,
            Self::UniqueOnly(id) => Some(id),
        }
    }

    /// Derive a per-selector id, e.g. `list_count,name` for two selected fields.
    pub fn append_to_id(&self, fields: &[&str]) -> Self {
        match self {
            Self::RedeliverOnStart => Self::RedeliverOnStart,
            Self::UniqueOnly(id) => Self::UniqueOnly(format!("{}_{}", id, fields.join(","))),
        }
    }

    fn redelivery(&self) -> Redelivery {
        match self {
            Self::RedeliverOnStart => Redelivery::Always,
            Self::UniqueOnly(_) => Redelivery::UniqueOnly,
        }
    }
}

/// Host-owned on/off signal, e.g. a view being visible.
#[derive(Debug, Clone)]
pub struct ActiveSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ActiveSignal {
    pub fn new(active: bool) -> Self {
        let (tx, _) = watch::channel(active);
        Self { tx: Arc::new(tx) }
    }

    /// Change the signal. Setting the current value again is a no-op.
    pub fn set_active(&self, active: bool) {
        self.tx.send_if_modified(|current| {
            if *current == active {
                false
            } else {
                *current = active;
                true
            }
        });
    }

    pub fn is_active(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Shared by the handle and its driver task; whichever stops first releases the id.
type ClaimSlot = Arc<Mutex<Option<SubscriptionClaim>>>;

fn release(slot: &ClaimSlot) {
    slot.lock().unwrap_or_else(|e| e.into_inner()).take();
}

/// Handle to a running gated subscription.
///
/// Dropping the handle cancels the subscription and releases its id. The id
/// is also released when the upstream stream completes.
pub struct GatedSubscription {
    scope: Scope,
    id: Option<String>,
    claim: ClaimSlot,
    task: Option<JoinHandle<()>>,
}

impl GatedSubscription {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn cancel(&mut self) {
        self.scope.cancel();
        release(&self.claim);
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the subscription to end, either by cancellation or because
    /// its upstream completed.
    pub async fn finished(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for GatedSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Drive `values` through a [`DeliveryGate`] into `callback`.
///
/// For [`DeliveryMode::UniqueOnly`] the id is claimed in `registry` first;
/// a live subscription already holding it is a
/// [`StoreError::DuplicateSubscription`](crate::StoreError::DuplicateSubscription).
pub fn gate_stream<T, F>(
    values: BoxStream<'static, T>,
    mode: DeliveryMode,
    signal: &ActiveSignal,
    registry: &Arc<SubscriptionRegistry>,
    parent: &Scope,
    callback: F,
) -> Result<GatedSubscription>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: FnMut(T) + Send + 'static,
{
    let claim = match mode.subscription_id() {
        Some(id) => Some(registry.claim(id)?),
        None => None,
    };
    let recorder = claim
        .as_ref()
        .map(|claim| (Arc::clone(registry), claim.id().to_string()));
    let seeded = recorder
        .as_ref()
        .and_then(|(registry, id)| registry.last_delivered::<T>(id));
    let gate = DeliveryGate::new(mode.redelivery(), signal.is_active()).with_last_delivered(seeded);

    let id = claim.as_ref().map(|claim| claim.id().to_string());
    let mut callback = callback;
    let deliver = move |value: T| {
        if let Some((registry, id)) = &recorder {
            registry.record_delivery(id, value.clone());
        }
        callback(value);
    };
    let claim = Arc::new(Mutex::new(claim));
    let mut subscription = spawn_gate(values, gate, signal, parent, claim, deliver);
    subscription.id = id;
    Ok(subscription)
}

/// Gate `values` with no id to claim. Always redelivers on start.
pub(crate) fn gate_unclaimed<T, F>(
    values: BoxStream<'static, T>,
    signal: &ActiveSignal,
    parent: &Scope,
    callback: F,
) -> GatedSubscription
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: FnMut(T) + Send + 'static,
{
    let gate = DeliveryGate::new(Redelivery::Always, signal.is_active());
    spawn_gate(values, gate, signal, parent, Arc::new(Mutex::new(None)), callback)
}

fn spawn_gate<T, F>(
    mut values: BoxStream<'static, T>,
    mut gate: DeliveryGate<T>,
    signal: &ActiveSignal,
    parent: &Scope,
    claim: ClaimSlot,
    mut deliver: F,
) -> GatedSubscription
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: FnMut(T) + Send + 'static,
{
    let mut signal_rx = signal.subscribe();
    gate.set_active(*signal_rx.borrow_and_update());
    let scope = parent.child();
    let task_scope = scope.clone();
    let task_claim = Arc::clone(&claim);

    let task = tokio::spawn(async move {
        let mut signal_open = true;
        loop {
            tokio::select! {
                biased;
                _ = task_scope.cancelled() => break,
                changed = signal_rx.changed(), if signal_open => {
                    if changed.is_err() {
                        trace!("Active signal dropped; gate stays {}", if gate.is_active() { "open" } else { "closed" });
                        signal_open = false;
                        continue;
                    }
                    let active = *signal_rx.borrow_and_update();
                    if let Some(value) = gate.set_active(active) {
                        deliver(value);
                    }
                }
                next = values.next() => {
                    let Some(value) = next else { break };
                    if signal_open {
                        let active = *signal_rx.borrow_and_update();
                        if let Some(value) = gate.set_active(active) {
                            deliver(value);
                        }
                    }
                    if let Some(value) = gate.on_value(value) {
                        deliver(value);
                    }
                }
            }
        }
        release(&task_claim);
        task_scope.cancel();
        debug!("Gated subscription finished");
    });

    GatedSubscription {
        scope,
        id: None,
        claim,
        task: Some(task),
    }
}
