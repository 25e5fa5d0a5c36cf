//! Subscriber registry and fan-out.
//!
//! The [`Broadcaster`] tracks live subscribers keyed by [`SubscriberId`]
//! and delivers every published [`StreamEvent`] to each of them.
//!
//! Delivery is non-blocking and isolated per subscriber: a sink that is
//! closed or whose buffer is full fails, is removed from the registry, and
//! the fan-out continues with the next subscriber. Publishing snapshots the
//! subscriber set under a read lock and delivers outside it, so a
//! concurrent register or unregister never disturbs an in-progress
//! fan-out.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use solar_twin_types::{StreamEvent, SubscriberId};
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::MAX_CHANNEL_CAPACITY;

/// Why a delivery to one subscriber failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryFailure {
    /// The receiving side is gone.
    #[error("subscriber connection closed")]
    Closed,

    /// The subscriber's buffer is full; it is too slow to keep.
    #[error("subscriber buffer full")]
    Full,
}

/// Destination for one subscriber's events.
///
/// Implementations must not block: the producer calls `deliver` once per
/// subscriber per event on the tick path.
pub trait SubscriberSink: Send + Sync {
    /// Hand one event to the subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryFailure`] if the subscriber can no longer accept
    /// events. The broadcaster then unregisters it.
    fn deliver(&self, event: Arc<StreamEvent>) -> Result<(), DeliveryFailure>;
}

impl SubscriberSink for mpsc::Sender<Arc<StreamEvent>> {
    fn deliver(&self, event: Arc<StreamEvent>) -> Result<(), DeliveryFailure> {
        self.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryFailure::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryFailure::Closed,
        })
    }
}

type Registry = RwLock<BTreeMap<SubscriberId, Arc<dyn SubscriberSink>>>;

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    subscribers: Registry,
}

impl Inner {
    fn remove(&self, id: SubscriberId) -> bool {
        let removed = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            debug!(subscriber = %id, "subscriber unregistered");
        }
        removed
    }
}

/// Registry of live subscribers. Cloning yields another handle to the same
/// registry.
#[derive(Clone, Default)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("subscribers", &self.len())
            .finish_non_exhaustive()
    }
}

impl Broadcaster {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink`, delivering `greeting` to it first.
    ///
    /// The greeting is delivered before the sink joins the live set, so no
    /// published event can overtake it. If the greeting cannot be delivered
    /// the sink is never added; the returned id is then already
    /// unregistered.
    pub fn register(&self, sink: Arc<dyn SubscriberSink>, greeting: StreamEvent) -> SubscriberId {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        if let Err(e) = sink.deliver(Arc::new(greeting)) {
            debug!(subscriber = %id, error = %e, "greeting failed, subscriber dropped");
            return id;
        }

        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, sink);
        debug!(subscriber = %id, "subscriber registered");
        id
    }

    /// Register a channel-backed subscriber with a buffer of `capacity`
    /// events, clamped to `[1, MAX_CHANNEL_CAPACITY]`.
    pub fn subscribe(&self, capacity: usize, greeting: StreamEvent) -> Subscription {
        let (tx, rx) = mpsc::channel(capacity.clamp(1, MAX_CHANNEL_CAPACITY));
        let id = self.register(Arc::new(tx), greeting);
        Subscription {
            id,
            receiver: rx,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscriber. Returns whether it was registered; calling it
    /// again is harmless.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        self.inner.remove(id)
    }

    /// Deliver `event` to every live subscriber.
    ///
    /// Subscribers whose delivery fails are unregistered; the rest still
    /// receive the event. Returns the number of successful deliveries.
    pub fn publish(&self, event: StreamEvent) -> usize {
        let event = Arc::new(event);
        let targets: Vec<(SubscriberId, Arc<dyn SubscriberSink>)> = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, sink)| (*id, Arc::clone(sink)))
            .collect();

        let mut delivered: usize = 0;
        let mut failed = Vec::new();
        for (id, sink) in targets {
            match sink.deliver(Arc::clone(&event)) {
                Ok(()) => delivered = delivered.saturating_add(1),
                Err(e) => {
                    debug!(subscriber = %id, error = %e, kind = event.kind(), "delivery failed");
                    failed.push(id);
                }
            }
        }

        for id in failed {
            self.inner.remove(id);
        }
        delivered
    }

    /// Whether `id` is currently registered.
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no subscribers are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Receiving end of a channel-backed subscriber.
///
/// Dropping it unregisters the subscriber.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<Arc<StreamEvent>>,
    registry: Weak<Inner>,
}

impl Subscription {
    /// This subscriber's id.
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event. Returns `None` once the subscriber has been
    /// dropped by the broadcaster and its buffer is drained.
    pub async fn recv(&mut self) -> Option<Arc<StreamEvent>> {
        self.receiver.recv().await
    }

    /// Take the next event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Arc<StreamEvent>> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            inner.remove(self.id);
        }
    }
}
