//! Process-wide typed publish/subscribe event bus.
//!
//! Delivery is fire-and-forget, in subscription order, to every current
//! subscriber of an event name. A panicking handler is caught and logged —
//! it never affects sibling subscribers or the publisher. Two subscription
//! styles are exposed: a closure-based `subscribe` for synchronous in-process
//! hooks (mirrors a `LifecycleHook` contract), and a `broadcast`-receiver
//! `subscribe_stream` for SSE-style consumers that want an owned stream.
//!
//! Grounded on `CancelMap`'s lock-around-map, release-before-await discipline
//! and `TaskStore`'s per-entity `broadcast` channel.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;

pub mod names;

/// One published occurrence: the event name plus its opaque payload map.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub payload: Value,
}

type Handler = dyn Fn(&Value) + Send + Sync;

/// Opaque token returned by [`EventBus::subscribe`], passed back to
/// [`EventBus::unsubscribe`] to remove that one handler.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: u64,
    event_name: String,
}

struct Subscriber {
    id: u64,
    handler: Arc<Handler>,
}

const BROADCAST_CAPACITY: usize = 256;

/// Process-wide pub/sub surface. Cheaply cloned — internally an `Arc`-free
/// struct of locked maps, intended to be held behind a single shared
/// instance and passed by reference (or wrapped in an `Arc` by callers).
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Vec<Subscriber>>>,
    broadcasters: RwLock<HashMap<String, broadcast::Sender<Event>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure-based subscriber for `event_name`. The handler
    /// runs synchronously, in subscription order, on every `publish` to
    /// that name until unsubscribed.
    pub fn subscribe<F>(&self, event_name: impl Into<String>, handler: F) -> SubscriptionHandle
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let event_name = event_name.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .entry(event_name.clone())
            .or_default()
            .push(Subscriber {
                id,
                handler: Arc::new(handler),
            });
        SubscriptionHandle { id, event_name }
    }

    /// Remove a single subscriber previously returned by [`subscribe`].
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Some(list) = self.subscribers.write().get_mut(&handle.event_name) {
            list.retain(|s| s.id != handle.id);
        }
    }

    /// Remove all closure subscribers for `event_name`, or every event name
    /// when `None`. Broadcast-stream subscribers are unaffected — they drop
    /// themselves when their `Receiver` is dropped.
    pub fn clear_subscriptions(&self, event_name: Option<&str>) {
        let mut subs = self.subscribers.write();
        match event_name {
            Some(name) => {
                subs.remove(name);
            }
            None => subs.clear(),
        }
    }

    /// Obtain a `broadcast::Receiver` for `event_name`, creating the
    /// underlying channel on first use. Lagging receivers silently drop the
    /// oldest buffered events rather than blocking the publisher.
    pub fn subscribe_stream(&self, event_name: impl Into<String>) -> broadcast::Receiver<Event> {
        let event_name = event_name.into();
        let mut broadcasters = self.broadcasters.write();
        broadcasters
            .entry(event_name)
            .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0)
            .subscribe()
    }

    /// Publish `payload` under `event_name` to every current subscriber.
    /// Non-blocking from the producer's perspective: the subscriber list is
    /// snapshotted under the lock, then dispatched with the lock released.
    pub fn publish(&self, event_name: impl Into<String>, payload: Value) {
        let event_name = event_name.into();

        let handlers: Vec<Arc<Handler>> = {
            let subs = self.subscribers.read();
            subs.get(&event_name)
                .map(|list| list.iter().map(|s| s.handler.clone()).collect())
                .unwrap_or_default()
        };

        for handler in handlers {
            let payload_ref = &payload;
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| handler(payload_ref)));
            if let Err(panic) = result {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(event = %event_name, %message, "event subscriber panicked, isolating");
            }
        }

        let broadcaster = self.broadcasters.read().get(&event_name).cloned();
        if let Some(tx) = broadcaster {
            // No receivers is a normal, non-error condition — fire-and-forget.
            let _ = tx.send(Event {
                name: event_name,
                payload,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    #[test]
    fn publish_delivers_to_all_subscribers_in_order() {
        let bus = EventBus::new();
        let order = Arc::new(RwLock::new(Vec::new()));

        let o1 = order.clone();
        bus.subscribe("x", move |_| o1.write().push(1));
        let o2 = order.clone();
        bus.subscribe("x", move |_| o2.write().push(2));

        bus.publish("x", serde_json::json!({}));
        assert_eq!(*order.read(), vec![1, 2]);
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = count.clone();
        let h1 = bus.subscribe("x", move |_| {
            c1.fetch_add(1, AtomicOrdering::SeqCst);
        });
        let c2 = count.clone();
        bus.subscribe("x", move |_| {
            c2.fetch_add(10, AtomicOrdering::SeqCst);
        });

        bus.unsubscribe(h1);
        bus.publish("x", serde_json::json!({}));
        assert_eq!(count.load(AtomicOrdering::SeqCst), 10);
    }

    #[test]
    fn panicking_handler_does_not_block_peers() {
        let bus = EventBus::new();
        let ran = Arc::new(AtomicUsize::new(0));

        bus.subscribe("x", |_| panic!("boom"));
        let r = ran.clone();
        bus.subscribe("x", move |_| {
            r.fetch_add(1, AtomicOrdering::SeqCst);
        });

        bus.publish("x", serde_json::json!({}));
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn clear_subscriptions_for_one_event_leaves_others() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe("x", move |_| {
            c.fetch_add(1, AtomicOrdering::SeqCst);
        });
        let c2 = count.clone();
        bus.subscribe("y", move |_| {
            c2.fetch_add(1, AtomicOrdering::SeqCst);
        });

        bus.clear_subscriptions(Some("x"));
        bus.publish("x", serde_json::json!({}));
        bus.publish("y", serde_json::json!({}));
        assert_eq!(count.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscribe_stream_receives_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_stream("x");

        bus.publish("x", serde_json::json!({"a": 1}));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "x");
        assert_eq!(event.payload["a"], 1);
    }

    #[test]
    fn no_subscribers_publish_is_a_no_op() {
        let bus = EventBus::new();
        bus.publish("ghost", serde_json::json!(null));
    }
}
