//! Realtime broadcaster - per-tenant fan-out to open push connections.
//!
//! The broadcaster is an explicitly owned registry handle (cloned into the
//! application state, never a module-level singleton) mapping a
//! case-normalized tenant key to the set of live subscribers. Subscribers
//! are purely in-memory; a connection that closes is removed either by its
//! stream's `Drop` or lazily on the next publish when its channel is gone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// One event queued for delivery to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEvent {
    /// SSE event name (`connected`, `ping`, `purchase`)
    pub name: String,
    /// JSON-encoded payload
    pub data: String,
}

struct Subscriber {
    id: Uuid,
    tx: mpsc::UnboundedSender<OutboundEvent>,
}

/// Cheaply clonable handle to the process-wide subscriber registry.
#[derive(Clone, Default)]
pub struct Broadcaster {
    inner: Arc<Mutex<HashMap<String, Vec<Subscriber>>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new push connection for a tenant.
    ///
    /// Returns the subscriber id (needed for `unsubscribe`) and the receive
    /// half the connection drains events from.
    pub fn subscribe(&self, tenant: &str) -> (Uuid, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        let mut map = self.lock();
        map.entry(normalize_tenant(tenant))
            .or_default()
            .push(Subscriber { id, tx });

        (id, rx)
    }

    /// Remove a subscriber. Unknown tenant or id is a no-op.
    pub fn unsubscribe(&self, tenant: &str, id: Uuid) {
        let key = normalize_tenant(tenant);
        let mut map = self.lock();

        if let Some(subscribers) = map.get_mut(&key) {
            subscribers.retain(|s| s.id != id);
            if subscribers.is_empty() {
                map.remove(&key);
            }
        }
    }

    /// Fan an event out to every current subscriber of a tenant.
    ///
    /// Fire-and-forget: an unknown tenant or empty subscriber set is a
    /// no-op, and subscribers whose connection is gone are dropped here.
    pub fn publish<T: Serialize>(&self, tenant: &str, event: &str, payload: &T) {
        let data = match serde_json::to_string(payload) {
            Ok(data) => data,
            Err(err) => {
                tracing::error!(tenant, event, "failed to serialize broadcast payload: {err}");
                return;
            }
        };

        let key = normalize_tenant(tenant);
        let mut map = self.lock();

        let Some(subscribers) = map.get_mut(&key) else {
            return;
        };

        let message = OutboundEvent {
            name: event.to_string(),
            data,
        };

        // A failed send means the receiver hung up; drop the subscriber
        subscribers.retain(|s| s.tx.send(message.clone()).is_ok());
        if subscribers.is_empty() {
            map.remove(&key);
        }
    }

    /// Number of live subscribers for a tenant (used in logs and tests).
    pub fn subscriber_count(&self, tenant: &str) -> usize {
        self.lock()
            .get(&normalize_tenant(tenant))
            .map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Subscriber>>> {
        // A poisoned lock only means another thread panicked mid-insert;
        // the map itself is still usable
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Tenant routing is case-insensitive.
fn normalize_tenant(tenant: &str) -> String {
    tenant.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn published_events_reach_all_subscribers() {
        let broadcaster = Broadcaster::new();
        let (_id1, mut rx1) = broadcaster.subscribe("alice");
        let (_id2, mut rx2) = broadcaster.subscribe("alice");

        broadcaster.publish("alice", "purchase", &json!({"username": "Maria"}));

        for rx in [&mut rx1, &mut rx2] {
            let event = rx.recv().await.expect("event delivered");
            assert_eq!(event.name, "purchase");
            assert_eq!(event.data, r#"{"username":"Maria"}"#);
        }
    }

    #[tokio::test]
    async fn tenant_routing_is_case_insensitive() {
        let broadcaster = Broadcaster::new();
        let (_id, mut rx) = broadcaster.subscribe("Alice");

        broadcaster.publish("ALICE", "ping", &json!({}));

        assert_eq!(rx.recv().await.expect("event delivered").name, "ping");
    }

    #[tokio::test]
    async fn events_do_not_cross_tenants() {
        let broadcaster = Broadcaster::new();
        let (_a, mut rx_a) = broadcaster.subscribe("alice");
        let (_b, mut rx_b) = broadcaster.subscribe("bob");

        broadcaster.publish("alice", "purchase", &json!({}));

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_to_unknown_tenant_is_a_noop() {
        let broadcaster = Broadcaster::new();
        // Must not panic or error
        broadcaster.publish("nobody", "purchase", &json!({}));
    }

    #[tokio::test]
    async fn unsubscribe_removes_only_the_given_connection() {
        let broadcaster = Broadcaster::new();
        let (id1, mut rx1) = broadcaster.subscribe("alice");
        let (_id2, mut rx2) = broadcaster.subscribe("alice");

        broadcaster.unsubscribe("alice", id1);
        broadcaster.publish("alice", "purchase", &json!({}));

        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
        assert_eq!(broadcaster.subscriber_count("alice"), 1);
    }

    #[tokio::test]
    async fn dead_subscribers_are_dropped_on_publish() {
        let broadcaster = Broadcaster::new();
        let (_id, rx) = broadcaster.subscribe("alice");
        drop(rx);

        broadcaster.publish("alice", "purchase", &json!({}));

        assert_eq!(broadcaster.subscriber_count("alice"), 0);
    }
}
