//! Event bus — broadcast fan-out between plugins and to the bridge.
//!
//! One bounded broadcast channel carries every event; subscribers
//! filter by event type on the receiving side. Publishing never blocks:
//! a subscriber that falls behind loses its oldest buffered events and
//! keeps receiving from there.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default broadcast buffer size per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// An event published on the bus. Immutable once published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub source_plugin: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    /// Unix milliseconds at publish time.
    pub timestamp: u64,
}

/// A live subscription, tracked for introspection and cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionInfo {
    pub owner: String,
    /// `None` means the subscription receives every event type.
    pub event_type: Option<String>,
}

type SubscriptionTable = Arc<Mutex<HashMap<u64, SubscriptionInfo>>>;

fn lock_table(table: &SubscriptionTable) -> std::sync::MutexGuard<'_, HashMap<u64, SubscriptionInfo>> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct EventBus {
    sender: broadcast::Sender<Event>,
    subscriptions: SubscriptionTable,
    next_subscription_id: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            next_subscription_id: AtomicU64::new(1),
        }
    }

    /// Publish an event. Returns the number of subscribers the event was
    /// buffered for. Never blocks and never fails: with no subscribers
    /// the event is simply dropped.
    pub fn publish(
        &self,
        source_plugin: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> usize {
        let event = Event {
            source_plugin: source_plugin.to_string(),
            event_type: event_type.to_string(),
            payload,
            timestamp: chrono::Utc::now().timestamp_millis() as u64,
        };
        tracing::debug!(source = %source_plugin, event = %event_type, "event published");
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events whose type matches `event_type` exactly.
    pub fn subscribe(&self, owner: &str, event_type: &str) -> EventStream {
        self.register(owner, Some(event_type.to_string()))
    }

    /// Subscribe to every event regardless of type. Used by the
    /// WebSocket bridge to mirror the bus to external clients.
    pub fn subscribe_all(&self, owner: &str) -> EventStream {
        self.register(owner, None)
    }

    fn register(&self, owner: &str, event_type: Option<String>) -> EventStream {
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        lock_table(&self.subscriptions).insert(
            id,
            SubscriptionInfo {
                owner: owner.to_string(),
                event_type: event_type.clone(),
            },
        );
        EventStream {
            rx: self.sender.subscribe(),
            filter: event_type,
            _guard: SubscriptionGuard {
                id,
                table: self.subscriptions.clone(),
            },
        }
    }

    /// Snapshot of all live subscriptions.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        let mut subs: Vec<_> = lock_table(&self.subscriptions).values().cloned().collect();
        subs.sort_by(|a, b| (&a.owner, &a.event_type).cmp(&(&b.owner, &b.event_type)));
        subs
    }

    /// Live subscriptions owned by one plugin.
    pub fn subscriptions_for(&self, owner: &str) -> Vec<SubscriptionInfo> {
        self.subscriptions()
            .into_iter()
            .filter(|s| s.owner == owner)
            .collect()
    }

    /// Drop a plugin's subscriptions from the tracking table. Its
    /// receivers die with the plugin's aborted tasks; this removes the
    /// bookkeeping immediately so introspection never shows stale
    /// entries. Returns the number of entries removed.
    pub fn remove_plugin(&self, owner: &str) -> usize {
        let mut table = lock_table(&self.subscriptions);
        let before = table.len();
        table.retain(|_, sub| sub.owner != owner);
        before - table.len()
    }

    /// Number of currently attached broadcast receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

// ─── Event stream ───────────────────────────────────────────────────

/// Receiving half of a subscription.
pub struct EventStream {
    rx: broadcast::Receiver<Event>,
    filter: Option<String>,
    _guard: SubscriptionGuard,
}

impl EventStream {
    /// Receive the next matching event.
    ///
    /// Lag gaps are logged and skipped: the stream resumes at the oldest
    /// retained event. Returns `None` once the bus has been dropped.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    let matches = match self.filter.as_deref() {
                        Some(wanted) => wanted == event.event_type,
                        None => true,
                    };
                    if matches {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagging, oldest events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Removes the subscription from the tracking table when the stream is
/// dropped.
struct SubscriptionGuard {
    id: u64,
    table: SubscriptionTable,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        lock_table(&self.table).remove(&self.id);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
