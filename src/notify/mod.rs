use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::order::Order;

/// Push events, tagged the way clients see them on the wire
/// (`{"event": "new-order", "data": {...}}`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum Notification {
    NewOrder {
        message: String,
        order: Order,
    },
    OrderConfirmed {
        message: String,
        order: Order,
    },
    OrderStatusUpdated {
        message: String,
        order: Order,
    },
    OrderNoLongerAvailable {
        order_id: Uuid,
        assigned_to: String,
    },
    OrderAvailableAgain {
        message: String,
        order: Order,
    },
    OrderTimeout {
        message: String,
        order: Order,
        support_contact: String,
    },
}

/// Identity-keyed fan-out. Each courier/customer identity gets its own
/// broadcast channel, created on first subscribe. Delivery is best-effort:
/// an identity with no live subscriber just misses the event, and clients
/// reconcile by re-fetching orders.
pub struct Notifier {
    channels: DashMap<String, broadcast::Sender<Notification>>,
    buffer: usize,
}

impl Notifier {
    pub fn new(buffer: usize) -> Self {
        Self {
            channels: DashMap::new(),
            buffer,
        }
    }

    pub fn subscribe(&self, identity: &str) -> broadcast::Receiver<Notification> {
        self.channels
            .entry(identity.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .subscribe()
    }

    pub fn notify(&self, identity: &str, notification: Notification) {
        if let Some(tx) = self.channels.get(identity) {
            let _ = tx.send(notification);
        }
    }

    pub fn broadcast(&self, identities: &[String], notification: &Notification) {
        for identity in identities {
            self.notify(identity, notification.clone());
        }
    }
}
