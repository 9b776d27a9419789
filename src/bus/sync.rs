use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::bus::{BusEvent, EventBus, EventKind, Topic};
use crate::models::order::{Order, OrderStatus};
use crate::observability::metrics::Metrics;
use crate::store::{OrderStore, StoreError};

/// Fans every committed transition out to the bus and hands reconnecting
/// subscribers an authoritative read to reconcile against.
pub struct StatusSynchronizer {
    bus: EventBus,
    orders: Arc<dyn OrderStore>,
    metrics: Metrics,
}

impl StatusSynchronizer {
    pub fn new(bus: EventBus, orders: Arc<dyn OrderStore>, metrics: Metrics) -> Self {
        Self {
            bus,
            orders,
            metrics,
        }
    }

    fn publish(&self, topic: Topic, order_id: Uuid, version: u64, kind: EventKind) {
        let label = match topic {
            Topic::Agent(_) => "agent",
            Topic::Order(_) => "order",
            Topic::Broadcast => "broadcast",
        };
        self.metrics
            .events_published_total
            .with_label_values(&[label])
            .inc();
        self.bus.publish(BusEvent {
            topic,
            order_id,
            version,
            kind,
            at: Utc::now(),
        });
    }

    /// Announces a successful claim: private offer to the winner, status
    /// change to order watchers, taken-notice to the broadcast topic.
    pub fn announce_claim(&self, order: &Order, agent_id: Uuid, expires_at: DateTime<Utc>) {
        self.publish(
            Topic::Agent(agent_id),
            order.id,
            order.version,
            EventKind::OfferIssued {
                agent_id,
                expires_at,
            },
        );
        self.announce_status(order, OrderStatus::Pending);
        self.publish(
            Topic::Broadcast,
            order.id,
            order.version,
            EventKind::OrderTaken { agent_id },
        );
    }

    pub fn announce_status(&self, order: &Order, from: OrderStatus) {
        self.publish(
            Topic::Order(order.id),
            order.id,
            order.version,
            EventKind::StatusChanged {
                from,
                to: order.status,
            },
        );
    }

    pub fn announce_revocation(&self, order: &Order, agent_id: Uuid) {
        self.publish(
            Topic::Agent(agent_id),
            order.id,
            order.version,
            EventKind::OfferRevoked { agent_id },
        );
    }

    pub fn subscribe(&self, topic: Topic) -> EventStream {
        EventStream {
            rx: self.bus.subscribe(topic),
            gate: VersionGate::default(),
        }
    }

    /// Authoritative current state, for subscribers that missed events.
    pub fn catch_up(&self, order_id: Uuid) -> Result<Order, StoreError> {
        self.orders.get(order_id)
    }
}

/// Per-subscriber ordering guard: per order, only strictly increasing
/// versions pass; redelivered or out-of-order events are dropped.
#[derive(Default)]
pub struct VersionGate {
    seen: HashMap<Uuid, u64>,
}

impl VersionGate {
    pub fn admit(&mut self, event: &BusEvent) -> bool {
        match self.seen.get(&event.order_id) {
            Some(&delivered) if event.version <= delivered => false,
            _ => {
                self.seen.insert(event.order_id, event.version);
                true
            }
        }
    }
}

/// A gated subscription. Lagged gaps are skipped silently; the caller is
/// expected to reconcile via `catch_up` when it cares about missed events.
pub struct EventStream {
    rx: broadcast::Receiver<BusEvent>,
    gate: VersionGate,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if self.gate.admit(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
