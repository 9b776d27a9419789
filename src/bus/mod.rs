pub mod sync;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::models::order::OrderStatus;

/// Addressing for the pub/sub layer: private per-agent offers, per-order
/// status streams, and cross-agent broadcast notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Agent(Uuid),
    Order(Uuid),
    Broadcast,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum EventKind {
    OfferIssued {
        agent_id: Uuid,
        expires_at: DateTime<Utc>,
    },
    OfferRevoked {
        agent_id: Uuid,
    },
    StatusChanged {
        from: OrderStatus,
        to: OrderStatus,
    },
    OrderTaken {
        agent_id: Uuid,
    },
}

/// Every event carries the order version committed by the transition it
/// announces, so subscribers can order and deduplicate.
#[derive(Debug, Clone, Serialize)]
pub struct BusEvent {
    #[serde(skip)]
    pub topic: Topic,
    pub order_id: Uuid,
    pub version: u64,
    #[serde(flatten)]
    pub kind: EventKind,
    pub at: DateTime<Utc>,
}

/// Topic-addressed fan-out over lazily created broadcast channels. The bus is
/// a notification layer, not the source of truth: a publish that reaches no
/// subscriber is degraded latency, reconciled by a catch-up read.
pub struct EventBus {
    channels: DashMap<Topic, broadcast::Sender<BusEvent>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    fn sender(&self, topic: Topic) -> broadcast::Sender<BusEvent> {
        self.channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Returns the number of subscribers reached.
    pub fn publish(&self, event: BusEvent) -> usize {
        let sender = self.sender(event.topic);
        match sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("published event had no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<BusEvent> {
        self.sender(topic).subscribe()
    }
}
