use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::agent::GeoPoint;

/// Lifecycle of an order. Forward-only except for the `Assigned -> Pending`
/// reversion (offer expiry, decline, forced reassignment) and the `Cancelled`
/// terminal, which is reachable from any state short of `Delivered`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Pending,
    Assigned,
    Accepted,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Full transition graph, including system-driven reversions.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Assigned) => true,
            (Assigned, Accepted) => true,
            // Reversion on offer expiry / decline / forced reassignment.
            (Assigned, Pending) | (Accepted, Pending) => true,
            (Accepted, PickedUp) => true,
            (PickedUp, InTransit) => true,
            (InTransit, Delivered) => true,
            (from, Cancelled) if !from.is_terminal() => true,
            _ => false,
        }
    }

    /// The single next step an assigned agent may advance to, if any.
    pub fn next_in_sequence(self) -> Option<OrderStatus> {
        use OrderStatus::*;
        match self {
            Accepted => Some(PickedUp),
            PickedUp => Some(InTransit),
            InTransit => Some(Delivered),
            _ => None,
        }
    }
}

/// Originator of a status transition, recorded for audit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Actor {
    Agent(Uuid),
    Customer,
    Admin,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub location: GeoPoint,
    pub zone_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub assigned_agent: Option<Uuid>,
    pub address: DeliveryAddress,
    /// Monetary total in minor units (e.g. cents).
    pub total_minor: i64,
    pub currency: String,
    /// Optimistic-concurrency token; bumped on every committed mutation.
    pub version: u64,
    /// How many times an assignment has been reverted back to pending.
    pub reassignments: u32,
    /// Set once automatic dispatch gives up; surfaced to admin tooling.
    pub needs_attention: bool,
    pub history: Vec<TransitionRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        customer_id: Uuid,
        address: DeliveryAddress,
        total_minor: i64,
        currency: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            customer_id,
            status: OrderStatus::Pending,
            assigned_agent: None,
            address,
            total_minor,
            currency,
            version: 1,
            reassignments: 0,
            needs_attention: false,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;

    #[test]
    fn forward_chain_is_valid() {
        assert!(Pending.can_transition_to(Assigned));
        assert!(Assigned.can_transition_to(Accepted));
        assert!(Accepted.can_transition_to(PickedUp));
        assert!(PickedUp.can_transition_to(InTransit));
        assert!(InTransit.can_transition_to(Delivered));
    }

    #[test]
    fn no_backward_transitions() {
        assert!(!Accepted.can_transition_to(Assigned));
        assert!(!PickedUp.can_transition_to(Accepted));
        assert!(!InTransit.can_transition_to(PickedUp));
        assert!(!Delivered.can_transition_to(InTransit));
        assert!(!PickedUp.can_transition_to(Pending));
        assert!(!InTransit.can_transition_to(Pending));
    }

    #[test]
    fn reversion_only_before_pickup() {
        assert!(Assigned.can_transition_to(Pending));
        assert!(Accepted.can_transition_to(Pending));
        assert!(!PickedUp.can_transition_to(Pending));
    }

    #[test]
    fn cancelled_reachable_from_all_non_terminal_states() {
        for from in [Pending, Assigned, Accepted, PickedUp, InTransit] {
            assert!(from.can_transition_to(Cancelled), "{from:?}");
        }
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Cancelled));
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for next in [Pending, Assigned, Accepted, PickedUp, InTransit, Delivered, Cancelled] {
            assert!(!Delivered.can_transition_to(next));
            assert!(!Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn agent_sequence_skips_terminal_and_unassigned_states() {
        assert_eq!(Accepted.next_in_sequence(), Some(PickedUp));
        assert_eq!(PickedUp.next_in_sequence(), Some(InTransit));
        assert_eq!(InTransit.next_in_sequence(), Some(Delivered));
        assert_eq!(Pending.next_in_sequence(), None);
        assert_eq!(Delivered.next_in_sequence(), None);
    }
}
