use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::agent::{Agent, AgentStatus, GeoPoint};
use crate::models::offer::{AssignmentOffer, OfferOutcome};
use crate::models::order::{Order, OrderStatus, TransitionRecord};
use crate::models::zone::DeliveryZone;
use crate::store::{
    AgentField, AgentStore, OfferStore, OrderMutation, OrderStore, StoreError, ZoneStore,
};

/// In-memory order store. DashMap's per-entry locking makes each
/// `conditional_update` an atomic read-check-write, which is exactly the
/// compare-and-set a transactional backend would provide.
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: DashMap<Uuid, Order>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderStore for MemoryOrderStore {
    fn get(&self, id: Uuid) -> Result<Order, StoreError> {
        self.orders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound)
    }

    fn insert(&self, order: Order) {
        self.orders.insert(order.id, order);
    }

    fn list(&self) -> Vec<Order> {
        self.orders.iter().map(|e| e.value().clone()).collect()
    }

    fn list_pending(&self, zone: Option<Uuid>) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|e| {
                let order = e.value();
                order.status == OrderStatus::Pending
                    && zone.is_none_or(|z| order.address.zone_id == Some(z))
            })
            .map(|e| e.value().clone())
            .collect()
    }

    fn conditional_update(
        &self,
        id: Uuid,
        expected_version: u64,
        mutation: OrderMutation,
    ) -> Result<Order, StoreError> {
        let mut entry = self.orders.get_mut(&id).ok_or(StoreError::NotFound)?;
        let order = entry.value_mut();

        if order.version != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                found: order.version,
            });
        }

        let from = order.status;
        let now = Utc::now();

        if mutation.new_status != from {
            if !from.can_transition_to(mutation.new_status) {
                return Err(StoreError::InvalidTransition {
                    from,
                    to: mutation.new_status,
                });
            }
            order.status = mutation.new_status;
            order.history.push(TransitionRecord {
                from,
                to: mutation.new_status,
                actor: mutation.actor,
                at: now,
            });
        }

        match mutation.agent {
            AgentField::Keep => {}
            AgentField::Clear => order.assigned_agent = None,
            AgentField::Set(agent_id) => order.assigned_agent = Some(agent_id),
        }
        if mutation.bump_reassignments {
            order.reassignments += 1;
        }
        if let Some(flag) = mutation.needs_attention {
            order.needs_attention = flag;
        }

        order.version += 1;
        order.updated_at = now;
        Ok(order.clone())
    }
}

#[derive(Default)]
pub struct MemoryAgentStore {
    agents: DashMap<Uuid, Agent>,
}

impl MemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_agent<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Agent) -> T,
    ) -> Result<T, StoreError> {
        let mut entry = self.agents.get_mut(&id).ok_or(StoreError::NotFound)?;
        let agent = entry.value_mut();
        let out = f(agent);
        agent.updated_at = Utc::now();
        Ok(out)
    }
}

impl AgentStore for MemoryAgentStore {
    fn get(&self, id: Uuid) -> Result<Agent, StoreError> {
        self.agents
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound)
    }

    fn insert(&self, agent: Agent) {
        self.agents.insert(agent.id, agent);
    }

    fn list(&self) -> Vec<Agent> {
        self.agents.iter().map(|e| e.value().clone()).collect()
    }

    fn set_status(&self, id: Uuid, status: AgentStatus) -> Result<Agent, StoreError> {
        self.with_agent(id, |agent| {
            agent.status = status;
            agent.last_seen = Utc::now();
            agent.clone()
        })
    }

    fn increment_active(&self, id: Uuid) -> Result<u32, StoreError> {
        self.with_agent(id, |agent| {
            agent.active_orders += 1;
            agent.active_orders
        })
    }

    fn decrement_active(&self, id: Uuid) -> Result<u32, StoreError> {
        self.with_agent(id, |agent| {
            agent.active_orders = agent.active_orders.saturating_sub(1);
            agent.active_orders
        })
    }

    fn list_available(&self, zone: Option<Uuid>) -> Vec<Agent> {
        self.agents
            .iter()
            .filter(|e| {
                let agent = e.value();
                agent.status == AgentStatus::Available
                    && !agent.deactivated
                    && zone.is_none_or(|z| agent.zone_id == Some(z))
            })
            .map(|e| e.value().clone())
            .collect()
    }

    fn touch_location(&self, id: Uuid, point: GeoPoint) -> Result<Agent, StoreError> {
        self.with_agent(id, |agent| {
            let now = Utc::now();
            agent.location = Some(point);
            agent.location_at = Some(now);
            agent.last_seen = now;
            agent.clone()
        })
    }
}

#[derive(Default)]
pub struct MemoryOfferStore {
    offers: DashMap<Uuid, AssignmentOffer>,
}

impl MemoryOfferStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OfferStore for MemoryOfferStore {
    fn put(&self, offer: AssignmentOffer) {
        self.offers.insert(offer.order_id, offer);
    }

    fn get(&self, order_id: Uuid) -> Option<AssignmentOffer> {
        self.offers.get(&order_id).map(|e| e.value().clone())
    }

    fn finalize(&self, order_id: Uuid, outcome: OfferOutcome) -> Option<AssignmentOffer> {
        let mut entry = self.offers.get_mut(&order_id)?;
        let offer = entry.value_mut();
        if offer.outcome != OfferOutcome::Pending {
            return None;
        }
        offer.outcome = outcome;
        Some(offer.clone())
    }

    fn expired_before(&self, cutoff: DateTime<Utc>) -> Vec<AssignmentOffer> {
        self.offers
            .iter()
            .filter(|e| {
                let offer = e.value();
                offer.outcome == OfferOutcome::Pending && offer.expires_at <= cutoff
            })
            .map(|e| e.value().clone())
            .collect()
    }
}

#[derive(Default)]
pub struct MemoryZoneStore {
    zones: DashMap<Uuid, DeliveryZone>,
}

impl MemoryZoneStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ZoneStore for MemoryZoneStore {
    fn insert(&self, zone: DeliveryZone) {
        self.zones.insert(zone.id, zone);
    }

    fn get(&self, id: Uuid) -> Option<DeliveryZone> {
        self.zones.get(&id).map(|e| e.value().clone())
    }

    fn list(&self) -> Vec<DeliveryZone> {
        self.zones.iter().map(|e| e.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{MemoryAgentStore, MemoryOfferStore, MemoryOrderStore};
    use crate::models::agent::{Agent, GeoPoint};
    use crate::models::offer::{AssignmentOffer, OfferOutcome};
    use crate::models::order::{Actor, DeliveryAddress, Order, OrderStatus};
    use crate::store::{AgentStore, OfferStore, OrderMutation, OrderStore, StoreError};

    fn order() -> Order {
        Order::new(
            Uuid::new_v4(),
            DeliveryAddress {
                location: GeoPoint {
                    lat: 12.97,
                    lng: 77.59,
                },
                zone_id: None,
            },
            45_000,
            "INR".to_string(),
        )
    }

    #[test]
    fn conditional_update_bumps_version_and_records_history() {
        let store = MemoryOrderStore::new();
        let o = order();
        let id = o.id;
        store.insert(o);

        let agent_id = Uuid::new_v4();
        let updated = store
            .conditional_update(
                id,
                1,
                OrderMutation::status(OrderStatus::Assigned, Actor::System).with_agent(agent_id),
            )
            .unwrap();

        assert_eq!(updated.version, 2);
        assert_eq!(updated.status, OrderStatus::Assigned);
        assert_eq!(updated.assigned_agent, Some(agent_id));
        assert_eq!(updated.history.len(), 1);
        assert_eq!(updated.history[0].from, OrderStatus::Pending);
        assert_eq!(updated.history[0].actor, Actor::System);
    }

    #[test]
    fn stale_version_is_rejected() {
        let store = MemoryOrderStore::new();
        let o = order();
        let id = o.id;
        store.insert(o);

        store
            .conditional_update(id, 1, OrderMutation::status(OrderStatus::Cancelled, Actor::Customer))
            .unwrap();

        let err = store
            .conditional_update(
                id,
                1,
                OrderMutation::status(OrderStatus::Assigned, Actor::System),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                expected: 1,
                found: 2
            }
        ));
    }

    #[test]
    fn illegal_transition_leaves_record_untouched() {
        let store = MemoryOrderStore::new();
        let o = order();
        let id = o.id;
        store.insert(o);

        let err = store
            .conditional_update(
                id,
                1,
                OrderMutation::status(OrderStatus::Delivered, Actor::System),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        let current = store.get(id).unwrap();
        assert_eq!(current.version, 1);
        assert_eq!(current.status, OrderStatus::Pending);
        assert!(current.history.is_empty());
    }

    #[test]
    fn concurrent_claims_have_exactly_one_winner() {
        let store = Arc::new(MemoryOrderStore::new());
        let o = order();
        let id = o.id;
        store.insert(o);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let agent_id = Uuid::new_v4();
                    store
                        .conditional_update(
                            id,
                            1,
                            OrderMutation::status(OrderStatus::Assigned, Actor::System)
                                .with_agent(agent_id),
                        )
                        .is_ok()
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 1);

        let current = store.get(id).unwrap();
        assert_eq!(current.status, OrderStatus::Assigned);
        assert_eq!(current.version, 2);
        assert!(current.assigned_agent.is_some());
    }

    #[test]
    fn active_counter_is_atomic_under_contention() {
        let store = Arc::new(MemoryAgentStore::new());
        let agent = Agent::new("a1".to_string(), None, None);
        let id = agent.id;
        store.insert(agent);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.increment_active(id).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.get(id).unwrap().active_orders, 800);
    }

    #[test]
    fn decrement_saturates_at_zero() {
        let store = MemoryAgentStore::new();
        let agent = Agent::new("a1".to_string(), None, None);
        let id = agent.id;
        store.insert(agent);

        assert_eq!(store.decrement_active(id).unwrap(), 0);
    }

    #[test]
    fn offer_finalize_is_single_winner() {
        let store = MemoryOfferStore::new();
        let order_id = Uuid::new_v4();
        store.put(AssignmentOffer {
            order_id,
            agent_id: Uuid::new_v4(),
            order_version: 2,
            offered_at: Utc::now(),
            expires_at: Utc::now() + Duration::seconds(60),
            outcome: OfferOutcome::Pending,
        });

        assert!(store.finalize(order_id, OfferOutcome::Expired).is_some());
        assert!(store.finalize(order_id, OfferOutcome::Accepted).is_none());
        assert_eq!(store.get(order_id).unwrap().outcome, OfferOutcome::Expired);
    }

    #[test]
    fn expired_scan_skips_settled_and_live_offers() {
        let store = MemoryOfferStore::new();
        let now = Utc::now();

        let stale = Uuid::new_v4();
        store.put(AssignmentOffer {
            order_id: stale,
            agent_id: Uuid::new_v4(),
            order_version: 2,
            offered_at: now - Duration::seconds(120),
            expires_at: now - Duration::seconds(60),
            outcome: OfferOutcome::Pending,
        });
        store.put(AssignmentOffer {
            order_id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            order_version: 2,
            offered_at: now,
            expires_at: now + Duration::seconds(60),
            outcome: OfferOutcome::Pending,
        });
        store.put(AssignmentOffer {
            order_id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            order_version: 2,
            offered_at: now - Duration::seconds(120),
            expires_at: now - Duration::seconds(60),
            outcome: OfferOutcome::Declined,
        });

        let hits = store.expired_before(now);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].order_id, stale);
    }
}
