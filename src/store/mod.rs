pub mod memory;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::agent::{Agent, AgentStatus, GeoPoint};
use crate::models::offer::{AssignmentOffer, OfferOutcome};
use crate::models::order::{Actor, Order, OrderStatus};
use crate::models::zone::DeliveryZone;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },

    #[error("invalid transition: {from:?} -> {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Contention and outages are retryable; structural failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// How a conditional update touches the assigned-agent column.
#[derive(Debug, Clone, Copy)]
pub enum AgentField {
    Keep,
    Clear,
    Set(Uuid),
}

/// The full write applied by a single compare-and-set against an order row.
/// Committed atomically with the version bump and the audit entry.
#[derive(Debug, Clone, Copy)]
pub struct OrderMutation {
    pub new_status: OrderStatus,
    pub agent: AgentField,
    pub actor: Actor,
    pub bump_reassignments: bool,
    pub needs_attention: Option<bool>,
}

impl OrderMutation {
    pub fn status(new_status: OrderStatus, actor: Actor) -> Self {
        Self {
            new_status,
            agent: AgentField::Keep,
            actor,
            bump_reassignments: false,
            needs_attention: None,
        }
    }

    pub fn with_agent(mut self, agent_id: Uuid) -> Self {
        self.agent = AgentField::Set(agent_id);
        self
    }

    pub fn clearing_agent(mut self) -> Self {
        self.agent = AgentField::Clear;
        self
    }

    pub fn bumping_reassignments(mut self) -> Self {
        self.bump_reassignments = true;
        self
    }

    pub fn flagging_attention(mut self, flag: bool) -> Self {
        self.needs_attention = Some(flag);
        self
    }
}

/// Durable order records with optimistic concurrency. Injected into the
/// coordinator; any transactional backend satisfying the CAS contract works.
pub trait OrderStore: Send + Sync {
    fn get(&self, id: Uuid) -> Result<Order, StoreError>;
    fn insert(&self, order: Order);
    fn list(&self) -> Vec<Order>;
    fn list_pending(&self, zone: Option<Uuid>) -> Vec<Order>;

    /// The race-free claim primitive: applies `mutation` only when the
    /// record's version equals `expected_version` and the status change is
    /// legal in the state machine. Returns the committed record.
    fn conditional_update(
        &self,
        id: Uuid,
        expected_version: u64,
        mutation: OrderMutation,
    ) -> Result<Order, StoreError>;
}

/// Durable agent availability records with per-agent atomic counters.
pub trait AgentStore: Send + Sync {
    fn get(&self, id: Uuid) -> Result<Agent, StoreError>;
    fn insert(&self, agent: Agent);
    fn list(&self) -> Vec<Agent>;
    fn set_status(&self, id: Uuid, status: AgentStatus) -> Result<Agent, StoreError>;

    /// Atomic with respect to concurrent calls for the same agent.
    fn increment_active(&self, id: Uuid) -> Result<u32, StoreError>;
    /// Saturates at zero so releasing an already-released order is a no-op.
    fn decrement_active(&self, id: Uuid) -> Result<u32, StoreError>;

    fn list_available(&self, zone: Option<Uuid>) -> Vec<Agent>;
    fn touch_location(&self, id: Uuid, point: GeoPoint) -> Result<Agent, StoreError>;
}

/// Live assignment offers, keyed by order id, scannable by expiry deadline.
pub trait OfferStore: Send + Sync {
    fn put(&self, offer: AssignmentOffer);
    fn get(&self, order_id: Uuid) -> Option<AssignmentOffer>;

    /// Settles a still-pending offer. Returns the settled offer if this call
    /// won, `None` if the offer was missing or already settled; concurrent
    /// reapers and accept handlers race through here safely.
    fn finalize(&self, order_id: Uuid, outcome: OfferOutcome) -> Option<AssignmentOffer>;

    /// Offers still pending whose deadline passed before `cutoff`.
    fn expired_before(&self, cutoff: DateTime<Utc>) -> Vec<AssignmentOffer>;
}

pub trait ZoneStore: Send + Sync {
    fn insert(&self, zone: DeliveryZone);
    fn get(&self, id: Uuid) -> Option<DeliveryZone>;
    fn list(&self) -> Vec<DeliveryZone>;
}
