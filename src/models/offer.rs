use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OfferOutcome {
    Pending,
    Accepted,
    Declined,
    Expired,
    Revoked,
}

/// Ephemeral candidate-to-order pairing awaiting the agent's answer.
/// Keyed by order id: at most one live offer per order at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentOffer {
    pub order_id: Uuid,
    pub agent_id: Uuid,
    /// Order version committed by the claim; the reaper's reversion is
    /// guarded on it so an accept that already advanced the order wins.
    pub order_version: u64,
    pub offered_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub outcome: OfferOutcome,
}

impl AssignmentOffer {
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.outcome == OfferOutcome::Pending && now < self.expires_at
    }
}
