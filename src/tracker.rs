use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::models::agent::{Agent, AgentStatus};
use crate::models::order::Actor;
use crate::store::{AgentStore, StoreError};

/// Outcome of a status self-report: either the new state, or the unchanged
/// current state when the request was rejected.
pub struct StatusChange {
    pub agent: Agent,
    pub applied: bool,
}

/// Authoritative view of agent availability consumed by the coordinator.
/// Thin over the agent store; the conditional order claim remains the true
/// correctness boundary, so reads here may be slightly stale.
pub struct AvailabilityTracker {
    agents: Arc<dyn AgentStore>,
    /// Max non-terminal orders an agent may hold at once.
    order_cap: u32,
}

impl AvailabilityTracker {
    pub fn new(agents: Arc<dyn AgentStore>, order_cap: u32) -> Self {
        Self { agents, order_cap }
    }

    /// Guarded self-reports: `Offline` while holding active orders, or
    /// `Available` while at the order cap, are rejected as a no-op. Only an
    /// admin override may force either, and the caller is then responsible
    /// for the orders the agent still holds.
    pub fn set_status(
        &self,
        agent_id: Uuid,
        status: AgentStatus,
        actor: Actor,
    ) -> Result<StatusChange, StoreError> {
        let current = self.agents.get(agent_id)?;

        let forced = actor == Actor::Admin;
        let rejected = !forced
            && match status {
                AgentStatus::Offline => current.active_orders > 0,
                AgentStatus::Available => current.active_orders >= self.order_cap,
                AgentStatus::Busy | AgentStatus::OnBreak => false,
            };
        if rejected {
            info!(
                agent_id = %agent_id,
                active_orders = current.active_orders,
                requested = ?status,
                "status self-report rejected while orders are in flight"
            );
            return Ok(StatusChange {
                agent: current,
                applied: false,
            });
        }

        let agent = self.agents.set_status(agent_id, status)?;
        Ok(StatusChange {
            agent,
            applied: true,
        })
    }

    pub fn increment_active(&self, agent_id: Uuid) -> Result<u32, StoreError> {
        self.agents.increment_active(agent_id)
    }

    pub fn decrement_active(&self, agent_id: Uuid) -> Result<u32, StoreError> {
        self.agents.decrement_active(agent_id)
    }

    /// Candidate pool for a dispatch cycle: available, under the order cap,
    /// and inside the order's zone when both sides carry one.
    pub fn list_eligible(&self, zone: Option<Uuid>) -> Vec<Agent> {
        self.agents
            .list_available(zone)
            .into_iter()
            .filter(|agent| agent.active_orders < self.order_cap)
            .collect()
    }
}
