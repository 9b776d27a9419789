use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::queue::{DispatchRequest, enqueue_dispatch};
use crate::error::AppError;
use crate::models::agent::AgentStatus;
use crate::models::offer::{AssignmentOffer, OfferOutcome};
use crate::models::order::{Actor, Order, OrderStatus};
use crate::state::AppState;
use crate::store::{OrderMutation, StoreError};

/// What a dispatch cycle did with an order. Losing a claim race or finding
/// no candidates is normal operation, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Assigned,
    NoCandidates,
    /// Order was no longer pending, or not serviceable right now.
    Skipped,
    /// Every ranked candidate lost the claim race this cycle.
    Exhausted,
}

impl DispatchOutcome {
    fn label(self) -> &'static str {
        match self {
            DispatchOutcome::Assigned => "assigned",
            DispatchOutcome::NoCandidates => "no_candidates",
            DispatchOutcome::Skipped => "skipped",
            DispatchOutcome::Exhausted => "exhausted",
        }
    }
}

pub async fn run_dispatch_engine(state: Arc<AppState>, mut rx: mpsc::Receiver<DispatchRequest>) {
    info!("dispatch engine started");

    while let Some(request) = rx.recv().await {
        state.metrics.orders_in_dispatch_queue.dec();

        let start = Instant::now();
        match dispatch_order(&state, request.order_id).await {
            Ok(outcome) => {
                state
                    .metrics
                    .dispatch_latency_seconds
                    .with_label_values(&[outcome.label()])
                    .observe(start.elapsed().as_secs_f64());
            }
            Err(err) => {
                state
                    .metrics
                    .dispatch_latency_seconds
                    .with_label_values(&["error"])
                    .observe(start.elapsed().as_secs_f64());
                state.metrics.dispatch_failures_total.inc();
                error!(order_id = %request.order_id, error = %err, "dispatch cycle failed");
            }
        }
    }

    warn!("dispatch engine stopped: queue channel closed");
}

/// One dispatch cycle: filter, rank, then walk candidates attempting the
/// conditional claim until one sticks or the retry budget runs out. Safe to
/// run concurrently from multiple engine instances; the order CAS arbitrates.
pub async fn dispatch_order(state: &AppState, order_id: Uuid) -> Result<DispatchOutcome, AppError> {
    let mut order = match state.orders.get(order_id) {
        Ok(order) => order,
        Err(StoreError::NotFound) => return Ok(DispatchOutcome::Skipped),
        Err(err) => return Err(err.into()),
    };

    if order.status != OrderStatus::Pending {
        return Ok(DispatchOutcome::Skipped);
    }

    if !zone_serviceable(state, &order) {
        warn!(order_id = %order.id, "delivery zone inactive or unknown; holding order");
        flag_for_attention(state, &order).await?;
        return Ok(DispatchOutcome::Skipped);
    }

    let mut candidates = state.tracker.list_eligible(order.address.zone_id);
    state.ranking.rank(&mut candidates, &order);

    if candidates.is_empty() {
        return Ok(DispatchOutcome::NoCandidates);
    }

    let mut attempts = 0;
    for candidate in &candidates {
        if attempts >= state.config.claim_retry_limit {
            break;
        }
        attempts += 1;

        let mutation = OrderMutation::status(OrderStatus::Assigned, Actor::System)
            .with_agent(candidate.id);
        match update_with_backoff(state, order.id, order.version, mutation).await {
            Ok(claimed) => {
                state
                    .metrics
                    .claims_total
                    .with_label_values(&["won"])
                    .inc();
                complete_claim(state, &claimed, candidate.id);
                return Ok(DispatchOutcome::Assigned);
            }
            Err(StoreError::VersionConflict { .. }) => {
                // Lost the race; reload and see whether the order is still up
                // for grabs before trying the next candidate.
                state
                    .metrics
                    .claims_total
                    .with_label_values(&["lost"])
                    .inc();
                order = match state.orders.get(order.id) {
                    Ok(order) => order,
                    Err(StoreError::NotFound) => return Ok(DispatchOutcome::Skipped),
                    Err(err) => return Err(err.into()),
                };
                if order.status != OrderStatus::Pending {
                    return Ok(DispatchOutcome::Skipped);
                }
            }
            Err(err) => return Err(err.into()),
        }
    }

    // Still pending; the reaper's rescan will bring it back around.
    Ok(DispatchOutcome::Exhausted)
}

fn zone_serviceable(state: &AppState, order: &Order) -> bool {
    match order.address.zone_id {
        None => true,
        Some(zone_id) => state.zones.get(zone_id).is_some_and(|zone| zone.active),
    }
}

async fn flag_for_attention(state: &AppState, order: &Order) -> Result<(), AppError> {
    if order.needs_attention {
        return Ok(());
    }
    let mutation =
        OrderMutation::status(order.status, Actor::System).flagging_attention(true);
    match update_with_backoff(state, order.id, order.version, mutation).await {
        Ok(_) | Err(StoreError::VersionConflict { .. }) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn complete_claim(state: &AppState, claimed: &Order, agent_id: Uuid) {
    occupy_agent(state, agent_id);

    let now = Utc::now();
    let expires_at = now
        + chrono::Duration::from_std(state.config.offer_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
    state.offers.put(AssignmentOffer {
        order_id: claimed.id,
        agent_id,
        order_version: claimed.version,
        offered_at: now,
        expires_at,
        outcome: OfferOutcome::Pending,
    });

    state.synchronizer.announce_claim(claimed, agent_id, expires_at);

    info!(
        order_id = %claimed.id,
        agent_id = %agent_id,
        version = claimed.version,
        "order claimed for agent"
    );
}

fn occupy_agent(state: &AppState, agent_id: Uuid) {
    match state.tracker.increment_active(agent_id) {
        Ok(active) if active >= state.config.agent_order_cap => {
            if let Err(err) = state.agents.set_status(agent_id, AgentStatus::Busy) {
                warn!(agent_id = %agent_id, error = %err, "failed to mark agent busy");
            }
        }
        Ok(_) => {}
        Err(err) => warn!(agent_id = %agent_id, error = %err, "failed to bump active count"),
    }
}

/// Releases an agent after an order leaves its hands. Flips a cap-induced
/// `Busy` back to `Available`; self-reported breaks and offline stay put.
pub fn release_agent(state: &AppState, agent_id: Uuid) {
    match state.tracker.decrement_active(agent_id) {
        Ok(active) if active < state.config.agent_order_cap => {
            if let Ok(agent) = state.agents.get(agent_id) {
                if agent.status == AgentStatus::Busy {
                    if let Err(err) = state.agents.set_status(agent_id, AgentStatus::Available) {
                        warn!(agent_id = %agent_id, error = %err, "failed to free busy agent");
                    }
                }
            }
        }
        Ok(_) => {}
        Err(err) => warn!(agent_id = %agent_id, error = %err, "failed to drop active count"),
    }
}

/// Reverts a claimed order back to `Pending` and releases its agent; shared
/// by offer expiry, explicit decline, and forced reassignment. The order CAS
/// is the arbiter: a lost race applies no side effects and returns `None`.
pub async fn revert_claim(
    state: &AppState,
    order: &Order,
    offer_outcome: OfferOutcome,
    actor: Actor,
) -> Result<Option<Order>, AppError> {
    let Some(agent_id) = order.assigned_agent else {
        return Ok(None);
    };

    let bumped = order.reassignments + 1;
    let mutation = OrderMutation::status(OrderStatus::Pending, actor)
        .clearing_agent()
        .bumping_reassignments()
        .flagging_attention(bumped >= state.config.max_reassignments);

    match update_with_backoff(state, order.id, order.version, mutation).await {
        Ok(reverted) => {
            state.offers.finalize(order.id, offer_outcome);
            release_agent(state, agent_id);
            state.synchronizer.announce_status(&reverted, order.status);
            state.synchronizer.announce_revocation(&reverted, agent_id);

            if reverted.needs_attention {
                warn!(
                    order_id = %reverted.id,
                    reassignments = reverted.reassignments,
                    "reassignment budget exhausted; order held for manual dispatch"
                );
            } else {
                enqueue_dispatch(state, reverted.id).await?;
            }
            Ok(Some(reverted))
        }
        Err(StoreError::VersionConflict { .. }) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Runs a conditional update with bounded exponential backoff on store
/// outages. Version conflicts are returned immediately; they are contention,
/// not unavailability, and the caller decides what losing the race means.
pub async fn update_with_backoff(
    state: &AppState,
    order_id: Uuid,
    expected_version: u64,
    mutation: OrderMutation,
) -> Result<Order, StoreError> {
    let mut delay = state.config.store_retry_base;
    let mut attempt = 0;

    loop {
        match state
            .orders
            .conditional_update(order_id, expected_version, mutation)
        {
            Err(err) if err.is_retryable() && attempt < state.config.store_retry_limit => {
                attempt += 1;
                warn!(
                    order_id = %order_id,
                    attempt,
                    error = %err,
                    "store unavailable; backing off"
                );
                sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            other => return other,
        }
    }
}
