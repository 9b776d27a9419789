use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::rest::agents::StatusResponse;
use crate::engine::dispatch::{revert_claim, update_with_backoff};
use crate::error::AppError;
use crate::models::agent::AgentStatus;
use crate::models::offer::OfferOutcome;
use crate::models::order::{Actor, Order, OrderStatus};
use crate::models::zone::DeliveryZone;
use crate::state::AppState;
use crate::store::{OrderMutation, StoreError};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/orders/:id/reassign", post(force_reassign))
        .route("/admin/orders/stuck", get(list_stuck_orders))
        .route("/admin/agents/:id/status", patch(override_agent_status))
        .route("/admin/zones", post(create_zone).get(list_zones))
}

#[derive(Deserialize)]
pub struct OverrideStatusRequest {
    pub status: AgentStatus,
}

#[derive(Deserialize)]
pub struct CreateZoneRequest {
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Rips an order away from its current agent and puts it back through
/// dispatch. Only orders that have not been picked up can be reassigned.
async fn force_reassign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.get(id)?;

    if !matches!(order.status, OrderStatus::Assigned | OrderStatus::Accepted) {
        return Err(AppError::Conflict(format!(
            "order in status {:?} cannot be reassigned",
            order.status
        )));
    }

    match revert_claim(&state, &order, OfferOutcome::Revoked, Actor::Admin).await? {
        Some(reverted) => {
            info!(order_id = %id, "order force-reassigned by admin");
            Ok(Json(reverted))
        }
        None => Err(AppError::Conflict(
            "order was modified concurrently".to_string(),
        )),
    }
}

/// Non-terminal orders sitting in one state past the configured threshold,
/// plus anything dispatch has given up on.
async fn list_stuck_orders(State(state): State<Arc<AppState>>) -> Json<Vec<Order>> {
    let cutoff = Utc::now()
        - Duration::from_std(state.config.stuck_threshold)
            .unwrap_or_else(|_| Duration::seconds(900));

    let stuck = state
        .orders
        .list()
        .into_iter()
        .filter(|order| {
            !order.status.is_terminal() && (order.needs_attention || order.updated_at <= cutoff)
        })
        .collect();

    Json(stuck)
}

/// Admin override of agent availability. Forcing an agent offline while it
/// holds orders triggers emergency reassignment of everything still
/// revertible; picked-up orders stay with the agent and are flagged instead.
async fn override_agent_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OverrideStatusRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    let change = state.tracker.set_status(id, payload.status, Actor::Admin)?;

    if payload.status == AgentStatus::Offline && change.applied {
        emergency_reassign(&state, id).await?;
    }

    let agent = state.agents.get(id)?;
    Ok(Json(StatusResponse {
        applied: change.applied,
        agent,
    }))
}

async fn emergency_reassign(state: &AppState, agent_id: Uuid) -> Result<(), AppError> {
    let held: Vec<Order> = state
        .orders
        .list()
        .into_iter()
        .filter(|order| order.assigned_agent == Some(agent_id) && !order.status.is_terminal())
        .collect();

    for order in held {
        match order.status {
            OrderStatus::Assigned | OrderStatus::Accepted => {
                if revert_claim(state, &order, OfferOutcome::Revoked, Actor::Admin)
                    .await?
                    .is_some()
                {
                    info!(
                        order_id = %order.id,
                        agent_id = %agent_id,
                        "order reclaimed from force-offlined agent"
                    );
                }
            }
            _ => {
                // Already picked up: cannot legally return to pending, so
                // surface it to the dashboard instead of stranding silently.
                warn!(
                    order_id = %order.id,
                    agent_id = %agent_id,
                    status = ?order.status,
                    "in-flight order held by offlined agent; flagged for attention"
                );
                let mutation =
                    OrderMutation::status(order.status, Actor::Admin).flagging_attention(true);
                match update_with_backoff(state, order.id, order.version, mutation).await {
                    Ok(_) | Err(StoreError::VersionConflict { .. }) => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }
    }

    Ok(())
}

async fn create_zone(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateZoneRequest>,
) -> Result<Json<DeliveryZone>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let mut zone = DeliveryZone::new(payload.name);
    zone.active = payload.active;
    state.zones.insert(zone.clone());
    Ok(Json(zone))
}

async fn list_zones(State(state): State<Arc<AppState>>) -> Json<Vec<DeliveryZone>> {
    Json(state.zones.list())
}
