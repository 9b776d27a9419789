use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::dispatch::{release_agent, revert_claim, update_with_backoff};
use crate::engine::queue::enqueue_dispatch;
use crate::error::AppError;
use crate::models::agent::GeoPoint;
use crate::models::offer::OfferOutcome;
use crate::models::order::{Actor, DeliveryAddress, Order, OrderStatus};
use crate::state::AppState;
use crate::store::{OrderMutation, StoreError};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/accept", post(accept_offer))
        .route("/orders/:id/decline", post(decline_offer))
        .route("/orders/:id/advance", post(advance_status))
        .route("/orders/:id/cancel", post(cancel_order))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    pub location: GeoPoint,
    pub zone_id: Option<Uuid>,
    pub total_minor: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "INR".to_string()
}

#[derive(Deserialize)]
pub struct OfferAnswerRequest {
    pub agent_id: Uuid,
}

#[derive(Deserialize)]
pub struct AdvanceStatusRequest {
    pub agent_id: Uuid,
    pub next_status: OrderStatus,
}

#[derive(Deserialize, Default)]
pub struct CancelRequest {
    #[serde(default)]
    pub by_admin: bool,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    if payload.total_minor < 0 {
        return Err(AppError::BadRequest("total cannot be negative".to_string()));
    }

    let order = Order::new(
        payload.customer_id,
        DeliveryAddress {
            location: payload.location,
            zone_id: payload.zone_id,
        },
        payload.total_minor,
        payload.currency,
    );

    state.orders.insert(order.clone());
    enqueue_dispatch(&state, order.id).await?;

    Ok(Json(order))
}

async fn list_orders(State(state): State<Arc<AppState>>) -> Json<Vec<Order>> {
    Json(state.orders.list())
}

/// The catch-up read: always the authoritative current state, whatever the
/// subscriber last saw on the bus.
async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state.synchronizer.catch_up(id)?;
    Ok(Json(order))
}

async fn accept_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OfferAnswerRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.get(id)?;
    let offer = state.offers.get(id).ok_or(AppError::OfferUnavailable)?;

    if offer.agent_id != payload.agent_id || !offer.is_open(Utc::now()) {
        return Err(AppError::OfferUnavailable);
    }
    if order.status != OrderStatus::Assigned || order.assigned_agent != Some(payload.agent_id) {
        return Err(AppError::OfferUnavailable);
    }

    // Guarded on the claim's version: if a cancellation or the reaper got
    // there first this fails cleanly and the agent sees the offer as gone.
    let mutation = OrderMutation::status(OrderStatus::Accepted, Actor::Agent(payload.agent_id));
    match update_with_backoff(&state, id, offer.order_version, mutation).await {
        Ok(accepted) => {
            state.offers.finalize(id, OfferOutcome::Accepted);
            state
                .synchronizer
                .announce_status(&accepted, OrderStatus::Assigned);
            info!(order_id = %id, agent_id = %payload.agent_id, "offer accepted");
            Ok(Json(accepted))
        }
        Err(StoreError::VersionConflict { .. }) => Err(AppError::OfferUnavailable),
        Err(err) => Err(err.into()),
    }
}

async fn decline_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OfferAnswerRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.get(id)?;
    let offer = state.offers.get(id).ok_or(AppError::OfferUnavailable)?;

    if offer.agent_id != payload.agent_id || offer.outcome != OfferOutcome::Pending {
        return Err(AppError::OfferUnavailable);
    }
    if order.status != OrderStatus::Assigned || order.assigned_agent != Some(payload.agent_id) {
        return Err(AppError::OfferUnavailable);
    }

    match revert_claim(
        &state,
        &order,
        OfferOutcome::Declined,
        Actor::Agent(payload.agent_id),
    )
    .await?
    {
        Some(reverted) => {
            state.metrics.offers_declined_total.inc();
            info!(order_id = %id, agent_id = %payload.agent_id, "offer declined");
            Ok(Json(reverted))
        }
        None => Err(AppError::OfferUnavailable),
    }
}

async fn advance_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdvanceStatusRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.get(id)?;

    // Repeating the transition already applied is a no-op, not an error.
    if order.status == payload.next_status && order.assigned_agent == Some(payload.agent_id) {
        return Ok(Json(order));
    }
    if order.assigned_agent != Some(payload.agent_id) {
        return Err(AppError::NotAssignedAgent);
    }

    let expected_next = order.status.next_in_sequence();
    if expected_next != Some(payload.next_status) {
        return Err(AppError::InvalidTransition {
            from: order.status,
            to: payload.next_status,
        });
    }

    let mutation = OrderMutation::status(payload.next_status, Actor::Agent(payload.agent_id));
    match update_with_backoff(&state, id, order.version, mutation).await {
        Ok(advanced) => {
            state.synchronizer.announce_status(&advanced, order.status);
            if advanced.status == OrderStatus::Delivered {
                release_agent(&state, payload.agent_id);
                info!(order_id = %id, agent_id = %payload.agent_id, "order delivered");
            }
            Ok(Json(advanced))
        }
        Err(StoreError::VersionConflict { .. }) => {
            // A concurrent duplicate of the same call may have landed; treat
            // an already-applied transition as success.
            let current = state.orders.get(id)?;
            if current.status == payload.next_status {
                Ok(Json(current))
            } else {
                Err(AppError::Conflict(
                    "order was modified concurrently".to_string(),
                ))
            }
        }
        Err(err) => Err(err.into()),
    }
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<CancelRequest>>,
) -> Result<Json<Order>, AppError> {
    let actor = if payload.is_some_and(|Json(p)| p.by_admin) {
        Actor::Admin
    } else {
        Actor::Customer
    };

    let mut order = state.orders.get(id)?;

    // Honored even while a claim is in flight: the CAS guard makes the two
    // writers serialize, and cancellation retries until it lands or the
    // order reaches a terminal state.
    for _ in 0..=state.config.claim_retry_limit {
        match order.status {
            OrderStatus::Cancelled => return Ok(Json(order)),
            OrderStatus::Delivered => {
                return Err(AppError::InvalidTransition {
                    from: OrderStatus::Delivered,
                    to: OrderStatus::Cancelled,
                });
            }
            _ => {}
        }

        let holder = order.assigned_agent;
        let mutation = OrderMutation::status(OrderStatus::Cancelled, actor).clearing_agent();
        match update_with_backoff(&state, id, order.version, mutation).await {
            Ok(cancelled) => {
                if let Some(agent_id) = holder {
                    state.offers.finalize(id, OfferOutcome::Revoked);
                    release_agent(&state, agent_id);
                    state.synchronizer.announce_revocation(&cancelled, agent_id);
                }
                state.synchronizer.announce_status(&cancelled, order.status);
                info!(order_id = %id, "order cancelled");
                return Ok(Json(cancelled));
            }
            Err(StoreError::VersionConflict { .. }) => {
                order = state.orders.get(id)?;
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(AppError::Conflict(
        "order kept changing concurrently; cancellation not applied".to_string(),
    ))
}
