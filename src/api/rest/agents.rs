use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::agent::{Agent, AgentStatus, GeoPoint};
use crate::models::order::Actor;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/agents", post(create_agent).get(list_agents))
        .route("/agents/:id/status", patch(report_status))
        .route("/agents/:id/location", patch(report_location))
        .route("/agents/:id", get(get_agent))
}

#[derive(Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
    pub vehicle: Option<String>,
    pub zone_id: Option<Uuid>,
    pub location: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct ReportStatusRequest {
    pub status: AgentStatus,
}

#[derive(Deserialize)]
pub struct ReportLocationRequest {
    pub location: GeoPoint,
}

/// Self-report response: `applied` is false when the request was rejected
/// (offline with orders in flight) and `agent` shows the unchanged state.
#[derive(Serialize)]
pub struct StatusResponse {
    pub applied: bool,
    pub agent: Agent,
}

async fn create_agent(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateAgentRequest>,
) -> Result<Json<Agent>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let mut agent = Agent::new(payload.name, payload.vehicle, payload.zone_id);
    if let Some(location) = payload.location {
        agent.location = Some(location);
        agent.location_at = Some(agent.created_at);
    }

    state.agents.insert(agent.clone());
    Ok(Json(agent))
}

async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Vec<Agent>> {
    Json(state.agents.list())
}

async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Agent>, AppError> {
    let agent = state.agents.get(id)?;
    Ok(Json(agent))
}

async fn report_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReportStatusRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    let change = state
        .tracker
        .set_status(id, payload.status, Actor::Agent(id))?;

    Ok(Json(StatusResponse {
        applied: change.applied,
        agent: change.agent,
    }))
}

async fn report_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReportLocationRequest>,
) -> Result<Json<Agent>, AppError> {
    let agent = state.agents.touch_location(id, payload.location)?;
    Ok(Json(agent))
}
