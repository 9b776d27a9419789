use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AgentStatus {
    Available,
    Busy,
    OnBreak,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub vehicle: Option<String>,
    pub status: AgentStatus,
    /// Count of non-terminal orders currently assigned to this agent.
    pub active_orders: u32,
    pub zone_id: Option<Uuid>,
    pub location: Option<GeoPoint>,
    pub location_at: Option<DateTime<Utc>>,
    pub last_seen: DateTime<Utc>,
    /// Agents are never deleted, only deactivated.
    pub deactivated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(name: String, vehicle: Option<String>, zone_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            vehicle,
            status: AgentStatus::Available,
            active_orders: 0,
            zone_id,
            location: None,
            location_at: None,
            last_seen: now,
            deactivated: false,
            created_at: now,
            updated_at: now,
        }
    }
}
