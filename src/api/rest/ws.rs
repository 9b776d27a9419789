use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::Topic;
use crate::state::AppState;

/// Private offer stream for one agent.
pub async fn agent_ws(
    ws: WebSocketUpgrade,
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Topic::Agent(id)))
}

/// Status stream for one order, consumed by the customer app and the admin
/// dashboard. Opens with an authoritative snapshot so a reconnecting client
/// is current before the first event arrives.
pub async fn order_ws(
    ws: WebSocketUpgrade,
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Topic::Order(id)))
}

/// Cross-agent notices ("order taken by someone else").
pub async fn broadcast_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Topic::Broadcast))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, topic: Topic) {
    let (mut sender, mut receiver) = socket.split();
    let mut stream = state.synchronizer.subscribe(topic);

    info!(topic = ?topic, "websocket client connected");

    // Catch-up snapshot before the live stream: the bus only accelerates,
    // the store is the source of truth.
    if let Topic::Order(order_id) = topic {
        if let Ok(order) = state.synchronizer.catch_up(order_id) {
            let snapshot = json!({ "type": "Snapshot", "order": order });
            if sender
                .send(Message::Text(snapshot.to_string()))
                .await
                .is_err()
            {
                return;
            }
        }
    }

    let send_task = tokio::spawn(async move {
        while let Some(event) = stream.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!(topic = ?topic, "websocket client disconnected");
}
