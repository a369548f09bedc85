//! WebSocket stream of campaign state updates.
//!
//! Connect to `/api/v1/ws/state`. The first message is a full snapshot;
//! after that one `updated` event is sent per applied change (local or
//! remote), carrying the changed field names and fresh progress figures.
//! A heartbeat keeps idle connections open.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::desk::{DonationDesk, ProgressSummary};
use crate::node::NodeState;
use crate::state::{CampaignState, FieldKey};

/// Seconds between heartbeats.
const HEARTBEAT_SECS: u64 = 30;

/// WebSocket message types for state updates
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// Full state, sent on connect and after a missed update
    Snapshot {
        instance_id: String,
        state: CampaignState,
        progress: ProgressSummary,
    },
    /// Some fields changed
    Updated {
        origin: Option<String>,
        fields: Vec<FieldKey>,
        progress: ProgressSummary,
    },
    /// Heartbeat to keep connection alive
    Heartbeat { timestamp: i64 },
}

/// WebSocket handler for state updates
pub async fn ws_state_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<NodeState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_state_socket(socket, state))
}

async fn handle_state_socket(mut socket: WebSocket, state: Arc<NodeState>) {
    info!("WebSocket client connected for state updates");
    let desk = &state.kiosk;

    // Subscribe before the snapshot so nothing falls between them
    let mut changes = desk.sync().subscribe_changes();

    if let Err(e) = send_event(&mut socket, snapshot(desk).await).await {
        warn!("Failed to send initial snapshot: {}", e);
        return;
    }

    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_SECS));
    heartbeat.tick().await;

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received from client: {}", text);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = socket.send(Message::Pong(data)).await {
                            warn!("Failed to send pong: {}", e);
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            change = changes.recv() => {
                let event = match change {
                    Ok(change) => StateEvent::Updated {
                        origin: change.origin,
                        fields: change.fields,
                        progress: desk.progress().await,
                    },
                    Err(RecvError::Lagged(missed)) => {
                        debug!("WebSocket client lagged by {} changes, resending snapshot", missed);
                        snapshot(desk).await
                    }
                    Err(RecvError::Closed) => break,
                };
                if let Err(e) = send_event(&mut socket, event).await {
                    warn!("Failed to send update: {}", e);
                    break;
                }
            }
            _ = heartbeat.tick() => {
                let event = StateEvent::Heartbeat {
                    timestamp: chrono::Utc::now().timestamp(),
                };
                if let Err(e) = send_event(&mut socket, event).await {
                    warn!("Failed to send heartbeat: {}", e);
                    break;
                }
            }
        }
    }
}

async fn snapshot(desk: &DonationDesk) -> StateEvent {
    let state = desk.sync().snapshot().await;
    StateEvent::Snapshot {
        instance_id: desk.sync().instance_id().to_string(),
        progress: ProgressSummary::of(&state),
        state,
    }
}

/// Send a state event over WebSocket
async fn send_event(socket: &mut WebSocket, event: StateEvent) -> Result<(), axum::Error> {
    let json = serde_json::to_string(&event).map_err(axum::Error::new)?;
    socket.send(Message::Text(json)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DEFAULT_BUCKETS;

    #[test]
    fn events_are_tagged() {
        let state = CampaignState::new(DEFAULT_BUCKETS).unwrap();
        let event = StateEvent::Updated {
            origin: Some("admin-1f2e".into()),
            fields: vec![FieldKey::TargetProgress("special-appeals".into())],
            progress: ProgressSummary::of(&state),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "updated");
        assert_eq!(json["fields"][0]["field"], "target_progress");
        assert_eq!(json["fields"][0]["id"], "special-appeals");

        let beat = serde_json::to_value(StateEvent::Heartbeat { timestamp: 7 }).unwrap();
        assert_eq!(beat, serde_json::json!({"type": "heartbeat", "timestamp": 7}));
    }
}
