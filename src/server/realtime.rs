//! Realtime assignment feed
//!
//! Committed assignments are fanned out to dashboard WebSocket clients
//! over a broadcast channel. The feed is best-effort: a crash between
//! commit and emit loses the event, and clients reconcile through the
//! lead listing endpoint on reconnect.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::AppState;
use crate::models::{AssignmentStatus, LeadAssignment};

/// Payload pushed to dashboards after every committed assignment.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentEvent {
    pub lead_id: Uuid,
    pub caller_id: Option<Uuid>,
    pub assignment_status: AssignmentStatus,
    pub assignment_reason: String,
    pub timestamp: DateTime<Utc>,
}

impl AssignmentEvent {
    pub fn from_assignment(assignment: &LeadAssignment) -> Self {
        Self {
            lead_id: assignment.lead_id,
            caller_id: assignment.caller_id,
            assignment_status: assignment.status,
            assignment_reason: assignment.assignment_reason.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Shared fan-out point for assignment events. Cloneable; all clones feed
/// the same set of subscribers.
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<AssignmentEvent>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AssignmentEvent> {
        self.tx.subscribe()
    }

    /// Send an event to all connected dashboards. Dropped silently when
    /// nobody is listening.
    pub fn broadcast_assignment(&self, event: AssignmentEvent) {
        let _ = self.tx.send(event);
    }
}

/// `WS /ws/dashboard` - server pushes assignment events; client messages
/// are discarded.
pub async fn dashboard_ws(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let events = state.broadcaster.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, events))
}

async fn handle_socket(mut socket: WebSocket, mut events: broadcast::Receiver<AssignmentEvent>) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let frame = dashboard_frame(&event);
                    if socket.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "dashboard socket lagging, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                // Client messages carry no meaning on this channel.
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
        }
    }
}

fn dashboard_frame(event: &AssignmentEvent) -> String {
    serde_json::json!({ "type": "assignment", "payload": event }).to_string()
}
