// ── Egress frames ──

use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use strum::{AsRefStr, Display};

use super::hub::HubStats;
use super::registry::ClientConnection;
use crate::model::{Conflict, Notification, SyncEvent};

/// Event name carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FrameKind {
    Connected,
    SyncEvent,
    Notification,
    Conflict,
    Heartbeat,
}

/// One typed message on a client stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub event: FrameKind,
    /// Identifier for client-side replay / ack bookkeeping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub data: Value,
}

impl Frame {
    pub fn connected(connection: &ClientConnection) -> Self {
        Self {
            event: FrameKind::Connected,
            id: Some(connection.id.clone()),
            data: json!({
                "connectionId": connection.id,
                "subscriptions": connection.subscriptions,
                "timestamp": connection.connected_at,
            }),
        }
    }

    pub fn sync_event(event: &SyncEvent) -> Self {
        Self {
            event: FrameKind::SyncEvent,
            id: Some(event.id.clone()),
            data: to_value(event),
        }
    }

    pub fn conflict(conflict: &Conflict) -> Self {
        Self {
            event: FrameKind::Conflict,
            id: Some(conflict.id.clone()),
            data: to_value(conflict),
        }
    }

    pub fn notification(notification: &Notification) -> Self {
        Self {
            event: FrameKind::Notification,
            id: Some(notification.id.clone()),
            data: to_value(notification),
        }
    }

    pub fn heartbeat(stats: &HubStats) -> Self {
        Self {
            event: FrameKind::Heartbeat,
            id: None,
            data: json!({
                "timestamp": Utc::now(),
                "stats": stats,
            }),
        }
    }

    /// The JSON payload as sent on the wire.
    pub fn data_json(&self) -> String {
        self.data.to_string()
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
