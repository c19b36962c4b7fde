// ── Sync hub domain types ──
//
// Change events, detected conflicts, and out-of-band notifications.
// All are immutable once built and exist only while being fanned out.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display};
use uuid::Uuid;

use super::table::{ChangeKind, Table};

/// Who caused a write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub session_id: Option<String>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            user_name: Some(user_name.into()),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// A change to one record, fanned out to matching connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    pub id: String,
    pub table: Table,
    pub operation: ChangeKind,
    pub record_id: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_data: Option<Value>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Per-record counter; higher means newer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl SyncEvent {
    pub fn new(
        table: Table,
        operation: ChangeKind,
        record_id: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            table,
            operation,
            record_id: record_id.into(),
            data,
            previous_data: None,
            timestamp: Utc::now(),
            user_id: None,
            user_name: None,
            session_id: None,
            version: None,
        }
    }

    pub fn with_previous(mut self, previous: Value) -> Self {
        self.previous_data = Some(previous);
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_actor(mut self, actor: &Actor) -> Self {
        self.user_id.clone_from(&actor.user_id);
        self.user_name.clone_from(&actor.user_name);
        self.session_id.clone_from(&actor.session_id);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Project this event belongs to, if it can be determined.
    ///
    /// A project record is its own scope; other records point at one
    /// through their `projectId` field (current or previous snapshot).
    pub fn project_id(&self) -> Option<&str> {
        if self.table == Table::Proyectos {
            return Some(&self.record_id);
        }
        self.data
            .get("projectId")
            .and_then(Value::as_str)
            .or_else(|| {
                self.previous_data
                    .as_ref()
                    .and_then(|p| p.get("projectId"))
                    .and_then(Value::as_str)
            })
    }

    /// Fields this event mutates, or `None` when the change has no
    /// field-level granularity (creates, deletes, non-object payloads).
    pub fn changed_fields(&self) -> Option<BTreeSet<String>> {
        if self.operation != ChangeKind::Update {
            return None;
        }
        let data = self.data.as_object()?;
        let previous = self.previous_data.as_ref().and_then(Value::as_object);
        let fields: BTreeSet<String> = data
            .iter()
            .filter(|(key, value)| previous.is_none_or(|p| p.get(key.as_str()) != Some(*value)))
            .map(|(key, _)| key.clone())
            .collect();
        Some(fields)
    }

    /// Whether two events were written by the same session.
    pub fn same_session(&self, other: &Self) -> bool {
        matches!((&self.session_id, &other.session_id), (Some(a), Some(b)) if a == b)
    }
}

/// How two writes to the same record collided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ConflictType {
    /// Both writers based their change on the same version.
    ConcurrentUpdate,
    /// The writer based its change on an older version.
    StaleVersion,
    /// A delete collided with another write.
    DeleteUpdateRace,
}

/// A detected conflicting concurrent edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub id: String,
    pub table: Table,
    pub record_id: String,
    /// Attribute in dispute, or `None` for whole-record conflicts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub conflict_type: ConflictType,
    pub timestamp: DateTime<Utc>,
    /// The event that triggered detection.
    pub event_id: String,
    /// The earlier event it collided with.
    pub prior_event_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    #[default]
    Info,
    Warning,
    Error,
}

/// An out-of-band message pushed to one or all connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        level: NotificationLevel,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            level,
            title: title.into(),
            message: message.into(),
            data: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}
