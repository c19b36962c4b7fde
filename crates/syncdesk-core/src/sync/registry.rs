// ── Connection registry ──
//
// Owns every live client connection together with the sending half of
// its frame queue. All access goes through `DashMap`, so single-key
// mutations are atomic; iteration callbacks must not call back into the
// registry (shard locks are held while they run).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use super::filter::SubscriptionFilter;
use super::frame::Frame;
use crate::error::CoreError;
use crate::model::{SyncEvent, Table};

/// Lifecycle of a connection. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Receiving events with a recent heartbeat.
    Open,
    /// Missed a heartbeat interval but still receiving events.
    Stale,
    /// Removed from the registry.
    Closed,
}

/// One client's long-lived stream subscription.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConnection {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub subscriptions: Vec<SubscriptionFilter>,
    pub connected_at: DateTime<Utc>,
    pub state: ConnectionState,
    #[serde(skip)]
    pub last_heartbeat: Instant,
}

impl ClientConnection {
    pub fn new(
        user_id: Option<String>,
        session_id: Option<String>,
        subscriptions: Vec<SubscriptionFilter>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            session_id,
            subscriptions,
            connected_at: Utc::now(),
            state: ConnectionState::Open,
            last_heartbeat: Instant::now(),
        }
    }

    /// OR across filters; a connection without filters receives everything.
    pub fn matches(&self, event: &SyncEvent) -> bool {
        self.subscriptions.is_empty() || self.subscriptions.iter().any(|f| f.matches(event))
    }

    /// Whether any filter covers `table`, ignoring the other dimensions.
    pub fn watches_table(&self, table: Table) -> bool {
        self.subscriptions.is_empty() || self.subscriptions.iter().any(|f| f.matches_table(table))
    }

    pub fn is_connected(&self) -> bool {
        self.state != ConnectionState::Closed
    }
}

struct Entry {
    connection: ClientConnection,
    sender: mpsc::Sender<Frame>,
}

/// Process-wide set of live connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: DashMap<String, Entry>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.entries.len())
            .finish()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, connection: ClientConnection, sender: mpsc::Sender<Frame>) {
        debug!(connection_id = %connection.id, "connection registered");
        self.entries
            .insert(connection.id.clone(), Entry { connection, sender });
    }

    /// Remove a connection, returning it in its `Closed` state.
    pub fn remove(&self, id: &str) -> Option<ClientConnection> {
        self.entries.remove(id).map(|(_, entry)| {
            let mut connection = entry.connection;
            connection.state = ConnectionState::Closed;
            connection
        })
    }

    /// Record a heartbeat, restoring a stale connection to `Open`.
    pub fn touch_heartbeat(&self, id: &str) -> Result<(), CoreError> {
        let mut entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| CoreError::ConnectionNotFound { id: id.to_owned() })?;
        entry.connection.last_heartbeat = Instant::now();
        entry.connection.state = ConnectionState::Open;
        Ok(())
    }

    /// Visit every connection whose filters match `event`.
    pub fn for_each_matching<F>(&self, event: &SyncEvent, f: F)
    where
        F: FnMut(&ClientConnection, &mpsc::Sender<Frame>),
    {
        self.for_each_where(|c| c.matches(event), f);
    }

    /// Visit every connection satisfying `predicate`.
    pub fn for_each_where<P, F>(&self, predicate: P, mut f: F)
    where
        P: Fn(&ClientConnection) -> bool,
        F: FnMut(&ClientConnection, &mpsc::Sender<Frame>),
    {
        for entry in &self.entries {
            if predicate(&entry.connection) {
                f(&entry.connection, &entry.sender);
            }
        }
    }

    /// Mark connections silent for longer than `threshold` as `Stale`.
    pub fn mark_stale(&self, threshold: Duration) -> usize {
        let now = Instant::now();
        let mut marked = 0;
        for mut entry in self.entries.iter_mut() {
            let connection = &mut entry.connection;
            if connection.state == ConnectionState::Open
                && now.duration_since(connection.last_heartbeat) > threshold
            {
                connection.state = ConnectionState::Stale;
                marked += 1;
            }
        }
        marked
    }

    /// Remove connections silent for longer than `max_age`. Returns the
    /// removed ids.
    pub fn prune_stale(&self, max_age: Duration) -> Vec<String> {
        let now = Instant::now();
        let mut pruned = Vec::new();
        self.entries.retain(|id, entry| {
            let alive = now.duration_since(entry.connection.last_heartbeat) <= max_age;
            if !alive {
                pruned.push(id.clone());
            }
            alive
        });
        if !pruned.is_empty() {
            debug!(count = pruned.len(), "pruned stale connections");
        }
        pruned
    }

    /// Snapshot of one connection.
    pub fn get(&self, id: &str) -> Option<ClientConnection> {
        self.entries.get(id).map(|e| e.connection.clone())
    }

    pub(crate) fn sender(&self, id: &str) -> Option<mpsc::Sender<Frame>> {
        self.entries.get(id).map(|e| e.sender.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
