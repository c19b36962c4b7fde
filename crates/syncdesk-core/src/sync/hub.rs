// ── Sync hub ──
//
// Coordination point for real-time sync. Publishing an event checks it
// against the last event seen for the same record, routes any conflict
// to connections watching the table, and fans the event out to every
// connection whose filters match. Delivery is a non-blocking `try_send`
// onto each connection's bounded queue; a closed or full queue removes
// that connection and fan-out carries on.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures_core::Stream;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::conflict::ConflictDetector;
use super::filter::SubscriptionFilter;
use super::frame::Frame;
use super::registry::{ClientConnection, ConnectionRegistry};
use crate::config::HubConfig;
use crate::error::CoreError;
use crate::model::{Actor, Conflict, Notification, SyncEvent, Table};

/// Point-in-time hub counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub connection_count: usize,
    pub events_published: u64,
    pub conflicts_detected: u64,
    pub notifications_sent: u64,
    pub delivery_failures: u64,
}

/// What one `publish` did.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishOutcome {
    /// Connections the event frame was queued on.
    pub delivered: usize,
    pub conflict: Option<Conflict>,
}

/// What one heartbeat tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub pruned: usize,
    pub marked_stale: usize,
    pub delivered: usize,
    /// Per-record last events dropped after the retention period.
    pub events_expired: usize,
}

/// Messages seen by in-process listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Event(SyncEvent),
    Conflict(Conflict),
    Notification {
        /// `None` for a notification sent to every connection.
        connection_id: Option<String>,
        notification: Notification,
    },
}

#[derive(Debug, Default)]
struct Counters {
    events_published: AtomicU64,
    conflicts_detected: AtomicU64,
    notifications_sent: AtomicU64,
    delivery_failures: AtomicU64,
}

/// Process-wide sync hub. Construct once and share behind an `Arc`.
#[derive(Debug)]
pub struct SyncHub {
    config: HubConfig,
    registry: ConnectionRegistry,
    detector: ConflictDetector,
    /// Most recent event per `(table, record id)` with when it was
    /// published. Entries older than `event_retention` are dropped on the
    /// heartbeat tick.
    last_events: DashMap<(Table, String), (SyncEvent, Instant)>,
    listeners: broadcast::Sender<HubMessage>,
    counters: Counters,
}

impl SyncHub {
    pub fn new(config: HubConfig) -> Self {
        let (listeners, _) = broadcast::channel(config.listener_capacity.max(1));
        Self {
            detector: ConflictDetector::new(config.conflict_race_window),
            registry: ConnectionRegistry::new(),
            last_events: DashMap::new(),
            listeners,
            counters: Counters::default(),
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    // ── Connections ──────────────────────────────────────────────────

    /// Register a new stream connection.
    ///
    /// The `connected` frame is already queued on the returned handle.
    /// Dropping the handle removes the connection.
    pub fn connect(
        self: &Arc<Self>,
        actor: &Actor,
        subscriptions: Vec<SubscriptionFilter>,
    ) -> ConnectionHandle {
        let (sender, frames) = mpsc::channel(self.config.connection_buffer.max(1));
        let connection = ClientConnection::new(
            actor.user_id.clone(),
            actor.session_id.clone(),
            subscriptions,
        );
        let id = connection.id.clone();

        // Fresh queue with capacity >= 1: cannot fail.
        let _ = sender.try_send(Frame::connected(&connection));
        self.registry.add(connection, sender);
        info!(
            connection_id = %id,
            user_id = actor.user_id.as_deref().unwrap_or("-"),
            connections = self.registry.len(),
            "stream connected"
        );

        ConnectionHandle {
            id,
            frames,
            hub: Arc::downgrade(self),
        }
    }

    /// Remove a connection. Returns whether it was registered.
    pub fn disconnect(&self, connection_id: &str) -> bool {
        let removed = self.registry.remove(connection_id).is_some();
        if removed {
            info!(
                connection_id,
                connections = self.registry.len(),
                "stream disconnected"
            );
        }
        removed
    }

    pub fn touch_heartbeat(&self, connection_id: &str) -> Result<(), CoreError> {
        self.registry.touch_heartbeat(connection_id)
    }

    pub fn connection(&self, connection_id: &str) -> Option<ClientConnection> {
        self.registry.get(connection_id)
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    // ── Publishing ───────────────────────────────────────────────────

    /// Fan an event out to matching connections, reporting any conflict
    /// with the record's previous event first.
    pub fn publish(&self, event: SyncEvent) -> PublishOutcome {
        self.counters.events_published.fetch_add(1, Ordering::Relaxed);

        let prior = self
            .last_events
            .insert((event.table, event.record_id.clone()), (event.clone(), Instant::now()))
            .map(|(prior, _)| prior);
        let conflict = self.detector.check(&event, prior.as_ref());

        if let Some(conflict) = &conflict {
            self.counters.conflicts_detected.fetch_add(1, Ordering::Relaxed);
            warn!(
                table = %conflict.table,
                record_id = %conflict.record_id,
                conflict_type = %conflict.conflict_type,
                field = conflict.field.as_deref().unwrap_or("*"),
                "conflicting write detected"
            );
            let table = event.table;
            self.deliver_where(|c| c.watches_table(table), &Frame::conflict(conflict));
            let _ = self.listeners.send(HubMessage::Conflict(conflict.clone()));
        }

        let delivered = self.deliver_where(|c| c.matches(&event), &Frame::sync_event(&event));
        debug!(
            table = %event.table,
            operation = %event.operation,
            record_id = %event.record_id,
            delivered,
            "sync event published"
        );
        let _ = self.listeners.send(HubMessage::Event(event));

        PublishOutcome { delivered, conflict }
    }

    /// The most recent event published for a record.
    pub fn last_event(&self, table: Table, record_id: &str) -> Option<SyncEvent> {
        self.last_events
            .get(&(table, record_id.to_owned()))
            .map(|e| e.value().0.clone())
    }

    /// Send a notification to one connection.
    pub fn notify(&self, connection_id: &str, notification: Notification) -> Result<(), CoreError> {
        let sender = self
            .registry
            .sender(connection_id)
            .ok_or_else(|| CoreError::ConnectionNotFound {
                id: connection_id.to_owned(),
            })?;

        if let Err(e) = sender.try_send(Frame::notification(&notification)) {
            self.delivery_failed(connection_id, &e);
            return Err(CoreError::ConnectionClosed {
                id: connection_id.to_owned(),
            });
        }

        self.counters.notifications_sent.fetch_add(1, Ordering::Relaxed);
        let _ = self.listeners.send(HubMessage::Notification {
            connection_id: Some(connection_id.to_owned()),
            notification,
        });
        Ok(())
    }

    /// Send a notification to every connection. Returns how many got it.
    pub fn notify_all(&self, notification: Notification) -> usize {
        let delivered = self.deliver_where(|_| true, &Frame::notification(&notification));
        self.counters
            .notifications_sent
            .fetch_add(u64::try_from(delivered).unwrap_or(u64::MAX), Ordering::Relaxed);
        let _ = self.listeners.send(HubMessage::Notification {
            connection_id: None,
            notification,
        });
        delivered
    }

    // ── Listeners & stats ────────────────────────────────────────────

    /// Attach an in-process listener.
    pub fn subscribe(&self) -> HubListener {
        HubListener {
            rx: self.listeners.subscribe(),
        }
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            connection_count: self.registry.len(),
            events_published: self.counters.events_published.load(Ordering::Relaxed),
            conflicts_detected: self.counters.conflicts_detected.load(Ordering::Relaxed),
            notifications_sent: self.counters.notifications_sent.load(Ordering::Relaxed),
            delivery_failures: self.counters.delivery_failures.load(Ordering::Relaxed),
        }
    }

    // ── Liveness ─────────────────────────────────────────────────────

    /// Prune dead connections, mark silent ones stale, then send every
    /// survivor a heartbeat frame carrying current stats.
    pub fn heartbeat_tick(&self) -> HeartbeatReport {
        let pruned = self.registry.prune_stale(self.config.liveness_window).len();
        let marked_stale = self.registry.mark_stale(self.config.heartbeat_interval);
        let delivered = self.deliver_where(|_| true, &Frame::heartbeat(&self.stats()));
        let events_expired = self.expire_events();

        if pruned > 0 || marked_stale > 0 {
            info!(pruned, marked_stale, connections = self.registry.len(), "heartbeat sweep");
        }
        if events_expired > 0 {
            debug!(events_expired, tracked = self.last_events.len(), "last events expired");
        }
        HeartbeatReport {
            pruned,
            marked_stale,
            delivered,
            events_expired,
        }
    }

    fn expire_events(&self) -> usize {
        let now = Instant::now();
        let before = self.last_events.len();
        self.last_events
            .retain(|_, (_, seen)| now.duration_since(*seen) <= self.config.event_retention);
        before.saturating_sub(self.last_events.len())
    }

    /// Run `heartbeat_tick` every heartbeat interval until cancelled.
    pub fn spawn_heartbeat(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(hub.config.heartbeat_interval);
            interval.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        hub.heartbeat_tick();
                    }
                }
            }
            debug!("heartbeat task stopped");
        })
    }

    // ── Delivery ─────────────────────────────────────────────────────

    fn deliver_where<P>(&self, predicate: P, frame: &Frame) -> usize
    where
        P: Fn(&ClientConnection) -> bool,
    {
        let mut delivered = 0;
        let mut failed = Vec::new();

        self.registry.for_each_where(predicate, |connection, sender| {
            match sender.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => failed.push((connection.id.clone(), e)),
            }
        });

        // Removal happens after iteration; the registry's shard locks
        // are held while the callback runs.
        for (id, err) in failed {
            self.delivery_failed(&id, &err);
        }
        delivered
    }

    fn delivery_failed(&self, connection_id: &str, err: &mpsc::error::TrySendError<Frame>) {
        self.counters.delivery_failures.fetch_add(1, Ordering::Relaxed);
        let reason = match err {
            mpsc::error::TrySendError::Full(_) => "queue full",
            mpsc::error::TrySendError::Closed(_) => "stream closed",
        };
        warn!(connection_id, reason, "delivery failed, dropping connection");
        self.registry.remove(connection_id);
    }
}

impl Default for SyncHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

// ── Connection handle ───────────────────────────────────────────────

/// The receiving side of one stream connection.
///
/// Yields frames as a `Stream`. Taking a frame off the queue refreshes
/// the connection's heartbeat, so a reader that keeps draining stays
/// registered. Dropping it unregisters the connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: String,
    frames: mpsc::Receiver<Frame>,
    hub: Weak<SyncHub>,
}

impl ConnectionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next frame, or `None` once the hub has dropped the connection.
    pub async fn recv(&mut self) -> Option<Frame> {
        let frame = self.frames.recv().await;
        if frame.is_some() {
            self.mark_alive();
        }
        frame
    }

    /// Next frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Frame> {
        let frame = self.frames.try_recv().ok();
        if frame.is_some() {
            self.mark_alive();
        }
        frame
    }

    fn mark_alive(&self) {
        if let Some(hub) = self.hub.upgrade() {
            // Already pruned: the queue is closed and will drain to `None`.
            let _ = hub.registry.touch_heartbeat(&self.id);
        }
    }
}

impl Stream for ConnectionHandle {
    type Item = Frame;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Frame>> {
        let this = self.get_mut();
        let polled = this.frames.poll_recv(cx);
        if let Poll::Ready(Some(_)) = &polled {
            this.mark_alive();
        }
        polled
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.disconnect(&self.id);
        }
    }
}

// ── Listener handle ─────────────────────────────────────────────────

/// An in-process subscription to hub traffic.
#[derive(Debug)]
pub struct HubListener {
    rx: broadcast::Receiver<HubMessage>,
}

impl HubListener {
    /// Next message. Skips over messages lost to lag; `None` once the
    /// hub is gone.
    pub async fn recv(&mut self) -> Option<HubMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "hub listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Convert into a `Stream`, dropping lag notifications.
    pub fn into_stream(self) -> impl Stream<Item = HubMessage> + Send + 'static {
        BroadcastStream::new(self.rx).filter_map(|item| match item {
            Ok(message) => Some(message),
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                warn!(skipped = n, "hub listener lagged");
                None
            }
        })
    }

    /// Detach from the hub.
    pub fn unsubscribe(self) {
        drop(self);
    }
}
