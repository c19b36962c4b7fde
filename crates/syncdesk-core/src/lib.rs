//! Resilient operation execution and real-time sync for syncdesk.
//!
//! This crate sits between HTTP callers and the remote record store
//! reached through `syncdesk-api`:
//!
//! - **[`OperationExecutor`]**: Runs validated [`CrudOperation`]s with a
//!   per-attempt deadline, bounded exponential-backoff retries driven by
//!   [`classify`], cache-aside reads through [`CacheStore`], and coarse
//!   per-table invalidation on writes. Always resolves to an
//!   [`OperationResult`].
//!
//! - **[`CacheStore`]**: TTL-keyed `DashMap` of read results grouped by
//!   table, with lazy expiry and an optional sweeper task.
//!
//! - **[`SyncHub`]**: Fans [`SyncEvent`]s out to live connections held in
//!   the [`ConnectionRegistry`], reports conflicting writes found by the
//!   [`ConflictDetector`], and keeps connections honest with a periodic
//!   heartbeat that prunes silent clients.
//!
//! - **[`RecordService`]**: Facade publishing every successful write to
//!   the hub, plus validated broadcast ingress for external writers.

pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod executor;
pub mod model;
pub mod service;
pub mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cache::{CacheKey, CacheStats, CacheStore};
pub use classify::{Classification, classify};
pub use config::{ExecutorConfig, HubConfig};
pub use error::{CoreError, ErrorKind};
pub use executor::{OperationExecutor, RecordStore};
pub use service::{BroadcastRequest, RecordService};
pub use sync::{
    ClientConnection, ConflictDetector, ConnectionHandle, ConnectionRegistry, ConnectionState,
    Frame, FrameKind, HeartbeatReport, HubListener, HubMessage, HubStats, PublishOutcome,
    SubscriptionFilter, SubscriptionParams, SyncHub,
};

pub use model::{
    Actor, ChangeKind, Conflict, ConflictType, CrudOperation, ExecuteOptions, Notification,
    NotificationLevel, OperationKind, OperationRequest, OperationResult, Pagination, RecordData,
    ResultMetadata, SyncEvent, Table,
};
