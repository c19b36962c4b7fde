// ── Real-time sync ──
//
// Connection registry, subscription filtering, conflict detection, and
// the hub that ties them together.

mod conflict;
mod filter;
mod frame;
mod hub;
mod registry;

pub use conflict::ConflictDetector;
pub use filter::{SubscriptionFilter, SubscriptionParams};
pub use frame::{Frame, FrameKind};
pub use hub::{
    ConnectionHandle, HeartbeatReport, HubListener, HubMessage, HubStats, PublishOutcome, SyncHub,
};
pub use registry::{ClientConnection, ConnectionRegistry, ConnectionState};
