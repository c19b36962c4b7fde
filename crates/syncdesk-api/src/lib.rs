// syncdesk-api: Async Rust client for the remote record store

pub mod client;
pub mod error;
pub mod transport;

pub use client::{ListQuery, RecordClient, RemoteResponse};
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};
