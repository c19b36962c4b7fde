//! HTTP surface for syncdesk.
//!
//! Exposes the operation executor, sync hub broadcast ingress, the
//! server-sent event stream, and cache administration over axum. The
//! binary in `main.rs` only parses arguments and calls [`server::serve`].

pub mod auth;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;
mod stream;

pub use auth::TokenTable;
pub use error::{ApiError, ServerError};
pub use routes::router;
pub use server::{build_state, cors_layer, serve};
pub use state::AppState;
