use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use syncdesk_api::RecordClient;
use syncdesk_core::{RecordService, SyncHub};

use crate::auth::TokenTable;

/// Shared handler state. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: Arc<RecordService<RecordClient>>,
    pub auth: Arc<TokenTable>,
    /// Cancelled on shutdown; open event streams end with it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(service: RecordService<RecordClient>, auth: TokenTable) -> Self {
        Self {
            service: Arc::new(service),
            auth: Arc::new(auth),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn hub(&self) -> &Arc<SyncHub> {
        self.service.hub()
    }
}
