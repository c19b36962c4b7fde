// ── Remote store seam ──
//
// The executor talks to the remote record store through this trait so
// retry / cache policy can be exercised against in-memory fakes.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use syncdesk_api::{Error as ApiError, ListQuery, RecordClient, RemoteResponse};

use crate::model::{CrudOperation, OperationKind, RecordData};

/// One round trip to the remote record store for a validated operation.
pub trait RecordStore: Send + Sync + 'static {
    fn call(
        &self,
        op: &CrudOperation,
    ) -> impl Future<Output = Result<RemoteResponse, ApiError>> + Send;
}

impl<T: RecordStore> RecordStore for Arc<T> {
    fn call(
        &self,
        op: &CrudOperation,
    ) -> impl Future<Output = Result<RemoteResponse, ApiError>> + Send {
        (**self).call(op)
    }
}

impl RecordStore for RecordClient {
    async fn call(&self, op: &CrudOperation) -> Result<RemoteResponse, ApiError> {
        let table = op.table();
        let table = table.as_ref();
        // Operations reach the store already validated, so id and data
        // are present wherever the operation kind requires them.
        let id = op.id().unwrap_or_default();
        let body = op.data().map_or(Value::Null, RecordData::to_value);

        match op.operation() {
            OperationKind::List => {
                let query = ListQuery {
                    page: op.pagination().map(|p| p.page),
                    limit: op.pagination().map(|p| p.limit),
                    filters: op.filters().clone(),
                };
                self.list(table, &query).await
            }
            OperationKind::Get => self.get(table, id).await,
            OperationKind::Create => self.create(table, &body).await,
            OperationKind::Update => self.update(table, id, &body).await,
            OperationKind::Delete => self.delete(table, id).await,
        }
    }
}
