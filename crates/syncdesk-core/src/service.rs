// ── Record service ──
//
// Facade that couples the executor to the hub: every successful write
// becomes a `SyncEvent` published to live connections, and external
// broadcast requests enter the hub through the same path.

use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::executor::{OperationExecutor, RecordStore};
use crate::model::{
    Actor, ChangeKind, CrudOperation, ExecuteOptions, OperationKind, OperationResult, RecordData,
    SyncEvent, Table,
};
use crate::sync::{PublishOutcome, SyncHub};

/// Broadcast ingress request from an external writer.
///
/// Fields are optional on the wire so missing ones surface as
/// validation errors naming the field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub record_id: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub previous_data: Option<Value>,
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Executes operations and publishes the resulting changes.
#[derive(Debug)]
pub struct RecordService<S> {
    executor: OperationExecutor<S>,
    hub: Arc<SyncHub>,
    invalidate_on_broadcast: bool,
}

impl<S: RecordStore> RecordService<S> {
    pub fn new(executor: OperationExecutor<S>, hub: Arc<SyncHub>) -> Self {
        Self {
            executor,
            hub,
            invalidate_on_broadcast: true,
        }
    }

    /// Whether broadcast ingress drops cached reads for the table.
    pub fn with_broadcast_invalidation(mut self, enabled: bool) -> Self {
        self.invalidate_on_broadcast = enabled;
        self
    }

    pub fn executor(&self) -> &OperationExecutor<S> {
        &self.executor
    }

    pub fn hub(&self) -> &Arc<SyncHub> {
        &self.hub
    }

    /// Execute one operation on behalf of `actor`.
    ///
    /// `base_version` is the record version the caller's edit was based
    /// on; the published event claims `base_version + 1`.
    pub async fn execute(
        &self,
        op: &CrudOperation,
        options: ExecuteOptions,
        actor: &Actor,
        base_version: Option<u64>,
    ) -> OperationResult {
        let result = self.executor.execute(op, options).await;
        self.publish_write(op, &result, actor, base_version);
        result
    }

    /// Execute a batch; each successful write is published.
    pub async fn execute_batch(
        &self,
        ops: &[CrudOperation],
        actor: &Actor,
    ) -> Vec<OperationResult> {
        let results = self.executor.execute_batch(ops).await;
        for (op, result) in ops.iter().zip(&results) {
            self.publish_write(op, result, actor, None);
        }
        results
    }

    /// Validate and publish a change reported by an external writer.
    pub fn broadcast(
        &self,
        request: BroadcastRequest,
        actor: &Actor,
    ) -> Result<PublishOutcome, CoreError> {
        if actor.user_id.is_none() {
            return Err(CoreError::Authentication {
                message: "caller identity could not be established".into(),
            });
        }

        let table = required(request.table.as_deref(), "table")?;
        let table = Table::from_str(table)
            .map_err(|_| CoreError::validation("table", format!("unknown table '{table}'")))?;
        let operation = required(request.operation.as_deref(), "operation")?;
        let operation = ChangeKind::from_str(operation).map_err(|_| {
            CoreError::validation("operation", "must be one of create, update, delete")
        })?;
        let record_id = required(request.record_id.as_deref(), "recordId")?.to_owned();

        let mut author = actor.clone();
        if request.session_id.is_some() {
            author.session_id = request.session_id;
        }

        let data = request.data.unwrap_or(Value::Null);
        let mut event = SyncEvent::new(table, operation, record_id, data).with_actor(&author);
        event.previous_data = request.previous_data;
        event.version = request.version;

        if self.invalidate_on_broadcast {
            self.executor.cache().invalidate_group(table.as_ref());
        }
        debug!(
            table = %table,
            operation = %operation,
            record_id = %event.record_id,
            "broadcast ingress"
        );
        Ok(self.hub.publish(event))
    }

    fn publish_write(
        &self,
        op: &CrudOperation,
        result: &OperationResult,
        actor: &Actor,
        base_version: Option<u64>,
    ) -> Option<PublishOutcome> {
        let change = op.operation().as_change()?;
        if !result.ok {
            return None;
        }

        let Some(record_id) = op
            .id()
            .map(str::to_owned)
            .or_else(|| result.data.as_ref().and_then(record_id_of))
        else {
            warn!(
                table = %op.table(),
                operation = %op.operation(),
                "write succeeded but the record id is unknown, not publishing"
            );
            return None;
        };

        let data = match change {
            // The stored record, when the store echoes it back.
            ChangeKind::Create => result
                .data
                .clone()
                .filter(Value::is_object)
                .or_else(|| op.data().map(RecordData::to_value))
                .unwrap_or(Value::Null),
            // Only the fields this write set, for field-level conflicts.
            ChangeKind::Update => op.data().map_or(Value::Null, RecordData::to_value),
            ChangeKind::Delete => json!({ "id": record_id }),
        };

        let mut event = SyncEvent::new(op.table(), change, record_id, data).with_actor(actor);
        if op.operation() != OperationKind::Create {
            event.previous_data = self
                .hub
                .last_event(op.table(), &event.record_id)
                .map(|prior| prior.data);
        }
        event.version = base_version.map(|v| v.saturating_add(1));

        Some(self.hub.publish(event))
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, CoreError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CoreError::validation(field, "is required"))
}

fn record_id_of(data: &Value) -> Option<String> {
    match data.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;
    use syncdesk_api::{Error as ApiError, RemoteResponse};

    use super::*;
    use crate::cache::{CacheKey, CacheStore};
    use crate::config::{ExecutorConfig, HubConfig};
    use crate::model::ConflictType;
    use crate::sync::{FrameKind, SubscriptionFilter};

    /// Echoes writes back with an id, lists whatever was created.
    #[derive(Default)]
    struct EchoStore {
        created: Mutex<Vec<Value>>,
    }

    impl RecordStore for EchoStore {
        async fn call(&self, op: &CrudOperation) -> Result<RemoteResponse, ApiError> {
            let mut created = self.created.lock().expect("lock");
            let (status, data) = match op.operation() {
                OperationKind::Create => {
                    let mut record = op.data().map_or(Value::Null, RecordData::to_value);
                    record["id"] = json!(format!("m{}", created.len() + 1));
                    created.push(record.clone());
                    (201, record)
                }
                OperationKind::List => (200, Value::Array(created.clone())),
                _ => (200, json!({ "id": op.id() })),
            };
            Ok(RemoteResponse { status, data })
        }
    }

    fn service() -> RecordService<EchoStore> {
        let executor = OperationExecutor::new(
            EchoStore::default(),
            Arc::new(CacheStore::new()),
            ExecutorConfig::default(),
        );
        RecordService::new(executor, Arc::new(SyncHub::new(HubConfig::default())))
    }

    fn actor(session: &str) -> Actor {
        Actor::new("u1", "Ana").with_session(session)
    }

    fn material(value: Value) -> RecordData {
        RecordData::parse(Table::Materiales, value).expect("valid")
    }

    #[tokio::test]
    async fn create_publishes_with_store_assigned_id() {
        let svc = service();
        let mut conn = svc
            .hub()
            .connect(&Actor::default(), vec![SubscriptionFilter::for_tables([Table::Materiales])]);
        conn.try_recv().expect("connected");

        let op = CrudOperation::create(material(json!({ "sku": "M-1" })));
        let result = svc.execute(&op, ExecuteOptions::default(), &actor("s1"), None).await;

        assert!(result.ok);
        assert_eq!(result.status, 201);
        let frame = conn.try_recv().expect("sync event");
        assert_eq!(frame.event, FrameKind::SyncEvent);
        assert_eq!(frame.data["recordId"], "m1");
        assert_eq!(frame.data["userId"], "u1");
    }

    #[tokio::test]
    async fn reads_publish_nothing() {
        let svc = service();
        svc.execute(
            &CrudOperation::list(Table::Materiales),
            ExecuteOptions::default(),
            &actor("s1"),
            None,
        )
        .await;
        assert_eq!(svc.hub().stats().events_published, 0);
    }

    #[tokio::test]
    async fn stale_base_version_is_reported() {
        let svc = service();
        let edit = CrudOperation::update("m1", material(json!({ "stock": 3 })));

        svc.execute(&edit, ExecuteOptions::default(), &actor("s1"), Some(2)).await;
        let second = CrudOperation::update("m1", material(json!({ "stock": 5 })));
        svc.execute(&second, ExecuteOptions::default(), &actor("s2"), Some(2)).await;

        assert_eq!(svc.hub().stats().conflicts_detected, 1);
        let last = svc.hub().last_event(Table::Materiales, "m1").expect("tracked");
        assert_eq!(last.version, Some(3));
        assert_eq!(last.previous_data, Some(json!({ "stock": 3.0 })));
    }

    #[tokio::test]
    async fn broadcast_requires_identity() {
        let svc = service();
        let err = svc
            .broadcast(BroadcastRequest::default(), &Actor::default())
            .expect_err("anonymous");
        assert!(matches!(err, CoreError::Authentication { .. }));
    }

    #[tokio::test]
    async fn broadcast_validates_fields() {
        let svc = service();
        let missing_id = BroadcastRequest {
            table: Some("Proyectos".into()),
            operation: Some("update".into()),
            ..BroadcastRequest::default()
        };
        let err = svc.broadcast(missing_id, &actor("x")).expect_err("no record id");
        assert!(matches!(err, CoreError::Validation { ref field, .. } if field == "recordId"));

        let read_op = BroadcastRequest {
            table: Some("Proyectos".into()),
            operation: Some("list".into()),
            record_id: Some("p1".into()),
            ..BroadcastRequest::default()
        };
        let err = svc.broadcast(read_op, &actor("x")).expect_err("not a change");
        assert!(matches!(err, CoreError::Validation { ref field, .. } if field == "operation"));
    }

    #[tokio::test]
    async fn broadcast_invalidates_table_cache_and_detects_races() {
        let svc = service();
        let key = CacheKey::new("Proyectos", "Proyectos:list");
        svc.executor()
            .cache()
            .set(&key, json!([]), std::time::Duration::from_secs(60));

        let delete = BroadcastRequest {
            table: Some("Proyectos".into()),
            operation: Some("delete".into()),
            record_id: Some("p1".into()),
            session_id: Some("external".into()),
            ..BroadcastRequest::default()
        };
        svc.broadcast(delete, &actor("x")).expect("published");
        assert!(svc.executor().cache().get(&key).is_none());

        let late_update = BroadcastRequest {
            table: Some("Proyectos".into()),
            operation: Some("update".into()),
            record_id: Some("p1".into()),
            data: Some(json!({ "name": "Torre" })),
            ..BroadcastRequest::default()
        };
        let outcome = svc.broadcast(late_update, &actor("y")).expect("published");
        assert_eq!(
            outcome.conflict.map(|c| c.conflict_type),
            Some(ConflictType::DeleteUpdateRace)
        );
    }
}
