// ── Operation request / response types ──
//
// `CrudOperation` is the validated, immutable unit the executor runs.
// `OperationRequest` is its wire form; conversion performs all boundary
// checks so nothing malformed reaches the remote store.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::record::RecordData;
use super::table::{OperationKind, Table};
use crate::error::{CoreError, ErrorKind};

/// Response format version reported in every result's metadata.
pub const RESULT_FORMAT_VERSION: &str = "1";

/// Upper bound on `pagination.limit`.
pub const MAX_PAGE_LIMIT: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

/// A single CRUD operation against one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrudOperation {
    table: Table,
    operation: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<RecordData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    filters: BTreeMap<String, String>,
}

impl CrudOperation {
    fn new(table: Table, operation: OperationKind) -> Self {
        Self {
            table,
            operation,
            id: None,
            data: None,
            pagination: None,
            filters: BTreeMap::new(),
        }
    }

    pub fn list(table: Table) -> Self {
        Self::new(table, OperationKind::List)
    }

    pub fn get(table: Table, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(table, OperationKind::Get)
        }
    }

    /// Create a record; the table is implied by the payload variant.
    pub fn create(data: RecordData) -> Self {
        Self {
            data: Some(data.clone()),
            ..Self::new(data.table(), OperationKind::Create)
        }
    }

    pub fn update(id: impl Into<String>, data: RecordData) -> Self {
        Self {
            id: Some(id.into()),
            data: Some(data.clone()),
            ..Self::new(data.table(), OperationKind::Update)
        }
    }

    pub fn delete(table: Table, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(table, OperationKind::Delete)
        }
    }

    pub fn with_pagination(mut self, page: u32, limit: u32) -> Self {
        self.pagination = Some(Pagination { page, limit });
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn data(&self) -> Option<&RecordData> {
        self.data.as_ref()
    }

    pub fn pagination(&self) -> Option<Pagination> {
        self.pagination
    }

    pub fn filters(&self) -> &BTreeMap<String, String> {
        &self.filters
    }

    // ── Validation ───────────────────────────────────────────────────

    /// Check the shape invariants for this operation kind.
    pub fn validate(&self) -> Result<(), CoreError> {
        let needs_id = matches!(
            self.operation,
            OperationKind::Get | OperationKind::Update | OperationKind::Delete
        );
        if needs_id && self.id.as_deref().is_none_or(|id| id.trim().is_empty()) {
            return Err(CoreError::validation(
                "id",
                format!("required for {}", self.operation),
            ));
        }

        match (self.operation, &self.data) {
            (OperationKind::Create | OperationKind::Update, None) => {
                return Err(CoreError::validation(
                    "data",
                    format!("required for {}", self.operation),
                ));
            }
            (OperationKind::Create, Some(data)) => data.validate_for_create()?,
            (OperationKind::Update, Some(data)) => {
                if data.is_empty() {
                    return Err(CoreError::validation("data", "update sets no fields"));
                }
                data.validate_ranges()?;
            }
            _ => {}
        }

        if let Some(data) = &self.data {
            if data.table() != self.table {
                return Err(CoreError::validation(
                    "data",
                    format!("payload is for {} but operation targets {}", data.table(), self.table),
                ));
            }
        }

        if let Some(p) = self.pagination {
            if p.page == 0 {
                return Err(CoreError::validation("pagination.page", "must be >= 1"));
            }
            if p.limit == 0 || p.limit > MAX_PAGE_LIMIT {
                return Err(CoreError::validation(
                    "pagination.limit",
                    format!("must be between 1 and {MAX_PAGE_LIMIT}"),
                ));
            }
        }

        Ok(())
    }
}

// ── Wire form ───────────────────────────────────────────────────────

/// Operation request as received from UI / API-route callers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    pub table: String,
    pub operation: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub filters: Option<Map<String, Value>>,
}

impl TryFrom<OperationRequest> for CrudOperation {
    type Error = CoreError;

    fn try_from(req: OperationRequest) -> Result<Self, Self::Error> {
        let table = Table::from_str(&req.table)
            .map_err(|_| CoreError::validation("table", format!("unknown table '{}'", req.table)))?;
        let operation = OperationKind::from_str(&req.operation).map_err(|_| {
            CoreError::validation("operation", format!("unknown operation '{}'", req.operation))
        })?;

        let data = req
            .data
            .map(|value| RecordData::parse(table, value))
            .transpose()?;

        let mut filters = BTreeMap::new();
        for (key, value) in req.filters.unwrap_or_default() {
            let rendered = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => continue,
                Value::Array(_) | Value::Object(_) => {
                    return Err(CoreError::validation(
                        format!("filters.{key}"),
                        "must be a scalar value",
                    ));
                }
            };
            filters.insert(key, rendered);
        }

        let op = Self {
            table,
            operation,
            id: req.id,
            data,
            pagination: req.pagination,
            filters,
        };
        op.validate()?;
        Ok(op)
    }
}

/// Per-call overrides for
/// [`OperationExecutor::execute`](crate::executor::OperationExecutor::execute).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteOptions {
    /// Deadline for each remote attempt. Wire form is milliseconds.
    #[serde(default, rename = "timeoutMs", with = "opt_millis")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub skip_cache: bool,
    #[serde(default)]
    pub retry_attempts: Option<u32>,
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D>(d: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

// ── Result envelope ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    /// Wall-clock duration of the whole call including retries, in ms.
    pub execution_time: u64,
    pub cache_hit: bool,
    pub version: String,
}

/// Uniform response for every executed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    pub metadata: ResultMetadata,
}

impl OperationResult {
    pub fn success(status: u16, data: Value, elapsed: Duration, cache_hit: bool) -> Self {
        Self {
            ok: true,
            data: Some(data),
            status,
            message: None,
            error: None,
            metadata: metadata(elapsed, cache_hit),
        }
    }

    pub fn failure(
        kind: ErrorKind,
        status: u16,
        message: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            ok: false,
            data: None,
            status,
            message: Some(message.into()),
            error: Some(kind),
            metadata: metadata(elapsed, false),
        }
    }

    /// Failure for an error detected before any remote call.
    pub fn rejected(err: &CoreError, elapsed: Duration) -> Self {
        let kind = err.kind();
        Self::failure(kind, kind.default_status(), err.to_string(), elapsed)
    }
}

fn metadata(elapsed: Duration, cache_hit: bool) -> ResultMetadata {
    ResultMetadata {
        execution_time: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        cache_hit,
        version: RESULT_FORMAT_VERSION.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: Value) -> Result<CrudOperation, CoreError> {
        let req: OperationRequest = serde_json::from_value(value).expect("wire shape");
        CrudOperation::try_from(req)
    }

    #[test]
    fn parses_create_request() {
        let op = request(json!({
            "table": "Materiales",
            "operation": "create",
            "data": { "sku": "M-1" }
        }))
        .expect("valid");
        assert_eq!(op.table(), Table::Materiales);
        assert_eq!(op.operation(), OperationKind::Create);
        assert!(op.data().is_some());
    }

    #[test]
    fn unknown_table_is_rejected() {
        let err =
            request(json!({ "table": "Usuarios", "operation": "list" })).expect_err("unknown");
        assert!(matches!(err, CoreError::Validation { ref field, .. } if field == "table"));
    }

    #[test]
    fn get_without_id_is_rejected() {
        let err = request(json!({ "table": "Proyectos", "operation": "get" })).expect_err("no id");
        assert!(matches!(err, CoreError::Validation { ref field, .. } if field == "id"));
    }

    #[test]
    fn update_without_data_is_rejected() {
        let err = request(json!({ "table": "Proyectos", "operation": "update", "id": "p1" }))
            .expect_err("no data");
        assert!(matches!(err, CoreError::Validation { ref field, .. } if field == "data"));
    }

    #[test]
    fn scalar_filters_are_stringified() {
        let op = request(json!({
            "table": "Pedidos",
            "operation": "list",
            "filters": { "quantity": 5, "urgent": true, "status": "approved", "skip": null }
        }))
        .expect("valid");
        assert_eq!(op.filters().get("quantity").map(String::as_str), Some("5"));
        assert_eq!(op.filters().get("urgent").map(String::as_str), Some("true"));
        assert!(!op.filters().contains_key("skip"));
    }

    #[test]
    fn nested_filters_are_rejected() {
        assert!(request(json!({
            "table": "Pedidos",
            "operation": "list",
            "filters": { "status": ["a", "b"] }
        }))
        .is_err());
    }

    #[test]
    fn pagination_bounds() {
        assert!(CrudOperation::list(Table::Materiales).with_pagination(0, 10).validate().is_err());
        assert!(CrudOperation::list(Table::Materiales).with_pagination(1, 0).validate().is_err());
        assert!(
            CrudOperation::list(Table::Materiales)
                .with_pagination(1, MAX_PAGE_LIMIT + 1)
                .validate()
                .is_err()
        );
        assert!(CrudOperation::list(Table::Materiales).with_pagination(3, 25).validate().is_ok());
    }

    #[test]
    fn execute_options_read_millis() {
        let opts: ExecuteOptions =
            serde_json::from_value(json!({ "timeoutMs": 1500, "skipCache": true })).expect("valid");
        assert_eq!(opts.timeout, Some(Duration::from_millis(1500)));
        assert!(opts.skip_cache);
        assert_eq!(opts.retry_attempts, None);
    }

    #[test]
    fn result_serializes_in_camel_case() {
        let result = OperationResult::success(200, json!([]), Duration::from_millis(12), true);
        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(value["metadata"]["executionTime"], 12);
        assert_eq!(value["metadata"]["cacheHit"], true);
        assert_eq!(value["metadata"]["version"], RESULT_FORMAT_VERSION);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn failure_carries_kind() {
        let result = OperationResult::failure(
            ErrorKind::RateLimit,
            429,
            "slow down",
            Duration::from_millis(5),
        );
        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"], "RATE_LIMIT");
        assert_eq!(value["status"], 429);
    }
}
