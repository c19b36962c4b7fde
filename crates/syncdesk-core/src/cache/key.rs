// ── Deterministic cache keys ──

use std::fmt;

use crate::model::CrudOperation;

/// A cache key plus the invalidation group its entry belongs to.
///
/// Rendering is deterministic: filters are kept in key order and
/// encoded as JSON, so equal operations always map to the same key and
/// no filter value can collide with the separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    group: String,
    key: String,
}

impl CacheKey {
    pub fn new(group: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            key: key.into(),
        }
    }

    /// Key for a read operation, grouped under its table.
    pub fn for_operation(op: &CrudOperation) -> Self {
        let table = op.table().to_string();
        let page = op
            .pagination()
            .map_or_else(|| "-".to_owned(), |p| format!("{}x{}", p.page, p.limit));
        let filters = serde_json::to_string(op.filters()).unwrap_or_default();
        let key = format!(
            "{table}:{}:id={}:page={page}:filters={filters}",
            op.operation(),
            op.id().unwrap_or("-"),
        );
        Self { group: table, key }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
