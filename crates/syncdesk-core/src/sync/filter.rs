// ── Subscription filters ──

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::{ChangeKind, SyncEvent, Table};

/// Which events one subscription wants.
///
/// Every dimension is optional: an empty set or `None` matches anything.
/// Dimensions combine with AND; a connection holding several filters
/// combines them with OR.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFilter {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tables: BTreeSet<Table>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub operations: BTreeSet<ChangeKind>,
    /// Only events written by this user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Only events scoped to this project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// Raw query-string form of a subscription: comma-separated lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionParams {
    #[serde(default)]
    pub tables: Option<String>,
    #[serde(default)]
    pub operations: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl SubscriptionFilter {
    /// A filter that only constrains tables.
    pub fn for_tables(tables: impl IntoIterator<Item = Table>) -> Self {
        Self {
            tables: tables.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Parse the query-string form, rejecting unknown tables or
    /// operations.
    pub fn from_params(params: &SubscriptionParams) -> Result<Self, CoreError> {
        Ok(Self {
            tables: parse_list(params.tables.as_deref(), "tables")?,
            operations: parse_list(params.operations.as_deref(), "operations")?,
            user_id: non_blank(params.user_id.as_deref()),
            project_id: non_blank(params.project_id.as_deref()),
        })
    }

    pub fn matches_table(&self, table: Table) -> bool {
        self.tables.is_empty() || self.tables.contains(&table)
    }

    pub fn matches(&self, event: &SyncEvent) -> bool {
        self.matches_table(event.table)
            && (self.operations.is_empty() || self.operations.contains(&event.operation))
            && self
                .user_id
                .as_deref()
                .is_none_or(|user| event.user_id.as_deref() == Some(user))
            && self
                .project_id
                .as_deref()
                .is_none_or(|project| event.project_id() == Some(project))
    }
}

fn parse_list<T: FromStr + Ord>(raw: Option<&str>, field: &str) -> Result<BTreeSet<T>, CoreError> {
    let Some(raw) = raw else {
        return Ok(BTreeSet::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            T::from_str(item)
                .map_err(|_| CoreError::validation(field, format!("unknown value '{item}'")))
        })
        .collect()
}

fn non_blank(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}
