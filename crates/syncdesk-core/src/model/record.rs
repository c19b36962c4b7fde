// ── Typed record payloads ──
//
// Write payloads are a union keyed by table. Each variant has a concrete
// schema with every field optional, so the same type serves full creates
// and partial updates; `validate_for_create` enforces required fields.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::table::Table;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Planning,
    Active,
    Paused,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Draft,
    Requested,
    Approved,
    Delivered,
    Cancelled,
}

/// `Materiales` record fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MaterialFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<String>,
}

/// `Proyectos` record fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProjectFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

/// `Proveedores` record fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SupplierFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
}

/// `Pedidos` record fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OrderFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A write payload, keyed by the table it targets.
///
/// Serializes to the bare field object (no tag); the table travels
/// alongside in the owning operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecordData {
    Material(MaterialFields),
    Project(ProjectFields),
    Supplier(SupplierFields),
    Order(OrderFields),
}

impl RecordData {
    /// Parse and schema-check a JSON payload for `table`.
    pub fn parse(table: Table, value: Value) -> Result<Self, CoreError> {
        if !value.is_object() {
            return Err(CoreError::validation("data", "payload must be a JSON object"));
        }
        let parsed = match table {
            Table::Materiales => serde_json::from_value(value).map(Self::Material),
            Table::Proyectos => serde_json::from_value(value).map(Self::Project),
            Table::Proveedores => serde_json::from_value(value).map(Self::Supplier),
            Table::Pedidos => serde_json::from_value(value).map(Self::Order),
        };
        parsed.map_err(|e| CoreError::validation("data", format!("{table}: {e}")))
    }

    pub fn table(&self) -> Table {
        match self {
            Self::Material(_) => Table::Materiales,
            Self::Project(_) => Table::Proyectos,
            Self::Supplier(_) => Table::Proveedores,
            Self::Order(_) => Table::Pedidos,
        }
    }

    /// The payload as sent to the remote store.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Names of the fields this payload sets.
    pub fn changed_fields(&self) -> BTreeSet<String> {
        match self.to_value() {
            Value::Object(map) => map.into_iter().map(|(k, _)| k).collect(),
            _ => BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    /// Required-field check applied to `create` payloads.
    pub fn validate_for_create(&self) -> Result<(), CoreError> {
        let missing = match self {
            Self::Material(m) => required(&[("sku", m.sku.as_deref())]),
            Self::Project(p) => required(&[("name", p.name.as_deref())]),
            Self::Supplier(s) => required(&[("name", s.name.as_deref())]),
            Self::Order(o) => required(&[
                ("projectId", o.project_id.as_deref()),
                ("materialId", o.material_id.as_deref()),
            ]),
        };
        match missing {
            Some(field) => Err(CoreError::validation(
                format!("data.{field}"),
                format!("required when creating {}", self.table()),
            )),
            None => self.validate_ranges(),
        }
    }

    /// Numeric sanity checks shared by create and update.
    pub fn validate_ranges(&self) -> Result<(), CoreError> {
        let negative = match self {
            Self::Material(m) => first_negative(&[("unitPrice", m.unit_price), ("stock", m.stock)]),
            Self::Project(p) => first_negative(&[("budget", p.budget)]),
            Self::Order(o) => first_negative(&[("quantity", o.quantity)]),
            Self::Supplier(_) => None,
        };
        match negative {
            Some(field) => Err(CoreError::validation(
                format!("data.{field}"),
                "must not be negative",
            )),
            None => Ok(()),
        }
    }
}

fn required<'a>(fields: &[(&'a str, Option<&str>)]) -> Option<&'a str> {
    fields
        .iter()
        .find(|(_, v)| v.is_none_or(|s| s.trim().is_empty()))
        .map(|(name, _)| *name)
}

fn first_negative<'a>(fields: &[(&'a str, Option<f64>)]) -> Option<&'a str> {
    fields
        .iter()
        .find(|(_, v)| v.is_some_and(|n| n < 0.0))
        .map(|(name, _)| *name)
}
