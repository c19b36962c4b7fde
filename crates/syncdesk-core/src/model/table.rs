// ── Collection and operation identifiers ──
//
// The closed set of logical record collections and the CRUD verbs that
// act on them. Both parse from and render to the exact wire strings.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// A logical record collection in the remote store.
///
/// Names match the remote store's collection names verbatim.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
pub enum Table {
    /// Construction materials catalog.
    Materiales,
    /// Projects (job sites).
    Proyectos,
    /// Suppliers.
    Proveedores,
    /// Purchase orders linking projects to materials.
    Pedidos,
}

/// A CRUD verb.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OperationKind {
    List,
    Get,
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn is_read(self) -> bool {
        matches!(self, Self::List | Self::Get)
    }

    pub fn is_write(self) -> bool {
        !self.is_read()
    }

    /// The write subset, or `None` for reads.
    pub fn as_change(self) -> Option<ChangeKind> {
        match self {
            Self::Create => Some(ChangeKind::Create),
            Self::Update => Some(ChangeKind::Update),
            Self::Delete => Some(ChangeKind::Delete),
            Self::List | Self::Get => None,
        }
    }
}

/// The mutating subset of [`OperationKind`], carried by sync events and
/// matched by subscription filters.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl From<ChangeKind> for OperationKind {
    fn from(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Create => Self::Create,
            ChangeKind::Update => Self::Update,
            ChangeKind::Delete => Self::Delete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn table_round_trips_through_its_name() {
        assert_eq!(Table::from_str("Materiales").ok(), Some(Table::Materiales));
        assert_eq!(Table::Proyectos.to_string(), "Proyectos");
        assert!(Table::from_str("materiales").is_err());
    }

    #[test]
    fn operation_kind_is_lowercase_on_the_wire() {
        assert_eq!(OperationKind::from_str("update").ok(), Some(OperationKind::Update));
        assert_eq!(
            serde_json::to_string(&OperationKind::Delete).ok().as_deref(),
            Some("\"delete\"")
        );
    }

    #[test]
    fn reads_have_no_change_kind() {
        assert_eq!(OperationKind::List.as_change(), None);
        assert_eq!(OperationKind::Get.as_change(), None);
        assert_eq!(OperationKind::Create.as_change(), Some(ChangeKind::Create));
        assert!(OperationKind::Delete.is_write());
    }

    #[test]
    fn change_kind_rejects_reads() {
        assert!(ChangeKind::from_str("list").is_err());
        assert_eq!(ChangeKind::from_str("create").ok(), Some(ChangeKind::Create));
    }
}
