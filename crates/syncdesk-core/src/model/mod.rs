// ── Domain model ──
//
// Typed operation, payload, and sync types shared by the executor,
// the hub, and the HTTP surface.

mod operation;
mod record;
mod sync;
mod table;

pub use operation::{
    CrudOperation, ExecuteOptions, MAX_PAGE_LIMIT, OperationRequest, OperationResult, Pagination,
    RESULT_FORMAT_VERSION, ResultMetadata,
};
pub use record::{
    MaterialFields, OrderFields, OrderStatus, ProjectFields, ProjectStatus, RecordData,
    SupplierFields,
};
pub use sync::{Actor, Conflict, ConflictType, Notification, NotificationLevel, SyncEvent};
pub use table::{ChangeKind, OperationKind, Table};
