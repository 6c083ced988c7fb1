pub mod audit;
pub mod sqlite;
pub mod store;

pub use audit::JsonlAuditLog;
pub use sqlite::SqliteStore;
pub use store::{AuditLog, Datastore, DatastoreHandle, EventQuery};
