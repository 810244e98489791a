//! Persistence layer: libSQL-backed storage for workflows, tasks, and results.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
