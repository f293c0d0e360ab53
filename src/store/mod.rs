//! Persistence layer: libSQL-backed storage for sessions and answer ledgers.

pub mod libsql_backend;
pub mod migrations;
pub mod sweep;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use sweep::spawn_session_sweep;
pub use traits::Database;
