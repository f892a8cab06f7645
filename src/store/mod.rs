//! Persistence layer — libSQL-backed storage for poll records.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::VoteStore;
