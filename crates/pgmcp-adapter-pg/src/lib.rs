//! # pgmcp-adapter-pg
//!
//! PostgreSQL side of pgmcp: the process-wide [`PgConnectionManager`] that
//! session actors release on eviction, and the [`DatabaseTools`] collection
//! registered on every session.

pub mod connection;
pub mod error;
pub mod introspect;
pub mod sql;
pub mod tools;

pub use connection::PgConnectionManager;
pub use error::DbError;
pub use tools::{DatabaseTools, EXECUTE_DATABASE, LIST_TABLES, QUERY_DATABASE};
