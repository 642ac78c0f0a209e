//! `SQLite` storage.
//!
//! [`Database::open`] is the single entry point: it applies the configured
//! pragmas and runs the migration engine before handing out a handle.
//!
//! ## Module Structure
//!
//! - `connection`: mutex acquisition and pragma configuration
//! - `database`: the [`Database`] handle and the read-only [`inspect`] probe
//! - [`metrics`]: storage and migration metrics

mod connection;
mod database;
pub mod metrics;

pub use connection::{acquire_lock, configure_connection};
pub use database::{Database, SchemaStatus, inspect};
