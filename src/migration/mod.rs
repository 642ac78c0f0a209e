//! Forward-only schema migrations tracked by `PRAGMA user_version`.
//!
//! A [`MigrationRegistry`] is an ordered list of [`MigrationStep`]s. The
//! [`Migrator`] compares the persisted version with the registry length and
//! applies whatever is missing, one transaction per step.

mod engine;
mod registry;
mod step;

pub use engine::{AppliedStep, MigrationReport, Migrator, SchemaState, read_version};
pub use registry::{MigrationRegistry, MigrationRegistryBuilder};
pub use step::{MigrationStep, Procedure};
