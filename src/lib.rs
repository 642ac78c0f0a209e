//! # rssd
//!
//! A small feed reader service backed by a single embedded `SQLite` database.
//!
//! The database schema evolves forward-only through an ordered registry of
//! migration steps. Opening the database always runs the pending steps first,
//! so nothing in the service can observe a schema older than the binary
//! expects.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rssd::config::StorageConfig;
//! use rssd::migration::MigrationRegistry;
//! use rssd::storage::Database;
//!
//! let registry = MigrationRegistry::builder()
//!     .sql("create feed table", "CREATE TABLE IF NOT EXISTS feed (id INTEGER PRIMARY KEY);")
//!     .build();
//!
//! let db = Database::open("rss.sqlite3", &StorageConfig::default(), &registry)?;
//! assert_eq!(db.schema_version()?, 1);
//! db.close()?;
//! # Ok::<(), rssd::Error>(())
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod migration;
pub mod observability;
pub mod schema;
pub mod server;
pub mod storage;

pub use config::{JournalMode, RssdConfig, StorageConfig, SynchronousMode};
pub use migration::{MigrationRegistry, MigrationReport, MigrationStep, Migrator, SchemaState};
pub use storage::{Database, SchemaStatus};

/// Error type for rssd operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Open` | The database file cannot be opened or its pragmas cannot be applied |
/// | `VersionSkew` | The database was migrated by a newer binary |
/// | `MigrationStep` | A migration step failed and was rolled back |
/// | `Close` | Releasing the connection at shutdown failed |
/// | `InvalidInput` | Malformed configuration values or CLI arguments |
/// | `OperationFailed` | Any other I/O or `SQLite` failure |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The store could not be opened or configured.
    ///
    /// Raised when:
    /// - The file cannot be created or opened (permissions, missing directory)
    /// - A pragma fails or reports a value other than the requested one
    #[error("opening database '{path}' failed: {cause}")]
    Open {
        /// Path of the database file.
        path: String,
        /// The underlying cause.
        cause: String,
    },

    /// The persisted schema version is newer than this binary supports.
    ///
    /// The database is left untouched. Running an older binary against it is
    /// an operator error.
    #[error("db schema version is {current} but application only supports version {supported}")]
    VersionSkew {
        /// Version persisted in the database.
        current: u32,
        /// Number of migration steps known to this binary.
        supported: u32,
    },

    /// A migration step failed.
    ///
    /// Steps before `version` are committed and durable; the failed step was
    /// rolled back and will be retried on the next open.
    #[error("migrating db schema to version {version} ({description}): {cause}")]
    MigrationStep {
        /// Target version of the failed step (1-based).
        version: u32,
        /// Description of the failed step.
        description: String,
        /// The underlying cause.
        cause: String,
    },

    /// Releasing the store failed.
    #[error("closing database failed: {cause}")]
    Close {
        /// The underlying cause.
        cause: String,
    },

    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A journal or synchronous mode name is unknown
    /// - A listen address cannot be parsed
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` queries outside the migration pass fail
    /// - Configuration or log files cannot be read
    /// - The HTTP listener cannot be bound
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Builds an [`Error::OperationFailed`] from an operation name and cause.
    pub fn operation(operation: impl Into<String>, cause: impl ToString) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for rssd operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::VersionSkew {
            current: 3,
            supported: 2,
        };
        assert_eq!(
            err.to_string(),
            "db schema version is 3 but application only supports version 2"
        );

        let err = Error::MigrationStep {
            version: 4,
            description: "add tags".to_string(),
            cause: "no such table: tag".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "migrating db schema to version 4 (add tags): no such table: tag"
        );

        let err = Error::operation("bind", "address in use");
        assert_eq!(err.to_string(), "operation 'bind' failed: address in use");
    }
}
