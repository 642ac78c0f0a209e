//! The storage handle: the only way to obtain a migrated connection.

use super::connection::{acquire_lock, configure_connection};
use super::metrics::record_operation_metrics;
use crate::config::StorageConfig;
use crate::migration::{MigrationRegistry, MigrationReport, Migrator, SchemaState, read_version};
use crate::{Error, Result};
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

/// An open, fully migrated `SQLite` database.
///
/// The connection sits behind a mutex, so SQL work is serialized within the
/// process; WAL mode still lets other processes read concurrently. Share it
/// across tasks with `Arc<Database>`.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Option<Connection>>,
    path: PathBuf,
    config: StorageConfig,
}

/// Result of a read-only schema probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaStatus {
    /// Probed database path.
    pub path: PathBuf,
    /// Whether the file exists.
    pub exists: bool,
    /// State relative to the registry; a missing file counts as version 0.
    pub state: SchemaState,
}

impl Database {
    /// Opens the database at `path`, configures it and applies pending
    /// migrations from `registry`.
    ///
    /// The handle is only returned once the schema matches the registry. If
    /// migration fails the connection is closed again.
    ///
    /// # Errors
    ///
    /// - [`Error::Open`] if the file cannot be opened or configured.
    /// - [`Error::VersionSkew`] if the database is newer than `registry`.
    /// - [`Error::MigrationStep`] if a step fails.
    pub fn open(
        path: impl AsRef<Path>,
        config: &StorageConfig,
        registry: &MigrationRegistry,
    ) -> Result<Self> {
        Self::open_with_report(path, config, registry).map(|(db, _)| db)
    }

    /// Like [`Database::open`], also returning what the migration pass did.
    ///
    /// # Errors
    ///
    /// Same as [`Database::open`].
    #[instrument(skip(path, config, registry), fields(path = %path.as_ref().display()))]
    pub fn open_with_report(
        path: impl AsRef<Path>,
        config: &StorageConfig,
        registry: &MigrationRegistry,
    ) -> Result<(Self, MigrationReport)> {
        let start = Instant::now();
        let result = Self::open_inner(path.as_ref(), config, registry);
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("open", start, status);
        result
    }

    fn open_inner(
        path: &Path,
        config: &StorageConfig,
        registry: &MigrationRegistry,
    ) -> Result<(Self, MigrationReport)> {
        tracing::debug!(
            file = %path.display(),
            journal_mode = %config.journal_mode,
            synchronous = %config.synchronous,
            busy_timeout_ms = u64::try_from(config.busy_timeout.as_millis()).unwrap_or(u64::MAX),
            "opening db"
        );

        let open_error = |cause: String| Error::Open {
            path: path.display().to_string(),
            cause,
        };

        let mut conn = Connection::open(path).map_err(|e| open_error(e.to_string()))?;
        configure_connection(&conn, config).map_err(|e| open_error(e.to_string()))?;

        let report = match Migrator::new(registry).run(&mut conn) {
            Ok(report) => report,
            Err(e) => {
                if let Err((_, close_err)) = conn.close() {
                    tracing::warn!(error = %close_err, "closing db after failed migration");
                }
                return Err(e);
            },
        };

        tracing::info!(
            file = %path.display(),
            version = report.to,
            applied = report.applied.len(),
            "db ready"
        );

        Ok((
            Self {
                conn: Mutex::new(Some(conn)),
                path: path.to_path_buf(),
                config: *config,
            },
            report,
        ))
    }

    /// Returns the database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the pragmas the database was opened with.
    #[must_use]
    pub const fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Returns the persisted schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is closed or the version cannot be
    /// read.
    pub fn schema_version(&self) -> Result<u32> {
        self.with_connection(read_version)
    }

    /// Runs `f` with the connection.
    ///
    /// # Errors
    ///
    /// Returns `f`'s error, or [`Error::OperationFailed`] if the database is
    /// closed.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = acquire_lock(&self.conn);
        let conn = guard.as_ref().ok_or_else(closed_error)?;
        f(conn)
    }

    /// Runs `f` as one unit of work.
    ///
    /// The transaction is `IMMEDIATE`, so the write lock is taken up front
    /// and contention is resolved by the busy timeout. It commits only when
    /// `f` returns `Ok`; errors and panics roll it back.
    ///
    /// # Errors
    ///
    /// Returns `f`'s error, or [`Error::OperationFailed`] if the database is
    /// closed or the transaction cannot begin or commit.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut guard = acquire_lock(&self.conn);
        let conn = guard.as_mut().ok_or_else(closed_error)?;

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::operation("begin_transaction", e))?;
        let value = f(&tx)?;
        tx.commit()
            .map_err(|e| Error::operation("commit_transaction", e))?;
        Ok(value)
    }

    /// Returns true once [`Database::close`] has succeeded.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        acquire_lock(&self.conn).is_none()
    }

    /// Closes the connection.
    ///
    /// Closing an already closed database is a no-op. If `SQLite` refuses
    /// to close, the connection is kept so the call can be retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Close`] if `SQLite` fails to release the connection.
    pub fn close(&self) -> Result<()> {
        let mut guard = acquire_lock(&self.conn);
        let Some(conn) = guard.take() else {
            return Ok(());
        };

        let start = Instant::now();
        let result = match conn.close() {
            Ok(()) => {
                tracing::info!(file = %self.path.display(), "db closed");
                Ok(())
            },
            Err((conn, e)) => {
                *guard = Some(conn);
                Err(Error::Close {
                    cause: e.to_string(),
                })
            },
        };
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("close", start, status);
        result
    }
}

fn closed_error() -> Error {
    Error::OperationFailed {
        operation: "acquire_connection".to_string(),
        cause: "database is closed".to_string(),
    }
}

/// Reports the schema state of the database at `path` without migrating.
///
/// The file is opened read-only and no connection escapes this function, so
/// it cannot be used to bypass the migration gate.
///
/// # Errors
///
/// Returns [`Error::Open`] if an existing file cannot be opened, or
/// [`Error::OperationFailed`] if the version cannot be read.
pub fn inspect(
    path: impl AsRef<Path>,
    config: &StorageConfig,
    registry: &MigrationRegistry,
) -> Result<SchemaStatus> {
    let path = path.as_ref();
    let target = registry.target_version();

    if !path.exists() {
        return Ok(SchemaStatus {
            path: path.to_path_buf(),
            exists: false,
            state: SchemaState::classify(0, target),
        });
    }

    let open_error = |cause: String| Error::Open {
        path: path.display().to_string(),
        cause,
    };
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| open_error(e.to_string()))?;
    conn.busy_timeout(config.busy_timeout)
        .map_err(|e| open_error(e.to_string()))?;

    let current = read_version(&conn)?;
    Ok(SchemaStatus {
        path: path.to_path_buf(),
        exists: true,
        state: SchemaState::classify(current, target),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry() -> MigrationRegistry {
        MigrationRegistry::builder()
            .sql(
                "create feed",
                "CREATE TABLE IF NOT EXISTS feed (id INTEGER PRIMARY KEY, title TEXT NOT NULL);",
            )
            .sql(
                "create feed_item",
                "CREATE TABLE IF NOT EXISTS feed_item (
                    id INTEGER PRIMARY KEY,
                    feed_id INTEGER NOT NULL REFERENCES feed (id) ON DELETE CASCADE
                );",
            )
            .build()
    }

    fn open(dir: &TempDir) -> Database {
        Database::open(
            dir.path().join("rss.sqlite3"),
            &StorageConfig::default(),
            &registry(),
        )
        .unwrap()
    }

    #[test]
    fn test_open_migrates() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir);
        assert_eq!(db.schema_version().unwrap(), 2);
        assert_eq!(db.path(), dir.path().join("rss.sqlite3"));
    }

    #[test]
    fn test_open_with_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rss.sqlite3");
        let (db, report) =
            Database::open_with_report(&path, &StorageConfig::default(), &registry()).unwrap();
        assert_eq!((report.from, report.to, report.applied.len()), (0, 2, 2));
        db.close().unwrap();

        let (_db, report) =
            Database::open_with_report(&path, &StorageConfig::default(), &registry()).unwrap();
        assert!(report.is_noop());
    }

    #[test]
    fn test_open_missing_directory_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Database::open(
            dir.path().join("missing").join("rss.sqlite3"),
            &StorageConfig::default(),
            &registry(),
        );
        assert!(matches!(result, Err(Error::Open { .. })));
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir);
        let result = db.transaction(|tx| {
            tx.execute("INSERT INTO feed_item (feed_id) VALUES (42)", [])
                .map_err(|e| Error::operation("insert_feed_item", e))
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir);
        db.transaction(|tx| {
            tx.execute("INSERT INTO feed (title) VALUES ('Go blog')", [])
                .map_err(|e| Error::operation("insert_feed", e))
        })
        .unwrap();

        let count: i64 = db
            .with_connection(|conn| {
                conn.query_row("SELECT COUNT(*) FROM feed", [], |row| row.get(0))
                    .map_err(|e| Error::operation("count_feeds", e))
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir);
        let result: Result<()> = db.transaction(|tx| {
            tx.execute("INSERT INTO feed (title) VALUES ('Go blog')", [])
                .map_err(|e| Error::operation("insert_feed", e))?;
            Err(Error::InvalidInput("abort".to_string()))
        });
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        let count: i64 = db
            .with_connection(|conn| {
                conn.query_row("SELECT COUNT(*) FROM feed", [], |row| row.get(0))
                    .map_err(|e| Error::operation("count_feeds", e))
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir);
        assert!(!db.is_closed());
        db.close().unwrap();
        assert!(db.is_closed());
        db.close().unwrap();

        assert!(matches!(
            db.schema_version(),
            Err(Error::OperationFailed { ref cause, .. }) if cause == "database is closed"
        ));
    }

    #[test]
    fn test_inspect_does_not_migrate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rss.sqlite3");

        let status = inspect(&path, &StorageConfig::default(), &registry()).unwrap();
        assert!(!status.exists);
        assert_eq!(
            status.state,
            SchemaState::Behind {
                current: 0,
                target: 2
            }
        );
        assert!(!path.exists());

        open(&dir).close().unwrap();
        let status = inspect(&path, &StorageConfig::default(), &registry()).unwrap();
        assert!(status.exists);
        assert_eq!(status.state, SchemaState::UpToDate(2));
    }
}
