//! Connection locking and pragma configuration.

use crate::config::StorageConfig;
use crate::{Error, Result};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

/// Acquires a mutex lock, recovering from poison.
///
/// A panic inside a unit of work leaves the mutex poisoned, but the
/// transaction has already been rolled back by its drop, so the connection
/// is still usable.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Applies the configured pragmas to a freshly opened connection.
///
/// # Configuration Applied
///
/// - **`busy_timeout`**: how long to wait on a lock held by another
///   connection or process before failing with `SQLITE_BUSY`. Set first so
///   the journal mode switch below can wait too.
/// - **`journal_mode`**: WAL by default, allowing concurrent readers with a
///   single writer. The mode `SQLite` reports back must match.
/// - **`synchronous`**: NORMAL by default.
/// - **`foreign_keys`**: off in `SQLite` unless enabled per connection.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if a pragma fails or does not take
/// effect.
pub fn configure_connection(conn: &Connection, config: &StorageConfig) -> Result<()> {
    conn.busy_timeout(config.busy_timeout)
        .map_err(|e| Error::operation("set_busy_timeout", e))?;

    let requested = config.journal_mode.as_str();
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", requested, |row| row.get(0))
        .map_err(|e| Error::operation("set_journal_mode", e))?;
    if !mode.eq_ignore_ascii_case(requested) {
        return Err(Error::OperationFailed {
            operation: "set_journal_mode".to_string(),
            cause: format!("requested journal mode '{requested}' but got '{mode}'"),
        });
    }

    conn.pragma_update(None, "synchronous", config.synchronous.as_str())
        .map_err(|e| Error::operation("set_synchronous", e))?;

    conn.pragma_update(None, "foreign_keys", config.foreign_keys)
        .map_err(|e| Error::operation("set_foreign_keys", e))?;
    let foreign_keys: bool = conn
        .pragma_query_value(None, "foreign_keys", |row| row.get(0))
        .map_err(|e| Error::operation("read_foreign_keys", e))?;
    if foreign_keys != config.foreign_keys {
        return Err(Error::OperationFailed {
            operation: "set_foreign_keys".to_string(),
            cause: format!("foreign_keys is {foreign_keys}, expected {}", config.foreign_keys),
        });
    }

    Ok(())
}
