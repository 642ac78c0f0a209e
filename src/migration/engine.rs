//! Migration engine: brings a database up to the registry's target version.

use super::registry::MigrationRegistry;
use super::step::MigrationStep;
use crate::storage::metrics::record_migration_step;
use crate::{Error, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Where a database stands relative to a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    /// Every step has been applied.
    UpToDate(u32),
    /// Steps `current..target` are pending.
    Behind {
        /// Persisted version.
        current: u32,
        /// Registry length.
        target: u32,
    },
    /// The database has history this binary does not know about.
    Ahead {
        /// Persisted version.
        current: u32,
        /// Registry length.
        target: u32,
    },
}

impl SchemaState {
    /// Classifies a persisted version against a target.
    #[must_use]
    pub const fn classify(current: u32, target: u32) -> Self {
        if current == target {
            Self::UpToDate(current)
        } else if current < target {
            Self::Behind { current, target }
        } else {
            Self::Ahead { current, target }
        }
    }

    /// Returns the persisted version.
    #[must_use]
    pub const fn current(self) -> u32 {
        match self {
            Self::UpToDate(current) | Self::Behind { current, .. } | Self::Ahead { current, .. } => {
                current
            },
        }
    }

    /// Returns the number of steps still to apply.
    #[must_use]
    pub const fn pending(self) -> u32 {
        match self {
            Self::Behind { current, target } => target.saturating_sub(current),
            Self::UpToDate(_) | Self::Ahead { .. } => 0,
        }
    }
}

impl fmt::Display for SchemaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpToDate(v) => write!(f, "up to date at version {v}"),
            Self::Behind { current, target } => {
                write!(f, "behind: version {current} of {target}")
            },
            Self::Ahead { current, target } => {
                write!(f, "ahead: version {current}, binary supports {target}")
            },
        }
    }
}

/// A step applied during a migration pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedStep {
    /// Version the step produced.
    pub version: u32,
    /// Step description.
    pub description: String,
    /// Wall-clock time spent in the step, including commit.
    pub duration: Duration,
}

/// Outcome of a successful migration pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Version before the pass.
    pub from: u32,
    /// Version after the pass.
    pub to: u32,
    /// Steps applied, in order.
    pub applied: Vec<AppliedStep>,
}

impl MigrationReport {
    /// Returns true if nothing was applied.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Applies a registry to a connection.
#[derive(Debug, Clone, Copy)]
pub struct Migrator<'a> {
    registry: &'a MigrationRegistry,
}

impl<'a> Migrator<'a> {
    /// Creates a migrator for `registry`.
    #[must_use]
    pub const fn new(registry: &'a MigrationRegistry) -> Self {
        Self { registry }
    }

    /// Reports where `conn` stands without changing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the version cannot be read.
    pub fn state(&self, conn: &Connection) -> Result<SchemaState> {
        let current = read_version(conn)?;
        Ok(SchemaState::classify(current, self.registry.target_version()))
    }

    /// Applies all pending steps in order.
    ///
    /// Each step runs in its own `IMMEDIATE` transaction together with the
    /// version bump, so a step either lands with its version or not at all.
    /// On failure, steps before the failing one stay committed. Steps that a
    /// concurrent pass applied first are skipped.
    ///
    /// # Errors
    ///
    /// - [`Error::VersionSkew`] if the database is ahead of the registry.
    /// - [`Error::MigrationStep`] if a step (or its transaction) fails.
    /// - [`Error::OperationFailed`] if the version cannot be read.
    #[instrument(skip_all, fields(target = self.registry.target_version()))]
    pub fn run(&self, conn: &mut Connection) -> Result<MigrationReport> {
        let target = self.registry.target_version();
        let current = match self.state(conn)? {
            SchemaState::UpToDate(v) => {
                return Ok(MigrationReport {
                    from: v,
                    to: v,
                    applied: Vec::new(),
                });
            },
            SchemaState::Ahead { current, target } => {
                return Err(Error::VersionSkew {
                    current,
                    supported: target,
                });
            },
            SchemaState::Behind { current, .. } => current,
        };

        tracing::debug!(current, target, "start db migration step");

        let mut applied = Vec::new();
        let mut version = current + 1;
        while version <= target {
            let Some(step) = self.registry.step_for_version(version) else {
                break;
            };

            let start = Instant::now();
            let result = apply_step(conn, version, target, step);
            let status = match &result {
                Ok(StepOutcome::Applied) => "success",
                Ok(StepOutcome::AlreadyAt(_)) => "skipped",
                Err(_) => "error",
            };
            record_migration_step(start, status);

            match result? {
                StepOutcome::Applied => {
                    let duration = start.elapsed();
                    tracing::debug!(
                        version,
                        target,
                        description = step.description(),
                        duration_ms = duration.as_secs_f64() * 1000.0,
                        "db migration step complete"
                    );
                    applied.push(AppliedStep {
                        version,
                        description: step.description().to_string(),
                        duration,
                    });
                    version += 1;
                },
                StepOutcome::AlreadyAt(persisted) => {
                    tracing::debug!(
                        version,
                        persisted,
                        "db migration step applied by another connection"
                    );
                    version = persisted + 1;
                },
            }
        }

        Ok(MigrationReport {
            from: current,
            to: target,
            applied,
        })
    }
}

/// Reads the persisted schema version.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the pragma cannot be read or holds a
/// negative value.
pub fn read_version(conn: &Connection) -> Result<u32> {
    let raw: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| Error::operation("read_user_version", e))?;

    u32::try_from(raw).map_err(|_| Error::OperationFailed {
        operation: "read_user_version".to_string(),
        cause: format!("invalid schema version {raw}"),
    })
}

/// What happened to one step.
enum StepOutcome {
    /// The step ran and the version was bumped.
    Applied,
    /// The version had already reached this value when the lock was taken.
    AlreadyAt(u32),
}

/// Runs one step and its version bump in a single transaction.
///
/// The version is re-read once the write lock is held. Another connection
/// may have migrated while this one waited on the busy timeout, in which
/// case the step is skipped, or the pass fails with
/// [`Error::VersionSkew`] if the database moved past `target`.
fn apply_step(
    conn: &mut Connection,
    version: u32,
    target: u32,
    step: &MigrationStep,
) -> Result<StepOutcome> {
    let step_error = |cause: String| Error::MigrationStep {
        version,
        description: step.description().to_string(),
        cause,
    };

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| step_error(e.to_string()))?;

    let persisted = read_version(&tx)?;
    if persisted > target {
        return Err(Error::VersionSkew {
            current: persisted,
            supported: target,
        });
    }
    if persisted >= version {
        return Ok(StepOutcome::AlreadyAt(persisted));
    }
    if persisted != version - 1 {
        return Err(step_error(format!(
            "schema version moved back to {persisted} during migration"
        )));
    }

    if let Err(e) = step.apply(&tx) {
        if let Err(rollback) = tx.rollback() {
            tracing::warn!(version, error = %rollback, "rollback after failed step failed");
        }
        return Err(step_error(e.to_string()));
    }

    write_version(&tx, version).map_err(|e| step_error(e.to_string()))?;
    tx.commit().map_err(|e| step_error(e.to_string()))?;
    Ok(StepOutcome::Applied)
}

/// Writes `PRAGMA user_version`.
///
/// PRAGMA statements do not accept bound parameters, so the value is
/// formatted into the statement. `version` always comes from the engine's
/// own step counter and never from outside input; do not reuse this for
/// anything else.
fn write_version(tx: &Transaction<'_>, version: u32) -> rusqlite::Result<()> {
    tx.execute_batch(&format!("PRAGMA user_version = {version}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(n: usize) -> MigrationRegistry {
        (0..n)
            .map(|i| {
                MigrationStep::sql(
                    format!("create t{i}"),
                    format!("CREATE TABLE IF NOT EXISTS t{i} (id INTEGER PRIMARY KEY);"),
                )
            })
            .collect()
    }

    #[test]
    fn test_classify() {
        assert_eq!(SchemaState::classify(2, 2), SchemaState::UpToDate(2));
        assert_eq!(
            SchemaState::classify(0, 3),
            SchemaState::Behind {
                current: 0,
                target: 3
            }
        );
        assert_eq!(
            SchemaState::classify(4, 3),
            SchemaState::Ahead {
                current: 4,
                target: 3
            }
        );
        assert_eq!(SchemaState::classify(1, 3).pending(), 2);
        assert_eq!(SchemaState::classify(4, 3).pending(), 0);
        assert_eq!(SchemaState::classify(4, 3).current(), 4);
        assert_eq!(
            SchemaState::Behind {
                current: 5,
                target: 3
            }
            .pending(),
            0
        );
    }

    #[test]
    fn test_run_fresh_in_memory() {
        let mut conn = Connection::open_in_memory().unwrap();
        let registry = registry(3);

        let report = Migrator::new(&registry).run(&mut conn).unwrap();
        assert_eq!(report.from, 0);
        assert_eq!(report.to, 3);
        let versions: Vec<_> = report.applied.iter().map(|s| s.version).collect();
        assert_eq!(versions, [1, 2, 3]);
        assert_eq!(read_version(&conn).unwrap(), 3);
    }

    #[test]
    fn test_run_up_to_date_is_noop() {
        let mut conn = Connection::open_in_memory().unwrap();
        let registry = registry(2);
        Migrator::new(&registry).run(&mut conn).unwrap();

        let report = Migrator::new(&registry).run(&mut conn).unwrap();
        assert!(report.is_noop());
        assert_eq!((report.from, report.to), (2, 2));
    }

    #[test]
    fn test_empty_registry_on_fresh_db() {
        let mut conn = Connection::open_in_memory().unwrap();
        let registry = registry(0);
        let report = Migrator::new(&registry).run(&mut conn).unwrap();
        assert!(report.is_noop());
        assert_eq!(read_version(&conn).unwrap(), 0);
    }

    #[test]
    fn test_ahead_is_version_skew() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA user_version = 5").unwrap();

        let result = Migrator::new(&registry(2)).run(&mut conn);
        assert!(matches!(
            result,
            Err(Error::VersionSkew {
                current: 5,
                supported: 2
            })
        ));
        assert_eq!(read_version(&conn).unwrap(), 5);
    }

    #[test]
    fn test_negative_version_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA user_version = -1").unwrap();
        assert!(matches!(
            read_version(&conn),
            Err(Error::OperationFailed { ref cause, .. }) if cause.contains("-1")
        ));
    }

    #[test]
    fn test_failed_step_rolls_back_its_own_work() {
        let mut conn = Connection::open_in_memory().unwrap();
        let registry = MigrationRegistry::builder()
            .sql("ok", "CREATE TABLE a (id INTEGER PRIMARY KEY);")
            .sql(
                "half done",
                "CREATE TABLE b (id INTEGER PRIMARY KEY); INSERT INTO missing VALUES (1);",
            )
            .build();

        let result = Migrator::new(&registry).run(&mut conn);
        assert!(matches!(
            result,
            Err(Error::MigrationStep { version: 2, ref description, .. }) if description == "half done"
        ));
        assert_eq!(read_version(&conn).unwrap(), 1);

        let b_exists: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'b'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(b_exists, 0);
    }

    #[test]
    fn test_apply_step_rechecks_version_under_lock() {
        let mut conn = Connection::open_in_memory().unwrap();
        let step = MigrationStep::sql("create x", "CREATE TABLE x (id INTEGER PRIMARY KEY);");

        conn.execute_batch("PRAGMA user_version = 2").unwrap();
        let outcome = apply_step(&mut conn, 1, 3, &step).unwrap();
        assert!(matches!(outcome, StepOutcome::AlreadyAt(2)));
        assert_eq!(read_version(&conn).unwrap(), 2);

        conn.execute_batch("PRAGMA user_version = 4").unwrap();
        assert!(matches!(
            apply_step(&mut conn, 1, 3, &step),
            Err(Error::VersionSkew {
                current: 4,
                supported: 3
            })
        ));
        assert_eq!(read_version(&conn).unwrap(), 4);

        conn.execute_batch("PRAGMA user_version = 0").unwrap();
        assert!(matches!(
            apply_step(&mut conn, 3, 3, &step),
            Err(Error::MigrationStep { version: 3, .. })
        ));

        let created: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'x'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(created, 0);
        assert_eq!(read_version(&conn).unwrap(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            SchemaState::classify(1, 3).to_string(),
            "behind: version 1 of 3"
        );
    }
}
