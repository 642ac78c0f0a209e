//! A single forward-only migration step.

use crate::{Error, Result};
use rusqlite::Transaction;
use std::borrow::Cow;
use std::fmt;

/// Procedure run by a [`MigrationStep::Procedure`].
pub type Procedure = Box<dyn Fn(&Transaction<'_>) -> Result<()> + Send + Sync>;

/// One element of a [`MigrationRegistry`](super::MigrationRegistry).
///
/// A step only ever sees the transaction it is handed. It must be safe to run
/// again against a database that already reflects its effects, so DDL should
/// use `IF NOT EXISTS` guards and data steps should tolerate rows they already
/// wrote.
pub enum MigrationStep {
    /// A literal statement batch, executed verbatim.
    Sql {
        /// Human-readable description.
        description: Cow<'static, str>,
        /// One or more `;`-separated statements.
        sql: Cow<'static, str>,
    },
    /// Arbitrary code that may inspect or rewrite existing rows.
    Procedure {
        /// Human-readable description.
        description: Cow<'static, str>,
        /// The procedure.
        apply: Procedure,
    },
}

impl MigrationStep {
    /// Creates a literal SQL step.
    pub fn sql(
        description: impl Into<Cow<'static, str>>,
        sql: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::Sql {
            description: description.into(),
            sql: sql.into(),
        }
    }

    /// Creates a procedural step.
    pub fn procedure<F>(description: impl Into<Cow<'static, str>>, apply: F) -> Self
    where
        F: Fn(&Transaction<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self::Procedure {
            description: description.into(),
            apply: Box::new(apply),
        }
    }

    /// Returns the step description.
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::Sql { description, .. } | Self::Procedure { description, .. } => description,
        }
    }

    /// Applies the step inside `tx`. Committing is the caller's job.
    ///
    /// # Errors
    ///
    /// Returns the step's own error, or [`Error::OperationFailed`] if a SQL
    /// batch fails.
    pub fn apply(&self, tx: &Transaction<'_>) -> Result<()> {
        match self {
            Self::Sql { sql, .. } => tx
                .execute_batch(sql)
                .map_err(|e| Error::operation("execute_batch", e)),
            Self::Procedure { apply, .. } => apply(tx),
        }
    }
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql { description, sql } => f
                .debug_struct("Sql")
                .field("description", description)
                .field("sql", sql)
                .finish(),
            Self::Procedure { description, .. } => f
                .debug_struct("Procedure")
                .field("description", description)
                .finish_non_exhaustive(),
        }
    }
}
