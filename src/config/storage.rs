//! Storage pragmas applied when the database is opened.

use crate::Error;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default wait before giving up on a locked database.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// `SQLite` journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JournalMode {
    /// Write-ahead log: concurrent readers with a single writer.
    #[default]
    Wal,
    /// Rollback journal deleted after each transaction.
    Delete,
    /// Rollback journal truncated after each transaction.
    Truncate,
    /// Rollback journal kept with its header zeroed.
    Persist,
}

impl JournalMode {
    /// Returns the pragma value, lowercase as `SQLite` reports it back.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
            Self::Truncate => "truncate",
            Self::Persist => "persist",
        }
    }
}

impl FromStr for JournalMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wal" => Ok(Self::Wal),
            "delete" => Ok(Self::Delete),
            "truncate" => Ok(Self::Truncate),
            "persist" => Ok(Self::Persist),
            other => Err(Error::InvalidInput(format!("unknown journal mode '{other}'"))),
        }
    }
}

impl fmt::Display for JournalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `SQLite` synchronous level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SynchronousMode {
    /// No syncs; fast and unsafe on power loss.
    Off,
    /// Sync at WAL checkpoints. Safe from corruption in WAL mode.
    #[default]
    Normal,
    /// Sync on every commit.
    Full,
    /// Like `Full`, also syncing the directory.
    Extra,
}

impl SynchronousMode {
    /// Returns the pragma value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
            Self::Extra => "EXTRA",
        }
    }

    /// Returns the integer `PRAGMA synchronous` reports for this level.
    #[must_use]
    pub const fn level(self) -> i64 {
        match self {
            Self::Off => 0,
            Self::Normal => 1,
            Self::Full => 2,
            Self::Extra => 3,
        }
    }
}

impl FromStr for SynchronousMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" | "0" => Ok(Self::Off),
            "normal" | "1" => Ok(Self::Normal),
            "full" | "2" => Ok(Self::Full),
            "extra" | "3" => Ok(Self::Extra),
            other => Err(Error::InvalidInput(format!(
                "unknown synchronous level '{other}'"
            ))),
        }
    }
}

impl fmt::Display for SynchronousMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pragmas applied to every connection at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageConfig {
    /// How long a writer waits for a lock held by another connection.
    pub busy_timeout: Duration,
    /// Journal mode.
    pub journal_mode: JournalMode,
    /// Synchronous level.
    pub synchronous: SynchronousMode,
    /// Whether foreign key constraints are enforced.
    pub foreign_keys: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            journal_mode: JournalMode::Wal,
            synchronous: SynchronousMode::Normal,
            foreign_keys: true,
        }
    }
}

impl StorageConfig {
    /// Sets the busy timeout.
    #[must_use]
    pub const fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets the journal mode.
    #[must_use]
    pub const fn with_journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }

    /// Sets the synchronous level.
    #[must_use]
    pub const fn with_synchronous(mut self, level: SynchronousMode) -> Self {
        self.synchronous = level;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_mode_parse() {
        assert_eq!("WAL".parse::<JournalMode>().unwrap(), JournalMode::Wal);
        assert_eq!(" delete ".parse::<JournalMode>().unwrap(), JournalMode::Delete);
        assert!("memory".parse::<JournalMode>().is_err());
    }

    #[test]
    fn test_synchronous_parse() {
        assert_eq!(
            "normal".parse::<SynchronousMode>().unwrap(),
            SynchronousMode::Normal
        );
        assert_eq!("2".parse::<SynchronousMode>().unwrap(), SynchronousMode::Full);
        assert_eq!(SynchronousMode::Extra.level(), 3);
    }
}
