/// Data store abstraction used by the backup orchestrator
///
/// The orchestrator only needs four opaque operations from the database:
/// ping, row count of a table, full logical export and full logical import.
/// Concrete stores shell out to `mysql`/`mysqldump` or to `wp db`.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("unexpected output from `{program}`: {output:?}")]
    BadOutput { program: String, output: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// The client reported that the queried table does not exist
    /// (MySQL `ER_NO_SUCH_TABLE`, 1146). A fresh database is in this state
    /// until WordPress installs its schema.
    pub fn is_missing_table(&self) -> bool {
        match self {
            StoreError::CommandFailed { stderr, .. } => {
                stderr.contains("ERROR 1146") || stderr.contains("doesn't exist")
            }
            _ => false,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Short human-readable description, used in logs
    fn describe(&self) -> String;

    /// Returns Ok(true) when the server accepts connections
    async fn ping(&self) -> Result<bool, StoreError>;

    /// Count rows in `table`
    async fn row_count(&self, table: &str) -> Result<u64, StoreError>;

    /// Write a full logical dump to `path`
    async fn export(&self, path: &Path) -> Result<(), StoreError>;

    /// Load a full logical dump from `path`
    async fn import(&self, path: &Path) -> Result<(), StoreError>;
}

/// Parse the single-number output of a `SELECT COUNT(*)` run in batch mode.
///
/// Column headers are tolerated (wp-cli prints them unless told otherwise), so
/// the last non-empty line is taken as the value.
pub fn parse_count(program: &str, output: &str) -> Result<u64, StoreError> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .and_then(|l| l.parse::<u64>().ok())
        .ok_or_else(|| StoreError::BadOutput {
            program: program.to_string(),
            output: output.trim().to_string(),
        })
}
