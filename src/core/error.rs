use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::core::store::StoreError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{target} not ready after {attempts} attempt(s) in {elapsed:?}")]
    Timeout {
        target: String,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("row count of `{table}` could not be determined: {source}")]
    ProbeFailed {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    ExternalCommand(#[from] StoreError),

    #[error("no backup available in {}", .dir.display())]
    NoBackupAvailable { dir: PathBuf },

    #[error("backup artifact already exists: {}", .path.display())]
    ArtifactExists { path: PathBuf },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OrchestratorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = OrchestratorError> = std::result::Result<T, E>;
