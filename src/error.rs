use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Why a store failed to open. The initializer retries transient causes and
/// treats schema problems as terminal.
#[derive(Debug, Error)]
pub enum StoreOpenError {
    #[error("failed to prepare store directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to open store: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store schema version {found} is newer than supported version {supported}")]
    SchemaNewer { found: i32, supported: i32 },
    #[error("migration to schema version {version} failed: {message}")]
    MigrationFailed { version: i32, message: String },
    #[error("store open timed out after {0:?}")]
    Timeout(Duration),
    #[error("store open worker failed: {0}")]
    Worker(String),
}

impl StoreOpenError {
    /// Retrying cannot fix a schema mismatch; everything else may clear up.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            StoreOpenError::SchemaNewer { .. } | StoreOpenError::MigrationFailed { .. }
        )
    }
}

/// Terminal initialization failure: the retry budget is spent (or a fatal
/// open error was hit) and the gate will fail fast until reinitialized.
#[derive(Debug, Error)]
#[error("store initialization failed after {attempts} attempt(s): {last_error}")]
pub struct StoreInitError {
    pub attempts: u32,
    #[source]
    pub last_error: StoreOpenError,
}

#[derive(Debug, Error)]
pub enum Error {
    /// The gate is in the failed state; the original cause rides along so
    /// every caller sees why without triggering new open attempts.
    #[error("stores unavailable: {cause}")]
    StoreUnavailable { cause: Arc<StoreInitError> },
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
