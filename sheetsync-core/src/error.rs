//! Error kinds raised by the synchronization and notification workflows

use thiserror::Error;

/// Why a composite key was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("agency id is blank")]
    MissingAgencyId,
    #[error("store id is blank")]
    MissingStoreId,
    #[error("agency id is a broken reference")]
    BrokenAgencyId,
    #[error("store id is a broken reference")]
    BrokenStoreId,
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// A required column is absent from a header row; aborts that table only
    #[error("table '{table}' is missing required column(s): {}", .columns.join(", "))]
    MissingRequiredHeader { table: String, columns: Vec<String> },

    /// Row skipped, processing continues
    #[error("row {row} has an invalid composite key: {reason}")]
    InvalidCompositeKey { row: u32, reason: KeyError },

    /// Aborts the whole run
    #[error("missing required configuration value '{0}'")]
    MissingConfiguration(&'static str),

    /// Aborts the whole run
    #[error("sheet '{0}' not found in master workbook")]
    MissingDestinationSheet(String),

    /// Webhook rejected the request or could not be reached
    #[error("webhook call failed: {0}")]
    ExternalCallFailure(String),

    #[error("failed to read '{name}': {source:#}")]
    Read {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
