use thiserror::Error;

/// Convenience result type for container, intuition and load operations.
pub type RowpackResult<T> = Result<T, RowpackError>;

/// Error type returned across the crate.
///
/// Structural failures (absent location, exclusivity violation, corrupt header) are surfaced to
/// the caller and never retried. Row-level oddities are absorbed by the intuiters and statistics
/// and do not show up here.
#[derive(Debug, Error)]
pub enum RowpackError {
    /// Underlying I/O error (permission denied, disk full, ...).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited-text source error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration (JSON) error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "excel")]
    /// Spreadsheet source error (feature-gated behind `excel`).
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// The container location does not exist.
    #[error("container not found: {location}")]
    NotFound { location: String },

    /// Another handle currently holds the location in a conflicting mode.
    #[error("container '{location}' is already open ({mode})")]
    AlreadyOpen { location: String, mode: &'static str },

    /// The location exists but its header segment was never written.
    #[error("container '{location}' was never finalized")]
    NotFinalized { location: String },

    /// Header or metadata failed magic/version/checksum validation, or a record is malformed.
    #[error("corrupt container: {message}")]
    Corrupt { message: String },

    /// A row's width disagrees with the recorded column count.
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// A value has no representable scalar kind.
    #[error("encoding error: {message}")]
    Encoding { message: String },

    /// Row numbers must be strictly increasing within a container.
    #[error("row {row_number} appended after row {previous}")]
    OutOfOrder { row_number: u64, previous: u64 },

    /// A column lookup by position or name failed.
    #[error("no column {key}")]
    ColumnNotFound { key: String },

    /// An optional capability (e.g. a source format) is not compiled in.
    #[error("{capability} is not available: {reason}")]
    CapabilityDisabled { capability: String, reason: String },
}

impl RowpackError {
    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }

    pub(crate) fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }
}
