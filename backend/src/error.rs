//! Error types for the Campusload import/export pipeline.
//!
//! One enum per layer, converted upward with `#[from]` so that `?` works
//! across the layer boundaries:
//!
//! - [`CodecError`] - spreadsheet decoding/encoding
//! - [`MappingError`] - header recognition
//! - [`StoreError`] - relational store failures
//! - [`ImportError`] - top-level import orchestration
//! - [`ExportError`] - top-level export orchestration
//! - [`ConfigError`] - environment configuration
//!
//! Row-level business failures (blank required cell, unknown parent) are not
//! errors at this level: they are recorded in the import summary.

use thiserror::Error;

// =============================================================================
// Codec Errors
// =============================================================================

/// Errors while turning bytes into a grid or a grid into bytes.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The bytes are not a well-formed spreadsheet container.
    #[error("Invalid spreadsheet file: {0}")]
    Format(String),

    /// The workbook has no first sheet.
    #[error("No worksheet found in the spreadsheet")]
    EmptySheet,

    /// Text could not be decoded.
    #[error("Failed to decode text: {0}")]
    Encoding(String),

    /// Delimited text reader/writer failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Workbook writer failure.
    #[error("Failed to write spreadsheet: {0}")]
    Encode(String),

    /// IO error while flushing an in-memory writer.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rust_xlsxwriter::XlsxError> for CodecError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        CodecError::Encode(err.to_string())
    }
}

// =============================================================================
// Header Mapping Errors
// =============================================================================

/// Errors while recognizing the header row.
#[derive(Debug, Error)]
pub enum MappingError {
    /// A required semantic column is absent.
    #[error("Missing required column \"{column}\"")]
    MissingColumn { column: String },
}

// =============================================================================
// Store Errors
// =============================================================================

/// Relational store failures. Always fatal for the call in flight.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Driver or connection error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema could not be applied.
    #[error("Schema error: {0}")]
    Schema(String),
}

// =============================================================================
// Import Errors (top-level)
// =============================================================================

/// Errors that stop an import call as a whole.
///
/// Everything except [`ImportError::Store`] is a structural problem with the
/// uploaded file and maps to a client error.
#[derive(Debug, Error)]
pub enum ImportError {
    /// No file part in the request.
    #[error("No file provided")]
    NoFile,

    /// File is neither a workbook nor delimited text.
    #[error("Unsupported file type: {0}. Use an Excel (.xlsx) or CSV (.csv) file")]
    UnsupportedFileType(String),

    /// Spreadsheet decoding error.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Header recognition error.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Header row present but no data rows.
    #[error("The file contains no data rows")]
    NoRows,

    /// At least one row failed validation under a fail-closed policy.
    #[error("{} row(s) failed validation", errors.len())]
    RowValidation { errors: Vec<String> },

    /// Infrastructure failure; the transaction was rolled back.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ImportError {
    /// Whether the failure is the caller's (bad file) rather than the server's.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ImportError::Store(_))
    }
}

// =============================================================================
// Export Errors (top-level)
// =============================================================================

/// Errors that stop an export call.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The request named no fields at all.
    #[error("No field specified for export")]
    NoFields,

    /// Every requested field was outside the allow-list.
    #[error("No valid field specified for export")]
    NoValidFields,

    /// Unknown output format.
    #[error("Unsupported export format: {0}")]
    UnknownFormat(String),

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Encoder failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// JSON rendering failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExportError {
    /// Whether the failure is the caller's rather than the server's.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ExportError::NoFields | ExportError::NoValidFields | ExportError::UnknownFormat(_)
        )
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while reading settings from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;
