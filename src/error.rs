//! # Centralized Error Handling
//!
//! Unified error types for the entire crate using `thiserror`.
//!
//! Every variant aborts the operation in progress. Nothing here is retried:
//! a package that fails validation or consolidation has to be fixed on disk.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for presamples operations
#[derive(Error, Debug)]
pub enum PresamplesError {
    /// I/O errors (permission denied, read/write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed manifest or side-file JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Package directory has no `datapackage.json`
    #[error("Missing manifest: {path}")]
    ManifestMissing { path: PathBuf },

    /// A file referenced by the manifest does not exist
    #[error("Resource file missing: {path}")]
    ResourceFileMissing { path: PathBuf },

    /// A resource file's content hash differs from the manifest
    #[error("Hash mismatch for {path}: expected {expected}, found {actual}")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Resources grouped for consolidation disagree on matrix or label metadata
    #[error("Conflicting labels in '{kind}' resources: {message}")]
    ConflictingLabels { kind: String, message: String },

    /// Resources grouped for consolidation have different index field layouts
    #[error("Incompatible indices in '{kind}' resources: {message}")]
    IncompatibleIndices { kind: String, message: String },

    /// Sample arrays disagree on the number of Monte-Carlo columns
    #[error("Inconsistent number of samples: expected {expected}, found {found}")]
    InconsistentSampleCount { expected: usize, found: usize },

    /// Sample rows disagree with the number of index records or names
    #[error("Shape mismatch: {message}")]
    ShapeMismatch { message: String },

    /// Duplicate parameter names within a package, or against an existing package
    #[error("Parameter name conflict: {names:?}")]
    NameConflict { names: Vec<String> },

    /// Strict column access outside a sample array's column range
    #[error("Column {column} out of range for {path} with {ncols} columns")]
    ColumnOutOfRange {
        column: usize,
        ncols: usize,
        path: PathBuf,
    },

    /// Duplicate cell whose exchange types cannot be aggregated
    #[error("Ambiguous aggregation for cell ({input}, {output}): types {tags:?}")]
    AmbiguousAggregation {
        input: u64,
        output: u64,
        tags: Vec<u64>,
    },

    /// `update_matrices` called with no bound or supplied matrix owner
    #[error("Must give a matrix owner on construction or in this call")]
    MissingMatrixOwner,

    /// Matrix metadata does not describe its index array
    #[error("Invalid matrix metadata: {message}")]
    InvalidMetadata { message: String },

    /// No built-in index formatter for a matrix kind
    #[error("Can't find formatter for '{kind}'")]
    UnknownFormatter { kind: String },

    /// Package directory already exists and overwrite was not requested
    #[error("Presamples directory already exists: {path}")]
    PackageExists { path: PathBuf },

    /// Package added to a campaign twice
    #[error("Package already in campaign '{campaign}': {path}")]
    DuplicatePackage { campaign: String, path: PathBuf },

    /// Package removed or replaced but not in the campaign
    #[error("Package not in campaign '{campaign}': {path}")]
    MissingPackage { campaign: String, path: PathBuf },

    /// Malformed binary sample file or index side file
    #[error("Format error in {path}: {message}")]
    Format { path: PathBuf, message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Type alias for Results using PresamplesError
pub type Result<T> = std::result::Result<T, PresamplesError>;

impl PresamplesError {
    /// Create a shape mismatch error
    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            message: message.into(),
        }
    }

    /// Create a conflicting labels error
    pub fn conflicting_labels(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConflictingLabels {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create an incompatible indices error
    pub fn incompatible_indices(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IncompatibleIndices {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create an invalid metadata error
    pub fn invalid_metadata(message: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            message: message.into(),
        }
    }

    /// Create a format error for a file
    pub fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
