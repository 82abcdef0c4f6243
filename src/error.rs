//! Error types shared across the crate.
//!
//! Every fallible operation returns [`Result`]. Data problems keep enough
//! context (the offending path or label) to be reported to a user verbatim.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A project or training configuration is structurally invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An image sample could not be opened or decoded.
    #[error("cannot decode image '{path}': {reason}")]
    UnreadableImage { path: PathBuf, reason: String },

    /// A raw-array sample is not a well-formed numeric array.
    #[error("sample '{reference}' is not a numeric array: {reason}")]
    MalformedArray { reference: String, reason: String },

    /// A label was requested that the label index does not contain.
    #[error("label '{0}' is not present in the label index")]
    UnknownLabel(String),

    /// A declared layer cannot be connected to the shape flowing into it.
    #[error("incompatible layer: {0}")]
    IncompatibleLayerSpec(String),

    /// Training started but could not run to completion.
    #[error("training failed: {0}")]
    FitFailure(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
