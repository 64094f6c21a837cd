//! Error types for catalog loading, submission preparation, and transport.

use std::path::PathBuf;
use thiserror::Error;

/// Errors while loading or registering operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("catalog does not match the catalog schema ({} issue(s))", issues.len())]
    Invalid { issues: Vec<CatalogIssue> },

    // Registration errors (exit code 2)
    #[error("invalid field at {path}: {message}")]
    InvalidField { path: String, message: String },

    #[error("unknown method \"{value}\": expected GET, POST, PUT, DELETE, or PATCH")]
    UnknownMethod { value: String },

    #[error("operation \"{operation}\": fields must be an object")]
    RootNotNode { operation: String },

    #[error("duplicate operation name \"{name}\"")]
    DuplicateOperation { name: String },

    #[error("operation \"{operation}\": placeholder :{placeholder} has no top-level text field")]
    UnboundPlaceholder {
        operation: String,
        placeholder: String,
    },

    #[error("operation \"{operation}\": file field {field} would be sent as \"{name}\", which another field already uses")]
    BinaryTargetCollision {
        operation: String,
        field: String,
        name: String,
    },

    #[error("no operation matches \"{query}\"")]
    UnknownOperation { query: String },
}

impl CatalogError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            CatalogError::FileNotFound { .. } | CatalogError::ReadError { .. } => 3,
            _ => 2,
        }
    }
}

/// Single catalog schema violation with path context.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CatalogIssue {
    /// JSON Pointer (RFC 6901) to the offending value.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for CatalogIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Errors that abort a submission before anything is dispatched.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("field {path} is not valid JSON: {source}")]
    InvalidStructuredText {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("fields {parent} and {child} are both filled in; fill in one or the other")]
    PathConflict { parent: String, child: String },

    #[error("cannot read file for field {path}: {source}")]
    BinaryRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("more than one file targets payload key \"{name}\"")]
    DuplicateBinaryTarget { name: String },

    #[error("file for field {path} would replace the value already at payload key \"{name}\"")]
    BinaryTargetTaken { path: String, name: String },

    #[error("form is missing reserved key {key}")]
    MissingRoute { key: &'static str },

    #[error("no operation is registered for {method} {endpoint}")]
    UnknownRoute { method: String, endpoint: String },
}

impl SubmitError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            SubmitError::BinaryRead { .. } => 3,
            _ => 2,
        }
    }
}

/// Failures between handing a request to the transport and decoding its reply.
#[derive(Debug, Error)]
pub enum TransportError {
    #[cfg(feature = "remote")]
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("response body is not JSON: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
    },

    #[error("{message}")]
    Unreachable { message: String },
}

impl TransportError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        3
    }
}
