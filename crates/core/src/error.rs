//! Tagged error kinds for the retrieval core.
//!
//! Nothing here ever crosses the MCP boundary as a panic or an exception-shaped value: every
//! public operation returns `Result<T, QaError>`, and the server's dispatch layer is the only
//! place that flattens a `QaError` into a JSON `error` string plus machine-readable `error_kind`.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum QaError {
    PathMissing(PathBuf),
    NotADirectory(PathBuf),
    IndexAbsent { identifier: String },
    SchemaMismatch { found: i64, expected: i64 },
    StoreCorrupt { reason: String },
    BinaryFile(PathBuf),
    PermissionDenied(PathBuf),
    ReadError { path: PathBuf, message: String },
    ParseFailure { path: PathBuf, message: String },
    EmbeddingUnavailable(String),
    InvalidUrl(String),
    WatchFailure(String),
}

impl QaError {
    /// PascalCase tag matching the kinds enumerated in the error handling design.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            QaError::PathMissing(_) => "PathMissing",
            QaError::NotADirectory(_) => "NotADirectory",
            QaError::IndexAbsent { .. } => "IndexAbsent",
            QaError::SchemaMismatch { .. } => "SchemaMismatch",
            QaError::StoreCorrupt { .. } => "StoreCorrupt",
            QaError::BinaryFile(_) => "BinaryFile",
            QaError::PermissionDenied(_) => "PermissionDenied",
            QaError::ReadError { .. } => "ReadError",
            QaError::ParseFailure { .. } => "ParseFailure",
            QaError::EmbeddingUnavailable(_) => "EmbeddingUnavailable",
            QaError::InvalidUrl(_) => "InvalidUrl",
            QaError::WatchFailure(_) => "WatchFailure",
        }
    }
}

impl fmt::Display for QaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QaError::PathMissing(p) => write!(f, "path does not exist: {}", p.display()),
            QaError::NotADirectory(p) => write!(f, "not a directory: {}", p.display()),
            QaError::IndexAbsent { identifier } if identifier.is_empty() => {
                write!(f, "no index found. Please run index_project first.")
            }
            QaError::IndexAbsent { identifier } => {
                write!(f, "no index found for '{identifier}'. Please run index_project first.")
            }
            QaError::SchemaMismatch { found, expected } => {
                write!(f, "schema version mismatch (found {found}, expected {expected})")
            }
            QaError::StoreCorrupt { reason } => write!(f, "index store is corrupted: {reason}"),
            QaError::BinaryFile(p) => write!(f, "binary file skipped: {}", p.display()),
            QaError::PermissionDenied(p) => write!(f, "permission denied: {}", p.display()),
            QaError::ReadError { path, message } => {
                write!(f, "failed to read {}: {message}", path.display())
            }
            QaError::ParseFailure { path, message } => {
                write!(f, "failed to parse {}: {message}", path.display())
            }
            QaError::EmbeddingUnavailable(reason) => write!(f, "embeddings unavailable: {reason}"),
            QaError::InvalidUrl(raw) => write!(f, "invalid GitHub URL: {raw}"),
            QaError::WatchFailure(reason) => write!(f, "file watcher error: {reason}"),
        }
    }
}

impl std::error::Error for QaError {}

impl From<QaError> for serde_json::Value {
    fn from(err: QaError) -> Self {
        serde_json::json!({
            "error": err.to_string(),
            "error_kind": err.kind_tag(),
        })
    }
}

pub type Result<T> = std::result::Result<T, QaError>;
