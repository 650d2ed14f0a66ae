//! Error types for document review operations.

use thiserror::Error;

/// Error types that can occur while extracting, rendering, or annotating a
/// document.
///
/// Failures local to one content unit or one issue are absorbed where they
/// occur; these variants represent resource-level failures that make the
/// whole operation impossible (missing file, unparseable package, broken
/// XML).
#[derive(Error, Debug)]
pub enum AuditError {
    /// File I/O error (file not found, permission denied, disk full).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The compound-document package is missing or structurally unreadable
    /// (not a ZIP, missing `word/document.xml`, bad part encoding).
    #[error("Package error: {0}")]
    Package(String),

    /// XML parsing or rewriting failed at the document level.
    #[error("XML error: {0}")]
    Xml(String),

    /// HTML rendering or anchor resolution failed at the document level.
    #[error("Render error: {0}")]
    Render(String),

    /// Comment insertion failed at the package level (per-issue failures are
    /// skipped, not raised).
    #[error("Comment error: {0}")]
    Comment(String),

    /// JSON serialization/deserialization error (analysis cache).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Type alias for [`Result<T, AuditError>`].
pub type Result<T> = std::result::Result<T, AuditError>;
