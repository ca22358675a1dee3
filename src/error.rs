//! Error types for the edgequake-md2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExportError`], **fatal**: the export cannot proceed at all (source
//!   file missing, invalid configuration) or every backend failed. Returned as
//!   `Err(ExportError)` from the `export_markdown*` helpers and from
//!   [`crate::output::ExportResult::into_result`].
//!
//! * [`BackendError`], **non-fatal**: a single backend failed (tool missing,
//!   non-zero exit, render fault, empty output). Stored inside
//!   [`crate::output::BackendAttempt`] while the cascade moves on to the
//!   next backend.
//!
//! No `BackendError` ever escapes the dispatcher on its own; callers see them
//! only as part of the attempt log or the aggregated diagnostic.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-md2pdf library.
#[derive(Debug, Error)]
pub enum ExportError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Markdown source was not found at the given path.
    #[error("Markdown file not found: '{path}'\nCheck the path exists and is readable.")]
    SourceNotFound { path: PathBuf },

    /// Process does not have read permission on the source.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The source exists but could not be read.
    #[error("Failed to read Markdown file '{path}': {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Cascade errors ────────────────────────────────────────────────────
    /// Every backend, including the plain-text fallback, failed.
    #[error("PDF export to '{output}' failed; every backend was exhausted:\n{diagnostic}")]
    AllBackendsFailed { output: PathBuf, diagnostic: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single backend attempt.
///
/// Every variant carries the backend name so an aggregated diagnostic can be
/// read without the surrounding attempt record.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendError {
    /// The runtime dependency disappeared between probe and conversion.
    #[error("{backend}: unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    /// An external tool exited unsuccessfully.
    #[error("{backend}: '{tool}' exited with {}: {stderr}", .status.map(|c| format!("status {c}")).unwrap_or_else(|| "a signal".into()))]
    ToolFailed {
        backend: String,
        tool: String,
        status: Option<i32>,
        stderr: String,
    },

    /// The attempt exceeded the configured bound and was abandoned.
    #[error("{backend}: timed out after {secs}s")]
    Timeout { backend: String, secs: u64 },

    /// The renderer raised a fault while producing pages.
    #[error("{backend}: render failed: {detail}")]
    Render { backend: String, detail: String },

    /// No usable font could be set up for the document.
    #[error("{backend}: font setup failed: {detail}")]
    Font { backend: String, detail: String },

    /// Reading inputs or writing the staging file failed.
    #[error("{backend}: I/O error: {detail}")]
    Io { backend: String, detail: String },

    /// The backend reported success but produced nothing.
    #[error("{backend}: produced an empty or missing output file")]
    EmptyOutput { backend: String },

    /// The backend produced a file that is not a PDF.
    #[error("{backend}: output is not a PDF (starts with {magic:?})")]
    InvalidOutput { backend: String, magic: String },

    /// The backend panicked; the panic was contained by the dispatcher.
    #[error("{backend}: panicked: {detail}")]
    Panicked { backend: String, detail: String },
}

impl BackendError {
    /// Name of the backend this error belongs to.
    pub fn backend(&self) -> &str {
        match self {
            BackendError::Unavailable { backend, .. }
            | BackendError::ToolFailed { backend, .. }
            | BackendError::Timeout { backend, .. }
            | BackendError::Render { backend, .. }
            | BackendError::Font { backend, .. }
            | BackendError::Io { backend, .. }
            | BackendError::EmptyOutput { backend }
            | BackendError::InvalidOutput { backend, .. }
            | BackendError::Panicked { backend, .. } => backend,
        }
    }

    pub(crate) fn io(backend: &str, err: impl std::fmt::Display) -> Self {
        BackendError::Io {
            backend: backend.to_string(),
            detail: err.to_string(),
        }
    }

    pub(crate) fn render(backend: &str, err: impl std::fmt::Display) -> Self {
        BackendError::Render {
            backend: backend.to_string(),
            detail: err.to_string(),
        }
    }
}
