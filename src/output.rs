//! Result types returned by the export cascade.

use crate::error::{BackendError, ExportError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of one [`crate::Exporter::export`] call.
///
/// The dispatcher never returns `Err`; a total failure is reported here with
/// `success == false` and a human-readable `diagnostic`. Use
/// [`ExportResult::into_result`] to turn it into a `Result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    pub success: bool,
    /// Name of the backend whose output was published. None on total failure.
    pub backend: Option<String>,
    /// Destination path of the PDF.
    pub output: PathBuf,
    /// Every backend considered, in the order they were considered.
    pub attempts: Vec<BackendAttempt>,
    /// Aggregated cause of every skip/failure. Set whenever any attempt did
    /// not succeed, so a successful fallback still explains what was passed
    /// over.
    pub diagnostic: Option<String>,
    pub duration_ms: u64,
}

impl ExportResult {
    /// The backend name, or `"none"` when every backend failed.
    pub fn backend_name(&self) -> &str {
        self.backend.as_deref().unwrap_or("none")
    }

    /// Attempts that ended in a failure (skips excluded).
    pub fn failures(&self) -> impl Iterator<Item = &BackendAttempt> {
        self.attempts
            .iter()
            .filter(|a| matches!(a.outcome, AttemptOutcome::Failed { .. }))
    }

    /// Convert into a `Result`, mapping total failure to
    /// [`ExportError::AllBackendsFailed`].
    pub fn into_result(self) -> Result<ExportResult, ExportError> {
        if self.success {
            Ok(self)
        } else {
            Err(ExportError::AllBackendsFailed {
                output: self.output,
                diagnostic: self.diagnostic.unwrap_or_default(),
            })
        }
    }
}

/// Record of a single backend being considered by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendAttempt {
    pub backend: String,
    pub outcome: AttemptOutcome,
    pub duration_ms: u64,
}

/// What happened to a backend during one export.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Output verified and published; `bytes` is the PDF size.
    Succeeded { bytes: u64 },
    /// The runtime dependency is missing; conversion was not invoked.
    Skipped { reason: String },
    /// Conversion was invoked and failed.
    Failed { error: BackendError },
}

impl BackendAttempt {
    /// One diagnostic line, e.g. `pandoc: skipped (pandoc not found)`.
    pub fn describe(&self) -> String {
        match &self.outcome {
            AttemptOutcome::Succeeded { bytes } => {
                format!("{}: succeeded ({} bytes)", self.backend, bytes)
            }
            AttemptOutcome::Skipped { reason } => format!("{}: skipped ({})", self.backend, reason),
            AttemptOutcome::Failed { error } => format!("{}: failed: {}", self.backend, error),
        }
    }
}

/// Build the aggregated diagnostic from every attempt that did not succeed.
///
/// Returns None when nothing was skipped or failed.
pub fn aggregate_diagnostic(attempts: &[BackendAttempt]) -> Option<String> {
    let lines: Vec<String> = attempts
        .iter()
        .filter(|a| !matches!(a.outcome, AttemptOutcome::Succeeded { .. }))
        .map(|a| format!("  - {}", a.describe()))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempts() -> Vec<BackendAttempt> {
        vec![
            BackendAttempt {
                backend: "pandoc".into(),
                outcome: AttemptOutcome::Skipped {
                    reason: "pandoc not found".into(),
                },
                duration_ms: 1,
            },
            BackendAttempt {
                backend: "pdfium".into(),
                outcome: AttemptOutcome::Failed {
                    error: BackendError::render("pdfium", "bad page"),
                },
                duration_ms: 5,
            },
            BackendAttempt {
                backend: "plain-text".into(),
                outcome: AttemptOutcome::Succeeded { bytes: 900 },
                duration_ms: 2,
            },
        ]
    }

    #[test]
    fn diagnostic_lists_each_unsuccessful_backend() {
        let diag = aggregate_diagnostic(&attempts()).unwrap();
        assert!(diag.contains("pandoc: skipped (pandoc not found)"), "{diag}");
        assert!(diag.contains("pdfium: failed: pdfium: render failed: bad page"), "{diag}");
        assert!(!diag.contains("plain-text"), "{diag}");
    }

    #[test]
    fn diagnostic_is_none_when_first_backend_succeeds() {
        let only = vec![attempts().remove(2)];
        assert!(aggregate_diagnostic(&only).is_none());
    }

    #[test]
    fn backend_name_defaults_to_none() {
        let r = ExportResult {
            success: false,
            backend: None,
            output: PathBuf::from("x.pdf"),
            attempts: attempts(),
            diagnostic: Some("boom".into()),
            duration_ms: 0,
        };
        assert_eq!(r.backend_name(), "none");
        assert_eq!(r.failures().count(), 1);
        match r.into_result() {
            Err(ExportError::AllBackendsFailed { diagnostic, .. }) => assert_eq!(diagnostic, "boom"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn result_serialises_outcome_tags() {
        let json = serde_json::to_string(&attempts()).unwrap();
        assert!(json.contains("\"status\":\"skipped\""), "{json}");
        assert!(json.contains("\"status\":\"failed\""), "{json}");
        assert!(json.contains("\"kind\":\"render\""), "{json}");
        assert!(json.contains("\"status\":\"succeeded\""), "{json}");
    }
}
