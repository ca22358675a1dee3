//! Conversion backends and the registry the dispatcher iterates.
//!
//! ```text
//! ExportRequest
//!  │
//!  ├─ pandoc      Markdown → LaTeX → PDF       (pandoc + xelatex)
//!  ├─ html-css    Markdown → HTML + CSS → PDF  (weasyprint | wkhtmltopdf)
//!  ├─ pdfium      Markdown → blocks → pages    (pdfium shared library)
//!  └─ plain-text  Markdown → text → Courier    (pure Rust, always present)
//! ```
//!
//! Each backend writes into the staging path it is given and nothing else;
//! publishing to the destination is the dispatcher's job.
//!
//! In-process backends render to memory on the blocking pool and write the
//! staging file from `convert` itself. A timed-out attempt drops `convert`,
//! so a blocking task that finishes late never touches the disk.

pub mod html;
pub mod pandoc;
pub mod pdfium;
pub mod plain_text;
pub mod process;

use crate::config::{BackendKind, ExportConfig};
use crate::document::ExportRequest;
use crate::error::BackendError;
use crate::probe::Availability;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub use html::HtmlCssBackend;
pub use pandoc::PandocBackend;
pub use pdfium::PdfiumBackend;
pub use plain_text::PlainTextBackend;

/// One strategy in the cascade.
///
/// `probe` must never fail; report problems as
/// [`Availability::Unavailable`]. `convert` writes a complete PDF to
/// `staging` or returns an error; a partial file left behind is removed by
/// the dispatcher.
#[async_trait]
pub trait PdfBackend: Send + Sync {
    /// Stable identifier used in results and diagnostics.
    fn name(&self) -> &str;

    /// Check whether the runtime dependency is present.
    async fn probe(&self) -> Availability;

    /// Convert the request's document into a PDF at `staging`.
    async fn convert(&self, request: &ExportRequest, staging: &Path) -> Result<(), BackendError>;
}

/// Instantiate one backend by kind.
pub fn create_backend(kind: BackendKind, config: &ExportConfig) -> Arc<dyn PdfBackend> {
    match kind {
        BackendKind::Pandoc => Arc::new(PandocBackend::from_config(config)),
        BackendKind::HtmlCss => Arc::new(HtmlCssBackend::from_config(config)),
        BackendKind::Pdfium => Arc::new(PdfiumBackend::from_config(config)),
        BackendKind::PlainText => Arc::new(PlainTextBackend::from_config(config)),
    }
}

/// Write rendered PDF bytes to the staging path.
///
/// Synchronous: a cancelled attempt must not leave a queued write behind.
pub(crate) fn write_staging(
    backend: &str,
    staging: &Path,
    bytes: &[u8],
) -> Result<(), BackendError> {
    std::fs::write(staging, bytes)
        .map_err(|e| BackendError::io(backend, format!("writing {}: {e}", staging.display())))
}

/// Backends named in `config.backends`, in order, excluding the plain-text
/// fallback (which the dispatcher always appends itself).
pub fn default_registry(config: &ExportConfig) -> Vec<Arc<dyn PdfBackend>> {
    config
        .backends
        .iter()
        .filter(|k| **k != BackendKind::PlainText)
        .map(|k| create_backend(*k, config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_follows_configured_order() {
        let config = ExportConfig::builder()
            .backends(vec![
                BackendKind::Pdfium,
                BackendKind::PlainText,
                BackendKind::Pandoc,
            ])
            .build()
            .unwrap();
        let names: Vec<String> = default_registry(&config)
            .iter()
            .map(|b| b.name().to_string())
            .collect();
        assert_eq!(names, vec!["pdfium", "pandoc"]);
    }

    #[test]
    fn default_registry_order() {
        let names: Vec<String> = default_registry(&ExportConfig::default())
            .iter()
            .map(|b| b.name().to_string())
            .collect();
        assert_eq!(names, vec!["pandoc", "html-css", "pdfium"]);
    }

    #[test]
    fn write_staging_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("missing").join("out.pdf");
        let err = write_staging("pdfium", &staging, b"%PDF-1.4").unwrap_err();
        assert!(matches!(err, BackendError::Io { .. }));
        assert!(err.to_string().contains("out.pdf"), "{err}");

        let staging = dir.path().join("out.pdf");
        write_staging("pdfium", &staging, b"%PDF-1.4").unwrap();
        assert_eq!(std::fs::read(&staging).unwrap(), b"%PDF-1.4");
    }

    #[test]
    fn create_backend_names_match_kinds() {
        let config = ExportConfig::default();
        for kind in [
            BackendKind::Pandoc,
            BackendKind::HtmlCss,
            BackendKind::Pdfium,
            BackendKind::PlainText,
        ] {
            assert_eq!(create_backend(kind, &config).name(), kind.as_str());
        }
    }
}
