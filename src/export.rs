//! The export cascade dispatcher.
//!
//! ## Publishing
//!
//! Every attempt writes into its own staging file (`.md2pdf-XXXX.pdf`) in the
//! destination directory, so the final rename never crosses a file system.
//! The staging file is a [`tempfile::TempPath`]: a failed, panicking or
//! timed-out attempt simply drops it and the file is removed. Only output
//! that is non-empty and starts with `%PDF-` is renamed onto the destination.
//!
//! ## Ordering
//!
//! Configured backends are tried in order; unavailable ones are skipped
//! without being invoked. The plain-text backend runs after the list is
//! exhausted and is never probed.

use crate::backend::{default_registry, PdfBackend, PlainTextBackend};
use crate::config::ExportConfig;
use crate::document::{Document, ExportRequest};
use crate::error::{BackendError, ExportError};
use crate::output::{aggregate_diagnostic, AttemptOutcome, BackendAttempt, ExportResult};
use crate::probe::{Availability, AvailabilityCache};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

const PDF_MAGIC: &[u8; 5] = b"%PDF-";

/// Runs exports through the backend cascade.
///
/// Cheap to clone; clones share the backend registry and the availability
/// cache.
///
/// # Example
/// ```rust,no_run
/// use edgequake_md2pdf::{Document, ExportConfig, ExportRequest, Exporter};
///
/// # async fn run() {
/// let exporter = Exporter::new(ExportConfig::default());
/// let request = ExportRequest::new(Document::from_text("# Hello"), "hello.pdf");
/// let result = exporter.export(&request).await;
/// println!("{} via {}", result.output.display(), result.backend_name());
/// # }
/// ```
#[derive(Clone)]
pub struct Exporter {
    inner: Arc<Inner>,
}

struct Inner {
    config: ExportConfig,
    backends: Vec<Arc<dyn PdfBackend>>,
    fallback: Arc<dyn PdfBackend>,
    availability: AvailabilityCache,
}

impl fmt::Debug for Exporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exporter")
            .field("backends", &self.backend_names())
            .field("cached_probes", &self.inner.availability.len())
            .finish()
    }
}

impl Exporter {
    /// Build the registry from `config.backends`.
    pub fn new(config: ExportConfig) -> Self {
        let backends = default_registry(&config);
        Self::with_backends(config, backends)
    }

    /// Use an explicit backend list. The plain-text fallback is still
    /// appended.
    pub fn with_backends(config: ExportConfig, backends: Vec<Arc<dyn PdfBackend>>) -> Self {
        let fallback: Arc<dyn PdfBackend> = Arc::new(PlainTextBackend::from_config(&config));
        Self::from_parts(config, backends, fallback)
    }

    /// Use an explicit backend list and a replacement for the terminal
    /// fallback.
    pub fn from_parts(
        config: ExportConfig,
        backends: Vec<Arc<dyn PdfBackend>>,
        fallback: Arc<dyn PdfBackend>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                backends,
                fallback,
                availability: AvailabilityCache::new(),
            }),
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.inner.config
    }

    /// Backend names in the order they are tried, fallback last.
    pub fn backend_names(&self) -> Vec<String> {
        self.inner
            .backends
            .iter()
            .chain(std::iter::once(&self.inner.fallback))
            .map(|b| b.name().to_string())
            .collect()
    }

    /// Probe every backend (cached), fallback included.
    pub async fn probe_all(&self) -> Vec<(String, Availability)> {
        let mut out = Vec::with_capacity(self.inner.backends.len() + 1);
        for backend in &self.inner.backends {
            out.push((backend.name().to_string(), self.availability(backend.as_ref()).await));
        }
        out.push((
            self.inner.fallback.name().to_string(),
            self.inner.fallback.probe().await,
        ));
        out
    }

    /// Forget cached probe results; the next export probes again.
    pub fn invalidate_availability(&self) {
        self.inner.availability.invalidate();
    }

    async fn availability(&self, backend: &dyn PdfBackend) -> Availability {
        self.inner
            .availability
            .get_or_probe(backend.name(), || backend.probe())
            .await
    }

    /// Export one document. Never returns an error; check
    /// [`ExportResult::success`] or call [`ExportResult::into_result`].
    pub async fn export(&self, request: &ExportRequest) -> ExportResult {
        let start = Instant::now();
        let callback = self.inner.config.progress_callback.as_ref();
        info!("Exporting PDF to {}", request.output.display());
        if let Some(cb) = callback {
            cb.on_export_start(&request.output);
        }

        let mut attempts = Vec::with_capacity(self.inner.backends.len() + 1);
        let mut published: Option<String> = None;

        for backend in &self.inner.backends {
            let name = backend.name();
            if let Availability::Unavailable { reason } = self.availability(backend.as_ref()).await {
                debug!("Skipping {}: {}", name, reason);
                if let Some(cb) = callback {
                    cb.on_backend_skipped(name, &reason);
                }
                attempts.push(BackendAttempt {
                    backend: name.to_string(),
                    outcome: AttemptOutcome::Skipped { reason },
                    duration_ms: 0,
                });
                continue;
            }

            let attempt = self.run_attempt(backend.as_ref(), request).await;
            let succeeded = matches!(attempt.outcome, AttemptOutcome::Succeeded { .. });
            attempts.push(attempt);
            if succeeded {
                published = Some(name.to_string());
                break;
            }
        }

        if published.is_none() {
            let fallback = self.inner.fallback.as_ref();
            let attempt = self.run_attempt(fallback, request).await;
            if matches!(attempt.outcome, AttemptOutcome::Succeeded { .. }) {
                published = Some(fallback.name().to_string());
            }
            attempts.push(attempt);
        }

        let result = ExportResult {
            success: published.is_some(),
            diagnostic: aggregate_diagnostic(&attempts),
            backend: published,
            output: request.output.clone(),
            attempts,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        match &result.backend {
            Some(name) => info!(
                "Exported {} via {} in {}ms",
                result.output.display(),
                name,
                result.duration_ms
            ),
            None => warn!(
                "Export to {} failed:\n{}",
                result.output.display(),
                result.diagnostic.as_deref().unwrap_or("")
            ),
        }
        if let Some(cb) = callback {
            cb.on_export_complete(&result);
        }
        result
    }

    /// Export several documents, up to `config.concurrency` at a time.
    /// Results come back in request order.
    pub async fn export_batch(&self, requests: &[ExportRequest]) -> Vec<ExportResult> {
        let mut results: Vec<(usize, ExportResult)> =
            stream::iter(requests.iter().enumerate().map(|(idx, request)| async move {
                (idx, self.export(request).await)
            }))
            .buffer_unordered(self.inner.config.concurrency.max(1))
            .collect()
            .await;
        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, r)| r).collect()
    }

    async fn run_attempt(&self, backend: &dyn PdfBackend, request: &ExportRequest) -> BackendAttempt {
        let name = backend.name();
        let callback = self.inner.config.progress_callback.as_ref();
        if let Some(cb) = callback {
            cb.on_backend_start(name);
        }
        debug!("Trying {}", name);

        let start = Instant::now();
        let outcome = match self.convert_and_publish(backend, request).await {
            Ok(bytes) => AttemptOutcome::Succeeded { bytes },
            Err(error) => {
                warn!("{} failed: {}", name, error);
                if let Some(cb) = callback {
                    cb.on_backend_failed(name, &error);
                }
                AttemptOutcome::Failed { error }
            }
        };
        BackendAttempt {
            backend: name.to_string(),
            outcome,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn convert_and_publish(
        &self,
        backend: &dyn PdfBackend,
        request: &ExportRequest,
    ) -> Result<u64, BackendError> {
        let name = backend.name();
        let dir = staging_dir(&request.output);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| BackendError::io(name, format!("creating {}: {e}", dir.display())))?;

        // Removed on drop unless persisted.
        let staging = tempfile::Builder::new()
            .prefix(".md2pdf-")
            .suffix(".pdf")
            .tempfile_in(&dir)
            .map_err(|e| BackendError::io(name, format!("staging file in {}: {e}", dir.display())))?
            .into_temp_path();

        let secs = self.inner.config.backend_timeout_secs;
        let conversion = AssertUnwindSafe(backend.convert(request, &staging)).catch_unwind();
        match tokio::time::timeout(Duration::from_secs(secs), conversion).await {
            Err(_) => {
                return Err(BackendError::Timeout {
                    backend: name.to_string(),
                    secs,
                })
            }
            Ok(Err(payload)) => {
                return Err(BackendError::Panicked {
                    backend: name.to_string(),
                    detail: panic_message(payload.as_ref()),
                })
            }
            Ok(Ok(result)) => result?,
        }

        let bytes = verify_pdf(name, &staging).await?;
        staging.persist(&request.output).map_err(|e| {
            BackendError::io(
                name,
                format!("publishing {}: {}", request.output.display(), e.error),
            )
        })?;
        Ok(bytes)
    }
}

fn staging_dir(output: &Path) -> PathBuf {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Confirm a staging file holds a PDF; returns its size.
pub async fn verify_pdf(backend: &str, path: &Path) -> Result<u64, BackendError> {
    let empty = || BackendError::EmptyOutput {
        backend: backend.to_string(),
    };
    let mut file = tokio::fs::File::open(path).await.map_err(|_| empty())?;
    let len = file
        .metadata()
        .await
        .map_err(|e| BackendError::io(backend, e))?
        .len();
    if len == 0 {
        return Err(empty());
    }

    let mut head = Vec::with_capacity(PDF_MAGIC.len());
    (&mut file)
        .take(PDF_MAGIC.len() as u64)
        .read_to_end(&mut head)
        .await
        .map_err(|e| BackendError::io(backend, e))?;
    if head.as_slice() != PDF_MAGIC {
        return Err(BackendError::InvalidOutput {
            backend: backend.to_string(),
            magic: String::from_utf8_lossy(&head).into_owned(),
        });
    }
    Ok(len)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Export a Markdown file to `output` (default `<input>.pdf`).
///
/// # Errors
/// Fatal input errors, or [`ExportError::AllBackendsFailed`].
pub async fn export_markdown(
    input: impl AsRef<Path>,
    output: Option<&Path>,
    config: &ExportConfig,
) -> Result<ExportResult, ExportError> {
    let request = ExportRequest::for_file(input, output)?.with_style(config.style.clone());
    Exporter::new(config.clone()).export(&request).await.into_result()
}

/// Synchronous wrapper around [`export_markdown`].
///
/// Creates a temporary tokio runtime internally.
pub fn export_markdown_sync(
    input: impl AsRef<Path>,
    output: Option<&Path>,
    config: &ExportConfig,
) -> Result<ExportResult, ExportError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExportError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(export_markdown(input, output, config))
}

/// Export Markdown held in memory. Relative image paths resolve against
/// `base_dir` when given.
pub async fn export_text(
    markdown: impl Into<String>,
    base_dir: Option<&Path>,
    output: impl AsRef<Path>,
    config: &ExportConfig,
) -> Result<ExportResult, ExportError> {
    let mut document = Document::from_text(markdown);
    if let Some(dir) = base_dir {
        document = document.with_base_dir(dir);
    }
    let request =
        ExportRequest::new(document, output.as_ref()).with_style(config.style.clone());
    Exporter::new(config.clone()).export(&request).await.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn verify_rejects_empty_and_non_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.pdf");
        std::fs::write(&empty, b"").unwrap();
        assert!(matches!(
            verify_pdf("x", &empty).await,
            Err(BackendError::EmptyOutput { .. })
        ));

        let html = dir.path().join("page.pdf");
        std::fs::write(&html, b"<html>").unwrap();
        match verify_pdf("x", &html).await {
            Err(BackendError::InvalidOutput { magic, .. }) => assert_eq!(magic, "<html"),
            other => panic!("unexpected {other:?}"),
        }

        let missing = dir.path().join("missing.pdf");
        assert!(matches!(
            verify_pdf("x", &missing).await,
            Err(BackendError::EmptyOutput { .. })
        ));
    }

    #[tokio::test]
    async fn verify_accepts_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("ok.pdf");
        std::fs::write(&pdf, b"%PDF-1.7\n...").unwrap();
        assert_eq!(verify_pdf("x", &pdf).await.unwrap(), 12);
    }

    #[test]
    fn staging_dir_for_bare_file_name() {
        assert_eq!(staging_dir(Path::new("out.pdf")), PathBuf::from("."));
        assert_eq!(staging_dir(Path::new("/a/b/out.pdf")), PathBuf::from("/a/b"));
    }

    #[test]
    fn panic_messages() {
        let s: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(s.as_ref()), "boom");
        let s: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(s.as_ref()), "bang");
        let s: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(s.as_ref()), "unknown panic payload");
    }

    #[test]
    fn backend_names_end_with_fallback() {
        let exporter = Exporter::new(ExportConfig::default());
        assert_eq!(
            exporter.backend_names(),
            vec!["pandoc", "html-css", "pdfium", "plain-text"]
        );
    }

    #[tokio::test]
    async fn export_text_with_only_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("notes.pdf");
        let config = ExportConfig::builder().backends(vec![]).build().unwrap();
        let result = export_text("# Notes\n\nhello", None, &out, &config)
            .await
            .unwrap();
        assert_eq!(result.backend_name(), "plain-text");
        assert!(std::fs::read(&out).unwrap().starts_with(b"%PDF-"));
    }
}
