//! Progress-callback trait for cascade events.
//!
//! Inject an [`Arc<dyn ExportProgressCallback>`] via
//! [`crate::config::ExportConfigBuilder::progress_callback`] to receive
//! events as the dispatcher walks the backend list.
//!
//! Callbacks forward events wherever the host wants them (a terminal spinner,
//! a log line, a job record) without the library knowing about it. The trait
//! is `Send + Sync` because [`crate::Exporter::export_batch`] runs several
//! cascades at once.
//!
//! # Example
//!
//! ```rust
//! use edgequake_md2pdf::{ExportConfig, ExportProgressCallback, BackendError};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FailureCounter {
//!     failures: AtomicUsize,
//! }
//!
//! impl ExportProgressCallback for FailureCounter {
//!     fn on_backend_failed(&self, backend: &str, error: &BackendError) {
//!         self.failures.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{backend} failed: {error}");
//!     }
//! }
//!
//! let counter = Arc::new(FailureCounter { failures: AtomicUsize::new(0) });
//!
//! let config = ExportConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExportProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::BackendError;
use crate::output::ExportResult;
use std::path::Path;
use std::sync::Arc;

/// Called by the dispatcher as it moves through the cascade.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// During a batch export, events for different outputs interleave and may
/// arrive from different threads. Use the `output` argument of
/// [`on_export_start`](Self::on_export_start) and the result's `output` field
/// to tell them apart.
pub trait ExportProgressCallback: Send + Sync {
    /// Called once before the first backend is considered.
    fn on_export_start(&self, output: &Path) {
        let _ = output;
    }

    /// Called when a backend is passed over because its dependency is missing.
    fn on_backend_skipped(&self, backend: &str, reason: &str) {
        let _ = (backend, reason);
    }

    /// Called just before a backend's conversion is invoked.
    fn on_backend_start(&self, backend: &str) {
        let _ = backend;
    }

    /// Called when an attempt fails; the cascade continues afterwards.
    fn on_backend_failed(&self, backend: &str, error: &BackendError) {
        let _ = (backend, error);
    }

    /// Called once with the final result, successful or not.
    fn on_export_complete(&self, result: &ExportResult) {
        let _ = result;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExportProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExportConfig`].
pub type ProgressCallback = Arc<dyn ExportProgressCallback>;
