//! # edgequake-md2pdf
//!
//! Export Markdown notes to PDF through a cascade of converters.
//!
//! ## Why a cascade?
//!
//! No single Markdown→PDF path works everywhere. pandoc with a LaTeX engine
//! gives the best typography but needs a TeX installation; HTML renderers
//! need native libraries that are often missing; an in-process PDF library
//! cannot do full layout. This crate tries each converter in order and
//! publishes the first output that verifies as a PDF, ending with a pure-Rust
//! plain-text writer that always succeeds.
//!
//! ## Cascade Overview
//!
//! ```text
//! Markdown
//!  │
//!  ├─ 1. pandoc      pandoc + xelatex          (best typography, CJK fonts)
//!  ├─ 2. html-css    weasyprint | wkhtmltopdf  (print stylesheet, inline images)
//!  ├─ 3. pdfium      in-process layout         (fallback TrueType font for CJK)
//!  └─ 4. plain-text  lopdf Courier pages       (always available, never probed)
//! ```
//!
//! Backends whose dependency is missing are skipped. A failing backend never
//! leaves a file at the destination; the next one is tried. Every skip and
//! failure is recorded in [`ExportResult::attempts`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_md2pdf::{export_markdown, ExportConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExportConfig::default();
//!     let result = export_markdown("notes.md", None, &config).await?;
//!     println!("{} written by {}", result.output.display(), result.backend_name());
//!     if let Some(diag) = &result.diagnostic {
//!         eprintln!("passed over:\n{diag}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `md2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-md2pdf = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime Dependencies
//!
//! | Backend | Needs | Install |
//! |---------|-------|---------|
//! | `pandoc` | `pandoc`, `xelatex` | pandoc.org + a TeX distribution |
//! | `html-css` | `weasyprint` or `wkhtmltopdf` | `pip install weasyprint` |
//! | `pdfium` | pdfium shared library | `PDFIUM_LIB_PATH` or the pdf2md cache |
//! | `plain-text` | nothing | built in |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod fonts;
pub mod layout;
pub mod markdown;
pub mod output;
pub mod probe;
pub mod progress;
pub mod styles;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::PdfBackend;
pub use config::{BackendKind, ExportConfig, ExportConfigBuilder, HtmlRenderer, PageSize, StyleHints};
pub use document::{Document, DocumentSource, ExportRequest};
pub use error::{BackendError, ExportError};
pub use export::{export_markdown, export_markdown_sync, export_text, Exporter};
pub use output::{AttemptOutcome, BackendAttempt, ExportResult};
pub use probe::{Availability, AvailabilityCache};
pub use progress::{ExportProgressCallback, NoopProgressCallback, ProgressCallback};
