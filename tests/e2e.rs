//! End-to-end integration tests for edgequake-md2pdf.
//!
//! These tests drive the real converters (pandoc + xelatex, weasyprint or
//! wkhtmltopdf, the pdfium shared library). They are gated behind the
//! `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested; a test whose converter is not installed prints a
//! SKIP line instead of failing.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=/path/to/libpdfium.so cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_pdfium -- --nocapture

use edgequake_md2pdf::backend::{HtmlCssBackend, PandocBackend, PdfiumBackend};
use edgequake_md2pdf::{
    export_markdown, BackendKind, Document, ExportConfig, ExportRequest, Exporter, PdfBackend,
};
use std::path::{Path, PathBuf};

// ── Test helpers ─────────────────────────────────────────────────────────────

const SAMPLE: &str = "# Title\n\nSome text with **bold** and *italic* words.\n\n\
- first\n- second\n\n| a | b |\n|---|---|\n| 1 | 2 |\n\n```rust\nfn main() {}\n```\n";

fn output_dir() -> tempfile::TempDir {
    tempfile::tempdir().unwrap()
}

/// Skip this test unless E2E_ENABLED is set.
macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

/// Skip this test when the backend's dependency is missing.
macro_rules! skip_unless_available {
    ($backend:expr) => {{
        let backend = $backend;
        let availability = backend.probe().await;
        if !availability.is_available() {
            println!("SKIP — {}: {:?}", backend.name(), availability);
            return;
        }
    }};
}

/// Assert the file is a loadable PDF with at least one page.
fn assert_pdf(path: &Path, context: &str) -> lopdf::Document {
    let bytes = std::fs::read(path).unwrap_or_else(|e| panic!("[{context}] missing output: {e}"));
    assert!(bytes.starts_with(b"%PDF-"), "[{context}] not a PDF");
    let doc = lopdf::Document::load_mem(&bytes)
        .unwrap_or_else(|e| panic!("[{context}] lopdf cannot parse output: {e}"));
    assert!(!doc.get_pages().is_empty(), "[{context}] PDF has no pages");
    doc
}

/// Text of the first page, for backends that emit extractable text.
fn first_page_text(doc: &lopdf::Document) -> String {
    doc.extract_text(&[1]).unwrap_or_default()
}

fn single_backend(kind: BackendKind) -> ExportConfig {
    let mut builder = ExportConfig::builder().backends(vec![kind]);
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        builder = builder.pdfium_lib_path(PathBuf::from(path));
    }
    builder.build().unwrap()
}

// ── Backends ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_pandoc_export() {
    e2e_skip_unless_enabled!();
    let config = single_backend(BackendKind::Pandoc);
    skip_unless_available!(PandocBackend::from_config(&config));

    let dir = output_dir();
    let out = dir.path().join("pandoc.pdf");
    let result = Exporter::new(config)
        .export(&ExportRequest::new(Document::from_text(SAMPLE), &out))
        .await;

    assert_eq!(result.backend_name(), "pandoc", "{:?}", result.diagnostic);
    let doc = assert_pdf(&out, "pandoc");
    assert!(first_page_text(&doc).contains("Title"));
}

#[tokio::test]
async fn test_html_css_export() {
    e2e_skip_unless_enabled!();
    let config = single_backend(BackendKind::HtmlCss);
    skip_unless_available!(HtmlCssBackend::from_config(&config));

    let dir = output_dir();
    let out = dir.path().join("html.pdf");
    let result = Exporter::new(config)
        .export(&ExportRequest::new(
            Document::from_text("# Title\n\nSome text"),
            &out,
        ))
        .await;

    assert_eq!(result.backend_name(), "html-css", "{:?}", result.diagnostic);
    let doc = assert_pdf(&out, "html-css");
    assert!(first_page_text(&doc).contains("Title"));
}

#[tokio::test]
async fn test_pdfium_export_with_image() {
    e2e_skip_unless_enabled!();
    let config = single_backend(BackendKind::Pdfium);
    skip_unless_available!(PdfiumBackend::from_config(&config));

    let dir = output_dir();
    let img = image::RgbImage::from_pixel(40, 20, image::Rgb([200, 30, 30]));
    img.save(dir.path().join("red.png")).unwrap();
    let md_path = dir.path().join("with-image.md");
    std::fs::write(&md_path, format!("{SAMPLE}\n![red box](red.png)\n")).unwrap();

    let result = export_markdown(&md_path, None, &config).await.unwrap();

    assert_eq!(result.backend_name(), "pdfium", "{:?}", result.diagnostic);
    assert_eq!(result.output, dir.path().join("with-image.pdf"));
    let doc = assert_pdf(&result.output, "pdfium");
    assert!(first_page_text(&doc).contains("Title"));
}

#[tokio::test]
async fn test_pdfium_cjk_without_font_never_crashes() {
    e2e_skip_unless_enabled!();
    let config = single_backend(BackendKind::Pdfium);
    skip_unless_available!(PdfiumBackend::from_config(&config));

    let dir = output_dir();
    let out = dir.path().join("cjk.pdf");
    let result = Exporter::new(config)
        .export(&ExportRequest::new(
            Document::from_text("# 会议记录\n\n今天讨论了项目进度。"),
            &out,
        ))
        .await;

    // Either pdfium drew it (fallback font or '?') or a recorded failure
    // sent it to plain-text; both leave a valid PDF.
    assert!(result.success);
    assert_pdf(&out, "cjk");
}

#[tokio::test]
async fn test_default_cascade_produces_pdf() {
    e2e_skip_unless_enabled!();
    let dir = output_dir();
    let md_path = dir.path().join("notes.md");
    std::fs::write(&md_path, SAMPLE).unwrap();

    let result = export_markdown(&md_path, None, &ExportConfig::default())
        .await
        .unwrap();

    println!("chosen backend: {}", result.backend_name());
    if let Some(diag) = &result.diagnostic {
        println!("passed over:\n{diag}");
    }
    assert_pdf(&result.output, "default cascade");
}

#[tokio::test]
async fn test_nonexistent_source() {
    e2e_skip_unless_enabled!();
    let err = export_markdown("/no/such/notes.md", None, &ExportConfig::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"), "{err}");
}

#[test]
fn test_json_serialisable_result() {
    let dir = output_dir();
    let md_path = dir.path().join("n.md");
    std::fs::write(&md_path, "# n").unwrap();
    let config = ExportConfig::builder().backends(vec![]).build().unwrap();

    let result = edgequake_md2pdf::export_markdown_sync(&md_path, None, &config).unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["backend"], "plain-text");
    assert_eq!(json["attempts"][0]["outcome"]["status"], "succeeded");
}
