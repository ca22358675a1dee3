//! Last-resort backend: Markdown stripped to text and written as Courier
//! pages with `lopdf`.
//!
//! Pure Rust with no runtime dependency, so it is never probed and the
//! dispatcher always runs it after the configured backends. Content streams
//! are left uncompressed; the text stays searchable in the raw file.

use crate::backend::{write_staging, PdfBackend};
use crate::config::{BackendKind, ExportConfig};
use crate::document::ExportRequest;
use crate::error::BackendError;
use crate::fonts::encode_winansi;
use crate::markdown::{plain_text_lines, wrap_line};
use crate::probe::Availability;
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use std::path::Path;
use tracing::{debug, warn};

const NAME: &str = "plain-text";

/// Courier size in points.
const FONT_SIZE: f32 = 10.0;
/// Baseline-to-baseline distance in points.
const LEADING: f32 = 16.0;
/// Courier advance width as a fraction of the font size.
const COURIER_ADVANCE: f32 = 0.6;

#[derive(Debug, Clone)]
pub struct PlainTextBackend {
    lines_per_page: usize,
}

impl PlainTextBackend {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            lines_per_page: config.plain_text_lines_per_page,
        }
    }
}

/// Page geometry for the text grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextGrid {
    pub page_width: f32,
    pub page_height: f32,
    pub margin: f32,
    pub columns: usize,
    pub lines_per_page: usize,
}

impl TextGrid {
    pub fn for_request(request: &ExportRequest, lines_per_page: usize) -> Self {
        let (w, h) = request.style.page_size.dimensions_pt();
        let margin = request.style.margin;
        let columns = ((w - 2.0 * margin) / (FONT_SIZE * COURIER_ADVANCE))
            .floor()
            .max(20.0) as usize;
        // Never paginate past the bottom margin on small pages.
        let fit = ((h - 2.0 * margin) / LEADING).floor().max(1.0) as usize;
        Self {
            page_width: w,
            page_height: h,
            margin,
            columns,
            lines_per_page: lines_per_page.min(fit).max(1),
        }
    }
}

/// Strip, wrap and paginate the document. Always returns at least one page.
pub fn paginate(markdown: &str, grid: &TextGrid) -> Vec<Vec<String>> {
    let wrapped: Vec<String> = plain_text_lines(markdown)
        .iter()
        .flat_map(|line| {
            if line.is_empty() {
                vec![String::new()]
            } else {
                wrap_line(line, grid.columns)
            }
        })
        .collect();

    let mut pages: Vec<Vec<String>> = wrapped
        .chunks(grid.lines_per_page)
        .map(|chunk| chunk.to_vec())
        .collect();
    if pages.is_empty() {
        pages.push(Vec::new());
    }
    pages
}

/// Build the PDF. Returns the document and how many characters became `?`.
pub fn build_pdf(
    pages: &[Vec<String>],
    grid: &TextGrid,
    title: Option<&str>,
) -> Result<(Document, usize), BackendError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut substituted = 0;
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for lines in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
            Operation::new("TL", vec![LEADING.into()]),
            Operation::new(
                "Td",
                vec![grid.margin.into(), (grid.page_height - grid.margin - FONT_SIZE).into()],
            ),
        ];
        for line in lines {
            let (bytes, replaced) = encode_winansi(line);
            substituted += replaced;
            if !bytes.is_empty() {
                operations.push(Operation::new(
                    "Tj",
                    vec![Object::String(bytes, StringFormat::Literal)],
                ));
            }
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations }
            .encode()
            .map_err(|e| BackendError::render(NAME, e))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), grid.page_width.into(), grid.page_height.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut info = dictionary! {
        "Producer" => Object::string_literal(concat!("md2pdf ", env!("CARGO_PKG_VERSION"))),
    };
    if let Some(title) = title {
        let (bytes, _) = encode_winansi(title);
        info.set("Title", Object::String(bytes, StringFormat::Literal));
    }
    let info_id = doc.add_object(info);
    doc.trailer.set("Info", info_id);

    Ok((doc, substituted))
}

/// Build the whole PDF in memory.
fn render_to_bytes(
    request: &ExportRequest,
    lines_per_page: usize,
) -> Result<Vec<u8>, BackendError> {
    let grid = TextGrid::for_request(request, lines_per_page);
    let pages = paginate(request.document.markdown(), &grid);
    let (mut doc, substituted) = build_pdf(&pages, &grid, request.document.title())?;
    if substituted > 0 {
        warn!(
            "plain-text: {} character(s) outside WinAnsi were replaced with '?'",
            substituted
        );
    }
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| BackendError::render(NAME, e))?;
    debug!(
        "plain-text: {} page(s), {} columns, {} lines/page",
        pages.len(),
        grid.columns,
        grid.lines_per_page
    );
    Ok(bytes)
}

#[async_trait]
impl PdfBackend for PlainTextBackend {
    fn name(&self) -> &str {
        BackendKind::PlainText.as_str()
    }

    async fn probe(&self) -> Availability {
        Availability::available("built in")
    }

    async fn convert(&self, request: &ExportRequest, staging: &Path) -> Result<(), BackendError> {
        let request = request.clone();
        let lines_per_page = self.lines_per_page;
        let bytes = tokio::task::spawn_blocking(move || render_to_bytes(&request, lines_per_page))
            .await
            .map_err(|e| BackendError::Panicked {
                backend: NAME.to_string(),
                detail: e.to_string(),
            })??;
        write_staging(NAME, staging, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PageSize, StyleHints};
    use crate::document::Document;

    fn request(md: &str) -> ExportRequest {
        ExportRequest::new(Document::from_text(md), "/tmp/out.pdf")
    }

    #[test]
    fn grid_for_a4() {
        let grid = TextGrid::for_request(&request(""), 40);
        assert_eq!(grid.columns, 75);
        assert_eq!(grid.lines_per_page, 40);
    }

    #[test]
    fn grid_caps_lines_on_small_pages() {
        let req = request("").with_style(StyleHints {
            page_size: PageSize::A5,
            ..StyleHints::default()
        });
        let grid = TextGrid::for_request(&req, 200);
        assert!(grid.lines_per_page as f32 * LEADING <= 595.0 - 144.0);
    }

    #[test]
    fn empty_document_has_one_page() {
        let grid = TextGrid::for_request(&request(""), 40);
        let pages = paginate("", &grid);
        assert_eq!(pages.len(), 1);
        let (doc, _) = build_pdf(&pages, &grid, None).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn paginates_at_line_count() {
        let md: String = (0..95).map(|i| format!("line {i}\n")).collect();
        let grid = TextGrid::for_request(&request(&md), 40);
        let pages = paginate(&md, &grid);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].len(), 40);
        assert_eq!(pages[2].len(), 15);
    }

    #[test]
    fn long_lines_are_wrapped() {
        let md = "word ".repeat(100);
        let grid = TextGrid::for_request(&request(&md), 40);
        let pages = paginate(&md, &grid);
        assert!(pages[0].len() > 1);
        assert!(pages[0].iter().all(|l| l.chars().count() <= grid.columns));
    }

    #[test]
    fn counts_substitutions() {
        let grid = TextGrid::for_request(&request(""), 40);
        let pages = vec![vec!["中文 ok".to_string()]];
        let (_, substituted) = build_pdf(&pages, &grid, Some("标题")).unwrap();
        assert_eq!(substituted, 2);
    }

    #[tokio::test]
    async fn writes_searchable_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("notes.pdf");
        let config = ExportConfig::default();
        let backend = PlainTextBackend::from_config(&config);
        backend
            .convert(&request("# Title\n\nSome **bold** text\n\n- item"), &out)
            .await
            .unwrap();

        let bytes = std::fs::read(&out).unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
        let raw = String::from_utf8_lossy(&bytes);
        assert!(raw.contains("Title"), "heading text missing");
        assert!(raw.contains("Some bold text"));
        assert!(raw.contains("/Courier"));

        let doc = lopdf::Document::load(&out).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[tokio::test]
    async fn probe_is_always_available() {
        let backend = PlainTextBackend::from_config(&ExportConfig::default());
        assert!(backend.probe().await.is_available());
    }
}
