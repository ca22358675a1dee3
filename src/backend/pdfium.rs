//! Direct PDF-library backend: lays the document out in-process and paints
//! it with pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks while it works. Binding, layout and painting all run on
//! Tokio's blocking pool so the worker threads keep serving other exports.
//!
//! ## Locating the library
//!
//! pdfium is a shared library loaded at runtime, never linked at build time.
//! It is searched for in this order:
//!
//! 1. the configured `pdfium_lib_path` (a file, or a directory holding the
//!    platform library)
//! 2. `PDFIUM_LIB_PATH`
//! 3. the cache directory shared with the pdf2md tools
//!    (`~/.cache/pdf2md/pdfium-7690/` on Linux)
//! 4. the system library search path
//! 5. the working directory

use crate::backend::{write_staging, PdfBackend};
use crate::config::{BackendKind, ExportConfig};
use crate::document::ExportRequest;
use crate::error::BackendError;
use crate::fonts::{find_fallback_font, non_winansi_chars, FallbackFont};
use crate::layout::{layout_document, DrawOp, FontRole, Layout, LayoutOptions};
use crate::markdown::parse_blocks;
use crate::probe::Availability;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const NAME: &str = "pdfium";

/// pdfium-binaries release whose cache directory is reused.
pub const PDFIUM_VERSION: &str = "7690";

const INSTALL_HINT: &str = "download a pdfium build from \
     https://github.com/bblanchon/pdfium-binaries/releases and set PDFIUM_LIB_PATH";

#[derive(Debug, Clone)]
pub struct PdfiumBackend {
    lib_path: Option<PathBuf>,
}

impl PdfiumBackend {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            lib_path: config.pdfium_lib_path.clone(),
        }
    }
}

/// Per-version cache directory used by the pdf2md pdfium downloader.
pub fn pdfium_cache_dir() -> PathBuf {
    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);
    base.join("pdf2md").join(format!("pdfium-{PDFIUM_VERSION}"))
}

/// File-system locations to try, in order. A directory entry is expanded to
/// the platform library name inside it.
pub fn library_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut v = Vec::new();
    if let Some(p) = explicit {
        v.push(p.to_path_buf());
    }
    if let Ok(env_path) = std::env::var("PDFIUM_LIB_PATH") {
        if !env_path.is_empty() {
            v.push(PathBuf::from(env_path));
        }
    }
    v.push(pdfium_cache_dir());
    v.into_iter()
        .map(|p| {
            if p.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&p)
            } else {
                p
            }
        })
        .collect()
}

/// Bind pdfium, returning the bound instance and where it came from.
pub fn bind_pdfium(explicit: Option<&Path>) -> Result<(Pdfium, String), String> {
    let mut tried = Vec::new();
    for path in library_candidates(explicit) {
        if !path.exists() {
            tried.push(format!("{} (missing)", path.display()));
            continue;
        }
        match Pdfium::bind_to_library(&path) {
            Ok(bindings) => return Ok((Pdfium::new(bindings), path.display().to_string())),
            Err(e) => tried.push(format!("{} ({e})", path.display())),
        }
    }
    match Pdfium::bind_to_system_library() {
        Ok(bindings) => return Ok((Pdfium::new(bindings), "system library".to_string())),
        Err(e) => tried.push(format!("system library ({e})")),
    }
    let local = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&local) {
        Ok(bindings) => Ok((Pdfium::new(bindings), local.display().to_string())),
        Err(e) => {
            tried.push(format!("{} ({e})", local.display()));
            Err(format!("pdfium library not found; tried {}", tried.join(", ")))
        }
    }
}

#[async_trait]
impl PdfBackend for PdfiumBackend {
    fn name(&self) -> &str {
        BackendKind::Pdfium.as_str()
    }

    async fn probe(&self) -> Availability {
        let explicit = self.lib_path.clone();
        let result = tokio::task::spawn_blocking(move || {
            bind_pdfium(explicit.as_deref()).map(|(_, source)| source)
        })
        .await;
        match result {
            Ok(Ok(source)) => Availability::available(format!("pdfium from {source}")),
            Ok(Err(reason)) => Availability::unavailable(format!("{reason}; {INSTALL_HINT}")),
            Err(e) => Availability::unavailable(format!("pdfium probe panicked: {e}")),
        }
    }

    async fn convert(&self, request: &ExportRequest, staging: &Path) -> Result<(), BackendError> {
        let request = request.clone();
        let explicit = self.lib_path.clone();

        let (bytes, pages) =
            tokio::task::spawn_blocking(move || render_to_bytes(&request, explicit.as_deref()))
                .await
                .map_err(|e| BackendError::Panicked {
                    backend: NAME.to_string(),
                    detail: e.to_string(),
                })??;

        write_staging(NAME, staging, &bytes)?;
        info!("pdfium: wrote {} page(s) to {}", pages, staging.display());
        Ok(())
    }
}

/// Lay out the document, choosing a fallback font for non-WinAnsi text.
///
/// Returns the layout and the font to embed (None when the standard fonts
/// cover everything or no usable font exists).
pub fn plan_layout(request: &ExportRequest) -> (Layout, Option<FallbackFont>) {
    let blocks = parse_blocks(request.document.markdown());
    let needed = non_winansi_chars(request.document.markdown());
    let base = LayoutOptions::from_style(&request.style);

    let font = find_fallback_font(&needed, request.style.cjk_font_path.as_deref());
    let covered = font
        .as_ref()
        .map(|f| f.covered_chars(&needed))
        .unwrap_or_default();
    if !needed.is_empty() {
        match &font {
            Some(f) => debug!(
                "pdfium: fallback font {} covers {}/{} characters",
                f.path.display(),
                covered.len(),
                needed.len()
            ),
            None => debug!("pdfium: no fallback font for {} characters", needed.len()),
        }
    }

    let layout = layout_document(
        &blocks,
        &request.document,
        &base.with_fallback_chars(covered),
    );
    let font = font.filter(|_| layout.uses_role(FontRole::Fallback));
    (layout, font)
}

/// Paint the document in memory. Returns the PDF bytes and the page count.
fn render_to_bytes(
    request: &ExportRequest,
    explicit_lib: Option<&Path>,
) -> Result<(Vec<u8>, usize), BackendError> {
    let (pdfium, source) = bind_pdfium(explicit_lib).map_err(|reason| BackendError::Unavailable {
        backend: NAME.to_string(),
        reason,
    })?;
    debug!("pdfium: bound {}", source);

    let (mut layout, mut fallback) = plan_layout(request);

    let mut document = pdfium.create_new_pdf().map_err(|e| BackendError::render(NAME, e))?;

    let regular = document.fonts_mut().helvetica();
    let bold = document.fonts_mut().helvetica_bold();
    let italic = document.fonts_mut().helvetica_oblique();
    let bold_italic = document.fonts_mut().helvetica_bold_oblique();
    let mono = document.fonts_mut().courier();

    let mut fallback_token = None;
    if let Some(font) = fallback.take() {
        match document.fonts_mut().load_true_type_from_bytes(&font.data, true) {
            Ok(token) => fallback_token = Some(token),
            Err(e) if request.style.cjk_font_path.is_some() => {
                return Err(BackendError::Font {
                    backend: NAME.to_string(),
                    detail: format!("cannot embed {}: {e}", font.path.display()),
                });
            }
            Err(e) => {
                warn!(
                    "pdfium: cannot embed {} ({}); substituting '?'",
                    font.path.display(),
                    e
                );
                let opts = LayoutOptions::from_style(&request.style);
                layout = layout_document(
                    &parse_blocks(request.document.markdown()),
                    &request.document,
                    &opts,
                );
            }
        }
    }

    if layout.substituted > 0 {
        warn!(
            "pdfium: {} character(s) not covered by any font were replaced with '?'",
            layout.substituted
        );
    }

    for page_layout in &layout.pages {
        let paper = PdfPagePaperSize::Custom(
            PdfPoints::new(layout.page_width),
            PdfPoints::new(layout.page_height),
        );
        let mut page = document
            .pages_mut()
            .create_page_at_end(paper)
            .map_err(|e| BackendError::render(NAME, e))?;

        for op in &page_layout.ops {
            match op {
                DrawOp::Text {
                    x,
                    y,
                    text,
                    role,
                    size,
                } => {
                    let font = match role {
                        FontRole::Regular => regular,
                        FontRole::Bold => bold,
                        FontRole::Italic => italic,
                        FontRole::BoldItalic => bold_italic,
                        FontRole::Mono => mono,
                        FontRole::Fallback => fallback_token.unwrap_or(regular),
                    };
                    page.objects_mut()
                        .create_text_object(
                            PdfPoints::new(*x),
                            PdfPoints::new(*y),
                            text,
                            font,
                            PdfPoints::new(*size),
                        )
                        .map_err(|e| BackendError::render(NAME, e))?;
                }
                DrawOp::Image {
                    x,
                    y,
                    width,
                    height,
                    path,
                } => match image::open(path) {
                    Ok(img) => {
                        page.objects_mut()
                            .create_image_object(
                                PdfPoints::new(*x),
                                PdfPoints::new(*y),
                                &img,
                                Some(PdfPoints::new(*width)),
                                Some(PdfPoints::new(*height)),
                            )
                            .map_err(|e| BackendError::render(NAME, e))?;
                    }
                    Err(e) => {
                        warn!("pdfium: image {} could not be decoded: {}", path.display(), e);
                        page.objects_mut()
                            .create_text_object(
                                PdfPoints::new(*x),
                                PdfPoints::new(*y + *height - request.style.font_size),
                                format!("[image: {}]", path.display()),
                                italic,
                                PdfPoints::new(request.style.font_size),
                            )
                            .map_err(|e| BackendError::render(NAME, e))?;
                    }
                },
                DrawOp::Rule { x1, x2, y } => {
                    page.objects_mut()
                        .create_path_object_line(
                            PdfPoints::new(*x1),
                            PdfPoints::new(*y),
                            PdfPoints::new(*x2),
                            PdfPoints::new(*y),
                            PdfColor::new(160, 160, 160, 255),
                            PdfPoints::new(0.75),
                        )
                        .map_err(|e| BackendError::render(NAME, e))?;
                }
            }
        }
    }

    let bytes = document
        .save_to_bytes()
        .map_err(|e| BackendError::render(NAME, e))?;
    Ok((bytes, layout.pages.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    #[test]
    fn cache_dir_is_versioned() {
        let dir = pdfium_cache_dir();
        assert!(dir.ends_with(format!("pdf2md/pdfium-{PDFIUM_VERSION}")));
    }

    #[test]
    fn explicit_path_comes_first() {
        let candidates = library_candidates(Some(Path::new("/opt/pdfium/libpdfium.so")));
        assert_eq!(candidates[0], PathBuf::from("/opt/pdfium/libpdfium.so"));
    }

    #[test]
    fn explicit_directory_expands_to_library_name() {
        let dir = tempfile::tempdir().unwrap();
        let candidates = library_candidates(Some(dir.path()));
        assert_eq!(candidates[0].parent(), Some(dir.path()));
        assert!(candidates[0]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains("pdfium"));
    }

    #[test]
    fn plan_without_cjk_needs_no_fallback() {
        let req = ExportRequest::new(Document::from_text("# Notes\n\nplain — text"), "/tmp/x.pdf");
        let (layout, font) = plan_layout(&req);
        assert!(font.is_none());
        assert_eq!(layout.substituted, 0);
        assert!(layout.text().contains("Notes"));
    }

    #[test]
    fn plan_with_cjk_never_panics() {
        let req = ExportRequest::new(Document::from_text("# 笔记\n\n中文内容 ☃"), "/tmp/x.pdf");
        let (layout, font) = plan_layout(&req);
        // Either a fallback font draws the text or it is substituted.
        match font {
            Some(_) => assert!(layout.uses_role(FontRole::Fallback)),
            None => assert!(layout.substituted >= 6),
        }
    }
}
