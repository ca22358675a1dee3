//! Configuration types for Markdown-to-PDF export.
//!
//! All cascade behaviour is controlled through [`ExportConfig`], built via its
//! [`ExportConfigBuilder`]. One struct holds every knob so an [`crate::Exporter`]
//! can be shared across tasks and two runs can be compared field by field.
//!
//! Per-document formatting lives in [`StyleHints`], which travels with each
//! [`crate::document::ExportRequest`] and is read (never mutated) by every
//! backend.

use crate::error::ExportError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Configuration for the export cascade.
///
/// Built via [`ExportConfig::builder()`] or using [`ExportConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_md2pdf::{BackendKind, ExportConfig, PageSize};
///
/// let config = ExportConfig::builder()
///     .backends(vec![BackendKind::HtmlCss, BackendKind::Pdfium])
///     .page_size(PageSize::Letter)
///     .backend_timeout_secs(60)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExportConfig {
    /// Backends to try, in priority order. Default: pandoc → html-css → pdfium.
    ///
    /// The plain-text fallback is always attempted last whether or not it is
    /// listed here; listing it has no effect on the order.
    pub backends: Vec<BackendKind>,

    /// Default formatting hints applied to requests built by the helpers.
    pub style: StyleHints,

    /// Upper bound on a single backend attempt in seconds. Default: 120.
    ///
    /// pandoc driving xelatex is the slow path: a first run on a fresh TeX
    /// installation builds font caches and can take a minute. Subprocesses are
    /// killed when the bound is hit.
    pub backend_timeout_secs: u64,

    /// Upper bound on each availability probe (`<tool> --version`). Default: 10.
    pub probe_timeout_secs: u64,

    /// pandoc executable. If None, `pandoc` is looked up on the search path.
    pub pandoc_path: Option<PathBuf>,

    /// LaTeX engine handed to pandoc. Default: `xelatex` (needed for CJK).
    pub pdf_engine: String,

    /// Preferred HTML/CSS renderer. If None, weasyprint then wkhtmltopdf.
    pub html_renderer: Option<HtmlRenderer>,

    /// Explicit executable for the preferred HTML renderer.
    pub html_renderer_path: Option<PathBuf>,

    /// Explicit pdfium shared library. If None, the usual locations are searched.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Lines per page for the plain-text fallback. Default: 40.
    pub plain_text_lines_per_page: usize,

    /// Concurrent exports in [`crate::Exporter::export_batch`]. Default: 4.
    pub concurrency: usize,

    /// Optional progress callback for cascade events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            backends: BackendKind::default_order().to_vec(),
            style: StyleHints::default(),
            backend_timeout_secs: 120,
            probe_timeout_secs: 10,
            pandoc_path: None,
            pdf_engine: "xelatex".to_string(),
            html_renderer: None,
            html_renderer_path: None,
            pdfium_lib_path: None,
            plain_text_lines_per_page: 40,
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportConfig")
            .field("backends", &self.backends)
            .field("style", &self.style)
            .field("backend_timeout_secs", &self.backend_timeout_secs)
            .field("probe_timeout_secs", &self.probe_timeout_secs)
            .field("pandoc_path", &self.pandoc_path)
            .field("pdf_engine", &self.pdf_engine)
            .field("html_renderer", &self.html_renderer)
            .field("html_renderer_path", &self.html_renderer_path)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("plain_text_lines_per_page", &self.plain_text_lines_per_page)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ExportProgressCallback>"),
            )
            .finish()
    }
}

impl ExportConfig {
    /// Create a new builder for `ExportConfig`.
    pub fn builder() -> ExportConfigBuilder {
        ExportConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExportConfig`].
#[derive(Debug)]
pub struct ExportConfigBuilder {
    config: ExportConfig,
}

impl ExportConfigBuilder {
    pub fn backends(mut self, backends: Vec<BackendKind>) -> Self {
        self.config.backends = backends;
        self
    }

    pub fn style(mut self, style: StyleHints) -> Self {
        self.config.style = style;
        self
    }

    pub fn page_size(mut self, size: PageSize) -> Self {
        self.config.style.page_size = size;
        self
    }

    pub fn font_size(mut self, pt: f32) -> Self {
        self.config.style.font_size = pt.clamp(6.0, 36.0);
        self
    }

    pub fn margin(mut self, pt: f32) -> Self {
        self.config.style.margin = pt.clamp(0.0, 144.0);
        self
    }

    pub fn font_family(mut self, family: impl Into<String>) -> Self {
        self.config.style.font_family = Some(family.into());
        self
    }

    pub fn cjk_font_family(mut self, family: impl Into<String>) -> Self {
        self.config.style.cjk_font_family = Some(family.into());
        self
    }

    pub fn cjk_font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.style.cjk_font_path = Some(path.into());
        self
    }

    pub fn backend_timeout_secs(mut self, secs: u64) -> Self {
        self.config.backend_timeout_secs = secs;
        self
    }

    pub fn probe_timeout_secs(mut self, secs: u64) -> Self {
        self.config.probe_timeout_secs = secs;
        self
    }

    pub fn pandoc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pandoc_path = Some(path.into());
        self
    }

    pub fn pdf_engine(mut self, engine: impl Into<String>) -> Self {
        self.config.pdf_engine = engine.into();
        self
    }

    pub fn html_renderer(mut self, renderer: HtmlRenderer) -> Self {
        self.config.html_renderer = Some(renderer);
        self
    }

    pub fn html_renderer_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.html_renderer_path = Some(path.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn plain_text_lines_per_page(mut self, n: usize) -> Self {
        self.config.plain_text_lines_per_page = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    /// Attach a progress callback that receives cascade events.
    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExportConfig, ExportError> {
        let c = &self.config;
        if c.backend_timeout_secs == 0 {
            return Err(ExportError::InvalidConfig(
                "Backend timeout must be ≥ 1 second".into(),
            ));
        }
        if c.probe_timeout_secs == 0 {
            return Err(ExportError::InvalidConfig(
                "Probe timeout must be ≥ 1 second".into(),
            ));
        }
        if !(10..=200).contains(&c.plain_text_lines_per_page) {
            return Err(ExportError::InvalidConfig(format!(
                "Plain-text lines per page must be 10–200, got {}",
                c.plain_text_lines_per_page
            )));
        }
        if c.pdf_engine.trim().is_empty() {
            return Err(ExportError::InvalidConfig("PDF engine must not be empty".into()));
        }
        for (i, kind) in c.backends.iter().enumerate() {
            if c.backends[..i].contains(kind) {
                return Err(ExportError::InvalidConfig(format!(
                    "Backend '{}' listed more than once",
                    kind
                )));
            }
        }
        let (w, h) = c.style.page_size.dimensions_pt();
        if c.style.margin * 2.0 >= w.min(h) {
            return Err(ExportError::InvalidConfig(format!(
                "Margin {}pt leaves no room on a {} page",
                c.style.margin, c.style.page_size
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// The built-in conversion strategies, listed from highest to lowest fidelity.
///
/// | Backend | Dependency | Layout | CJK |
/// |---------|------------|--------|-----|
/// | `pandoc` | pandoc + LaTeX engine | full typography | via `CJKmainfont` |
/// | `html-css` | weasyprint or wkhtmltopdf | good, CSS driven | system font stack |
/// | `pdfium` | pdfium shared library | basic blocks, images | fallback TrueType font |
/// | `plain-text` | none | text only | replaced with `?` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Pandoc,
    HtmlCss,
    Pdfium,
    PlainText,
}

impl BackendKind {
    /// Default priority order (the plain-text fallback is implicit).
    pub fn default_order() -> &'static [BackendKind] {
        &[BackendKind::Pandoc, BackendKind::HtmlCss, BackendKind::Pdfium]
    }

    /// Stable identifier used in results, logs and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Pandoc => "pandoc",
            BackendKind::HtmlCss => "html-css",
            BackendKind::Pdfium => "pdfium",
            BackendKind::PlainText => "plain-text",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pandoc" => Ok(BackendKind::Pandoc),
            "html-css" | "html" | "css" => Ok(BackendKind::HtmlCss),
            "pdfium" => Ok(BackendKind::Pdfium),
            "plain-text" | "plain" | "text" => Ok(BackendKind::PlainText),
            other => Err(ExportError::InvalidConfig(format!(
                "Unknown backend '{other}' (expected pandoc, html-css, pdfium or plain-text)"
            ))),
        }
    }
}

/// External CSS-aware HTML → PDF renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HtmlRenderer {
    WeasyPrint,
    Wkhtmltopdf,
}

impl HtmlRenderer {
    /// Executable name looked up on the search path.
    pub fn program(&self) -> &'static str {
        match self {
            HtmlRenderer::WeasyPrint => "weasyprint",
            HtmlRenderer::Wkhtmltopdf => "wkhtmltopdf",
        }
    }
}

/// Physical page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSize {
    /// 210 × 297 mm. (default)
    #[default]
    A4,
    /// 148 × 210 mm.
    A5,
    /// 8.5 × 11 in.
    Letter,
    /// 8.5 × 14 in.
    Legal,
}

impl PageSize {
    /// Width and height in PDF points (1/72 in).
    pub fn dimensions_pt(&self) -> (f32, f32) {
        match self {
            PageSize::A4 => (595.0, 842.0),
            PageSize::A5 => (420.0, 595.0),
            PageSize::Letter => (612.0, 792.0),
            PageSize::Legal => (612.0, 1008.0),
        }
    }

    /// Name understood by LaTeX `papersize` and CSS `@page { size }`.
    pub fn paper_name(&self) -> &'static str {
        match self {
            PageSize::A4 => "a4",
            PageSize::A5 => "a5",
            PageSize::Letter => "letter",
            PageSize::Legal => "legal",
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PageSize::A4 => "A4",
            PageSize::A5 => "A5",
            PageSize::Letter => "Letter",
            PageSize::Legal => "Legal",
        };
        f.write_str(s)
    }
}

/// Formatting hints shared by every backend.
///
/// Backends honour what they can: pandoc and the HTML renderer respect font
/// families by name, the pdfium backend needs a font *file* for CJK glyphs,
/// and the plain-text fallback only uses the page size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleHints {
    pub page_size: PageSize,
    /// Base body font size in points. Default: 11.
    pub font_size: f32,
    /// Page margin in points on every side. Default: 72 (one inch).
    pub margin: f32,
    /// Latin font family, e.g. "Source Serif Pro".
    pub font_family: Option<String>,
    /// CJK font family for pandoc/CSS, e.g. "Noto Sans CJK SC".
    pub cjk_font_family: Option<String>,
    /// CJK font file for the pdfium backend.
    pub cjk_font_path: Option<PathBuf>,
}

impl Default for StyleHints {
    fn default() -> Self {
        Self {
            page_size: PageSize::default(),
            font_size: 11.0,
            margin: 72.0,
            font_family: None,
            cjk_font_family: None,
            cjk_font_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_order_excludes_plain_text() {
        let order = BackendKind::default_order();
        assert_eq!(
            order,
            &[BackendKind::Pandoc, BackendKind::HtmlCss, BackendKind::Pdfium]
        );
        assert!(!order.contains(&BackendKind::PlainText));
    }

    #[test]
    fn backend_kind_parses_aliases() {
        assert_eq!("html".parse::<BackendKind>().unwrap(), BackendKind::HtmlCss);
        assert_eq!(" PDFium ".parse::<BackendKind>().unwrap(), BackendKind::Pdfium);
        assert_eq!("text".parse::<BackendKind>().unwrap(), BackendKind::PlainText);
        assert!("latex".parse::<BackendKind>().is_err());
    }

    #[test]
    fn backend_kind_display_matches_serde() {
        for kind in [
            BackendKind::Pandoc,
            BackendKind::HtmlCss,
            BackendKind::Pdfium,
            BackendKind::PlainText,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }

    #[test]
    fn builder_clamps_font_size() {
        let c = ExportConfig::builder().font_size(100.0).build().unwrap();
        assert_eq!(c.style.font_size, 36.0);
    }

    #[test]
    fn builder_rejects_duplicate_backends() {
        let err = ExportConfig::builder()
            .backends(vec![BackendKind::Pdfium, BackendKind::Pdfium])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        assert!(ExportConfig::builder().backend_timeout_secs(0).build().is_err());
        assert!(ExportConfig::builder().probe_timeout_secs(0).build().is_err());
    }

    #[test]
    fn builder_rejects_oversized_margin() {
        let err = ExportConfig::builder()
            .page_size(PageSize::A5)
            .margin(144.0)
            .build();
        assert!(err.is_ok(), "144pt on A5 (420pt wide) still leaves room");
        let err = ExportConfig::builder()
            .page_size(PageSize::A5)
            .style(StyleHints {
                page_size: PageSize::A5,
                margin: 300.0,
                ..StyleHints::default()
            })
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn builder_rejects_tiny_plain_text_pages() {
        assert!(ExportConfig::builder()
            .plain_text_lines_per_page(3)
            .build()
            .is_err());
    }

    #[test]
    fn debug_hides_callback() {
        let c = ExportConfig::default();
        let dbg = format!("{:?}", c);
        assert!(dbg.contains("ExportConfig"));
        assert!(dbg.contains("xelatex"));
    }

    #[test]
    fn page_size_dimensions() {
        assert_eq!(PageSize::A4.dimensions_pt(), (595.0, 842.0));
        assert_eq!(PageSize::Letter.paper_name(), "letter");
        assert_eq!(PageSize::Legal.to_string(), "Legal");
    }
}
