//! HTML/CSS backend: Markdown → styled HTML → PDF via an external renderer.
//!
//! The HTML is produced in-process with pulldown-cmark; only the final
//! typesetting step shells out, to weasyprint or wkhtmltopdf. Local images
//! are inlined as `data:` URIs so the renderer never needs file access or a
//! working directory.

use crate::backend::process::{probe_tool, run_tool};
use crate::backend::PdfBackend;
use crate::config::{BackendKind, ExportConfig, HtmlRenderer, StyleHints};
use crate::document::{is_remote, Document, ExportRequest};
use crate::error::BackendError;
use crate::markdown::parser_options;
use crate::probe::Availability;
use crate::styles::{html_escape, stylesheet};
use async_trait::async_trait;
use base64::Engine as _;
use pulldown_cmark::{html, CowStr, Event, Parser, Tag};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const NAME: &str = "html-css";

const INSTALL_HINT: &str = "install weasyprint (pip install weasyprint; needs pango, \
     see https://doc.courtbouillon.org/weasyprint/stable/first_steps.html) \
     or wkhtmltopdf (https://wkhtmltopdf.org/downloads.html)";

/// One renderer executable to try.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererCandidate {
    pub renderer: HtmlRenderer,
    pub program: PathBuf,
}

#[derive(Debug, Clone)]
pub struct HtmlCssBackend {
    candidates: Vec<RendererCandidate>,
    timeout_secs: u64,
    probe_timeout_secs: u64,
}

impl HtmlCssBackend {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            candidates: renderer_candidates(config),
            timeout_secs: config.backend_timeout_secs,
            probe_timeout_secs: config.probe_timeout_secs,
        }
    }

    pub fn candidates(&self) -> &[RendererCandidate] {
        &self.candidates
    }
}

/// Renderers in the order they are tried: the configured preference (with
/// its explicit path, if any) first, then the remaining one by name.
pub fn renderer_candidates(config: &ExportConfig) -> Vec<RendererCandidate> {
    let preferred = config.html_renderer.unwrap_or(HtmlRenderer::WeasyPrint);
    let other = match preferred {
        HtmlRenderer::WeasyPrint => HtmlRenderer::Wkhtmltopdf,
        HtmlRenderer::Wkhtmltopdf => HtmlRenderer::WeasyPrint,
    };
    vec![
        RendererCandidate {
            renderer: preferred,
            program: config
                .html_renderer_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(preferred.program())),
        },
        RendererCandidate {
            renderer: other,
            program: PathBuf::from(other.program()),
        },
    ]
}

/// Render the document body to HTML.
///
/// Soft line breaks become `<br>` so notes keep their line structure, and
/// image sources are rewritten by [`image_source`].
pub fn render_body(document: &Document) -> String {
    let parser = Parser::new_ext(document.markdown(), parser_options()).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => {
            let dest_url = image_source(document, &dest_url)
                .map(CowStr::from)
                .unwrap_or(dest_url);
            Event::Start(Tag::Image {
                link_type,
                dest_url,
                title,
                id,
            })
        }
        other => other,
    });
    let mut body = String::new();
    html::push_html(&mut body, parser);
    body
}

/// Replacement `src` for an image, or None to keep the original.
///
/// Readable local files become base64 `data:` URIs; unreadable ones an
/// absolute `file://` URL so the renderer can still try. Remote and
/// `data:` sources are kept.
pub fn image_source(document: &Document, url: &str) -> Option<String> {
    if is_remote(url) {
        return None;
    }
    let path = document.resolve_resource(url)?;
    match std::fs::read(&path) {
        Ok(bytes) => {
            let mime = image_mime(&path, &bytes);
            let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
            Some(format!("data:{mime};base64,{encoded}"))
        }
        Err(e) => {
            warn!("Image {} not readable: {}", path.display(), e);
            let abs = if path.is_absolute() {
                path
            } else {
                std::env::current_dir().map(|d| d.join(&path)).unwrap_or(path)
            };
            Some(format!("file://{}", abs.display()))
        }
    }
}

fn image_mime(path: &Path, bytes: &[u8]) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("svg") => return "image/svg+xml",
        Some("png") => return "image/png",
        Some("jpg") | Some("jpeg") => return "image/jpeg",
        Some("gif") => return "image/gif",
        Some("webp") => return "image/webp",
        _ => {}
    }
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::Gif) => "image/gif",
        Ok(image::ImageFormat::WebP) => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Wrap the rendered body in a complete document with the print stylesheet.
pub fn render_html(document: &Document, style: &StyleHints) -> String {
    let body = render_body(document);
    let title = document.title().unwrap_or("Notes");
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    <style>
{css}
    </style>
</head>
<body>
{body}
</body>
</html>"#,
        title = html_escape(title),
        css = stylesheet(style),
        body = body
    )
}

/// Command-line arguments for one renderer run.
pub fn renderer_args(
    renderer: HtmlRenderer,
    html_path: &Path,
    staging: &Path,
    base_dir: &Path,
    style: &StyleHints,
) -> Vec<OsString> {
    match renderer {
        HtmlRenderer::WeasyPrint => vec![
            html_path.into(),
            staging.into(),
            "--encoding".into(),
            "utf-8".into(),
            "--base-url".into(),
            base_dir.into(),
        ],
        HtmlRenderer::Wkhtmltopdf => {
            let margin = format!("{:.1}mm", style.margin * 25.4 / 72.0);
            let mut args: Vec<OsString> = vec![
                "--quiet".into(),
                "--encoding".into(),
                "utf-8".into(),
                "--enable-local-file-access".into(),
                "--page-size".into(),
                style.page_size.to_string().into(),
            ];
            for side in ["-T", "-B", "-L", "-R"] {
                args.push(side.into());
                args.push(margin.clone().into());
            }
            args.push(html_path.into());
            args.push(staging.into());
            args
        }
    }
}

/// [`render_html`] on the blocking pool; inlining images reads files.
pub async fn build_html(request: &ExportRequest) -> Result<String, BackendError> {
    let document = request.document.clone();
    let style = request.style.clone();
    tokio::task::spawn_blocking(move || render_html(&document, &style))
        .await
        .map_err(|e| BackendError::Panicked {
            backend: NAME.to_string(),
            detail: e.to_string(),
        })
}

#[async_trait]
impl PdfBackend for HtmlCssBackend {
    fn name(&self) -> &str {
        BackendKind::HtmlCss.as_str()
    }

    async fn probe(&self) -> Availability {
        let mut reasons = Vec::new();
        for candidate in &self.candidates {
            match probe_tool(candidate.program.as_os_str(), self.probe_timeout_secs).await {
                Ok(version) => return Availability::available(version),
                Err(reason) => reasons.push(reason),
            }
        }
        Availability::unavailable(format!("{}; {}", reasons.join("; "), INSTALL_HINT))
    }

    async fn convert(&self, request: &ExportRequest, staging: &Path) -> Result<(), BackendError> {
        let workdir = tempfile::Builder::new()
            .prefix("md2pdf-html-")
            .tempdir()
            .map_err(|e| BackendError::io(NAME, e))?;
        let html_path = workdir.path().join("note.html");
        let html = build_html(request).await?;
        tokio::fs::write(&html_path, html)
            .await
            .map_err(|e| BackendError::io(NAME, format!("writing {}: {e}", html_path.display())))?;

        let base_dir = request
            .document
            .base_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| workdir.path().to_path_buf());

        let mut last_error: Option<BackendError> = None;
        for candidate in &self.candidates {
            let args = renderer_args(
                candidate.renderer,
                &html_path,
                staging,
                &base_dir,
                &request.style,
            );
            match run_tool(
                NAME,
                candidate.program.as_os_str(),
                args,
                None,
                self.timeout_secs,
            )
            .await
            {
                Ok(()) => {
                    debug!("html-css: rendered with {}", candidate.renderer.program());
                    return Ok(());
                }
                // A missing renderer must not mask a real failure of another.
                Err(e @ BackendError::Unavailable { .. }) => {
                    if last_error.is_none() {
                        last_error = Some(e);
                    }
                }
                Err(e) => {
                    warn!("html-css: {} failed: {}", candidate.renderer.program(), e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| BackendError::Unavailable {
            backend: NAME.to_string(),
            reason: INSTALL_HINT.to_string(),
        }))
    }
}
