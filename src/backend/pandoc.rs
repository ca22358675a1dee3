//! pandoc backend: Markdown → LaTeX → PDF via an external LaTeX engine.
//!
//! Highest fidelity of the cascade. xelatex is the default engine because it
//! loads system fonts by name, which is what `CJKmainfont` needs.

use crate::backend::process::{probe_tool, run_tool};
use crate::backend::PdfBackend;
use crate::config::{BackendKind, ExportConfig};
use crate::document::ExportRequest;
use crate::error::BackendError;
use crate::probe::Availability;
use crate::styles::default_cjk_font_family;
use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing::debug;

const NAME: &str = "pandoc";

const PANDOC_HINT: &str = "install pandoc from https://pandoc.org/installing.html \
     (macOS: brew install pandoc; Debian/Ubuntu: apt install pandoc)";
const ENGINE_HINT: &str = "install a TeX distribution providing it \
     (macOS: brew install --cask mactex; Debian/Ubuntu: apt install texlive-xetex)";

#[derive(Debug, Clone)]
pub struct PandocBackend {
    program: PathBuf,
    pdf_engine: String,
    timeout_secs: u64,
    probe_timeout_secs: u64,
}

impl PandocBackend {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            program: config
                .pandoc_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("pandoc")),
            pdf_engine: config.pdf_engine.clone(),
            timeout_secs: config.backend_timeout_secs,
            probe_timeout_secs: config.probe_timeout_secs,
        }
    }
}

/// Command-line arguments for one conversion.
pub fn pandoc_args(
    request: &ExportRequest,
    input: &Path,
    staging: &Path,
    pdf_engine: &str,
) -> Vec<OsString> {
    let style = &request.style;
    // LaTeX's standard classes only offer 10, 11 and 12pt.
    let font_size = style.font_size.round().clamp(10.0, 12.0) as u32;

    let mut args: Vec<OsString> = vec![
        input.into(),
        "-f".into(),
        "markdown".into(),
        "-o".into(),
        staging.into(),
        "--standalone".into(),
        format!("--pdf-engine={pdf_engine}").into(),
        "-V".into(),
        format!("papersize={}", style.page_size.paper_name()).into(),
        "-V".into(),
        format!("geometry:margin={}pt", style.margin).into(),
        "-V".into(),
        format!("fontsize={font_size}pt").into(),
    ];

    if let Some(base) = request.document.base_dir() {
        let mut flag = OsString::from("--resource-path=");
        flag.push(base);
        args.push(flag);
    }
    if let Some(font) = &style.font_family {
        args.push("-V".into());
        args.push(format!("mainfont={font}").into());
    }
    if request.document.has_cjk() {
        let cjk = style
            .cjk_font_family
            .as_deref()
            .unwrap_or(default_cjk_font_family());
        args.push("-V".into());
        args.push(format!("CJKmainfont={cjk}").into());
    }
    args
}

#[async_trait]
impl PdfBackend for PandocBackend {
    fn name(&self) -> &str {
        BackendKind::Pandoc.as_str()
    }

    async fn probe(&self) -> Availability {
        let version = match probe_tool(self.program.as_os_str(), self.probe_timeout_secs).await {
            Ok(v) => v,
            Err(reason) => return Availability::unavailable(format!("{reason}; {PANDOC_HINT}")),
        };
        match probe_tool(OsStr::new(&self.pdf_engine), self.probe_timeout_secs).await {
            Ok(engine) => Availability::available(format!("{version}; {engine}")),
            Err(reason) => Availability::unavailable(format!(
                "PDF engine {reason}; {ENGINE_HINT}"
            )),
        }
    }

    async fn convert(&self, request: &ExportRequest, staging: &Path) -> Result<(), BackendError> {
        let workdir = tempfile::Builder::new()
            .prefix("md2pdf-pandoc-")
            .tempdir()
            .map_err(|e| BackendError::io(NAME, e))?;
        let input = workdir.path().join("source.md");
        tokio::fs::write(&input, request.document.markdown())
            .await
            .map_err(|e| BackendError::io(NAME, format!("writing {}: {e}", input.display())))?;

        let args = pandoc_args(request, &input, staging, &self.pdf_engine);
        debug!("pandoc: {} args", args.len());
        run_tool(NAME, self.program.as_os_str(), args, None, self.timeout_secs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PageSize, StyleHints};
    use crate::document::Document;

    fn args_of(request: &ExportRequest) -> Vec<String> {
        pandoc_args(request, Path::new("/tmp/in.md"), Path::new("/out/.x.pdf"), "xelatex")
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn args_carry_geometry() {
        let req = ExportRequest::new(Document::from_text("# Hi"), "/out/x.pdf").with_style(
            StyleHints {
                page_size: PageSize::Letter,
                font_size: 14.0,
                margin: 54.0,
                ..StyleHints::default()
            },
        );
        let args = args_of(&req);
        assert_eq!(&args[..5], &["/tmp/in.md", "-f", "markdown", "-o", "/out/.x.pdf"]);
        assert!(args.contains(&"--pdf-engine=xelatex".to_string()));
        assert!(args.contains(&"papersize=letter".to_string()));
        assert!(args.contains(&"geometry:margin=54pt".to_string()));
        assert!(args.contains(&"fontsize=12pt".to_string()), "clamped: {args:?}");
        assert!(!args.iter().any(|a| a.starts_with("CJKmainfont")));
        assert!(!args.iter().any(|a| a.starts_with("--resource-path")));
    }

    #[test]
    fn args_add_cjk_font_only_for_cjk_documents() {
        let req = ExportRequest::new(
            Document::from_text("# 标题\n\n内容").with_base_dir("/notes"),
            "/out/x.pdf",
        );
        let args = args_of(&req);
        assert!(args.contains(&format!("CJKmainfont={}", default_cjk_font_family())));
        assert!(args.contains(&"--resource-path=/notes".to_string()));
    }

    #[test]
    fn args_respect_configured_fonts() {
        let req = ExportRequest::new(Document::from_text("中文"), "/out/x.pdf").with_style(
            StyleHints {
                font_family: Some("TeX Gyre Pagella".into()),
                cjk_font_family: Some("SimSun".into()),
                ..StyleHints::default()
            },
        );
        let args = args_of(&req);
        assert!(args.contains(&"mainfont=TeX Gyre Pagella".to_string()));
        assert!(args.contains(&"CJKmainfont=SimSun".to_string()));
    }

    #[tokio::test]
    async fn probe_reports_missing_pandoc_with_hint() {
        let config = ExportConfig::builder()
            .pandoc_path("/nonexistent/pandoc")
            .build()
            .unwrap();
        match PandocBackend::from_config(&config).probe().await {
            Availability::Unavailable { reason } => {
                assert!(reason.contains("not found"), "{reason}");
                assert!(reason.contains("pandoc.org"), "{reason}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
