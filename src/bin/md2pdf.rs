//! CLI binary for edgequake-md2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExportConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_md2pdf::{
    Availability, BackendError, BackendKind, ExportConfig, ExportProgressCallback, ExportRequest,
    ExportResult, Exporter, HtmlRenderer, PageSize, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

fn truncate(s: &str, max: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    if first_line.chars().count() > max {
        let cut: String = first_line.chars().take(max - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        first_line.to_string()
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one spinner plus a log line per backend
/// event. Events from concurrent exports interleave; each line names its
/// output file.
struct CliProgressCallback {
    bar: ProgressBar,
    done: AtomicUsize,
    total: usize,
}

impl CliProgressCallback {
    fn new(total: usize) -> Arc<Self> {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  {pos}/{len}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Exporting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            done: AtomicUsize::new(0),
            total,
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ExportProgressCallback for CliProgressCallback {
    fn on_export_start(&self, output: &Path) {
        self.bar.set_message(output.display().to_string());
    }

    fn on_backend_skipped(&self, backend: &str, reason: &str) {
        self.bar.println(format!(
            "  {} {:<10} {}",
            dim("–"),
            backend,
            dim(&format!("skipped: {}", truncate(reason, 90))),
        ));
    }

    fn on_backend_start(&self, backend: &str) {
        self.bar.set_message(format!("{backend}…"));
    }

    fn on_backend_failed(&self, backend: &str, error: &BackendError) {
        self.bar.println(format!(
            "  {} {:<10} {}",
            red("✗"),
            backend,
            red(&truncate(&error.to_string(), 90)),
        ));
    }

    fn on_export_complete(&self, result: &ExportResult) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        let line = if result.success {
            format!(
                "{} {}  {}  {}",
                green("✔"),
                bold(&result.output.display().to_string()),
                dim(&format!("via {}", result.backend_name())),
                dim(&format!("{:.1}s", result.duration_ms as f64 / 1000.0)),
            )
        } else {
            format!(
                "{} {}  {}",
                red("✘"),
                bold(&result.output.display().to_string()),
                red("every backend failed"),
            )
        };
        self.bar.println(line);
        self.bar.set_position(done as u64);
        if done == self.total {
            self.bar.set_message("done");
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Export next to the source (notes.pdf)
  md2pdf notes.md

  # Choose the destination
  md2pdf notes.md -o out/notes.pdf

  # Several files at once
  md2pdf chapter1.md chapter2.md chapter3.md --concurrency 2

  # Skip pandoc, Letter paper, larger type
  md2pdf --backends html-css,pdfium --page-size letter --font-size 12 notes.md

  # Chinese notes with an explicit fallback font for the pdfium backend
  md2pdf --cjk-font "Noto Sans CJK SC" --cjk-font-path ~/fonts/NotoSansSC.ttf 笔记.md

  # Which converters are installed?
  md2pdf --check

  # Machine-readable results
  md2pdf --json notes.md > result.json

BACKENDS (tried in order; the plain-text writer always runs last):
  pandoc      pandoc + xelatex          best typography, CJK via CJKmainfont
  html-css    weasyprint | wkhtmltopdf  print stylesheet, images inlined
  pdfium      pdfium shared library     in-process layout, TrueType fallback font
  plain-text  built in                  Courier text pages, always succeeds

ENVIRONMENT VARIABLES:
  Every flag reads MD2PDF_<FLAG>, e.g. MD2PDF_BACKENDS=pdfium,html-css
  PDFIUM_LIB_PATH         Path to an existing libpdfium
  RUST_LOG                Override log filtering (e.g. edgequake_md2pdf=debug)
"#;

/// Export Markdown notes to PDF, falling back across converters.
#[derive(Parser, Debug)]
#[command(
    name = "md2pdf",
    version,
    about = "Export Markdown notes to PDF, falling back across converters",
    long_about = "Export Markdown files to PDF. pandoc, an HTML/CSS renderer and pdfium are \
tried in order; whichever is installed and succeeds first wins, and a built-in plain-text \
writer guarantees a PDF even when none of them work.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Markdown files to export.
    #[arg(required_unless_present = "check")]
    inputs: Vec<PathBuf>,

    /// Destination PDF (single input only). Default: <input>.pdf.
    #[arg(short, long, env = "MD2PDF_OUTPUT")]
    output: Option<PathBuf>,

    /// Backends to try, comma-separated: pandoc, html-css, pdfium.
    #[arg(long, env = "MD2PDF_BACKENDS", value_delimiter = ',')]
    backends: Option<Vec<BackendKind>>,

    /// Page size.
    #[arg(long, env = "MD2PDF_PAGE_SIZE", value_enum, default_value = "a4")]
    page_size: PageSizeArg,

    /// Body font size in points (6–36).
    #[arg(long, env = "MD2PDF_FONT_SIZE", default_value_t = 11.0)]
    font_size: f32,

    /// Page margin in points.
    #[arg(long, env = "MD2PDF_MARGIN", default_value_t = 72.0)]
    margin: f32,

    /// Body font family (pandoc and html-css).
    #[arg(long, env = "MD2PDF_FONT")]
    font: Option<String>,

    /// CJK font family (pandoc and html-css).
    #[arg(long, env = "MD2PDF_CJK_FONT")]
    cjk_font: Option<String>,

    /// TrueType/OpenType file used for non-Latin text by the pdfium backend.
    #[arg(long, env = "MD2PDF_CJK_FONT_PATH")]
    cjk_font_path: Option<PathBuf>,

    /// pandoc executable.
    #[arg(long, env = "MD2PDF_PANDOC_PATH")]
    pandoc_path: Option<PathBuf>,

    /// LaTeX engine passed to pandoc.
    #[arg(long, env = "MD2PDF_PDF_ENGINE", default_value = "xelatex")]
    pdf_engine: String,

    /// Preferred HTML renderer.
    #[arg(long, env = "MD2PDF_HTML_RENDERER", value_enum)]
    html_renderer: Option<HtmlRendererArg>,

    /// Executable for the preferred HTML renderer.
    #[arg(long, env = "MD2PDF_HTML_RENDERER_PATH")]
    html_renderer_path: Option<PathBuf>,

    /// pdfium shared library (file or directory).
    #[arg(long, env = "MD2PDF_PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Per-backend timeout in seconds.
    #[arg(long, env = "MD2PDF_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Number of files exported at once.
    #[arg(short, long, env = "MD2PDF_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Print results as JSON.
    #[arg(long, env = "MD2PDF_JSON")]
    json: bool,

    /// Probe every backend, print availability and exit.
    #[arg(long)]
    check: bool,

    /// Disable progress output.
    #[arg(long, env = "MD2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MD2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MD2PDF_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PageSizeArg {
    A4,
    A5,
    Letter,
    Legal,
}

impl From<PageSizeArg> for PageSize {
    fn from(v: PageSizeArg) -> Self {
        match v {
            PageSizeArg::A4 => PageSize::A4,
            PageSizeArg::A5 => PageSize::A5,
            PageSizeArg::Letter => PageSize::Letter,
            PageSizeArg::Legal => PageSize::Legal,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum HtmlRendererArg {
    Weasyprint,
    Wkhtmltopdf,
}

impl From<HtmlRendererArg> for HtmlRenderer {
    fn from(v: HtmlRendererArg) -> Self {
        match v {
            HtmlRendererArg::Weasyprint => HtmlRenderer::WeasyPrint,
            HtmlRendererArg::Wkhtmltopdf => HtmlRenderer::Wkhtmltopdf,
        }
    }
}

#[derive(Serialize)]
struct CheckEntry {
    backend: String,
    #[serde(flatten)]
    availability: Availability,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress output is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.check;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if cli.output.is_some() && cli.inputs.len() > 1 {
        anyhow::bail!("--output can only be used with a single input file");
    }

    // ── Check mode ───────────────────────────────────────────────────────
    if cli.check {
        let exporter = Exporter::new(build_config(&cli, None)?);
        let report = exporter.probe_all().await;
        if cli.json {
            let entries: Vec<CheckEntry> = report
                .into_iter()
                .map(|(backend, availability)| CheckEntry {
                    backend,
                    availability,
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&entries).context("Failed to serialise report")?
            );
        } else {
            for (backend, availability) in &report {
                match availability {
                    Availability::Available { detail } => {
                        println!("{} {:<10} {}", green("✔"), bold(backend), dim(detail))
                    }
                    Availability::Unavailable { reason } => {
                        println!("{} {:<10} {}", red("✘"), bold(backend), reason)
                    }
                }
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    // ── Read sources ─────────────────────────────────────────────────────
    let (requests, read_failures) = read_requests(&cli.inputs, cli.output.as_deref());

    // Only readable sources reach the cascade, so size the bar by those.
    let progress = show_progress.then(|| CliProgressCallback::new(requests.len()));
    let config = build_config(
        &cli,
        progress
            .clone()
            .map(|cb| cb as Arc<dyn ExportProgressCallback>),
    )?;
    let requests: Vec<ExportRequest> = requests
        .into_iter()
        .map(|request| request.with_style(config.style.clone()))
        .collect();
    let exporter = Exporter::new(config);

    // ── Export ───────────────────────────────────────────────────────────
    let results = exporter.export_batch(&requests).await;
    if let Some(cb) = &progress {
        cb.finish();
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&results).context("Failed to serialise results")?
        );
    } else if !cli.quiet {
        for result in &results {
            print_summary(result, show_progress);
        }
    }

    let failed = read_failures + results.iter().filter(|r| !r.success).count();
    if failed > 0 {
        if !cli.quiet && !cli.json {
            eprintln!(
                "{} {}/{} exports failed",
                red("✘"),
                failed,
                cli.inputs.len()
            );
        }
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_summary(result: &ExportResult, progress_shown: bool) {
    if result.success {
        // The progress callback already printed a line per export.
        if !progress_shown {
            eprintln!(
                "{} {} via {} in {}ms",
                green("✔"),
                bold(&result.output.display().to_string()),
                result.backend_name(),
                result.duration_ms
            );
        }
        if result.backend_name() == "plain-text" {
            eprintln!(
                "  {} {}",
                cyan("⚠"),
                dim("only the plain-text fallback succeeded; formatting was dropped")
            );
        }
    } else {
        eprintln!(
            "{} {} could not be exported:",
            red("✘"),
            bold(&result.output.display().to_string())
        );
        if let Some(diag) = &result.diagnostic {
            eprintln!("{diag}");
        }
    }
}

/// Map CLI args to `ExportConfig`.
/// Read every input, reporting unreadable ones. Returns the requests and the
/// number of inputs that could not be read.
fn read_requests(inputs: &[PathBuf], output: Option<&Path>) -> (Vec<ExportRequest>, usize) {
    let mut requests = Vec::with_capacity(inputs.len());
    let mut failures = 0usize;
    for input in inputs {
        match ExportRequest::for_file(input, output) {
            Ok(request) => requests.push(request),
            Err(e) => {
                failures += 1;
                eprintln!("{} {}", red("✘"), e);
            }
        }
    }
    (requests, failures)
}

fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExportConfig> {
    let mut builder = ExportConfig::builder()
        .page_size(cli.page_size.into())
        .font_size(cli.font_size)
        .margin(cli.margin)
        .pdf_engine(cli.pdf_engine.clone())
        .backend_timeout_secs(cli.timeout)
        .concurrency(cli.concurrency);

    if let Some(backends) = &cli.backends {
        builder = builder.backends(backends.clone());
    }
    if let Some(font) = &cli.font {
        builder = builder.font_family(font.clone());
    }
    if let Some(font) = &cli.cjk_font {
        builder = builder.cjk_font_family(font.clone());
    }
    if let Some(path) = &cli.cjk_font_path {
        builder = builder.cjk_font_path(path.clone());
    }
    if let Some(path) = &cli.pandoc_path {
        builder = builder.pandoc_path(path.clone());
    }
    if let Some(renderer) = cli.html_renderer {
        builder = builder.html_renderer(renderer.into());
    }
    if let Some(path) = &cli.html_renderer_path {
        builder = builder.html_renderer_path(path.clone());
    }
    if let Some(path) = &cli.pdfium_lib_path {
        builder = builder.pdfium_lib_path(path.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_inputs_are_counted_separately() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("notes.md");
        std::fs::write(&good, "# Notes").unwrap();
        let inputs = vec![good, dir.path().join("missing.md")];

        let (requests, failures) = read_requests(&inputs, None);

        assert_eq!(requests.len(), 1);
        assert_eq!(failures, 1);
        assert_eq!(requests[0].output, dir.path().join("notes.pdf"));
    }

    #[test]
    fn progress_reaches_done_when_an_input_was_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("notes.md");
        std::fs::write(&good, "# Notes").unwrap();
        let inputs = vec![good, dir.path().join("missing.md")];
        let (requests, _) = read_requests(&inputs, None);

        let progress = CliProgressCallback::new(requests.len());
        let result = ExportResult {
            success: false,
            backend: None,
            output: requests[0].output.clone(),
            attempts: Vec::new(),
            diagnostic: None,
            duration_ms: 0,
        };
        progress.on_export_complete(&result);

        assert_eq!(progress.bar.message(), "done");
        progress.finish();
    }
}
