//! Input resolution: the Markdown document and the request that carries it.
//!
//! A [`Document`] is built once and never mutated. Reading the source file
//! happens here, up front, so every backend in the cascade sees exactly the
//! same text and a missing file is reported before any backend runs.

use crate::config::StyleHints;
use crate::error::ExportError;
use crate::fonts::is_cjk;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where the Markdown came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// Read from a file on disk.
    File(PathBuf),
    /// Supplied in memory, e.g. by a note-generation pipeline.
    Text,
}

/// A Markdown document ready for export.
#[derive(Debug, Clone)]
pub struct Document {
    source: DocumentSource,
    markdown: String,
    base_dir: Option<PathBuf>,
}

impl Document {
    /// Read a Markdown file. Invalid UTF-8 is replaced, not rejected.
    ///
    /// Relative image references resolve against the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ExportError> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(ExportError::SourceNotFound { path });
        }

        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(ExportError::PermissionDenied { path });
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExportError::SourceNotFound { path });
            }
            Err(source) => return Err(ExportError::SourceUnreadable { path, source }),
        };

        let markdown = String::from_utf8_lossy(&bytes).into_owned();
        let base_dir = path
            .parent()
            .map(|p| {
                if p.as_os_str().is_empty() {
                    PathBuf::from(".")
                } else {
                    p.to_path_buf()
                }
            })
            .map(|p| std::fs::canonicalize(&p).unwrap_or(p));

        debug!("Read {} bytes of Markdown from {}", markdown.len(), path.display());
        Ok(Self {
            source: DocumentSource::File(path),
            markdown,
            base_dir,
        })
    }

    /// Wrap in-memory Markdown. Call [`with_base_dir`](Self::with_base_dir)
    /// if it references local images by relative path.
    pub fn from_text(markdown: impl Into<String>) -> Self {
        Self {
            source: DocumentSource::Text,
            markdown: markdown.into(),
            base_dir: None,
        }
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn source(&self) -> &DocumentSource {
        &self.source
    }

    pub fn markdown(&self) -> &str {
        &self.markdown
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Text of the first level-1 ATX heading, if any.
    pub fn title(&self) -> Option<&str> {
        let mut in_fence = false;
        for line in self.markdown.lines() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
                continue;
            }
            if in_fence {
                continue;
            }
            if let Some(rest) = trimmed.strip_prefix("# ") {
                let t = rest.trim().trim_end_matches('#').trim();
                if !t.is_empty() {
                    return Some(t);
                }
            }
        }
        None
    }

    /// Whether any character falls in a CJK block.
    pub fn has_cjk(&self) -> bool {
        self.markdown.chars().any(is_cjk)
    }

    /// Resolve an image/link target to a local path.
    ///
    /// Remote (`http://`, `https://`) and `data:` URLs return None. `file://`
    /// URLs and absolute paths are kept; relative paths join the base
    /// directory (or the working directory when there is none).
    pub fn resolve_resource(&self, url: &str) -> Option<PathBuf> {
        let url = url.trim();
        if url.is_empty() || is_remote(url) || url.starts_with("data:") {
            return None;
        }
        let raw = url.strip_prefix("file://").unwrap_or(url);
        // Drop "#fragment" and "?query" suffixes.
        let raw = raw.split(['#', '?']).next().unwrap_or(raw);
        let decoded = raw.replace("%20", " ");
        let path = PathBuf::from(decoded);
        if path.is_absolute() {
            return Some(path);
        }
        Some(match &self.base_dir {
            Some(base) => base.join(path),
            None => path,
        })
    }
}

/// Check if a resource reference points at the network.
pub fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// One export job: a document, a destination, and formatting hints.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub document: Document,
    pub output: PathBuf,
    pub style: StyleHints,
}

impl ExportRequest {
    pub fn new(document: Document, output: impl Into<PathBuf>) -> Self {
        Self {
            document,
            output: output.into(),
            style: StyleHints::default(),
        }
    }

    /// Read `input` and target `output`, or `<input>.pdf` next to it.
    pub fn for_file(input: impl AsRef<Path>, output: Option<&Path>) -> Result<Self, ExportError> {
        let input = input.as_ref();
        let document = Document::from_file(input)?;
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_output_path(input));
        Ok(Self::new(document, output))
    }

    pub fn with_style(mut self, style: StyleHints) -> Self {
        self.style = style;
        self
    }
}

/// `notes/lecture.md` → `notes/lecture.pdf`.
pub fn default_output_path(markdown: &Path) -> PathBuf {
    markdown.with_extension("pdf")
}
