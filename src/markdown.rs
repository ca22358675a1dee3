//! Markdown analysis shared by the in-process backends.
//!
//! Two views of a document are produced here:
//!
//! * [`parse_blocks`] builds a flat list of layout [`Block`]s with styled
//!   inline [`Span`]s. The pdfium backend lays these out.
//! * [`plain_text_lines`] strips every bit of markup and returns printable
//!   lines. The plain-text fallback paginates these.
//!
//! ## Rule order for plain text
//!
//! Line rules run first (headings, bullets, fences), then inline rules on
//! non-code lines: images before links (an image is a link with a leading
//! `!`), links before emphasis, and HTML tags last.

use once_cell::sync::Lazy;
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use regex::Regex;

/// Inline emphasis carried by a [`Span`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanStyle {
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
}

/// A run of text sharing one style. A span whose text is `"\n"` is a hard
/// line break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub style: SpanStyle,
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: SpanStyle::default(),
        }
    }

    pub fn is_break(&self) -> bool {
        self.text == "\n"
    }
}

/// A block-level element, flattened (nesting is expressed as `depth`).
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading { level: u8, spans: Vec<Span> },
    Paragraph { spans: Vec<Span> },
    /// `marker` is empty for continuation paragraphs inside an item.
    ListItem { depth: usize, marker: String, spans: Vec<Span> },
    Quote { spans: Vec<Span> },
    Code { lines: Vec<String> },
    Image { src: String, alt: String },
    Table { rows: Vec<Vec<String>> },
    Rule,
}

/// Concatenated text of a span list.
pub fn spans_text(spans: &[Span]) -> String {
    spans.iter().map(|s| s.text.as_str()).collect()
}

/// pulldown-cmark extensions used everywhere in this crate.
pub fn parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum InlineTarget {
    Heading(u8),
    Paragraph,
    Item(usize),
    Quote,
}

#[derive(Default)]
struct BlockBuilder {
    blocks: Vec<Block>,
    target: Option<InlineTarget>,
    spans: Vec<Span>,
    bold: usize,
    italic: usize,
    /// Counter per open list; None for bullet lists.
    lists: Vec<Option<u64>>,
    item_depths: Vec<usize>,
    pending_marker: Option<String>,
    quote_depth: usize,
    code: Option<String>,
    image: Option<(String, String)>,
    table: Option<Vec<Vec<String>>>,
    row: Vec<String>,
    cell: Option<String>,
    footnote_label: Option<String>,
}

impl BlockBuilder {
    fn style(&self, code: bool) -> SpanStyle {
        SpanStyle {
            bold: self.bold > 0,
            italic: self.italic > 0,
            code,
        }
    }

    fn push_text(&mut self, text: &str, code: bool) {
        if let Some(cell) = self.cell.as_mut() {
            cell.push_str(text);
            return;
        }
        if self.target.is_none() {
            self.target = Some(self.container_target());
        }
        let style = self.style(code);
        match self.spans.last_mut() {
            Some(last) if last.style == style && !last.is_break() && text != "\n" => {
                last.text.push_str(text)
            }
            _ => self.spans.push(Span {
                text: text.to_string(),
                style,
            }),
        }
    }

    /// Target for loose text given the surrounding containers.
    fn container_target(&self) -> InlineTarget {
        if let Some(depth) = self.item_depths.last() {
            InlineTarget::Item(*depth)
        } else if self.quote_depth > 0 {
            InlineTarget::Quote
        } else {
            InlineTarget::Paragraph
        }
    }

    fn flush(&mut self) {
        let mut spans = std::mem::take(&mut self.spans);
        let Some(target) = self.target else {
            return;
        };
        while spans.last().is_some_and(Span::is_break) {
            spans.pop();
        }
        if spans_text(&spans).trim().is_empty() {
            return;
        }
        let block = match target {
            InlineTarget::Heading(level) => Block::Heading { level, spans },
            InlineTarget::Paragraph => Block::Paragraph { spans },
            InlineTarget::Quote => Block::Quote { spans },
            InlineTarget::Item(depth) => Block::ListItem {
                depth,
                marker: self.pending_marker.take().unwrap_or_default(),
                spans,
            },
        };
        self.blocks.push(block);
    }

    fn handle(&mut self, event: Event<'_>) {
        if let Some(buf) = self.code.as_mut() {
            match event {
                Event::Text(t) => {
                    buf.push_str(&t);
                    return;
                }
                Event::End(TagEnd::CodeBlock) => {}
                _ => return,
            }
        }

        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(t) => {
                if let Some((_, alt)) = self.image.as_mut() {
                    alt.push_str(&t);
                } else {
                    self.push_text(&t, false);
                }
            }
            Event::Code(t) => {
                if let Some((_, alt)) = self.image.as_mut() {
                    alt.push_str(&t);
                } else {
                    self.push_text(&t, true);
                }
            }
            Event::SoftBreak => {
                if self.image.is_none() {
                    self.push_text(" ", false);
                }
            }
            Event::HardBreak => {
                if self.cell.is_some() {
                    self.push_text(" ", false);
                } else if self.image.is_none() {
                    self.push_text("\n", false);
                }
            }
            Event::Rule => {
                self.flush();
                self.target = None;
                self.blocks.push(Block::Rule);
            }
            Event::TaskListMarker(checked) => {
                self.push_text(if checked { "[x] " } else { "[ ] " }, false);
            }
            Event::FootnoteReference(name) => {
                self.push_text(&format!("[{name}]"), false);
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush();
                self.target = Some(InlineTarget::Heading(level as u8));
            }
            Tag::Paragraph => {
                if !matches!(self.target, Some(InlineTarget::Item(_))) {
                    self.flush();
                    self.target = Some(self.container_target());
                }
                if let Some(label) = self.footnote_label.take() {
                    self.push_text(&label, false);
                }
            }
            Tag::BlockQuote(..) => {
                self.flush();
                self.quote_depth += 1;
                self.target = None;
            }
            Tag::CodeBlock(_) => {
                self.flush();
                self.target = None;
                self.code = Some(String::new());
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush();
                let depth = self.lists.len().saturating_sub(1);
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let m = format!("{n}.");
                        *n += 1;
                        m
                    }
                    _ => "•".to_string(),
                };
                self.item_depths.push(depth);
                self.pending_marker = Some(marker);
                self.target = Some(InlineTarget::Item(depth));
            }
            Tag::Emphasis => self.italic += 1,
            Tag::Strong => self.bold += 1,
            Tag::Image { dest_url, .. } => {
                self.image = Some((dest_url.to_string(), String::new()));
            }
            Tag::Table(_) => {
                self.flush();
                self.target = None;
                self.table = Some(Vec::new());
            }
            Tag::TableHead | Tag::TableRow => self.row.clear(),
            Tag::TableCell => self.cell = Some(String::new()),
            Tag::FootnoteDefinition(name) => {
                self.flush();
                self.target = None;
                self.footnote_label = Some(format!("[{name}]: "));
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Heading(_) => {
                self.flush();
                self.target = None;
            }
            TagEnd::Paragraph => {
                self.flush();
                self.target = self.item_depths.last().map(|d| InlineTarget::Item(*d));
            }
            TagEnd::BlockQuote(..) => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.target = None;
            }
            TagEnd::CodeBlock => {
                if let Some(buf) = self.code.take() {
                    let lines = buf.trim_end_matches('\n').lines().map(str::to_string).collect();
                    self.blocks.push(Block::Code { lines });
                }
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
                self.target = self.item_depths.last().map(|d| InlineTarget::Item(*d));
            }
            TagEnd::Item => {
                self.flush();
                self.item_depths.pop();
                self.pending_marker = None;
                self.target = self.item_depths.last().map(|d| InlineTarget::Item(*d));
            }
            TagEnd::Emphasis => self.italic = self.italic.saturating_sub(1),
            TagEnd::Strong => self.bold = self.bold.saturating_sub(1),
            TagEnd::Image => {
                if let Some((src, alt)) = self.image.take() {
                    if let Some(cell) = self.cell.as_mut() {
                        cell.push_str(&format!("[image: {alt}]"));
                        return;
                    }
                    let target = self.target;
                    self.flush();
                    self.blocks.push(Block::Image { src, alt });
                    self.target = target;
                }
            }
            TagEnd::TableCell => {
                if let Some(cell) = self.cell.take() {
                    self.row.push(cell.trim().to_string());
                }
            }
            TagEnd::TableHead | TagEnd::TableRow => {
                let row = std::mem::take(&mut self.row);
                if let Some(table) = self.table.as_mut() {
                    table.push(row);
                }
            }
            TagEnd::Table => {
                if let Some(rows) = self.table.take() {
                    self.blocks.push(Block::Table { rows });
                }
            }
            TagEnd::FootnoteDefinition => {
                self.flush();
                self.target = None;
            }
            _ => {}
        }
    }
}

/// Parse Markdown into layout blocks.
pub fn parse_blocks(markdown: &str) -> Vec<Block> {
    let mut builder = BlockBuilder::default();
    for event in Parser::new_ext(markdown, parser_options()) {
        builder.handle(event);
    }
    builder.flush();
    builder.blocks
}

// ── Plain-text stripping ─────────────────────────────────────────────────

static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").unwrap());
static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap());
static RE_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\*\*|__)(.+?)(\*\*|__)").unwrap());
static RE_ITALIC_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\s][^*]*)\*").unwrap());
static RE_ITALIC_UNDERSCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[^\w])_([^_\s][^_]*)_([^\w]|$)").unwrap());
static RE_STRIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"~~(.+?)~~").unwrap());
static RE_INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]*)`").unwrap());
static RE_HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[A-Za-z][^>]*>").unwrap());
static RE_TABLE_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\|?\s*:?-{2,}:?\s*(\|\s*:?-{2,}:?\s*)*\|?$").unwrap());
static RE_ORDERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+[.)] ").unwrap());

/// Strip inline markup from one line of text.
pub fn strip_inline(line: &str) -> String {
    let s = RE_IMAGE.replace_all(line, "[image: $1]");
    let s = RE_LINK.replace_all(&s, "$1");
    let s = RE_INLINE_CODE.replace_all(&s, "$1");
    let s = RE_BOLD.replace_all(&s, "$2");
    let s = RE_ITALIC_STAR.replace_all(&s, "$1");
    let s = RE_ITALIC_UNDERSCORE.replace_all(&s, "$1$2$3");
    let s = RE_STRIKE.replace_all(&s, "$1");
    let s = RE_HTML_TAG.replace_all(&s, "");
    s.into_owned()
}

/// Turn Markdown into printable lines for the plain-text fallback.
///
/// * `# Title` → `====== Title ======` (7 − level `=` on each side)
/// * `- item` / `* item` / `+ item` → `• item`
/// * code fences → `----- code -----`, code content kept verbatim
/// * table rows → cells joined with ` | `, separator rows dropped
/// * `> quote` → `  quote`, horizontal rules → a line of dashes
pub fn plain_text_lines(markdown: &str) -> Vec<String> {
    let normalised = markdown.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = Vec::new();
    let mut in_code = false;

    for raw in normalised.split('\n') {
        let trimmed = raw.trim();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_code = !in_code;
            out.push("----- code -----".to_string());
            continue;
        }
        if in_code {
            out.push(raw.trim_end().to_string());
            continue;
        }
        if trimmed.is_empty() {
            out.push(String::new());
            continue;
        }

        let indent = " ".repeat((raw.len() - raw.trim_start().len()).min(8));

        if trimmed.starts_with('#') {
            let level = trimmed.chars().take_while(|c| *c == '#').count();
            if level <= 6 {
                let title = strip_inline(trimmed[level..].trim().trim_end_matches('#').trim());
                let bar = "=".repeat(7 - level);
                out.push(format!("{bar} {title} {bar}"));
            } else {
                out.push(strip_inline(trimmed));
            }
            continue;
        }

        if ["---", "***", "___"].contains(&trimmed.replace(' ', "").as_str()) {
            out.push("-".repeat(40));
            continue;
        }

        if let Some(rest) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
            .or_else(|| trimmed.strip_prefix("+ "))
        {
            out.push(format!("{indent}• {}", strip_inline(rest)));
            continue;
        }

        if RE_ORDERED.is_match(trimmed) {
            out.push(format!("{indent}{}", strip_inline(trimmed)));
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix('>') {
            out.push(format!("  {}", strip_inline(rest.trim_start_matches('>').trim())));
            continue;
        }

        if trimmed.starts_with('|') {
            if RE_TABLE_SEPARATOR.is_match(trimmed) {
                continue;
            }
            let cells: Vec<String> = trimmed
                .trim_matches('|')
                .split('|')
                .map(|c| strip_inline(c.trim()))
                .collect();
            out.push(cells.join(" | "));
            continue;
        }

        out.push(strip_inline(trimmed));
    }

    while matches!(out.last(), Some(l) if l.is_empty()) {
        out.pop();
    }
    out
}

/// Hard-wrap a line at `width` characters, preferring word boundaries.
/// Continuation lines keep the original line's leading indent.
pub fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let width = width.max(8);
    if line.chars().count() <= width {
        return vec![line.to_string()];
    }
    let indent_len = line.chars().take_while(|c| *c == ' ').count();
    let base = if indent_len * 2 > width { 0 } else { indent_len };
    let indent = " ".repeat(base);

    let mut lines = Vec::new();
    let mut current = indent.clone();
    let mut len = base;

    for word in line.split_whitespace() {
        let mut chars: Vec<char> = word.chars().collect();
        while !chars.is_empty() {
            let sep = usize::from(len > base);
            if len + sep + chars.len() <= width {
                if sep == 1 {
                    current.push(' ');
                }
                len += sep + chars.len();
                current.extend(chars.drain(..));
            } else if len > base {
                lines.push(std::mem::replace(&mut current, indent.clone()));
                len = base;
            } else {
                // Word longer than a whole line: split it.
                let room = (width - base).min(chars.len());
                current.extend(chars.drain(..room));
                lines.push(std::mem::replace(&mut current, indent.clone()));
                len = base;
            }
        }
    }
    if len > base {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Blocks ──────────────────────────────────────────────────────────────

    #[test]
    fn test_parse_heading_and_paragraph() {
        let blocks = parse_blocks("# Title\n\nSome **bold** text");
        assert_eq!(blocks.len(), 2);
        match &blocks[0] {
            Block::Heading { level, spans } => {
                assert_eq!(*level, 1);
                assert_eq!(spans_text(spans), "Title");
            }
            other => panic!("expected heading, got {other:?}"),
        }
        match &blocks[1] {
            Block::Paragraph { spans } => {
                assert_eq!(spans_text(spans), "Some bold text");
                assert!(spans.iter().any(|s| s.style.bold && s.text == "bold"));
            }
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_nested_lists() {
        let blocks = parse_blocks("- one\n  - inner\n- two\n\n1. first\n2. second\n");
        let items: Vec<(usize, String, String)> = blocks
            .iter()
            .filter_map(|b| match b {
                Block::ListItem { depth, marker, spans } => {
                    Some((*depth, marker.clone(), spans_text(spans)))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            items,
            vec![
                (0, "•".into(), "one".into()),
                (1, "•".into(), "inner".into()),
                (0, "•".into(), "two".into()),
                (0, "1.".into(), "first".into()),
                (0, "2.".into(), "second".into()),
            ]
        );
    }

    #[test]
    fn test_parse_code_and_table() {
        let md = "```rust\nfn main() {}\n  let x = 1;\n```\n\n| a | b |\n|---|---|\n| 1 | `2` |\n";
        let blocks = parse_blocks(md);
        assert_eq!(
            blocks[0],
            Block::Code {
                lines: vec!["fn main() {}".into(), "  let x = 1;".into()]
            }
        );
        assert_eq!(
            blocks[1],
            Block::Table {
                rows: vec![vec!["a".into(), "b".into()], vec!["1".into(), "2".into()]]
            }
        );
    }

    #[test]
    fn test_parse_image_splits_paragraph() {
        let blocks = parse_blocks("Before ![diagram](img/d.png) after");
        assert_eq!(blocks.len(), 3);
        assert_eq!(
            blocks[1],
            Block::Image {
                src: "img/d.png".into(),
                alt: "diagram".into()
            }
        );
        assert!(matches!(&blocks[2], Block::Paragraph { spans } if spans_text(spans).trim() == "after"));
    }

    #[test]
    fn test_parse_quote_rule_and_tasks() {
        let blocks = parse_blocks("> quoted *line*\n\n---\n\n- [x] done\n");
        assert!(matches!(&blocks[0], Block::Quote { spans } if spans_text(spans) == "quoted line"));
        assert_eq!(blocks[1], Block::Rule);
        assert!(matches!(&blocks[2], Block::ListItem { spans, .. } if spans_text(spans) == "[x] done"));
    }

    #[test]
    fn test_parse_hard_break() {
        let blocks = parse_blocks("line one  \nline two");
        match &blocks[0] {
            Block::Paragraph { spans } => assert!(spans.iter().any(Span::is_break)),
            other => panic!("unexpected {other:?}"),
        }
    }

    // ── Plain text ──────────────────────────────────────────────────────────

    #[test]
    fn test_plain_text_headings() {
        let lines = plain_text_lines("# Title\n### Sub");
        assert_eq!(lines, vec!["====== Title ======", "==== Sub ===="]);
    }

    #[test]
    fn test_plain_text_lists_and_code() {
        let lines = plain_text_lines("- a\n* b\n1. c\n```\n*raw* code\n```\n");
        assert_eq!(
            lines,
            vec![
                "• a",
                "• b",
                "1. c",
                "----- code -----",
                "*raw* code",
                "----- code -----"
            ]
        );
    }

    #[test]
    fn test_plain_text_inline_stripping() {
        let lines = plain_text_lines(
            "Some **bold**, *italic*, `code`, [link](http://x) and ![alt](a.png) <b>html</b> ~~gone~~",
        );
        assert_eq!(
            lines,
            vec!["Some bold, italic, code, link and [image: alt] html gone"]
        );
    }

    #[test]
    fn test_plain_text_tables() {
        let lines = plain_text_lines("| a | b |\n|:--|--:|\n| 1 | 2 |");
        assert_eq!(lines, vec!["a | b", "1 | 2"]);
    }

    #[test]
    fn test_plain_text_keeps_snake_case() {
        assert_eq!(plain_text_lines("call my_func_name now"), vec!["call my_func_name now"]);
    }

    #[test]
    fn test_plain_text_trims_trailing_blank_lines() {
        assert_eq!(plain_text_lines("x\n\n\n"), vec!["x"]);
        assert!(plain_text_lines("").is_empty());
    }

    #[test]
    fn test_wrap_line() {
        assert_eq!(wrap_line("short", 20), vec!["short"]);
        let wrapped = wrap_line("the quick brown fox jumps over the lazy dog", 16);
        assert!(wrapped.iter().all(|l| l.chars().count() <= 16), "{wrapped:?}");
        assert_eq!(wrapped.join(" "), "the quick brown fox jumps over the lazy dog");
    }

    #[test]
    fn test_wrap_long_word() {
        let wrapped = wrap_line(&"x".repeat(25), 10);
        assert_eq!(wrapped, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }
}
