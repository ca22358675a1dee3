//! Page layout for the direct PDF-library backend.
//!
//! Turns [`Block`]s into positioned drawing operations: word wrapping with
//! estimated glyph widths, pagination, heading scale, list and quote
//! indentation, code blocks in a monospace face and scaled images. Nothing
//! here touches pdfium, so layout decisions are unit-testable without the
//! shared library.
//!
//! Coordinates are PDF points with the origin at the bottom-left corner;
//! a text operation's `y` is its baseline.

use crate::config::StyleHints;
use crate::document::Document;
use crate::fonts::{is_cjk, is_winansi};
use crate::markdown::{Block, Span, SpanStyle};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;

/// Which font a text run is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontRole {
    Regular,
    Bold,
    Italic,
    BoldItalic,
    Mono,
    /// The embedded TrueType font used for characters outside WinAnsi.
    Fallback,
}

impl FontRole {
    fn from_style(style: SpanStyle) -> Self {
        match (style.code, style.bold, style.italic) {
            (true, _, _) => FontRole::Mono,
            (false, true, true) => FontRole::BoldItalic,
            (false, true, false) => FontRole::Bold,
            (false, false, true) => FontRole::Italic,
            (false, false, false) => FontRole::Regular,
        }
    }
}

/// A positioned drawing operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text {
        x: f32,
        y: f32,
        text: String,
        role: FontRole,
        size: f32,
    },
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        path: PathBuf,
    },
    Rule {
        x1: f32,
        x2: f32,
        y: f32,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub ops: Vec<DrawOp>,
}

/// Output of [`layout_document`].
#[derive(Debug, Clone)]
pub struct Layout {
    pub page_width: f32,
    pub page_height: f32,
    /// Never empty.
    pub pages: Vec<PageLayout>,
    /// Characters replaced with `?` because no font covered them.
    pub substituted: usize,
}

impl Layout {
    /// All text on every page, in drawing order.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for page in &self.pages {
            for op in &page.ops {
                if let DrawOp::Text { text, .. } = op {
                    out.push_str(text);
                }
            }
        }
        out
    }

    pub fn uses_role(&self, role: FontRole) -> bool {
        self.pages.iter().flat_map(|p| &p.ops).any(|op| {
            matches!(op, DrawOp::Text { role: r, .. } if *r == role)
        })
    }
}

#[derive(Debug, Clone)]
pub struct LayoutOptions {
    pub page_width: f32,
    pub page_height: f32,
    pub margin: f32,
    pub font_size: f32,
    /// Characters the fallback font has glyphs for.
    pub fallback_chars: HashSet<char>,
}

impl LayoutOptions {
    pub fn from_style(style: &StyleHints) -> Self {
        let (page_width, page_height) = style.page_size.dimensions_pt();
        Self {
            page_width,
            page_height,
            margin: style.margin,
            font_size: style.font_size,
            fallback_chars: HashSet::new(),
        }
    }

    pub fn with_fallback_chars(mut self, chars: impl IntoIterator<Item = char>) -> Self {
        self.fallback_chars = chars.into_iter().collect();
        self
    }
}

const LINE_SPACING: f32 = 1.4;
const LIST_INDENT: f32 = 18.0;
const PX_TO_PT: f32 = 0.75;

fn heading_scale(level: u8) -> f32 {
    match level {
        1 => 1.8,
        2 => 1.5,
        3 => 1.3,
        4 => 1.15,
        _ => 1.0,
    }
}

/// Estimated advance width of `c` in points.
pub fn char_width(c: char, role: FontRole, size: f32) -> f32 {
    let factor = match role {
        FontRole::Fallback => {
            if is_cjk(c) {
                1.0
            } else {
                0.6
            }
        }
        FontRole::Mono => 0.6,
        _ if c == ' ' => 0.28,
        FontRole::Bold | FontRole::BoldItalic => {
            if c.is_uppercase() {
                0.72
            } else {
                0.56
            }
        }
        _ => {
            if c.is_uppercase() {
                0.67
            } else {
                0.5
            }
        }
    };
    factor * size
}

fn text_width(text: &str, role: FontRole, size: f32) -> f32 {
    text.chars().map(|c| char_width(c, role, size)).sum()
}

/// Split `text` into runs a single font can draw.
///
/// WinAnsi characters keep `role`; others switch to [`FontRole::Fallback`]
/// when the fallback covers them, and become `?` otherwise.
pub fn split_runs(
    text: &str,
    role: FontRole,
    fallback: &HashSet<char>,
    substituted: &mut usize,
) -> Vec<(String, FontRole)> {
    let mut runs: Vec<(String, FontRole)> = Vec::new();
    for c in text.chars() {
        if c.is_control() {
            continue;
        }
        let (c, r) = if is_winansi(c) {
            (c, role)
        } else if fallback.contains(&c) {
            (c, FontRole::Fallback)
        } else {
            *substituted += 1;
            ('?', role)
        };
        match runs.last_mut() {
            Some((s, last)) if *last == r => s.push(c),
            _ => runs.push((c.to_string(), r)),
        }
    }
    runs
}

#[derive(Debug, Clone)]
struct Frag {
    text: String,
    role: FontRole,
    width: f32,
}

/// An unbreakable unit: one word, or a single CJK character.
#[derive(Debug, Default)]
struct Token {
    frags: Vec<Frag>,
    width: f32,
    space_before: bool,
}

impl Token {
    fn push(&mut self, c: char, role: FontRole, size: f32) {
        let w = char_width(c, role, size);
        self.width += w;
        match self.frags.last_mut() {
            Some(f) if f.role == role => {
                f.text.push(c);
                f.width += w;
            }
            _ => self.frags.push(Frag {
                text: c.to_string(),
                role,
                width: w,
            }),
        }
    }

    fn is_empty(&self) -> bool {
        self.frags.is_empty()
    }
}

/// One wrapped line before placement.
type Line = Vec<Frag>;

struct Wrapper {
    max_width: f32,
    size: f32,
    lines: Vec<Line>,
    line: Line,
    line_width: f32,
}

impl Wrapper {
    fn new(max_width: f32, size: f32) -> Self {
        Self {
            max_width: max_width.max(size * 4.0),
            size,
            lines: Vec::new(),
            line: Vec::new(),
            line_width: 0.0,
        }
    }

    fn break_line(&mut self) {
        self.lines.push(std::mem::take(&mut self.line));
        self.line_width = 0.0;
    }

    fn push_token(&mut self, token: Token) {
        if token.is_empty() {
            return;
        }
        let lead_role = token.frags[0].role;
        let space = if token.space_before && !self.line.is_empty() {
            char_width(' ', lead_role, self.size)
        } else {
            0.0
        };

        if !self.line.is_empty() && self.line_width + space + token.width > self.max_width {
            self.break_line();
        }

        if self.line.is_empty() && token.width > self.max_width {
            // Too long for any line: break between characters.
            for frag in token.frags {
                for c in frag.text.chars() {
                    let w = char_width(c, frag.role, self.size);
                    if !self.line.is_empty() && self.line_width + w > self.max_width {
                        self.break_line();
                    }
                    self.append(c.to_string(), frag.role, w);
                }
            }
            return;
        }

        if space > 0.0 {
            self.append(" ".to_string(), lead_role, space);
        }
        for frag in token.frags {
            self.append(frag.text, frag.role, frag.width);
        }
    }

    fn append(&mut self, text: String, role: FontRole, width: f32) {
        self.line_width += width;
        match self.line.last_mut() {
            Some(f) if f.role == role => {
                f.text.push_str(&text);
                f.width += width;
            }
            _ => self.line.push(Frag { text, role, width }),
        }
    }

    fn finish(mut self) -> Vec<Line> {
        if !self.line.is_empty() {
            self.break_line();
        }
        self.lines
    }
}

/// Wrap styled spans into lines no wider than `max_width`.
fn wrap_spans(
    spans: &[Span],
    base_role: Option<FontRole>,
    size: f32,
    max_width: f32,
    fallback: &HashSet<char>,
    substituted: &mut usize,
) -> Vec<Line> {
    let mut wrapper = Wrapper::new(max_width, size);
    let mut token = Token::default();
    let mut pending_space = false;

    for span in spans {
        if span.is_break() {
            wrapper.push_token(std::mem::take(&mut token));
            wrapper.break_line();
            pending_space = false;
            continue;
        }
        let role = match base_role {
            Some(FontRole::Italic) if !span.style.code => {
                if span.style.bold {
                    FontRole::BoldItalic
                } else {
                    FontRole::Italic
                }
            }
            Some(r) if span.style == SpanStyle::default() => r,
            _ => FontRole::from_style(span.style),
        };
        for (run, run_role) in split_runs(&span.text, role, fallback, substituted) {
            for c in run.chars() {
                if c.is_whitespace() {
                    if !token.is_empty() {
                        wrapper.push_token(std::mem::take(&mut token));
                    }
                    pending_space = true;
                    continue;
                }
                if is_cjk(c) {
                    if !token.is_empty() {
                        wrapper.push_token(std::mem::take(&mut token));
                        pending_space = false;
                    }
                    let mut single = Token {
                        space_before: pending_space,
                        ..Token::default()
                    };
                    single.push(c, run_role, size);
                    wrapper.push_token(single);
                    pending_space = false;
                    continue;
                }
                if token.is_empty() {
                    token.space_before = pending_space;
                    pending_space = false;
                }
                token.push(c, run_role, size);
            }
        }
    }
    wrapper.push_token(token);
    wrapper.finish()
}

struct Cursor<'a> {
    opts: &'a LayoutOptions,
    pages: Vec<PageLayout>,
    /// Top of the next line.
    y: f32,
    substituted: usize,
}

impl<'a> Cursor<'a> {
    fn new(opts: &'a LayoutOptions) -> Self {
        Self {
            opts,
            pages: vec![PageLayout::default()],
            y: opts.page_height - opts.margin,
            substituted: 0,
        }
    }

    fn left(&self) -> f32 {
        self.opts.margin
    }

    fn content_width(&self) -> f32 {
        self.opts.page_width - 2.0 * self.opts.margin
    }

    fn content_height(&self) -> f32 {
        self.opts.page_height - 2.0 * self.opts.margin
    }

    fn at_page_top(&self) -> bool {
        (self.y - (self.opts.page_height - self.opts.margin)).abs() < f32::EPSILON
    }

    fn new_page(&mut self) {
        self.pages.push(PageLayout::default());
        self.y = self.opts.page_height - self.opts.margin;
    }

    fn ensure_space(&mut self, height: f32) {
        if self.y - height < self.opts.margin && !self.at_page_top() {
            self.new_page();
        }
    }

    fn gap(&mut self, height: f32) {
        if !self.at_page_top() {
            self.y -= height;
        }
    }

    fn push(&mut self, op: DrawOp) {
        if let Some(page) = self.pages.last_mut() {
            page.ops.push(op);
        }
    }

    fn place_line(&mut self, x: f32, line: Line, size: f32) {
        let height = size * LINE_SPACING;
        self.ensure_space(height);
        let baseline = self.y - size;
        let mut cursor_x = x;
        for frag in line {
            let width = frag.width;
            if !frag.text.trim().is_empty() {
                self.push(DrawOp::Text {
                    x: cursor_x,
                    y: baseline,
                    text: frag.text,
                    role: frag.role,
                    size,
                });
            }
            cursor_x += width;
        }
        self.y -= height;
    }

    fn place_spans(&mut self, x: f32, spans: &[Span], base_role: Option<FontRole>, size: f32) {
        let max_width = self.content_width() - (x - self.left());
        let mut substituted = 0;
        let lines = wrap_spans(
            spans,
            base_role,
            size,
            max_width,
            &self.opts.fallback_chars,
            &mut substituted,
        );
        self.substituted += substituted;
        for line in lines {
            self.place_line(x, line, size);
        }
    }

    fn place_plain(&mut self, x: f32, text: &str, role: FontRole, size: f32) {
        let span = Span {
            text: text.to_string(),
            style: SpanStyle::default(),
        };
        self.place_spans(x, std::slice::from_ref(&span), Some(role), size);
    }
}

/// Lay out `blocks` onto pages. Relative image paths resolve against the
/// document's base directory.
pub fn layout_document(blocks: &[Block], document: &Document, opts: &LayoutOptions) -> Layout {
    let base = opts.font_size;
    let mut cur = Cursor::new(opts);

    for block in blocks {
        match block {
            Block::Heading { level, spans } => {
                let size = base * heading_scale(*level);
                cur.gap(size * 0.6);
                // Keep a heading together with at least one following line.
                cur.ensure_space(size * LINE_SPACING + base * LINE_SPACING);
                let x = cur.left();
                cur.place_spans(x, spans, Some(FontRole::Bold), size);
                cur.gap(size * 0.2);
            }
            Block::Paragraph { spans } => {
                let x = cur.left();
                cur.place_spans(x, spans, None, base);
                cur.gap(base * 0.5);
            }
            Block::ListItem {
                depth,
                marker,
                spans,
            } => {
                let marker_x = cur.left() + LIST_INDENT * (*depth as f32);
                let marker_width = text_width(marker, FontRole::Regular, base) + base * 0.5;
                let text_x = marker_x + marker_width.max(LIST_INDENT);
                if !marker.is_empty() {
                    cur.ensure_space(base * LINE_SPACING);
                    let baseline = cur.y - base;
                    cur.push(DrawOp::Text {
                        x: marker_x,
                        y: baseline,
                        text: marker.clone(),
                        role: FontRole::Regular,
                        size: base,
                    });
                }
                cur.place_spans(text_x, spans, None, base);
                cur.gap(base * 0.2);
            }
            Block::Quote { spans } => {
                let x = cur.left() + LIST_INDENT;
                cur.place_spans(x, spans, Some(FontRole::Italic), base);
                cur.gap(base * 0.5);
            }
            Block::Code { lines } => {
                let size = base * 0.9;
                let x = cur.left() + 10.0;
                for line in lines {
                    if line.trim().is_empty() {
                        cur.ensure_space(size * LINE_SPACING);
                        cur.y -= size * LINE_SPACING;
                        continue;
                    }
                    let mut substituted = 0;
                    let runs = split_runs(
                        line,
                        FontRole::Mono,
                        &opts.fallback_chars,
                        &mut substituted,
                    );
                    cur.substituted += substituted;
                    let max_width = cur.content_width() - 10.0;
                    let mut wrapper = Wrapper::new(max_width, size);
                    for (text, role) in runs {
                        for c in text.chars() {
                            let w = char_width(c, role, size);
                            if !wrapper.line.is_empty() && wrapper.line_width + w > max_width {
                                wrapper.break_line();
                            }
                            wrapper.append(c.to_string(), role, w);
                        }
                    }
                    for l in wrapper.finish() {
                        cur.place_line(x, l, size);
                    }
                }
                cur.gap(base * 0.5);
            }
            Block::Image { src, alt } => {
                place_image(&mut cur, document, src, alt, base);
            }
            Block::Table { rows } => {
                let x = cur.left();
                for (i, row) in rows.iter().enumerate() {
                    let role = if i == 0 { FontRole::Bold } else { FontRole::Regular };
                    cur.place_plain(x, &row.join(" | "), role, base);
                }
                cur.gap(base * 0.5);
            }
            Block::Rule => {
                cur.gap(base * 0.4);
                cur.ensure_space(base);
                let y = cur.y - base * 0.5;
                let (x1, x2) = (cur.left(), cur.left() + cur.content_width());
                cur.push(DrawOp::Rule { x1, x2, y });
                cur.y -= base;
            }
        }
    }

    Layout {
        page_width: opts.page_width,
        page_height: opts.page_height,
        pages: cur.pages,
        substituted: cur.substituted,
    }
}

fn place_image(cur: &mut Cursor<'_>, document: &Document, src: &str, alt: &str, base: f32) {
    let resolved = document
        .resolve_resource(src)
        .and_then(|path| match image::image_dimensions(&path) {
            Ok(dims) => Some((path, dims)),
            Err(e) => {
                debug!("Image {} unusable: {}", path.display(), e);
                None
            }
        });

    let Some((path, (px_w, px_h))) = resolved else {
        let label = if alt.trim().is_empty() {
            format!("[image: {src}]")
        } else {
            format!("[image: {alt}]")
        };
        let x = cur.left();
        cur.place_plain(x, &label, FontRole::Italic, base);
        cur.gap(base * 0.5);
        return;
    };

    let mut width = px_w.max(1) as f32 * PX_TO_PT;
    let mut height = px_h.max(1) as f32 * PX_TO_PT;
    let max_w = cur.content_width();
    let max_h = cur.content_height() * 0.8;
    let scale = (max_w / width).min(max_h / height).min(1.0);
    width *= scale;
    height *= scale;

    cur.ensure_space(height);
    let x = cur.left();
    let y = cur.y - height;
    cur.push(DrawOp::Image {
        x,
        y,
        width,
        height,
        path,
    });
    cur.y = y;
    cur.gap(base * 0.5);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::parse_blocks;

    fn opts() -> LayoutOptions {
        LayoutOptions::from_style(&StyleHints::default())
    }

    fn layout(md: &str, opts: &LayoutOptions) -> Layout {
        let doc = Document::from_text(md);
        layout_document(&parse_blocks(md), &doc, opts)
    }

    #[test]
    fn empty_document_has_one_page() {
        let l = layout("", &opts());
        assert_eq!(l.pages.len(), 1);
        assert!(l.pages[0].ops.is_empty());
    }

    #[test]
    fn heading_is_bold_and_larger() {
        let l = layout("# Title\n\nbody", &opts());
        let ops = &l.pages[0].ops;
        match (&ops[0], &ops[1]) {
            (
                DrawOp::Text {
                    text: t1,
                    role: FontRole::Bold,
                    size: s1,
                    y: y1,
                    ..
                },
                DrawOp::Text {
                    text: t2,
                    role: FontRole::Regular,
                    size: s2,
                    y: y2,
                    ..
                },
            ) => {
                assert_eq!(t1, "Title");
                assert_eq!(t2, "body");
                assert!(s1 > s2);
                assert!(y1 > y2, "heading above body");
            }
            other => panic!("unexpected ops {other:?}"),
        }
    }

    #[test]
    fn text_stays_inside_margins() {
        let md = "word ".repeat(2000);
        let o = opts();
        let l = layout(&md, &o);
        assert!(l.pages.len() > 1, "long text paginates");
        for page in &l.pages {
            for op in &page.ops {
                if let DrawOp::Text { x, y, text, role, size } = op {
                    assert!(*x >= o.margin - 0.01);
                    assert!(*x + text_width(text, *role, *size) <= o.page_width - o.margin + 0.5);
                    assert!(*y >= o.margin - 0.01, "baseline {y} below bottom margin");
                }
            }
        }
    }

    #[test]
    fn cjk_without_fallback_is_substituted() {
        let l = layout("中文 text", &opts());
        assert_eq!(l.substituted, 2);
        assert!(l.text().contains("??"));
        assert!(!l.uses_role(FontRole::Fallback));
    }

    #[test]
    fn cjk_with_fallback_uses_fallback_role() {
        let o = opts().with_fallback_chars(['中', '文']);
        let l = layout("中文 text", &o);
        assert_eq!(l.substituted, 0);
        assert!(l.uses_role(FontRole::Fallback));
        assert!(l.text().contains('中'));
    }

    #[test]
    fn cjk_text_wraps_without_spaces() {
        let o = opts().with_fallback_chars(['字']);
        let md = "字".repeat(200);
        let l = layout(&md, &o);
        let lines = l.pages[0]
            .ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Text { .. }))
            .count();
        assert!(lines > 1, "long CJK run must wrap");
    }

    #[test]
    fn list_items_are_indented() {
        let l = layout("- item\n  - nested", &opts());
        let xs: Vec<(String, f32)> = l.pages[0]
            .ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, x, .. } => Some((text.clone(), *x)),
                _ => None,
            })
            .collect();
        let item_x = xs.iter().find(|(t, _)| t == "item").unwrap().1;
        let nested_x = xs.iter().find(|(t, _)| t == "nested").unwrap().1;
        assert!(nested_x > item_x);
        assert!(xs.iter().any(|(t, _)| t == "•"));
    }

    #[test]
    fn code_uses_mono() {
        let l = layout("```\nlet x = 1;\n```", &opts());
        assert!(l.uses_role(FontRole::Mono));
        assert!(l.text().contains("let x = 1;"));
    }

    #[test]
    fn missing_image_becomes_placeholder() {
        let l = layout("![chart](does/not/exist.png)", &opts());
        assert!(l.text().contains("[image: chart]"));
        assert!(l.uses_role(FontRole::Italic));
    }

    #[test]
    fn local_image_is_scaled_to_fit() {
        let dir = tempfile::tempdir().unwrap();
        let img = image::RgbImage::new(2000, 100);
        img.save(dir.path().join("wide.png")).unwrap();

        let md = "![wide](wide.png)";
        let doc = Document::from_text(md).with_base_dir(dir.path());
        let o = opts();
        let l = layout_document(&parse_blocks(md), &doc, &o);
        let op = l.pages[0]
            .ops
            .iter()
            .find(|op| matches!(op, DrawOp::Image { .. }))
            .expect("image op");
        if let DrawOp::Image { width, height, .. } = op {
            assert!((*width - (o.page_width - 2.0 * o.margin)).abs() < 0.5);
            assert!((*width / *height - 20.0).abs() < 0.1);
        }
    }

    #[test]
    fn rule_spans_content_width() {
        let o = opts();
        let l = layout("above\n\n---\n\nbelow", &o);
        assert!(l.pages[0].ops.iter().any(|op| matches!(
            op,
            DrawOp::Rule { x1, x2, .. } if (*x2 - *x1 - (o.page_width - 2.0 * o.margin)).abs() < 0.01
        )));
    }

    #[test]
    fn split_runs_merges_roles() {
        let mut n = 0;
        let fb: HashSet<char> = ['é'].into_iter().collect();
        let runs = split_runs("aé☃b", FontRole::Bold, &fb, &mut n);
        assert_eq!(runs, vec![("aé?b".to_string(), FontRole::Bold)]);
        assert_eq!(n, 1);
    }
}
