//! Print stylesheets and font-family defaults.
//!
//! Centralising the CSS and the CJK font choices here keeps the pandoc and
//! HTML backends in agreement about typography, and lets unit tests inspect
//! the generated stylesheet without running a renderer.

use crate::config::StyleHints;

/// Base stylesheet for the HTML/CSS backend. Page geometry and font
/// families are appended per document by [`stylesheet`].
pub const DEFAULT_CSS: &str = r#"
* {
    box-sizing: border-box;
}

body {
    line-height: 1.5;
    color: #1f2937;
    margin: 0;
}

h1, h2, h3, h4, h5, h6 {
    line-height: 1.25;
    margin: 1.2em 0 0.5em;
    page-break-after: avoid;
}

h1 { font-size: 1.8em; border-bottom: 1px solid #e5e7eb; padding-bottom: 0.2em; }
h2 { font-size: 1.5em; }
h3 { font-size: 1.3em; }
h4 { font-size: 1.15em; }

p, ul, ol, blockquote, table, pre {
    margin: 0 0 0.8em;
}

img {
    max-width: 100%;
    page-break-inside: avoid;
}

code, pre {
    font-family: 'DejaVu Sans Mono', Menlo, Consolas, monospace;
    font-size: 0.9em;
    background: #f3f4f6;
}

code {
    padding: 0.1em 0.3em;
    border-radius: 3px;
}

pre {
    padding: 0.8em;
    white-space: pre-wrap;
    word-wrap: break-word;
    page-break-inside: avoid;
}

pre code {
    padding: 0;
    background: none;
}

blockquote {
    border-left: 4px solid #d1d5db;
    padding-left: 1em;
    color: #4b5563;
}

table {
    border-collapse: collapse;
    width: 100%;
}

th, td {
    border: 1px solid #d1d5db;
    padding: 0.35em 0.6em;
    text-align: left;
}

th {
    background: #f9fafb;
}

li input[type="checkbox"] {
    margin-right: 0.4em;
}
"#;

/// CJK family used when the caller names none.
pub fn default_cjk_font_family() -> &'static str {
    if cfg!(target_os = "windows") {
        "SimSun"
    } else if cfg!(target_os = "macos") {
        "PingFang SC"
    } else {
        "Noto Sans CJK SC"
    }
}

/// CSS font-family fallbacks able to render Chinese text on this platform.
pub fn cjk_font_stack() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &["Microsoft YaHei", "SimSun", "SimHei", "Arial Unicode MS"]
    } else if cfg!(target_os = "macos") {
        &["PingFang SC", "Hiragino Sans GB", "Heiti SC"]
    } else {
        &["Noto Sans CJK SC", "WenQuanYi Micro Hei", "Droid Sans Fallback"]
    }
}

fn css_quote(family: &str) -> String {
    format!("'{}'", family.replace('\'', "\\'"))
}

/// Full stylesheet for one document: [`DEFAULT_CSS`] plus `@page` geometry
/// and the body font stack derived from `style`.
pub fn stylesheet(style: &StyleHints) -> String {
    let mut families: Vec<String> = Vec::new();
    if let Some(f) = &style.font_family {
        families.push(css_quote(f));
    }
    if let Some(f) = &style.cjk_font_family {
        families.push(css_quote(f));
    }
    families.extend(["'Helvetica Neue'", "Arial"].iter().map(|s| s.to_string()));
    families.extend(cjk_font_stack().iter().map(|f| css_quote(f)));
    families.push("sans-serif".to_string());

    format!(
        "{base}\n@page {{\n    size: {size};\n    margin: {margin}pt;\n}}\n\nbody {{\n    font-family: {families};\n    font-size: {font_size}pt;\n}}\n",
        base = DEFAULT_CSS,
        size = style.page_size.paper_name().to_uppercase(),
        margin = style.margin,
        families = families.join(", "),
        font_size = style.font_size,
    )
}

/// Escape HTML special characters.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageSize;

    #[test]
    fn stylesheet_has_page_rule() {
        let css = stylesheet(&StyleHints {
            page_size: PageSize::Letter,
            margin: 50.0,
            ..StyleHints::default()
        });
        assert!(css.contains("size: LETTER;"), "{css}");
        assert!(css.contains("margin: 50pt;"), "{css}");
        assert!(css.contains("font-size: 11pt;"), "{css}");
    }

    #[test]
    fn stylesheet_prefers_configured_fonts() {
        let css = stylesheet(&StyleHints {
            font_family: Some("Source Serif Pro".into()),
            cjk_font_family: Some("LXGW WenKai".into()),
            ..StyleHints::default()
        });
        let body = css.split("body {").last().unwrap();
        let serif = body.find("'Source Serif Pro'").unwrap();
        let cjk = body.find("'LXGW WenKai'").unwrap();
        let platform = body.find(&css_quote(cjk_font_stack()[0])).unwrap();
        assert!(serif < cjk && cjk < platform);
    }

    #[test]
    fn platform_stack_includes_default_family() {
        assert!(cjk_font_stack().contains(&default_cjk_font_family()));
    }

    #[test]
    fn html_escape_escapes_special_chars() {
        assert_eq!(html_escape("<script>"), "&lt;script&gt;");
        assert_eq!(html_escape("a & b"), "a &amp; b");
        assert_eq!(html_escape("\"quoted\""), "&quot;quoted&quot;");
    }
}
