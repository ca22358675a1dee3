//! Glyph coverage: WinAnsi encoding for the standard PDF fonts and discovery
//! of a TrueType fallback for everything else.
//!
//! The 14 standard PDF fonts (Helvetica, Courier, …) only cover
//! WinAnsiEncoding, roughly Latin-1 plus typographic punctuation. Anything
//! else needs an embedded font whose `cmap` actually covers the characters,
//! which is checked here with `ttf-parser` before the font is handed to a
//! renderer.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Byte for `c` in WinAnsiEncoding (Windows-1252), if it has one.
pub fn winansi_byte(c: char) -> Option<u8> {
    let cp = c as u32;
    match cp {
        0x20..=0x7E => Some(cp as u8),
        0xA0..=0xFF => Some(cp as u8),
        _ => match c {
            '€' => Some(0x80),
            '‚' => Some(0x82),
            'ƒ' => Some(0x83),
            '„' => Some(0x84),
            '…' => Some(0x85),
            '†' => Some(0x86),
            '‡' => Some(0x87),
            'ˆ' => Some(0x88),
            '‰' => Some(0x89),
            'Š' => Some(0x8A),
            '‹' => Some(0x8B),
            'Œ' => Some(0x8C),
            'Ž' => Some(0x8E),
            '‘' => Some(0x91),
            '’' => Some(0x92),
            '“' => Some(0x93),
            '”' => Some(0x94),
            '•' => Some(0x95),
            '–' => Some(0x96),
            '—' => Some(0x97),
            '˜' => Some(0x98),
            '™' => Some(0x99),
            'š' => Some(0x9A),
            '›' => Some(0x9B),
            'œ' => Some(0x9C),
            'ž' => Some(0x9E),
            'Ÿ' => Some(0x9F),
            _ => None,
        },
    }
}

/// Whether a standard PDF font can draw `c`.
pub fn is_winansi(c: char) -> bool {
    winansi_byte(c).is_some()
}

/// Encode text for a WinAnsi font, replacing uncovered characters with `?`.
///
/// Tabs become four spaces; other control characters are dropped.
/// Returns the bytes and the number of substitutions made.
pub fn encode_winansi(text: &str) -> (Vec<u8>, usize) {
    let mut out = Vec::with_capacity(text.len());
    let mut replaced = 0;
    for c in text.chars() {
        if c == '\t' {
            out.extend_from_slice(b"    ");
            continue;
        }
        if c.is_control() {
            continue;
        }
        match winansi_byte(c) {
            Some(b) => out.push(b),
            None => {
                out.push(b'?');
                replaced += 1;
            }
        }
    }
    (out, replaced)
}

/// Whether `c` belongs to a CJK script block (ideographs, kana, hangul,
/// CJK punctuation and full-width forms).
pub fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x1100..=0x11FF     // Hangul Jamo
        | 0x2E80..=0x2FDF   // radicals
        | 0x3000..=0x303F   // CJK symbols and punctuation
        | 0x3040..=0x30FF   // Hiragana, Katakana
        | 0x3100..=0x312F   // Bopomofo
        | 0x3130..=0x318F   // Hangul compatibility Jamo
        | 0x31F0..=0x31FF   // Katakana extensions
        | 0x3200..=0x33FF   // enclosed / compatibility
        | 0x3400..=0x4DBF   // Extension A
        | 0x4E00..=0x9FFF   // Unified ideographs
        | 0xAC00..=0xD7AF   // Hangul syllables
        | 0xF900..=0xFAFF   // compatibility ideographs
        | 0xFE30..=0xFE4F   // compatibility forms
        | 0xFF00..=0xFFEF   // half/full-width forms
        | 0x20000..=0x2FA1F // Extensions B–F, supplement
    )
}

/// A TrueType/OpenType font loaded from disk.
#[derive(Clone)]
pub struct FallbackFont {
    pub path: PathBuf,
    pub data: Vec<u8>,
    /// Face index inside a collection (`.ttc`).
    pub index: u32,
}

impl std::fmt::Debug for FallbackFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackFont")
            .field("path", &self.path)
            .field("bytes", &self.data.len())
            .field("index", &self.index)
            .finish()
    }
}

impl FallbackFont {
    /// Load a font file and confirm it parses.
    pub fn load(path: &Path) -> Option<Self> {
        let data = std::fs::read(path).ok()?;
        let count = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
        for index in 0..count.max(1) {
            if ttf_parser::Face::parse(&data, index).is_ok() {
                return Some(Self {
                    path: path.to_path_buf(),
                    data,
                    index,
                });
            }
        }
        None
    }

    /// Count of `chars` with a glyph in this font.
    pub fn coverage(&self, chars: &[char]) -> usize {
        match ttf_parser::Face::parse(&self.data, self.index) {
            Ok(face) => chars.iter().filter(|c| face.glyph_index(**c).is_some()).count(),
            Err(_) => 0,
        }
    }

    /// The subset of `chars` with a glyph in this font.
    pub fn covered_chars(&self, chars: &[char]) -> Vec<char> {
        match ttf_parser::Face::parse(&self.data, self.index) {
            Ok(face) => chars
                .iter()
                .copied()
                .filter(|c| face.glyph_index(*c).is_some())
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Well-known CJK-capable font files, per platform.
pub fn platform_font_candidates() -> Vec<PathBuf> {
    let mut v: Vec<PathBuf> = Vec::new();
    if cfg!(target_os = "windows") {
        let windir = std::env::var("WINDIR").unwrap_or_else(|_| "C:\\Windows".to_string());
        let fonts = Path::new(&windir).join("Fonts");
        for name in ["msyh.ttf", "simhei.ttf", "simsun.ttc", "msyh.ttc", "arialuni.ttf"] {
            v.push(fonts.join(name));
        }
    } else if cfg!(target_os = "macos") {
        for p in [
            "/Library/Fonts/Arial Unicode.ttf",
            "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
            "/System/Library/Fonts/STHeiti Light.ttc",
            "/System/Library/Fonts/Hiragino Sans GB.ttc",
            "/System/Library/Fonts/PingFang.ttc",
        ] {
            v.push(PathBuf::from(p));
        }
    } else {
        for p in [
            "/usr/share/fonts/truetype/droid/DroidSansFallbackFull.ttf",
            "/usr/share/fonts/truetype/droid/DroidSansFallback.ttf",
            "/usr/share/fonts/google-droid/DroidSansFallbackFull.ttf",
            "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
            "/usr/share/fonts/wenquanyi/wqy-microhei/wqy-microhei.ttc",
            "/usr/share/fonts/truetype/arphic/uming.ttc",
            "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
        ] {
            v.push(PathBuf::from(p));
        }
    }
    if let Some(user) = dirs::font_dir() {
        for name in ["NotoSansSC-Regular.ttf", "SourceHanSansSC-Regular.otf", "DroidSansFallbackFull.ttf"] {
            v.push(user.join(name));
        }
    }
    v
}

/// Find a font covering as many of `required` as possible.
///
/// An explicit path is tried first and used whenever it loads, even with
/// partial coverage. Otherwise the platform candidates are scanned and the
/// first one covering every character wins; failing that, the best partial
/// match. Returns None when `required` is empty or nothing loads.
pub fn find_fallback_font(required: &[char], explicit: Option<&Path>) -> Option<FallbackFont> {
    if required.is_empty() {
        return None;
    }

    if let Some(path) = explicit {
        match FallbackFont::load(path) {
            Some(font) => {
                debug!("Using configured fallback font {}", path.display());
                return Some(font);
            }
            None => warn!("Configured font {} could not be loaded", path.display()),
        }
    }

    let mut best: Option<(usize, FallbackFont)> = None;
    for candidate in platform_font_candidates() {
        if !candidate.is_file() {
            continue;
        }
        let Some(font) = FallbackFont::load(&candidate) else {
            continue;
        };
        let covered = font.coverage(required);
        debug!(
            "Font candidate {}: covers {}/{} characters",
            candidate.display(),
            covered,
            required.len()
        );
        if covered == required.len() {
            return Some(font);
        }
        if covered > 0 && best.as_ref().map(|(n, _)| covered > *n).unwrap_or(true) {
            best = Some((covered, font));
        }
    }
    best.map(|(_, f)| f)
}

/// Distinct characters in `text` that a standard font cannot draw.
pub fn non_winansi_chars(text: &str) -> Vec<char> {
    let mut out: Vec<char> = text
        .chars()
        .filter(|c| !c.is_control() && !is_winansi(*c))
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}
