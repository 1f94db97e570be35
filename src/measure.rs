//! # Measurement Adapter
//!
//! The engine never touches glyph tables directly. Everything it needs to
//! know about text (per-character advances, ascent/descent, where a line
//! may legally end) comes through the [`TextMeasure`] trait, treated as a
//! pure function of `(style, text)`.
//!
//! Two implementations ship with the crate:
//! - [`FontMeasure`]: real metrics from registered font faces, parsed with
//!   `ttf-parser` and shaped with `rustybuzz`.
//! - [`CharGrid`]: deterministic fixed-advance metrics for tests and as a
//!   last-resort fallback.

use std::collections::HashMap;

use crate::error::LayoutError;
use crate::geometry::Size;
use crate::style::{Dimension, FontStyle, Hyphens, Style};
use unicode_linebreak::{linebreaks, BreakOpportunity};

/// Per-character metrics for one run of text under one style.
#[derive(Debug, Clone)]
pub struct ShapedRun {
    /// Advance of each character, including letter/word spacing.
    pub advances: Vec<f64>,
    /// Total advance.
    pub width: f64,
    /// Distance from baseline to the top of the em box.
    pub ascent: f64,
    /// Distance from baseline to the bottom of the em box (positive).
    pub descent: f64,
}

impl ShapedRun {
    pub fn height(&self) -> f64 {
        self.ascent + self.descent
    }
}

/// A position within a run where a line may end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakChance {
    /// No break before this character.
    Prohibited,
    /// A break is allowed before this character (typically after a space).
    Allowed,
    /// A break is required before this character (raw newline under `pre*`).
    Mandatory,
    /// A hyphenation point: breaking here inserts the hyphenate character.
    Hyphen,
}

/// The measurement contract consumed by the line breaker and by every
/// component that sizes replaced content.
pub trait TextMeasure {
    /// Measure a run of text under a style.
    fn measure(&self, style: &Style, text: &str) -> ShapedRun;

    /// Used size of a replaced box, honoring explicit dimensions and
    /// preserving the intrinsic ratio when only one axis is given.
    fn replaced_size(&self, style: &Style, intrinsic: Size, available_width: f64) -> Size {
        let w = style.width.resolve(available_width);
        let h = style.height.resolve(0.0);
        let ratio = if intrinsic.height > 0.0 {
            intrinsic.width / intrinsic.height
        } else {
            1.0
        };
        let (width, height) = match (w, h) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, if ratio > 0.0 { w / ratio } else { 0.0 }),
            (None, Some(h)) => (h * ratio, h),
            (None, None) => (intrinsic.width, intrinsic.height),
        };
        Size::new(
            style.clamp_width(width, available_width),
            style.clamp_height(height, 0.0),
        )
    }

    /// Legal break positions for a run: one [`BreakChance`] per character,
    /// entry `i` answering "may the line end before character `i`?".
    ///
    /// Combines UAX#14 opportunities, soft hyphens, and dictionary
    /// hyphenation governed by `hyphens`/`lang`/`hyphenate-limit-chars`.
    /// Index 0 is always prohibited.
    fn break_opportunities(&self, style: &Style, text: &str) -> Vec<BreakChance> {
        let chars: Vec<char> = text.chars().collect();
        let mut result = vec![BreakChance::Prohibited; chars.len()];
        if chars.is_empty() {
            return result;
        }

        // Byte offset → char index, for mapping UAX#14 output.
        let byte_to_char: Vec<usize> = {
            let mut map = vec![0usize; text.len() + 1];
            let mut idx = 0;
            for (byte, _) in text.char_indices() {
                map[byte] = idx;
                idx += 1;
            }
            map[text.len()] = idx;
            map
        };

        for (byte_offset, opp) in linebreaks(text) {
            let char_idx = byte_to_char[byte_offset];
            if char_idx == 0 || char_idx >= chars.len() {
                // A break "at the end" is the natural end of the run.
                continue;
            }
            result[char_idx] = match opp {
                BreakOpportunity::Mandatory => BreakChance::Mandatory,
                BreakOpportunity::Allowed => BreakChance::Allowed,
            };
        }

        // Soft hyphens: break after the U+00AD, rendering the hyphen char.
        if style.hyphens != Hyphens::None {
            for (i, &ch) in chars.iter().enumerate() {
                if ch == '\u{00AD}' && i + 1 < chars.len() {
                    result[i + 1] = BreakChance::Hyphen;
                }
            }
        }

        if style.hyphens == Hyphens::Auto {
            mark_dictionary_hyphens(style, &chars, &mut result);
        }

        result
    }
}

/// Walk the words of a run and mark dictionary hyphenation points.
fn mark_dictionary_hyphens(style: &Style, chars: &[char], result: &mut [BreakChance]) {
    let lang = match resolve_hyphenation_lang(style.lang.as_deref()) {
        Some(l) => l,
        None => return,
    };
    let limits = style.hyphenate_limit_chars;

    let mut word_start = 0;
    for i in 0..=chars.len() {
        let at_boundary = i == chars.len() || !chars[i].is_alphabetic();
        if !at_boundary {
            continue;
        }
        let word_len = i - word_start;
        if word_len >= limits.total.max(limits.before + limits.after) {
            let word: String = chars[word_start..i].iter().collect();
            let mut offset = word_start;
            for syllable in hypher::hyphenate(&word, lang) {
                let len = syllable.chars().count();
                let pos = offset + len;
                offset = pos;
                if pos >= i {
                    break;
                }
                let before = pos - word_start;
                let after = i - pos;
                if before >= limits.before
                    && after >= limits.after
                    && result[pos] == BreakChance::Prohibited
                {
                    result[pos] = BreakChance::Hyphen;
                }
            }
        }
        word_start = i + 1;
    }
}

/// Map a BCP 47 tag to a hyphenation dictionary. Unsupported languages
/// disable dictionary hyphenation; no tag means English.
fn resolve_hyphenation_lang(lang: Option<&str>) -> Option<hypher::Lang> {
    let tag = match lang {
        Some(t) => t,
        None => return Some(hypher::Lang::English),
    };
    let primary = tag.split('-').next().unwrap_or(tag).to_lowercase();
    match primary.as_str() {
        "af" => Some(hypher::Lang::Afrikaans),
        "be" => Some(hypher::Lang::Belarusian),
        "bg" => Some(hypher::Lang::Bulgarian),
        "ca" => Some(hypher::Lang::Catalan),
        "cs" => Some(hypher::Lang::Czech),
        "da" => Some(hypher::Lang::Danish),
        "de" => Some(hypher::Lang::German),
        "el" => Some(hypher::Lang::Greek),
        "en" => Some(hypher::Lang::English),
        "es" => Some(hypher::Lang::Spanish),
        "et" => Some(hypher::Lang::Estonian),
        "fi" => Some(hypher::Lang::Finnish),
        "fr" => Some(hypher::Lang::French),
        "hr" => Some(hypher::Lang::Croatian),
        "hu" => Some(hypher::Lang::Hungarian),
        "is" => Some(hypher::Lang::Icelandic),
        "it" => Some(hypher::Lang::Italian),
        "ka" => Some(hypher::Lang::Georgian),
        "la" => Some(hypher::Lang::Latin),
        "lt" => Some(hypher::Lang::Lithuanian),
        "mn" => Some(hypher::Lang::Mongolian),
        "nb" | "nn" | "no" => Some(hypher::Lang::Norwegian),
        "nl" => Some(hypher::Lang::Dutch),
        "pl" => Some(hypher::Lang::Polish),
        "pt" => Some(hypher::Lang::Portuguese),
        "ru" => Some(hypher::Lang::Russian),
        "sk" => Some(hypher::Lang::Slovak),
        "sl" => Some(hypher::Lang::Slovenian),
        "sq" => Some(hypher::Lang::Albanian),
        "sr" => Some(hypher::Lang::Serbian),
        "sv" => Some(hypher::Lang::Swedish),
        "tr" => Some(hypher::Lang::Turkish),
        "uk" => Some(hypher::Lang::Ukrainian),
        _ => None,
    }
}

// ── Font-backed adapter ─────────────────────────────────────────

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct FaceKey {
    family: String,
    weight: u16,
    italic: bool,
}

struct FaceEntry {
    data: Vec<u8>,
    units_per_em: u16,
    ascender: i16,
    descender: i16,
}

/// Text measurement backed by registered font faces.
///
/// Runs are shaped with rustybuzz so advances reflect kerning and
/// ligatures; cluster advances are attributed to the first character of
/// each cluster, the rest measure zero. Families without a registered face
/// fall back to fixed advances.
pub struct FontMeasure {
    faces: HashMap<FaceKey, FaceEntry>,
    fallback: CharGrid,
}

impl Default for FontMeasure {
    fn default() -> Self {
        Self::new()
    }
}

impl FontMeasure {
    pub fn new() -> Self {
        Self {
            faces: HashMap::new(),
            fallback: CharGrid::default(),
        }
    }

    /// Register a font face for a family/weight/style triple.
    pub fn register(
        &mut self,
        family: &str,
        weight: u16,
        italic: bool,
        data: Vec<u8>,
    ) -> Result<(), LayoutError> {
        let face = ttf_parser::Face::parse(&data, 0).map_err(|_| LayoutError::BadFontData {
            family: family.to_string(),
        })?;
        let entry = FaceEntry {
            units_per_em: face.units_per_em(),
            ascender: face.ascender(),
            descender: face.descender(),
            data,
        };
        self.faces.insert(
            FaceKey {
                family: family.to_string(),
                weight,
                italic,
            },
            entry,
        );
        Ok(())
    }

    fn resolve(&self, style: &Style) -> Option<&FaceEntry> {
        let italic = matches!(style.font_style, FontStyle::Italic | FontStyle::Oblique);
        // Exact weight first, then snapped to the regular/bold pair.
        let exact = FaceKey {
            family: style.font_family.clone(),
            weight: style.font_weight,
            italic,
        };
        if let Some(e) = self.faces.get(&exact) {
            return Some(e);
        }
        let snapped = FaceKey {
            weight: if style.font_weight >= 600 { 700 } else { 400 },
            ..exact
        };
        self.faces.get(&snapped)
    }
}

impl TextMeasure for FontMeasure {
    fn measure(&self, style: &Style, text: &str) -> ShapedRun {
        let entry = match self.resolve(style) {
            Some(e) => e,
            None => return self.fallback.measure(style, text),
        };
        let face = match rustybuzz::Face::from_slice(&entry.data, 0) {
            Some(f) => f,
            None => return self.fallback.measure(style, text),
        };

        let mut buffer = rustybuzz::UnicodeBuffer::new();
        buffer.push_str(text);
        let output = rustybuzz::shape(&face, &[], buffer);

        let scale = style.font_size / entry.units_per_em as f64;
        let num_chars = text.chars().count();
        let mut advances = vec![0.0f64; num_chars];
        // Cluster values are byte offsets; map them to char indices.
        let mut byte_to_char = vec![0usize; text.len() + 1];
        for (idx, (byte, _)) in text.char_indices().enumerate() {
            byte_to_char[byte] = idx;
        }
        for (info, pos) in output
            .glyph_infos()
            .iter()
            .zip(output.glyph_positions().iter())
        {
            let cluster = byte_to_char
                .get(info.cluster as usize)
                .copied()
                .unwrap_or(0);
            if cluster < num_chars {
                advances[cluster] += pos.x_advance as f64 * scale;
            }
        }

        apply_spacing(style, text, &mut advances);
        let width = advances.iter().sum();
        ShapedRun {
            advances,
            width,
            ascent: entry.ascender as f64 * scale,
            descent: -(entry.descender as f64) * scale,
        }
    }
}

/// Letter spacing after every character, word spacing on top of spaces.
fn apply_spacing(style: &Style, text: &str, advances: &mut [f64]) {
    if style.letter_spacing == 0.0 && style.word_spacing == 0.0 {
        return;
    }
    for (i, ch) in text.chars().enumerate() {
        advances[i] += style.letter_spacing;
        if ch == ' ' || ch == '\u{00A0}' {
            advances[i] += style.word_spacing;
        }
    }
}

// ── Fixed-advance adapter ───────────────────────────────────────

/// Deterministic metrics: every glyph advances a fixed fraction of the em,
/// ascent and descent are fixed fractions too. Zero-width characters
/// (soft hyphens, ZWSP) still measure zero.
///
/// The defaults (advance 1em, ascent 0.8em, descent 0.2em) give integral
/// geometry for integral font sizes, which keeps layout assertions exact.
pub struct CharGrid {
    pub advance_em: f64,
    pub ascent_em: f64,
    pub descent_em: f64,
}

impl Default for CharGrid {
    fn default() -> Self {
        Self {
            advance_em: 1.0,
            ascent_em: 0.8,
            descent_em: 0.2,
        }
    }
}

impl CharGrid {
    pub fn with_advance(advance_em: f64) -> Self {
        Self {
            advance_em,
            ..Default::default()
        }
    }
}

impl TextMeasure for CharGrid {
    fn measure(&self, style: &Style, text: &str) -> ShapedRun {
        let advance = style.font_size * self.advance_em;
        let mut advances: Vec<f64> = text
            .chars()
            .map(|ch| match ch {
                '\u{00AD}' | '\u{200B}' => 0.0,
                '\n' | '\r' | '\u{2028}' | '\u{2029}' => 0.0,
                _ => advance,
            })
            .collect();
        apply_spacing(style, text, &mut advances);
        let width = advances.iter().sum();
        ShapedRun {
            advances,
            width,
            ascent: style.font_size * self.ascent_em,
            descent: style.font_size * self.descent_em,
        }
    }
}

/// Resolve the line height of a style against its font metrics.
pub fn resolved_line_height(measure: &dyn TextMeasure, style: &Style) -> f64 {
    let strut = measure.measure(style, "x");
    style.line_height.resolve(style.font_size, strut.height())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style() -> Style {
        Style {
            font_size: 10.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_char_grid_advances() {
        let grid = CharGrid::default();
        let run = grid.measure(&style(), "abc");
        assert_eq!(run.advances, vec![10.0, 10.0, 10.0]);
        assert_eq!(run.width, 30.0);
        assert_eq!(run.ascent, 8.0);
        assert_eq!(run.descent, 2.0);
    }

    #[test]
    fn test_char_grid_zero_width_chars() {
        let grid = CharGrid::default();
        let run = grid.measure(&style(), "a\u{00AD}b");
        assert_eq!(run.advances, vec![10.0, 0.0, 10.0]);
    }

    #[test]
    fn test_letter_and_word_spacing() {
        let grid = CharGrid::default();
        let spaced = Style {
            letter_spacing: 1.0,
            word_spacing: 2.0,
            ..style()
        };
        let run = grid.measure(&spaced, "a b");
        assert_eq!(run.advances, vec![11.0, 13.0, 11.0]);
    }

    #[test]
    fn test_break_opportunities_spaces() {
        let grid = CharGrid::default();
        let breaks = grid.break_opportunities(&style(), "one two");
        // Break allowed before 't' (index 4), nowhere else.
        assert_eq!(breaks[4], BreakChance::Allowed);
        assert_eq!(breaks[1], BreakChance::Prohibited);
        assert_eq!(breaks[0], BreakChance::Prohibited);
    }

    #[test]
    fn test_break_opportunities_soft_hyphen() {
        let grid = CharGrid::default();
        let breaks = grid.break_opportunities(&style(), "co\u{00AD}operate");
        assert_eq!(breaks[3], BreakChance::Hyphen);
    }

    #[test]
    fn test_soft_hyphen_disabled() {
        let grid = CharGrid::default();
        let none = Style {
            hyphens: Hyphens::None,
            ..style()
        };
        let breaks = grid.break_opportunities(&none, "co\u{00AD}operate");
        assert_eq!(breaks[3], BreakChance::Prohibited);
    }

    #[test]
    fn test_dictionary_hyphenation() {
        let grid = CharGrid::default();
        let auto = Style {
            hyphens: Hyphens::Auto,
            lang: Some("en".to_string()),
            ..style()
        };
        let breaks = grid.break_opportunities(&auto, "hyphenation");
        assert!(breaks.iter().any(|b| *b == BreakChance::Hyphen));
    }

    #[test]
    fn test_replaced_size_ratio() {
        let grid = CharGrid::default();
        let s = Style {
            width: Dimension::Pt(100.0),
            ..Default::default()
        };
        let size = grid.replaced_size(&s, Size::new(50.0, 25.0), 400.0);
        assert_eq!(size.width, 100.0);
        assert_eq!(size.height, 50.0);
    }

    #[test]
    fn test_replaced_size_intrinsic() {
        let grid = CharGrid::default();
        let s = Style::default();
        let size = grid.replaced_size(&s, Size::new(40.0, 30.0), 400.0);
        assert_eq!(size.width, 40.0);
        assert_eq!(size.height, 30.0);
    }
}
