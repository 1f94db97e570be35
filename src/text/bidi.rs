//! # Bidirectional Text
//!
//! UAX#9 support for mixed LTR/RTL content: paragraph analysis into
//! per-character embedding levels, and the L2 reordering rule applied to
//! the pieces of a finished line.
//!
//! Levels are computed once per paragraph over the concatenated inline
//! content (atomic inlines contribute U+FFFC). Reordering runs per line,
//! so a box's horizontal position depends only on the visual order: the
//! same content mirrored produces mirrored geometry.

use crate::style::Direction;
use unicode_bidi::{BidiInfo, Level};

/// Per-character embedding levels for one paragraph.
pub fn paragraph_levels(text: &str, direction: Direction) -> Vec<Level> {
    if text.is_empty() {
        return Vec::new();
    }
    let para_level = match direction {
        Direction::Ltr => Some(Level::ltr()),
        Direction::Rtl => Some(Level::rtl()),
    };
    let info = BidiInfo::new(text, para_level);

    // `levels` is indexed by byte; project down to chars. Paragraph
    // separators inside the text keep their own level, which is fine for
    // reordering purposes.
    let mut out = Vec::with_capacity(text.chars().count());
    for (byte_idx, _) in text.char_indices() {
        out.push(
            info.levels
                .get(byte_idx)
                .copied()
                .unwrap_or_else(|| para_level.unwrap_or(Level::ltr())),
        );
    }
    out
}

/// Fast path: text with no RTL characters under an LTR paragraph needs no
/// reordering at all.
pub fn is_pure_ltr(text: &str, direction: Direction) -> bool {
    if matches!(direction, Direction::Rtl) {
        return false;
    }
    !text.chars().any(is_rtl_char)
}

fn is_rtl_char(ch: char) -> bool {
    matches!(ch,
        '\u{0590}'..='\u{08FF}' |   // Hebrew, Arabic, Syriac, Thaana, NKo …
        '\u{FB1D}'..='\u{FDFF}' |   // Presentation forms
        '\u{FE70}'..='\u{FEFF}' |
        '\u{10800}'..='\u{10FFF}' |
        '\u{1E800}'..='\u{1EEFF}' |
        '\u{200F}' | '\u{202B}' | '\u{202E}' | '\u{2067}'
    )
}

/// Reorder the indices of a line's pieces into visual order given each
/// piece's embedding level (L2: from the highest level down to the lowest
/// odd level, reverse every maximal run at or above that level).
pub fn visual_order(levels: &[Level]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..levels.len()).collect();
    if levels.is_empty() {
        return order;
    }
    let max_level = levels.iter().copied().max().unwrap_or(Level::ltr());
    if !max_level.is_rtl() && levels.iter().all(|l| !l.is_rtl()) {
        return order;
    }
    let min_level = levels.iter().copied().min().unwrap_or(Level::ltr());
    let min_odd = if min_level.is_rtl() {
        min_level
    } else {
        Level::rtl()
    };

    let mut current = max_level;
    loop {
        let mut i = 0;
        while i < order.len() {
            if levels[order[i]] >= current {
                let start = i;
                while i < order.len() && levels[order[i]] >= current {
                    i += 1;
                }
                order[start..i].reverse();
            } else {
                i += 1;
            }
        }
        if current <= min_odd || current.number() == 0 {
            break;
        }
        current = Level::new(current.number() - 1).unwrap_or(Level::ltr());
    }
    order
}
