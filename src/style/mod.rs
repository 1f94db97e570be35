//! # Style Model
//!
//! The resolved style attached to every element of the input tree. Cascade,
//! inheritance and unit conversion happen upstream: by the time a `Style`
//! reaches this crate every length is in points, every keyword is an enum.
//!
//! A `Style` is immutable and shared. Boxes and fragments hold an
//! `Arc<Style>` and never write through it; computing a used value means
//! building a new `Style` and swapping the reference.

use crate::geometry::Edges;
use serde::{Deserialize, Serialize};

/// A length that can be points, a percentage of the containing block, or
/// auto.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum Dimension {
    /// Fixed size in points (1/72 inch).
    Pt(f64),
    /// Percentage of the containing block's corresponding dimension.
    Percent(f64),
    /// Size determined by content.
    #[default]
    Auto,
}

impl Dimension {
    /// Resolve against a containing-block size. Returns `None` for `Auto`.
    pub fn resolve(&self, base: f64) -> Option<f64> {
        match self {
            Dimension::Pt(v) => Some(*v),
            Dimension::Percent(p) => Some(base * p / 100.0),
            Dimension::Auto => None,
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Dimension::Auto)
    }
}

/// Margins may be auto (centering, flex free-space claims), so each edge is
/// a full [`Dimension`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarginEdges {
    pub top: Dimension,
    pub right: Dimension,
    pub bottom: Dimension,
    pub left: Dimension,
}

impl MarginEdges {
    pub fn uniform(v: f64) -> Self {
        let d = Dimension::Pt(v);
        Self {
            top: d,
            right: d,
            bottom: d,
            left: d,
        }
    }

    pub fn symmetric(vertical: f64, horizontal: f64) -> Self {
        Self {
            top: Dimension::Pt(vertical),
            right: Dimension::Pt(horizontal),
            bottom: Dimension::Pt(vertical),
            left: Dimension::Pt(horizontal),
        }
    }

    /// Resolve to concrete edges; `auto` becomes zero.
    pub fn resolve(&self, base: f64) -> Edges {
        Edges {
            top: self.top.resolve(base).unwrap_or(0.0),
            right: self.right.resolve(base).unwrap_or(0.0),
            bottom: self.bottom.resolve(base).unwrap_or(0.0),
            left: self.left.resolve(base).unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Display {
    #[default]
    Block,
    Inline,
    InlineBlock,
    Flex,
    None,
}

/// Positioning scheme. `Running` removes the box from flow and registers it
/// for placement into page margin boxes by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Position {
    #[default]
    Static,
    Relative,
    Absolute,
    Fixed,
    Running(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Float {
    #[default]
    None,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Clear {
    #[default]
    None,
    Left,
    Right,
    Both,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlexDirection {
    #[default]
    Row,
    RowReverse,
    Column,
    ColumnReverse,
}

impl FlexDirection {
    pub fn is_row(&self) -> bool {
        matches!(self, FlexDirection::Row | FlexDirection::RowReverse)
    }

    pub fn is_reverse(&self) -> bool {
        matches!(
            self,
            FlexDirection::RowReverse | FlexDirection::ColumnReverse
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JustifyContent {
    #[default]
    FlexStart,
    FlexEnd,
    Start,
    End,
    Left,
    Right,
    Center,
    SpaceBetween,
    SpaceAround,
    SpaceEvenly,
    Stretch,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlignItems {
    FlexStart,
    FlexEnd,
    Center,
    Baseline,
    #[default]
    Stretch,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlignContent {
    #[default]
    Stretch,
    FlexStart,
    FlexEnd,
    Center,
    SpaceBetween,
    SpaceAround,
    SpaceEvenly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlexWrap {
    #[default]
    NoWrap,
    Wrap,
    WrapReverse,
}

/// `break-before`/`break-after` values. Legacy `page-break-*` spellings are
/// accepted as aliases at the serde layer (`always` ≡ `page` upstream of
/// column context; they stay distinct values so the controller can tell).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakBetween {
    #[default]
    Auto,
    Avoid,
    AvoidPage,
    AvoidColumn,
    Always,
    Page,
    Column,
    Left,
    Right,
    Recto,
    Verso,
}

impl BreakBetween {
    /// Does this value force a fragmentainer boundary in the given context?
    pub fn forces(&self, in_column: bool) -> bool {
        match self {
            BreakBetween::Always
            | BreakBetween::Page
            | BreakBetween::Left
            | BreakBetween::Right
            | BreakBetween::Recto
            | BreakBetween::Verso => true,
            BreakBetween::Column => in_column,
            _ => false,
        }
    }

    /// Does this value forbid a boundary in the given context?
    pub fn avoids(&self, in_column: bool) -> bool {
        match self {
            BreakBetween::Avoid => true,
            BreakBetween::AvoidPage => !in_column,
            BreakBetween::AvoidColumn => in_column,
            _ => false,
        }
    }

    /// Combine the `break-after` of one box with the `break-before` of the
    /// next. A forced value wins over any avoid; between two forced values
    /// the later (before) one wins.
    pub fn combine(after: BreakBetween, before: BreakBetween) -> BreakBetween {
        if before.forces(true) || before.forces(false) {
            before
        } else if after.forces(true) || after.forces(false) {
            after
        } else if before != BreakBetween::Auto {
            before
        } else {
            after
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakInside {
    #[default]
    Auto,
    Avoid,
    AvoidPage,
    AvoidColumn,
}

impl BreakInside {
    pub fn avoids(&self, in_column: bool) -> bool {
        match self {
            BreakInside::Avoid => true,
            BreakInside::AvoidPage => !in_column,
            BreakInside::AvoidColumn => in_column,
            BreakInside::Auto => false,
        }
    }
}

/// What happens to a margin that lands on a fragmentainer boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarginBreak {
    /// Kept after a forced break, discarded after a natural one.
    #[default]
    Auto,
    Keep,
    Discard,
}

/// Whether a box split across fragmentainers repeats its edge decorations
/// on every piece or slices them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecorationBreak {
    #[default]
    Slice,
    Clone,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnSpan {
    #[default]
    None,
    All,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnFill {
    Auto,
    #[default]
    Balance,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    #[default]
    Ltr,
    Rtl,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextAlign {
    #[default]
    Start,
    End,
    Left,
    Right,
    Center,
    Justify,
    JustifyAll,
}

/// Alignment of the last line of a block (and lines before forced breaks).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextAlignLast {
    #[default]
    Auto,
    Start,
    End,
    Left,
    Right,
    Center,
    Justify,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WhiteSpace {
    #[default]
    Normal,
    Nowrap,
    Pre,
    PreWrap,
    PreLine,
}

impl WhiteSpace {
    /// Are consecutive spaces and newlines collapsed?
    pub fn collapses(&self) -> bool {
        matches!(
            self,
            WhiteSpace::Normal | WhiteSpace::Nowrap | WhiteSpace::PreLine
        )
    }

    /// Do raw newlines force a line break?
    pub fn preserves_newlines(&self) -> bool {
        matches!(
            self,
            WhiteSpace::Pre | WhiteSpace::PreWrap | WhiteSpace::PreLine
        )
    }

    /// May lines wrap at all?
    pub fn allows_wrap(&self) -> bool {
        !matches!(self, WhiteSpace::Nowrap | WhiteSpace::Pre)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Hyphens {
    #[default]
    Manual,
    None,
    Auto,
}

/// `hyphenate-limit-chars`: minimum word length, minimum characters kept
/// before and after the hyphen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HyphenateLimitChars {
    pub total: usize,
    pub before: usize,
    pub after: usize,
}

impl Default for HyphenateLimitChars {
    fn default() -> Self {
        Self {
            total: 5,
            before: 2,
            after: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowWrap {
    #[default]
    Normal,
    BreakWord,
    Anywhere,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WordBreak {
    #[default]
    Normal,
    BreakAll,
    KeepAll,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerticalAlign {
    #[default]
    Baseline,
    Top,
    Bottom,
    Middle,
    TextTop,
    TextBottom,
    Sub,
    Super,
    /// Raise (positive) or lower (negative) by a length in points.
    Length(f64),
    /// Raise or lower by a percentage of the box's line height.
    Percent(f64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
    Oblique,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextTransform {
    #[default]
    None,
    Uppercase,
    Lowercase,
    Capitalize,
}

/// Line height: `normal` uses the font's ascent+descent, a bare number
/// multiplies the font size, a length is used as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LineHeight {
    #[default]
    Normal,
    Multiple(f64),
    Pt(f64),
}

impl LineHeight {
    /// Resolve to points given the font size and the font's natural height.
    pub fn resolve(&self, font_size: f64, natural: f64) -> f64 {
        match self {
            LineHeight::Normal => natural,
            LineHeight::Multiple(m) => font_size * m,
            LineHeight::Pt(v) => *v,
        }
    }
}

/// Predefined counter representation styles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CounterStyleKind {
    #[default]
    Decimal,
    LowerRoman,
    UpperRoman,
    LowerAlpha,
    UpperAlpha,
    None,
}

impl CounterStyleKind {
    /// Format a counter value in this style.
    pub fn format(&self, value: i32) -> String {
        match self {
            CounterStyleKind::Decimal => value.to_string(),
            CounterStyleKind::None => String::new(),
            CounterStyleKind::LowerRoman => to_roman(value).to_lowercase(),
            CounterStyleKind::UpperRoman => to_roman(value),
            CounterStyleKind::LowerAlpha => to_alpha(value),
            CounterStyleKind::UpperAlpha => to_alpha(value).to_uppercase(),
        }
    }
}

fn to_roman(value: i32) -> String {
    if value <= 0 || value >= 5000 {
        return value.to_string();
    }
    const TABLE: [(i32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut n = value;
    let mut out = String::new();
    for (v, s) in TABLE {
        while n >= v {
            out.push_str(s);
            n -= v;
        }
    }
    out
}

fn to_alpha(value: i32) -> String {
    if value <= 0 {
        return value.to_string();
    }
    let mut n = value as u32;
    let mut out = Vec::new();
    while n > 0 {
        n -= 1;
        out.push((b'a' + (n % 26) as u8) as char);
        n /= 26;
    }
    out.iter().rev().collect()
}

/// Which occurrence of a named string or running element a margin box reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageValueSelect {
    /// First value assigned on the page, else the value carried in.
    #[default]
    First,
    /// Value in effect after the page's content is laid out.
    Last,
    /// Empty on the page where the value was first assigned.
    FirstExcept,
    /// Value in effect when the page began.
    Start,
}

/// One piece of a `content`/`string-set` value list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ContentItem {
    Text {
        text: String,
    },
    Counter {
        name: String,
        #[serde(default)]
        style: CounterStyleKind,
    },
    Counters {
        name: String,
        separator: String,
        #[serde(default)]
        style: CounterStyleKind,
    },
    String {
        name: String,
        #[serde(default)]
        select: PageValueSelect,
    },
    Element {
        name: String,
        #[serde(default)]
        select: PageValueSelect,
    },
    TargetCounter {
        target: String,
        name: String,
        #[serde(default)]
        style: CounterStyleKind,
    },
    TargetText {
        target: String,
    },
}

/// The complete resolved style for one element.
///
/// Every field is concrete; `Default` gives the initial value of each
/// property. Lengths that depend on the containing block stay as
/// [`Dimension`] and are resolved at layout time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Style {
    // ── Box generation ─────────────────────────────────────────
    pub display: Display,
    pub position: Position,
    pub float: Float,
    pub clear: Clear,

    // ── Box model ──────────────────────────────────────────────
    pub width: Dimension,
    pub height: Dimension,
    pub min_width: Dimension,
    pub min_height: Dimension,
    pub max_width: Dimension,
    pub max_height: Dimension,
    pub margin: MarginEdges,
    pub padding: Edges,
    pub border_width: Edges,

    // ── Positioned offsets ─────────────────────────────────────
    pub top: Option<f64>,
    pub right: Option<f64>,
    pub bottom: Option<f64>,
    pub left: Option<f64>,

    // ── Flex ───────────────────────────────────────────────────
    pub flex_direction: FlexDirection,
    pub flex_wrap: FlexWrap,
    pub justify_content: JustifyContent,
    pub align_items: AlignItems,
    pub align_self: Option<AlignItems>,
    pub align_content: AlignContent,
    pub flex_grow: f64,
    pub flex_shrink: f64,
    pub flex_basis: Dimension,
    pub row_gap: f64,
    pub column_gap: f64,

    // ── Multicolumn ────────────────────────────────────────────
    pub column_count: Option<u32>,
    pub column_width: Option<f64>,
    pub column_span: ColumnSpan,
    pub column_fill: ColumnFill,

    // ── Fragmentation ──────────────────────────────────────────
    pub break_before: BreakBetween,
    pub break_after: BreakBetween,
    pub break_inside: BreakInside,
    pub orphans: u32,
    pub widows: u32,
    pub margin_break: MarginBreak,
    pub box_decoration_break: DecorationBreak,
    /// Named page this element wants to be placed on.
    pub page: Option<String>,

    // ── Typography ─────────────────────────────────────────────
    pub font_family: String,
    pub font_size: f64,
    pub font_weight: u16,
    pub font_style: FontStyle,
    pub line_height: LineHeight,
    pub vertical_align: VerticalAlign,
    pub text_align: TextAlign,
    pub text_align_last: TextAlignLast,
    pub text_indent: Dimension,
    pub text_transform: TextTransform,
    pub letter_spacing: f64,
    pub word_spacing: f64,
    pub white_space: WhiteSpace,
    pub tab_size: f64,
    pub direction: Direction,
    pub lang: Option<String>,

    // ── Hyphenation & overflow breaking ────────────────────────
    pub hyphens: Hyphens,
    pub hyphenate_character: Option<String>,
    pub hyphenate_limit_chars: HyphenateLimitChars,
    pub hyphenate_limit_zone: Dimension,
    pub overflow_wrap: OverflowWrap,
    pub word_break: WordBreak,

    // ── Counters and named strings ─────────────────────────────
    pub counter_reset: Vec<(String, i32)>,
    pub counter_increment: Vec<(String, i32)>,
    pub counter_set: Vec<(String, i32)>,
    pub string_set: Vec<(String, Vec<ContentItem>)>,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            display: Display::default(),
            position: Position::default(),
            float: Float::default(),
            clear: Clear::default(),
            width: Dimension::Auto,
            height: Dimension::Auto,
            min_width: Dimension::Pt(0.0),
            min_height: Dimension::Pt(0.0),
            max_width: Dimension::Auto,
            max_height: Dimension::Auto,
            margin: MarginEdges::default(),
            padding: Edges::default(),
            border_width: Edges::default(),
            top: None,
            right: None,
            bottom: None,
            left: None,
            flex_direction: FlexDirection::default(),
            flex_wrap: FlexWrap::default(),
            justify_content: JustifyContent::default(),
            align_items: AlignItems::default(),
            align_self: None,
            align_content: AlignContent::default(),
            flex_grow: 0.0,
            flex_shrink: 1.0,
            flex_basis: Dimension::Auto,
            row_gap: 0.0,
            column_gap: 0.0,
            column_count: None,
            column_width: None,
            column_span: ColumnSpan::default(),
            column_fill: ColumnFill::default(),
            break_before: BreakBetween::default(),
            break_after: BreakBetween::default(),
            break_inside: BreakInside::default(),
            orphans: 2,
            widows: 2,
            margin_break: MarginBreak::default(),
            box_decoration_break: DecorationBreak::default(),
            page: None,
            font_family: "serif".to_string(),
            font_size: 16.0,
            font_weight: 400,
            font_style: FontStyle::default(),
            line_height: LineHeight::default(),
            vertical_align: VerticalAlign::default(),
            text_align: TextAlign::default(),
            text_align_last: TextAlignLast::default(),
            text_indent: Dimension::Pt(0.0),
            text_transform: TextTransform::default(),
            letter_spacing: 0.0,
            word_spacing: 0.0,
            white_space: WhiteSpace::default(),
            tab_size: 8.0,
            direction: Direction::default(),
            lang: None,
            hyphens: Hyphens::default(),
            hyphenate_character: None,
            hyphenate_limit_chars: HyphenateLimitChars::default(),
            hyphenate_limit_zone: Dimension::Pt(0.0),
            overflow_wrap: OverflowWrap::default(),
            word_break: WordBreak::default(),
            counter_reset: Vec::new(),
            counter_increment: Vec::new(),
            counter_set: Vec::new(),
            string_set: Vec::new(),
        }
    }
}

impl Style {
    /// Does this box establish an independent formatting context, which
    /// suppresses margin collapsing through its boundary?
    pub fn establishes_context(&self) -> bool {
        matches!(self.display, Display::Flex | Display::InlineBlock)
            || self.column_count.is_some()
            || self.column_width.is_some()
            || self.float != Float::None
            || !matches!(self.position, Position::Static | Position::Relative)
    }

    /// Is this box a multicolumn container?
    pub fn is_multicol(&self) -> bool {
        self.column_count.is_some() || self.column_width.is_some()
    }

    /// Is this box out of the normal flow?
    pub fn out_of_flow(&self) -> bool {
        matches!(
            self.position,
            Position::Absolute | Position::Fixed | Position::Running(_)
        ) || self.float != Float::None
    }

    /// Physical text alignment for a line, given whether it is the last
    /// line before a forced break or the end of the block.
    pub fn line_alignment(&self, is_last: bool) -> TextAlign {
        if is_last {
            match self.text_align_last {
                TextAlignLast::Auto => match self.text_align {
                    // The last line of a justified block falls back to start.
                    TextAlign::Justify => TextAlign::Start,
                    TextAlign::JustifyAll => TextAlign::Justify,
                    other => other,
                },
                TextAlignLast::Start => TextAlign::Start,
                TextAlignLast::End => TextAlign::End,
                TextAlignLast::Left => TextAlign::Left,
                TextAlignLast::Right => TextAlign::Right,
                TextAlignLast::Center => TextAlign::Center,
                TextAlignLast::Justify => TextAlign::Justify,
            }
        } else {
            match self.text_align {
                TextAlign::JustifyAll => TextAlign::Justify,
                other => other,
            }
        }
    }

    /// Clamp a used main-size value to the box's min/max constraints.
    pub fn clamp_width(&self, value: f64, base: f64) -> f64 {
        let mut v = value;
        if let Some(max) = self.max_width.resolve(base) {
            v = v.min(max);
        }
        if let Some(min) = self.min_width.resolve(base) {
            v = v.max(min);
        }
        v.max(0.0)
    }

    pub fn clamp_height(&self, value: f64, base: f64) -> f64 {
        let mut v = value;
        if let Some(max) = self.max_height.resolve(base) {
            v = v.min(max);
        }
        if let Some(min) = self.min_height.resolve(base) {
            v = v.max(min);
        }
        v.max(0.0)
    }
}
