//! # Line Breaker
//!
//! Turns the inline-level content of a block container into line boxes:
//! white-space processing, break placement (UAX#14, soft and dictionary
//! hyphens, emergency mid-word breaks), inline-box splitting across lines,
//! vertical alignment, bidi reordering and horizontal distribution.
//!
//! The work happens in three phases:
//! 1. **collect**: flatten the inline subtree into measured items,
//! 2. **fill**: greedy placement into lines against the available bands,
//! 3. **finalize**: per line, alignment, justification, bidi order,
//!    vertical metrics, fragment emission.
//!
//! Breaking is a pure function of the content and the available widths, so
//! a paragraph resumed on a later page reproduces the same prefix and
//! continues exactly where it stopped.

pub mod bidi;

use std::sync::Arc;

use unicode_bidi::Level;

use crate::geometry::{Edges, Rect};
use crate::layout::{BoxKind, BoxNode, Fragment, FragmentKind, LayoutContext, SplitMarker};
use crate::measure::{resolved_line_height, BreakChance};
use crate::style::{
    DecorationBreak, Direction, OverflowWrap, Style, TextAlign, TextTransform, VerticalAlign,
    WhiteSpace, WordBreak,
};

// ── Items ───────────────────────────────────────────────────────

/// An inline box opened somewhere in the paragraph.
#[derive(Debug, Clone)]
pub struct InlineBoxInfo {
    pub style: Arc<Style>,
    pub id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunItem {
    pub style: Arc<Style>,
    pub chars: Vec<char>,
    pub advances: Vec<f64>,
    pub breaks: Vec<BreakChance>,
    pub levels: Vec<Level>,
    pub ascent: f64,
    pub descent: f64,
    /// Advance of one space in this style, for tab stops.
    pub space_advance: f64,
}

#[derive(Debug, Clone)]
pub struct AtomItem {
    /// Fully laid out content, positioned at (0, 0).
    pub fragment: Fragment,
    pub style: Arc<Style>,
    pub margin: Edges,
    pub level: Level,
}

#[derive(Debug, Clone)]
pub enum InlineItem {
    Run(RunItem),
    Open(usize),
    Close(usize),
    Atom(AtomItem),
    /// A forced line break.
    Hard,
}

/// The measured inline content of one paragraph.
#[derive(Debug, Clone, Default)]
pub struct InlineContent {
    pub items: Vec<InlineItem>,
    pub boxes: Vec<InlineBoxInfo>,
}

impl InlineContent {
    pub fn is_empty(&self) -> bool {
        !self.items.iter().any(|item| match item {
            InlineItem::Run(run) => !run.chars.is_empty(),
            InlineItem::Atom(_) | InlineItem::Hard => true,
            _ => false,
        })
    }
}

// ── Collection ──────────────────────────────────────────────────

struct Collector<'a, 'm> {
    ctx: &'a mut LayoutContext<'m>,
    items: Vec<InlineItem>,
    boxes: Vec<InlineBoxInfo>,
    /// Carries space-collapsing state across node boundaries.
    prev_space: bool,
    origin_x: f64,
    origin_y: f64,
    avail_width: f64,
}

/// Flatten and measure the inline content of `children`.
///
/// `effects` applies the boxes' document-order side effects (counters,
/// string sets, anchors); pass `false` when re-collecting for a resumed
/// fragment so state does not advance twice.
pub fn collect_inline(
    ctx: &mut LayoutContext,
    para_style: &Arc<Style>,
    children: &[BoxNode],
    origin_x: f64,
    origin_y: f64,
    avail_width: f64,
    effects: bool,
) -> InlineContent {
    let was_measuring = ctx.measuring;
    if !effects {
        ctx.measuring = true;
    }
    let mut collector = Collector {
        ctx,
        items: Vec::new(),
        boxes: Vec::new(),
        prev_space: true,
        origin_x,
        origin_y,
        avail_width,
    };
    for child in children {
        collector.visit(child);
    }
    let Collector { items, boxes, .. } = collector;
    ctx.measuring = was_measuring;

    let mut content = InlineContent { items, boxes };
    assign_bidi_levels(&mut content, para_style.direction);
    content
}

impl Collector<'_, '_> {
    fn visit(&mut self, node: &BoxNode) {
        if node.style.out_of_flow() {
            // Floats and positioned boxes are handled by block flow; the
            // paragraph itself only sees true inline content.
            return;
        }
        match &node.kind {
            BoxKind::Text(text) => {
                self.ctx.note_box_start(node, self.origin_x, self.origin_y);
                self.push_run(&node.style, text);
            }
            BoxKind::LineBreak => {
                self.items.push(InlineItem::Hard);
                self.prev_space = true;
            }
            BoxKind::Replaced(intrinsic) => {
                self.ctx.note_box_start(node, self.origin_x, self.origin_y);
                let size =
                    self.ctx
                        .measure
                        .replaced_size(&node.style, *intrinsic, self.avail_width);
                let fragment = Fragment::new(
                    FragmentKind::Replaced,
                    node.style.clone(),
                    Rect::new(0.0, 0.0, size.width, size.height),
                );
                self.items.push(InlineItem::Atom(AtomItem {
                    fragment,
                    margin: node.style.margin.resolve(self.avail_width),
                    style: node.style.clone(),
                    level: Level::ltr(),
                }));
                self.prev_space = false;
            }
            BoxKind::Container if node.style.display == crate::style::Display::InlineBlock => {
                self.ctx.note_box_start(node, self.origin_x, self.origin_y);
                let fragment =
                    crate::layout::block::layout_atomic_inline(self.ctx, node, self.avail_width);
                self.items.push(InlineItem::Atom(AtomItem {
                    margin: node.style.margin.resolve(self.avail_width),
                    style: node.style.clone(),
                    fragment,
                    level: Level::ltr(),
                }));
                self.prev_space = false;
            }
            BoxKind::Container => {
                self.ctx.note_box_start(node, self.origin_x, self.origin_y);
                let idx = self.boxes.len();
                self.boxes.push(InlineBoxInfo {
                    style: node.style.clone(),
                    id: node.id.clone(),
                });
                self.items.push(InlineItem::Open(idx));
                for child in &node.children {
                    self.visit(child);
                }
                self.items.push(InlineItem::Close(idx));
            }
        }
    }

    fn push_run(&mut self, style: &Arc<Style>, text: &str) {
        let collapsed = collapse_white_space(text, style.white_space, &mut self.prev_space);
        let transformed = apply_transform(&collapsed, style.text_transform);
        if transformed.is_empty() {
            return;
        }
        let run = self.ctx.measure.measure(style, &transformed);
        let breaks = self.ctx.measure.break_opportunities(style, &transformed);
        let space = self.ctx.measure.measure(style, " ");
        let chars: Vec<char> = transformed.chars().collect();
        let levels = vec![Level::ltr(); chars.len()];
        self.items.push(InlineItem::Run(RunItem {
            style: style.clone(),
            chars,
            advances: run.advances,
            breaks,
            levels,
            ascent: run.ascent,
            descent: run.descent,
            space_advance: space.width,
        }));
    }
}

/// Process white space per the governing mode, merging the collapse state
/// across adjacent runs.
fn collapse_white_space(text: &str, ws: WhiteSpace, prev_space: &mut bool) -> String {
    let mut out = String::with_capacity(text.len());
    if ws.collapses() {
        for ch in text.chars() {
            let newline = ch == '\n' || ch == '\r' || ch == '\u{2028}' || ch == '\u{2029}';
            if newline && ws.preserves_newlines() {
                // pre-line: the newline survives, surrounding spaces go.
                while out.ends_with(' ') {
                    out.pop();
                }
                out.push('\n');
                *prev_space = true;
                continue;
            }
            if ch.is_whitespace() {
                if !*prev_space {
                    out.push(' ');
                }
                *prev_space = true;
            } else {
                out.push(ch);
                *prev_space = false;
            }
        }
    } else {
        // pre / pre-wrap: normalize newline flavors, keep the rest.
        let mut chars = text.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '\r' => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    out.push('\n');
                }
                '\u{2029}' => out.push('\n'),
                other => out.push(other),
            }
        }
        *prev_space = out.ends_with([' ', '\n']);
    }
    out
}

fn apply_transform(text: &str, transform: TextTransform) -> String {
    match transform {
        TextTransform::None => text.to_string(),
        TextTransform::Uppercase => text
            .chars()
            .map(|c| c.to_uppercase().next().unwrap_or(c))
            .collect(),
        TextTransform::Lowercase => text
            .chars()
            .map(|c| c.to_lowercase().next().unwrap_or(c))
            .collect(),
        TextTransform::Capitalize => {
            let mut out = String::with_capacity(text.len());
            let mut word_start = true;
            for ch in text.chars() {
                if word_start && ch.is_alphabetic() {
                    out.push(ch.to_uppercase().next().unwrap_or(ch));
                } else {
                    out.push(ch);
                }
                word_start = !ch.is_alphanumeric();
            }
            out
        }
    }
}

/// Compute embedding levels over the whole paragraph and write them back
/// into the runs (atomic inlines count as one object character).
fn assign_bidi_levels(content: &mut InlineContent, direction: Direction) {
    let mut para = String::new();
    for item in &content.items {
        match item {
            InlineItem::Run(run) => para.extend(run.chars.iter()),
            InlineItem::Atom(_) => para.push('\u{FFFC}'),
            _ => {}
        }
    }
    if bidi::is_pure_ltr(&para, direction) {
        return;
    }
    let levels = bidi::paragraph_levels(&para, direction);
    let mut cursor = 0;
    for item in &mut content.items {
        match item {
            InlineItem::Run(run) => {
                for level in run.levels.iter_mut() {
                    *level = levels.get(cursor).copied().unwrap_or_else(Level::ltr);
                    cursor += 1;
                }
            }
            InlineItem::Atom(atom) => {
                atom.level = levels.get(cursor).copied().unwrap_or_else(Level::ltr);
                cursor += 1;
            }
            _ => {}
        }
    }
}

// ── Pieces and lines ────────────────────────────────────────────

#[derive(Debug, Clone)]
enum PieceKind {
    Text(String),
    Atom { fragment: Fragment, margin: Edges },
    LeftEdge(usize),
    RightEdge(usize),
}

#[derive(Debug, Clone)]
struct Piece {
    kind: PieceKind,
    owners: Vec<usize>,
    style: Arc<Style>,
    level: Level,
    width: f64,
    /// Justification-stretchable spaces inside this piece.
    spaces: usize,
    /// Advances of the trailing space run, for end-of-line trimming.
    trailing: Vec<f64>,
    x: f64,
}

#[derive(Debug)]
struct RawLine {
    pieces: Vec<Piece>,
    start: (usize, usize),
    is_last: bool,
    band: (f64, f64),
    opened: Vec<usize>,
    closed: Vec<usize>,
}

/// One finished line: a fragment plus the fill state needed to resume
/// after it.
#[derive(Debug, Clone)]
pub struct LineOut {
    pub fragment: Fragment,
    pub height: f64,
    /// (item, char) state at the start of this line.
    pub start: (usize, usize),
}

/// Break and position the paragraph, producing every line from `resume` to
/// the end. The caller decides how many fit in the current fragmentainer.
pub fn layout_paragraph(
    ctx: &LayoutContext,
    style: &Arc<Style>,
    content: &InlineContent,
    x: f64,
    width: f64,
    top: f64,
    resume: Option<(usize, usize)>,
) -> Vec<LineOut> {
    if content.items.is_empty() {
        return Vec::new();
    }
    let strut = strut_metrics(ctx, style);
    let raw = fill_lines(ctx, style, content, x, width, top, resume, &strut);
    let mut out = Vec::with_capacity(raw.len());
    let mut y = top;
    let first_formatted = resume.is_none();
    for (i, line) in raw.into_iter().enumerate() {
        let indent = if i == 0 && first_formatted {
            style.text_indent.resolve(width).unwrap_or(0.0)
        } else {
            0.0
        };
        let finished = finalize_line(ctx, style, content, line, y, indent, &strut);
        y += finished.height;
        out.push(finished);
    }
    out
}

#[derive(Debug, Clone, Copy)]
struct Strut {
    ascent: f64,
    descent: f64,
    line_height: f64,
}

fn strut_metrics(ctx: &LayoutContext, style: &Style) -> Strut {
    let run = ctx.measure.measure(style, "x");
    let line_height = style.line_height.resolve(style.font_size, run.height());
    Strut {
        ascent: run.ascent,
        descent: run.descent,
        line_height,
    }
}

/// Half-leaded extent of a piece of text under `style`.
fn leaded(ctx: &LayoutContext, style: &Style, ascent: f64, descent: f64) -> (f64, f64) {
    let line_height = resolved_line_height(ctx.measure, style);
    let leading = line_height - (ascent + descent);
    (ascent + leading / 2.0, descent + leading / 2.0)
}

// ── Fill ────────────────────────────────────────────────────────

#[derive(Clone)]
struct SavePoint {
    /// Cursor to resume at after breaking here.
    cursor: (usize, usize),
    pieces_len: usize,
    piece_text_len: usize,
    piece_width: f64,
    piece_spaces: usize,
    piece_trailing: Vec<f64>,
    line_width: f64,
    owners: Vec<usize>,
    opened_len: usize,
    closed_len: usize,
    hyphen: bool,
}

struct Filler<'c> {
    content: &'c InlineContent,
    lines: Vec<RawLine>,
    pieces: Vec<Piece>,
    owners: Vec<usize>,
    line_width: f64,
    line_start: (usize, usize),
    opened: Vec<usize>,
    closed: Vec<usize>,
    save_allowed: Option<SavePoint>,
    save_hyphen: Option<SavePoint>,
    last_was_space: bool,
    y: f64,
    band: (f64, f64),
    strut_height: f64,
    /// Set by a line break; the main loop jumps here.
    jump: Option<(usize, usize)>,
}

#[allow(clippy::too_many_arguments)]
fn fill_lines(
    ctx: &LayoutContext,
    para_style: &Arc<Style>,
    content: &InlineContent,
    x: f64,
    width: f64,
    top: f64,
    resume: Option<(usize, usize)>,
    strut: &Strut,
) -> Vec<RawLine> {
    let start = resume.unwrap_or((0, 0));
    let strut_height = strut.line_height.max(strut.ascent + strut.descent);
    let band = ctx.floats.band(top, strut_height, x, x + width);

    let mut f = Filler {
        content,
        lines: Vec::new(),
        pieces: Vec::new(),
        owners: Vec::new(),
        line_width: 0.0,
        line_start: start,
        opened: Vec::new(),
        closed: Vec::new(),
        save_allowed: None,
        save_hyphen: None,
        last_was_space: true,
        y: top,
        band,
        strut_height,
        jump: None,
    };

    // Rebuild the open-box stack for a resumed paragraph.
    for item in &content.items[..start.0] {
        match item {
            InlineItem::Open(idx) => f.owners.push(*idx),
            InlineItem::Close(_) => {
                f.owners.pop();
            }
            _ => {}
        }
    }
    for &owner in f.owners.clone().iter() {
        if content.boxes[owner].style.box_decoration_break == DecorationBreak::Clone {
            f.push_edge(PieceKind::LeftEdge(owner));
        }
    }

    let indent = if resume.is_none() {
        para_style.text_indent.resolve(width).unwrap_or(0.0)
    } else {
        0.0
    };

    let (mut item_idx, mut char_idx) = start;
    while item_idx < content.items.len() {
        match &content.items[item_idx] {
            InlineItem::Open(idx) => {
                f.owners.push(*idx);
                f.opened.push(*idx);
                f.push_edge(PieceKind::LeftEdge(*idx));
                item_idx += 1;
            }
            InlineItem::Close(idx) => {
                f.push_edge(PieceKind::RightEdge(*idx));
                f.owners.pop();
                f.closed.push(*idx);
                item_idx += 1;
            }
            InlineItem::Hard => {
                f.flush_line(ctx, x, width, (item_idx + 1, 0), true);
                item_idx += 1;
                char_idx = 0;
            }
            InlineItem::Atom(atom) => {
                let outer = atom.fragment.rect.width + atom.margin.horizontal();
                let avail = f.avail(indent);
                if f.line_width > 0.0 && f.line_width + outer > avail + 1e-6 {
                    if let Some(save) = f.save_allowed.clone() {
                        f.cut_at(ctx, para_style, save, x, width);
                    } else {
                        f.flush_line(ctx, x, width, (item_idx, 0), false);
                    }
                } else {
                    f.pieces.push(Piece {
                        kind: PieceKind::Atom {
                            fragment: atom.fragment.clone(),
                            margin: atom.margin,
                        },
                        owners: f.owners.clone(),
                        style: atom.style.clone(),
                        level: atom.level,
                        width: outer,
                        spaces: 0,
                        trailing: Vec::new(),
                        x: 0.0,
                    });
                    f.line_width += outer;
                    f.last_was_space = false;
                    // Breaking is legal on either side of an atomic inline.
                    f.save_allowed = Some(f.save_point((item_idx + 1, 0), false));
                    f.save_hyphen = None;
                    item_idx += 1;
                }
            }
            InlineItem::Run(run) => {
                if char_idx >= run.chars.len() {
                    item_idx += 1;
                    char_idx = 0;
                    continue;
                }
                f.step_run(ctx, para_style, run, item_idx, char_idx, x, width, indent);
                if f.jump.is_none() {
                    char_idx += 1;
                }
            }
        }
        if let Some((ji, jc)) = f.jump.take() {
            item_idx = ji;
            char_idx = jc;
        }
    }

    // Flush the final line.
    let end = (content.items.len(), 0);
    if !f.pieces.is_empty() || f.lines.is_empty() {
        f.flush_line(ctx, x, width, end, true);
    }
    f.lines
}

impl Filler<'_> {
    fn avail(&self, indent: f64) -> f64 {
        let first_line = self.lines.is_empty();
        (self.band.1 - self.band.0) - if first_line { indent } else { 0.0 }
    }

    fn save_point(&self, cursor: (usize, usize), hyphen: bool) -> SavePoint {
        let (text_len, width, spaces, trailing) = match self.pieces.last() {
            Some(Piece {
                kind: PieceKind::Text(t),
                width,
                spaces,
                trailing,
                ..
            }) => (t.chars().count(), *width, *spaces, trailing.clone()),
            _ => (0, 0.0, 0, Vec::new()),
        };
        SavePoint {
            cursor,
            pieces_len: self.pieces.len(),
            piece_text_len: text_len,
            piece_width: width,
            piece_spaces: spaces,
            piece_trailing: trailing,
            line_width: self.line_width,
            owners: self.owners.clone(),
            opened_len: self.opened.len(),
            closed_len: self.closed.len(),
            hyphen,
        }
    }

    fn push_edge(&mut self, kind: PieceKind) {
        let (idx, left) = match kind {
            PieceKind::LeftEdge(i) => (i, true),
            PieceKind::RightEdge(i) => (i, false),
            _ => unreachable!(),
        };
        let style = self.content.boxes[idx].style.clone();
        let margin = style.margin.resolve(0.0);
        let width = if left {
            margin.left + style.border_width.left + style.padding.left
        } else {
            margin.right + style.border_width.right + style.padding.right
        };
        self.pieces.push(Piece {
            kind,
            owners: self.owners.clone(),
            style,
            level: Level::ltr(),
            width,
            spaces: 0,
            trailing: Vec::new(),
            x: 0.0,
        });
        self.line_width += width;
    }

    /// Process one character of a run.
    #[allow(clippy::too_many_arguments)]
    fn step_run(
        &mut self,
        ctx: &LayoutContext,
        para_style: &Arc<Style>,
        run: &RunItem,
        item_idx: usize,
        i: usize,
        x: f64,
        width: f64,
        indent: f64,
    ) {
        let ch = run.chars[i];
        let wrap = run.style.white_space.allows_wrap();

        // Newlines preserved by the white-space mode are hard breaks.
        if ch == '\n' {
            self.flush_line(ctx, x, width, (item_idx, i + 1), true);
            self.jump = Some((item_idx, i + 1));
            return;
        }

        // Skip collapsible spaces at the start of a line.
        if self.line_width == 0.0
            && self.pieces.iter().all(|p| p.width == 0.0)
            && ch == ' '
            && run.style.white_space.collapses()
        {
            self.line_start = (item_idx, i + 1);
            return;
        }

        if wrap {
            match run.breaks.get(i).copied().unwrap_or(BreakChance::Prohibited) {
                BreakChance::Mandatory => {
                    // Already taken when the newline itself flushed the line.
                    if self.line_start != (item_idx, i) {
                        self.flush_line(ctx, x, width, (item_idx, i), true);
                        self.jump = Some((item_idx, i));
                        return;
                    }
                }
                BreakChance::Allowed => {
                    self.save_allowed = Some(self.save_point((item_idx, i), false));
                    self.save_hyphen = None;
                }
                BreakChance::Hyphen => {
                    self.save_hyphen = Some(self.save_point((item_idx, i), true));
                }
                BreakChance::Prohibited => {
                    if self.last_was_space && ch != ' ' {
                        self.save_allowed = Some(self.save_point((item_idx, i), false));
                        self.save_hyphen = None;
                    } else if run.style.word_break == WordBreak::BreakAll
                        && ch != ' '
                        && self.line_width > 0.0
                    {
                        self.save_allowed = Some(self.save_point((item_idx, i), false));
                    }
                }
            }
        }

        let advance = if ch == '\t' && !run.style.white_space.collapses() {
            let tab = run.style.tab_size.max(1.0) * run.space_advance;
            let within = (self.line_width / tab + 1e-9).floor();
            (within + 1.0) * tab - self.line_width
        } else {
            run.advances[i]
        };

        let avail = self.avail(indent);
        if wrap && ch != ' ' && self.line_width + advance > avail + 1e-6 {
            let zone = run
                .style
                .hyphenate_limit_zone
                .resolve(avail)
                .unwrap_or(0.0);
            let choice = match (&self.save_allowed, &self.save_hyphen) {
                (Some(a), Some(h)) => {
                    if h.line_width > a.line_width && (avail - a.line_width) > zone {
                        Some(h.clone())
                    } else {
                        Some(a.clone())
                    }
                }
                (Some(a), None) => Some(a.clone()),
                (None, Some(h)) => Some(h.clone()),
                (None, None) => None,
            };
            if let Some(save) = choice {
                self.cut_at(ctx, para_style, save, x, width);
                return;
            }
            // No break point on the line: a mid-word emergency break is
            // allowed only for styles that opt in, and only once the line
            // has something on it.
            let can_emergency = matches!(
                run.style.overflow_wrap,
                OverflowWrap::BreakWord | OverflowWrap::Anywhere
            ) || run.style.word_break == WordBreak::BreakAll;
            if can_emergency && self.line_width > 0.0 {
                let save = self.save_point((item_idx, i), false);
                self.cut_at(ctx, para_style, save, x, width);
                return;
            }
            // Otherwise the word overflows the line.
        }

        self.append_char(run, ch, advance, i);
        self.last_was_space = ch == ' ';
    }

    fn append_char(&mut self, run: &RunItem, ch: char, advance: f64, i: usize) {
        if ch == '\u{00AD}' {
            // Soft hyphens are invisible off the break point.
            return;
        }
        let level = run.levels.get(i).copied().unwrap_or_else(Level::ltr);
        let start_new = match self.pieces.last() {
            Some(piece) => {
                !matches!(piece.kind, PieceKind::Text(_))
                    || piece.owners != self.owners
                    || piece.level != level
                    || !Arc::ptr_eq(&piece.style, &run.style)
                    || (self.last_was_space && ch != ' ')
            }
            None => true,
        };
        if start_new {
            self.pieces.push(Piece {
                kind: PieceKind::Text(String::new()),
                owners: self.owners.clone(),
                style: run.style.clone(),
                level,
                width: 0.0,
                spaces: 0,
                trailing: Vec::new(),
                x: 0.0,
            });
        }
        if let Some(piece) = self.pieces.last_mut() {
            if let PieceKind::Text(t) = &mut piece.kind {
                t.push(ch);
            }
            piece.width += advance;
            if ch == ' ' {
                piece.spaces += 1;
                piece.trailing.push(advance);
            } else {
                piece.trailing.clear();
            }
        }
        self.line_width += advance;
    }

    /// Truncate to a save point and flush the line ending there.
    fn cut_at(
        &mut self,
        ctx: &LayoutContext,
        para_style: &Arc<Style>,
        save: SavePoint,
        x: f64,
        width: f64,
    ) {
        self.pieces.truncate(save.pieces_len);
        if let Some(piece) = self.pieces.last_mut() {
            if let PieceKind::Text(t) = &mut piece.kind {
                let keep: String = t.chars().take(save.piece_text_len).collect();
                *t = keep;
                piece.width = save.piece_width;
                piece.spaces = save.piece_spaces;
                piece.trailing = save.piece_trailing.clone();
            }
        }
        self.line_width = save.line_width;
        self.owners = save.owners.clone();
        self.opened.truncate(save.opened_len);
        self.closed.truncate(save.closed_len);

        if save.hyphen {
            let style = self
                .pieces
                .last()
                .map(|p| p.style.clone())
                .unwrap_or_else(|| para_style.clone());
            let hyphen_text = style
                .hyphenate_character
                .clone()
                .unwrap_or_else(|| "-".to_string());
            let hyphen_run = ctx.measure.measure(&style, &hyphen_text);
            if let Some(piece) = self.pieces.last_mut() {
                if let PieceKind::Text(t) = &mut piece.kind {
                    t.push_str(&hyphen_text);
                    piece.width += hyphen_run.width;
                    piece.trailing.clear();
                }
            }
            self.line_width += hyphen_run.width;
        }

        self.flush_line(ctx, x, width, save.cursor, false);
        self.jump = Some(save.cursor);
    }

    /// Close the current line and start a fresh one at `next_start`.
    fn flush_line(
        &mut self,
        ctx: &LayoutContext,
        x: f64,
        width: f64,
        next_start: (usize, usize),
        is_last: bool,
    ) {
        let open_now = self.owners.clone();
        if !is_last {
            // Boxes continuing past this line repeat their trailing edge
            // under `box-decoration-break: clone`.
            for &owner in open_now.iter().rev() {
                if self.content.boxes[owner].style.box_decoration_break == DecorationBreak::Clone {
                    self.push_edge(PieceKind::RightEdge(owner));
                }
            }
        }

        let line = RawLine {
            pieces: std::mem::take(&mut self.pieces),
            start: self.line_start,
            is_last,
            band: self.band,
            opened: std::mem::take(&mut self.opened),
            closed: std::mem::take(&mut self.closed),
        };
        // The strut height is a lower bound on the finished line height;
        // it keeps float-band queries monotonic while filling.
        self.y += self.strut_height;
        self.band = ctx.floats.band(self.y, self.strut_height, x, x + width);
        self.lines.push(line);

        self.line_width = 0.0;
        self.line_start = next_start;
        self.save_allowed = None;
        self.save_hyphen = None;
        self.last_was_space = true;

        if !is_last {
            for &owner in open_now.iter() {
                if self.content.boxes[owner].style.box_decoration_break == DecorationBreak::Clone {
                    self.push_edge(PieceKind::LeftEdge(owner));
                }
            }
        }
    }
}

// ── Finalize ────────────────────────────────────────────────────

fn finalize_line(
    ctx: &LayoutContext,
    para_style: &Arc<Style>,
    content: &InlineContent,
    mut line: RawLine,
    y: f64,
    indent: f64,
    strut: &Strut,
) -> LineOut {
    trim_trailing_spaces(&mut line.pieces);

    let natural_width: f64 = line.pieces.iter().map(|p| p.width).sum();
    let band_width = line.band.1 - line.band.0;
    let slack = (band_width - indent - natural_width).max(0.0);

    // Horizontal distribution.
    let align = physical_align(para_style, line.is_last);
    let mut lead = match align {
        TextAlign::Right => slack,
        TextAlign::Center => slack / 2.0,
        _ => 0.0,
    };
    if matches!(align, TextAlign::Justify) {
        let spaces: usize = line.pieces.iter().map(|p| p.spaces).sum();
        if spaces > 0 {
            let per_space = slack / spaces as f64;
            for piece in &mut line.pieces {
                piece.width += per_space * piece.spaces as f64;
            }
        }
        // A line with no stretchable break points stays unjustified.
        lead = 0.0;
    }

    let indent_offset = match para_style.direction {
        Direction::Ltr => indent,
        Direction::Rtl => 0.0,
    };

    // Visual order, then x assignment left to right.
    let levels: Vec<Level> = line.pieces.iter().map(|p| p.level).collect();
    let order = bidi::visual_order(&levels);
    let mut cursor = line.band.0 + indent_offset + lead;
    for &idx in &order {
        line.pieces[idx].x = cursor;
        cursor += line.pieces[idx].width;
    }

    // Vertical metrics: the strut plus every piece's aligned extent.
    let (strut_a, strut_d) = {
        let leading = strut.line_height - (strut.ascent + strut.descent);
        (strut.ascent + leading / 2.0, strut.descent + leading / 2.0)
    };
    let mut ascent: f64 = strut_a;
    let mut descent: f64 = strut_d;
    let mut extents: Vec<(f64, f64, f64)> = Vec::with_capacity(line.pieces.len());
    for piece in &line.pieces {
        let (a, d) = piece_extent(ctx, piece);
        let shift = baseline_shift(ctx, para_style, piece, strut);
        match piece.style.vertical_align {
            VerticalAlign::Top | VerticalAlign::Bottom => {}
            _ => {
                ascent = ascent.max(a + shift);
                descent = descent.max(d - shift);
            }
        }
        extents.push((a, d, shift));
    }
    // Top/bottom-aligned pieces can still grow the line.
    let mut height = ascent + descent;
    for (piece, (a, d, _)) in line.pieces.iter().zip(extents.iter()) {
        if matches!(
            piece.style.vertical_align,
            VerticalAlign::Top | VerticalAlign::Bottom
        ) {
            height = height.max(a + d);
        }
    }
    let baseline = y + ascent;

    // Emit child fragments in logical order, grouped by inline box.
    let mut entries: Vec<(Vec<usize>, Option<Fragment>, Rect)> = Vec::new();
    for (piece, (a, d, shift)) in line.pieces.iter().zip(extents.iter()) {
        match &piece.kind {
            PieceKind::Text(text) => {
                if text.is_empty() {
                    continue;
                }
                let rect = Rect::new(piece.x, baseline - shift - a, piece.width, a + d);
                let mut frag = Fragment::new(
                    FragmentKind::Text { text: text.clone() },
                    piece.style.clone(),
                    rect,
                );
                frag.baseline = Some(*a);
                entries.push((piece.owners.clone(), Some(frag), rect));
            }
            PieceKind::Atom { fragment, margin } => {
                let mut frag = fragment.clone();
                let top = match piece.style.vertical_align {
                    VerticalAlign::Top => y + margin.top,
                    VerticalAlign::Bottom => y + height - (a + d) + margin.top,
                    _ => baseline - shift - a + margin.top,
                };
                frag.translate(piece.x + margin.left, top);
                let rect = frag.rect;
                entries.push((piece.owners.clone(), Some(frag), rect));
            }
            PieceKind::LeftEdge(_) | PieceKind::RightEdge(_) => {
                let rect = Rect::new(piece.x, baseline - strut.ascent, piece.width, 0.0);
                entries.push((piece.owners.clone(), None, rect));
            }
        }
    }
    let children = group_inline_boxes(content, &line, &entries, 0);

    let mut fragment = Fragment::new(
        FragmentKind::Line,
        para_style.clone(),
        Rect::new(line.band.0, y, band_width, height),
    );
    fragment.baseline = Some(ascent);
    fragment.children = children;

    LineOut {
        fragment,
        height,
        start: line.start,
    }
}

/// Spaces at the end of a line take no space and do not justify.
fn trim_trailing_spaces(pieces: &mut [Piece]) {
    for piece in pieces.iter_mut().rev() {
        match &mut piece.kind {
            PieceKind::Text(t) => {
                while t.ends_with(' ') {
                    t.pop();
                    if let Some(w) = piece.trailing.pop() {
                        piece.width -= w;
                    }
                    piece.spaces = piece.spaces.saturating_sub(1);
                }
                if !t.is_empty() {
                    break;
                }
            }
            PieceKind::RightEdge(_) | PieceKind::LeftEdge(_) => continue,
            _ => break,
        }
    }
}

fn physical_align(style: &Style, is_last: bool) -> TextAlign {
    let logical = style.line_alignment(is_last);
    match (logical, style.direction) {
        (TextAlign::Start, Direction::Ltr) | (TextAlign::End, Direction::Rtl) => TextAlign::Left,
        (TextAlign::Start, Direction::Rtl) | (TextAlign::End, Direction::Ltr) => TextAlign::Right,
        (other, _) => other,
    }
}

fn piece_extent(ctx: &LayoutContext, piece: &Piece) -> (f64, f64) {
    match &piece.kind {
        PieceKind::Text(_) => {
            let run = ctx.measure.measure(&piece.style, "x");
            leaded(ctx, &piece.style, run.ascent, run.descent)
        }
        PieceKind::Atom { fragment, margin } => (fragment.rect.height + margin.vertical(), 0.0),
        _ => (0.0, 0.0),
    }
}

/// Baseline shift for `vertical-align`, positive upward.
fn baseline_shift(
    ctx: &LayoutContext,
    para_style: &Arc<Style>,
    piece: &Piece,
    strut: &Strut,
) -> f64 {
    match piece.style.vertical_align {
        VerticalAlign::Baseline | VerticalAlign::Top | VerticalAlign::Bottom => 0.0,
        VerticalAlign::Sub => -0.5 * piece.style.font_size,
        VerticalAlign::Super => 0.5 * piece.style.font_size,
        VerticalAlign::Length(l) => l,
        VerticalAlign::Percent(p) => p / 100.0 * resolved_line_height(ctx.measure, &piece.style),
        VerticalAlign::Middle => {
            let (a, d) = piece_extent(ctx, piece);
            let x_half = 0.25 * para_style.font_size;
            x_half - (a - d) / 2.0
        }
        VerticalAlign::TextTop => {
            let (a, _) = piece_extent(ctx, piece);
            strut.ascent - a
        }
        VerticalAlign::TextBottom => {
            let (_, d) = piece_extent(ctx, piece);
            d - strut.descent
        }
    }
}

/// Group a line's entries into nested inline-box fragments by owner path.
fn group_inline_boxes(
    content: &InlineContent,
    line: &RawLine,
    entries: &[(Vec<usize>, Option<Fragment>, Rect)],
    depth: usize,
) -> Vec<Fragment> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < entries.len() {
        let (owners, frag, rect) = &entries[i];
        match owners.get(depth) {
            None => {
                if let Some(frag) = frag {
                    out.push(frag.clone());
                }
                i += 1;
            }
            Some(&box_idx) => {
                let mut j = i;
                while j < entries.len() && entries[j].0.get(depth) == Some(&box_idx) {
                    j += 1;
                }
                let info = &content.boxes[box_idx];
                let children = group_inline_boxes(content, line, &entries[i..j], depth + 1);
                let mut union = *rect;
                for (_, _, r) in &entries[i..j] {
                    let x0 = union.x.min(r.x);
                    let y0 = union.y.min(r.y);
                    let x1 = union.right().max(r.right());
                    let y1 = union.bottom().max(r.bottom());
                    union = Rect::new(x0, y0, x1 - x0, y1 - y0);
                }
                let opened = line.opened.contains(&box_idx);
                let closed = line.closed.contains(&box_idx);
                let split = match (opened, closed) {
                    (true, true) => SplitMarker::Whole,
                    (true, false) => SplitMarker::First,
                    (false, true) => SplitMarker::Last,
                    (false, false) => SplitMarker::Middle,
                };
                let mut inline = Fragment::new(FragmentKind::Inline, info.style.clone(), union);
                inline.split = split;
                inline.id = info.id.clone();
                inline.children = children;
                out.push(inline);
                i = j;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::CharGrid;

    fn para_style(size: f64) -> Arc<Style> {
        Arc::new(Style {
            font_size: size,
            ..Default::default()
        })
    }

    fn text_node(content: &str, style: &Arc<Style>) -> BoxNode {
        BoxNode {
            kind: BoxKind::Text(content.to_string()),
            style: style.clone(),
            children: Vec::new(),
            id: None,
        }
    }

    fn lines_for(text: &str, width: f64, size: f64) -> Vec<LineOut> {
        let grid = CharGrid::default();
        let mut ctx = LayoutContext::new(&grid);
        let style = para_style(size);
        let children = vec![text_node(text, &style)];
        let content = collect_inline(&mut ctx, &style, &children, 0.0, 0.0, width, true);
        layout_paragraph(&ctx, &style, &content, 0.0, width, 0.0, None)
    }

    #[test]
    fn test_single_line_fits() {
        let lines = lines_for("abc", 100.0, 10.0);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].fragment.children.len(), 1);
    }

    #[test]
    fn test_breaks_at_spaces() {
        // "aaa bbb ccc" at 10pt/char in 40pt: one word per line.
        let lines = lines_for("aaa bbb ccc", 40.0, 10.0);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].fragment.text_content(), "aaa");
        assert_eq!(lines[1].fragment.text_content(), "bbb");
        assert_eq!(lines[2].fragment.text_content(), "ccc");
    }

    #[test]
    fn test_line_heights_use_strut() {
        let lines = lines_for("aaa bbb", 30.0, 10.0);
        // Normal line height with the grid metrics = ascent+descent = 1em.
        for line in &lines {
            assert!((line.height - 10.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_line_positions_stack() {
        let lines = lines_for("aaa bbb ccc", 40.0, 10.0);
        assert!((lines[0].fragment.rect.y - 0.0).abs() < 1e-6);
        assert!((lines[1].fragment.rect.y - 10.0).abs() < 1e-6);
        assert!((lines[2].fragment.rect.y - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_oversized_word_overflows_without_panic() {
        let lines = lines_for("abcdefghij", 30.0, 10.0);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].fragment.children[0].rect.width > 30.0);
    }

    #[test]
    fn test_break_word_splits_oversized_word() {
        let grid = CharGrid::default();
        let mut ctx = LayoutContext::new(&grid);
        let style = Arc::new(Style {
            font_size: 10.0,
            overflow_wrap: OverflowWrap::BreakWord,
            ..Default::default()
        });
        let children = vec![text_node("abcdefgh", &style)];
        let content = collect_inline(&mut ctx, &style, &children, 0.0, 0.0, 30.0, true);
        let lines = layout_paragraph(&ctx, &style, &content, 0.0, 30.0, 0.0, None);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].fragment.text_content(), "abc");
    }

    #[test]
    fn test_break_word_leaves_fitting_words_alone() {
        let grid = CharGrid::default();
        let mut ctx = LayoutContext::new(&grid);
        let style = Arc::new(Style {
            font_size: 10.0,
            overflow_wrap: OverflowWrap::BreakWord,
            ..Default::default()
        });
        let children = vec![text_node("ab cd", &style)];
        let content = collect_inline(&mut ctx, &style, &children, 0.0, 0.0, 30.0, true);
        let lines = layout_paragraph(&ctx, &style, &content, 0.0, 30.0, 0.0, None);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].fragment.text_content(), "ab");
        assert_eq!(lines[1].fragment.text_content(), "cd");
    }

    #[test]
    fn test_collapse_modes() {
        let mut prev = true;
        assert_eq!(
            collapse_white_space("a  b\nc", WhiteSpace::Normal, &mut prev),
            "a b c"
        );
        let mut prev = true;
        assert_eq!(
            collapse_white_space("a  b\nc", WhiteSpace::PreLine, &mut prev),
            "a b\nc"
        );
        let mut prev = true;
        assert_eq!(
            collapse_white_space("a\r\nb", WhiteSpace::Pre, &mut prev),
            "a\nb"
        );
    }

    #[test]
    fn test_pre_newlines_make_lines() {
        let grid = CharGrid::default();
        let mut ctx = LayoutContext::new(&grid);
        let style = Arc::new(Style {
            font_size: 10.0,
            white_space: WhiteSpace::Pre,
            ..Default::default()
        });
        let children = vec![text_node("ab\ncd", &style)];
        let content = collect_inline(&mut ctx, &style, &children, 0.0, 0.0, 500.0, true);
        let lines = layout_paragraph(&ctx, &style, &content, 0.0, 500.0, 0.0, None);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].fragment.text_content(), "ab");
        assert_eq!(lines[1].fragment.text_content(), "cd");
    }

    #[test]
    fn test_nowrap_never_breaks() {
        let grid = CharGrid::default();
        let mut ctx = LayoutContext::new(&grid);
        let style = Arc::new(Style {
            font_size: 10.0,
            white_space: WhiteSpace::Nowrap,
            ..Default::default()
        });
        let children = vec![text_node("aa bb cc", &style)];
        let content = collect_inline(&mut ctx, &style, &children, 0.0, 0.0, 30.0, true);
        let lines = layout_paragraph(&ctx, &style, &content, 0.0, 30.0, 0.0, None);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_center_alignment() {
        let grid = CharGrid::default();
        let mut ctx = LayoutContext::new(&grid);
        let style = Arc::new(Style {
            font_size: 10.0,
            text_align: TextAlign::Center,
            ..Default::default()
        });
        let children = vec![text_node("ab", &style)];
        let content = collect_inline(&mut ctx, &style, &children, 0.0, 0.0, 100.0, true);
        let lines = layout_paragraph(&ctx, &style, &content, 0.0, 100.0, 0.0, None);
        let text = &lines[0].fragment.children[0];
        assert!((text.rect.x - 40.0).abs() < 1e-6);
    }

    #[test]
    fn test_justify_stretches_spaces() {
        let grid = CharGrid::default();
        let mut ctx = LayoutContext::new(&grid);
        let style = Arc::new(Style {
            font_size: 10.0,
            text_align: TextAlign::Justify,
            ..Default::default()
        });
        let children = vec![text_node("aa bb cc dd", &style)];
        let content = collect_inline(&mut ctx, &style, &children, 0.0, 0.0, 70.0, true);
        let lines = layout_paragraph(&ctx, &style, &content, 0.0, 70.0, 0.0, None);
        assert!(lines.len() >= 2);
        let first = &lines[0].fragment;
        let rightmost = first
            .children
            .iter()
            .map(|c| c.rect.right())
            .fold(0.0, f64::max);
        assert!((rightmost - 70.0).abs() < 1e-6, "justified to the edge");
        // The last line is not justified.
        let last = lines.last().unwrap();
        let last_right = last
            .fragment
            .children
            .iter()
            .map(|c| c.rect.right())
            .fold(0.0, f64::max);
        assert!(last_right < 70.0 - 1e-6);
    }

    #[test]
    fn test_text_indent_first_line_only() {
        let grid = CharGrid::default();
        let mut ctx = LayoutContext::new(&grid);
        let style = Arc::new(Style {
            font_size: 10.0,
            text_indent: crate::style::Dimension::Pt(20.0),
            ..Default::default()
        });
        let children = vec![text_node("aa bb", &style)];
        let content = collect_inline(&mut ctx, &style, &children, 0.0, 0.0, 40.0, true);
        let lines = layout_paragraph(&ctx, &style, &content, 0.0, 40.0, 0.0, None);
        assert_eq!(lines.len(), 2);
        assert!((lines[0].fragment.children[0].rect.x - 20.0).abs() < 1e-6);
        assert!((lines[1].fragment.children[0].rect.x - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_resume_reproduces_suffix() {
        let grid = CharGrid::default();
        let mut ctx = LayoutContext::new(&grid);
        let style = para_style(10.0);
        let children = vec![text_node("aa bb cc dd", &style)];
        let content = collect_inline(&mut ctx, &style, &children, 0.0, 0.0, 30.0, true);
        let all = layout_paragraph(&ctx, &style, &content, 0.0, 30.0, 0.0, None);
        assert_eq!(all.len(), 4);
        let resumed = layout_paragraph(&ctx, &style, &content, 0.0, 30.0, 0.0, Some(all[2].start));
        assert_eq!(resumed.len(), 2);
        assert_eq!(resumed[0].fragment.text_content(), "cc");
        assert_eq!(resumed[1].fragment.text_content(), "dd");
    }

    #[test]
    fn test_soft_hyphen_break_renders_hyphen() {
        let grid = CharGrid::default();
        let mut ctx = LayoutContext::new(&grid);
        let style = para_style(10.0);
        let children = vec![text_node("ab\u{00AD}cdef", &style)];
        let content = collect_inline(&mut ctx, &style, &children, 0.0, 0.0, 40.0, true);
        let lines = layout_paragraph(&ctx, &style, &content, 0.0, 40.0, 0.0, None);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].fragment.text_content(), "ab-");
        assert_eq!(lines[1].fragment.text_content(), "cdef");
    }

    #[test]
    fn test_inline_box_split_across_lines() {
        let grid = CharGrid::default();
        let mut ctx = LayoutContext::new(&grid);
        let style = para_style(10.0);
        let inline_style = Arc::new(Style {
            display: crate::style::Display::Inline,
            font_size: 10.0,
            ..Default::default()
        });
        let span = BoxNode {
            kind: BoxKind::Container,
            style: inline_style,
            children: vec![text_node("aa bb", &style)],
            id: None,
        };
        let content = collect_inline(&mut ctx, &style, &[span], 0.0, 0.0, 30.0, true);
        let lines = layout_paragraph(&ctx, &style, &content, 0.0, 30.0, 0.0, None);
        assert_eq!(lines.len(), 2);
        let first_inline = &lines[0].fragment.children[0];
        assert!(matches!(first_inline.kind, FragmentKind::Inline));
        assert_eq!(first_inline.split, SplitMarker::First);
        let last_inline = &lines[1].fragment.children[0];
        assert_eq!(last_inline.split, SplitMarker::Last);
    }

    #[test]
    fn test_rtl_paragraph_right_aligned_by_default() {
        let grid = CharGrid::default();
        let mut ctx = LayoutContext::new(&grid);
        let style = Arc::new(Style {
            font_size: 10.0,
            direction: Direction::Rtl,
            ..Default::default()
        });
        let children = vec![text_node("אב", &style)];
        let content = collect_inline(&mut ctx, &style, &children, 0.0, 0.0, 100.0, true);
        let lines = layout_paragraph(&ctx, &style, &content, 0.0, 100.0, 0.0, None);
        let piece = &lines[0].fragment.children[0];
        assert!((piece.rect.right() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_vertical_align_super_raises_text() {
        let grid = CharGrid::default();
        let mut ctx = LayoutContext::new(&grid);
        let para = para_style(10.0);
        let sup_style = Arc::new(Style {
            font_size: 10.0,
            vertical_align: VerticalAlign::Super,
            display: crate::style::Display::Inline,
            ..Default::default()
        });
        let span = BoxNode {
            kind: BoxKind::Container,
            style: sup_style.clone(),
            children: vec![text_node("x", &sup_style)],
            id: None,
        };
        let children = vec![text_node("a", &para), span];
        let content = collect_inline(&mut ctx, &para, &children, 0.0, 0.0, 100.0, true);
        let lines = layout_paragraph(&ctx, &para, &content, 0.0, 100.0, 0.0, None);
        assert_eq!(lines.len(), 1);
        // The raised run grows the line above the strut height.
        assert!(lines[0].height > 10.0 + 1e-6);
        let base_text = &lines[0].fragment.children[0];
        let raised = &lines[0].fragment.children[1].children[0];
        assert!(raised.rect.y < base_text.rect.y - 1e-6);
    }
}
