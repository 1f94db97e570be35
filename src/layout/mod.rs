//! # Layout Engine Core
//!
//! Shared machinery for every formatting context: the box tree built from
//! the input elements, the fragment tree produced for each page, the
//! context object threaded through all layout calls, float bookkeeping,
//! and intrinsic (content-based) sizing.
//!
//! The page boundary is a first-class constraint here.  Nothing is laid
//! out onto an unbounded canvas and sliced afterwards; every block, line
//! and flex item is placed knowing how much of the current fragmentainer
//! is left, and what does not fit is returned to the caller as a
//! continuation token.

pub mod block;
pub mod columns;
pub mod flex;
pub mod fragment;

use std::sync::Arc;

use crate::counters::{AnchorIndex, CounterContext, RunningRegistry, StringSets};
use crate::geometry::{Rect, Size};
use crate::measure::TextMeasure;
use crate::model::{Element, ElementKind, MarginBoxPosition};
use crate::style::{Display, Float, Position, Style, WhiteSpace};

// ── Box tree ────────────────────────────────────────────────────

/// What a box contains.
#[derive(Debug, Clone)]
pub enum BoxKind {
    /// A container; the formatting context is derived from the style and
    /// from the children at layout time.
    Container,
    /// A text box.
    Text(String),
    /// A replaced box with an intrinsic size.
    Replaced(Size),
    /// A forced line break.
    LineBreak,
}

/// One box of the layout tree.  Styles are shared and immutable; the tree
/// itself is owned by the pagination call that built it.
#[derive(Debug, Clone)]
pub struct BoxNode {
    pub kind: BoxKind,
    pub style: Arc<Style>,
    pub children: Vec<BoxNode>,
    pub id: Option<String>,
}

impl BoxNode {
    /// Is this box inline-level in its parent's flow?
    pub fn is_inline_level(&self) -> bool {
        match self.kind {
            BoxKind::Text(_) | BoxKind::LineBreak => true,
            _ => matches!(
                self.style.display,
                Display::Inline | Display::InlineBlock
            ),
        }
    }

    /// Concatenated text content, for `target-text()`.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(node: &BoxNode, out: &mut String) {
    if let BoxKind::Text(t) = &node.kind {
        out.push_str(t);
    }
    for child in &node.children {
        collect_text(child, out);
    }
}

/// A style for the anonymous block wrapped around runs of inline-level
/// children inside a block container: inherits the text properties,
/// carries no box of its own.
fn anonymous_block_style(parent: &Style) -> Arc<Style> {
    Arc::new(Style {
        display: Display::Block,
        position: Position::Static,
        float: Float::None,
        width: Default::default(),
        height: Default::default(),
        margin: Default::default(),
        padding: Default::default(),
        border_width: Default::default(),
        page: parent.page.clone(),
        counter_reset: Vec::new(),
        counter_increment: Vec::new(),
        counter_set: Vec::new(),
        string_set: Vec::new(),
        ..parent.clone()
    })
}

/// Build the box tree for a document, splitting out `position: fixed`
/// boxes (replayed on every page).  Elements with `display: none`
/// disappear along with their subtrees.  Block containers with mixed
/// children get anonymous block wrappers around their inline runs.
pub fn build_box_tree(root: &Element) -> (BoxNode, Vec<BoxNode>) {
    let mut fixed = Vec::new();
    let node = build_box(root, &mut fixed).unwrap_or(BoxNode {
        kind: BoxKind::Container,
        style: root.style.clone(),
        children: Vec::new(),
        id: None,
    });
    (node, fixed)
}

fn build_box(element: &Element, fixed: &mut Vec<BoxNode>) -> Option<BoxNode> {
    if element.style.display == Display::None {
        return None;
    }

    let children: Vec<BoxNode> = element
        .children
        .iter()
        .filter_map(|child| {
            let node = build_box(child, fixed)?;
            if matches!(node.style.position, Position::Fixed) {
                fixed.push(node);
                None
            } else {
                Some(node)
            }
        })
        .collect();

    let kind = match &element.kind {
        ElementKind::Container => BoxKind::Container,
        ElementKind::Text { content } => BoxKind::Text(content.clone()),
        ElementKind::Replaced { intrinsic } => BoxKind::Replaced(*intrinsic),
        ElementKind::LineBreak => BoxKind::LineBreak,
    };

    let mut node = BoxNode {
        kind,
        style: element.style.clone(),
        children,
        id: element.id.clone(),
    };
    if matches!(node.kind, BoxKind::Container) {
        node.children = wrap_anonymous(&node.style, node.children);
    }
    Some(node)
}

/// Wrap consecutive inline-level children in anonymous blocks when the
/// container also has block-level children, so every container's flow
/// children are homogeneous.
fn wrap_anonymous(parent_style: &Arc<Style>, children: Vec<BoxNode>) -> Vec<BoxNode> {
    let has_block = children
        .iter()
        .any(|c| !c.is_inline_level() && !c.style.out_of_flow());
    let has_inline = children
        .iter()
        .any(|c| c.is_inline_level() && !c.style.out_of_flow());
    if !(has_block && has_inline) {
        return children;
    }

    let anon_style = anonymous_block_style(parent_style);
    let mut out: Vec<BoxNode> = Vec::new();
    let mut run: Vec<BoxNode> = Vec::new();
    for child in children {
        if child.is_inline_level() && !child.style.out_of_flow() {
            run.push(child);
        } else {
            flush_anonymous(&anon_style, &mut run, &mut out);
            out.push(child);
        }
    }
    flush_anonymous(&anon_style, &mut run, &mut out);
    out
}

fn flush_anonymous(style: &Arc<Style>, run: &mut Vec<BoxNode>, out: &mut Vec<BoxNode>) {
    if run.is_empty() {
        return;
    }
    // A run that is nothing but collapsible white space generates no box.
    let only_space = run.iter().all(|n| match &n.kind {
        BoxKind::Text(t) => {
            n.style.white_space.collapses() && t.chars().all(|c| c.is_whitespace())
        }
        _ => false,
    });
    let children = std::mem::take(run);
    if only_space {
        return;
    }
    out.push(BoxNode {
        kind: BoxKind::Container,
        style: style.clone(),
        children,
        id: None,
    });
}

// ── Fragments ───────────────────────────────────────────────────

/// Marks which piece of a split box a fragment is, for
/// `box-decoration-break` and for reassembling content order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitMarker {
    #[default]
    Whole,
    First,
    Middle,
    Last,
}

impl SplitMarker {
    /// Does this fragment carry the box's leading (top) decoration?
    pub fn has_leading_edge(&self, cloned: bool) -> bool {
        cloned || matches!(self, SplitMarker::Whole | SplitMarker::First)
    }

    /// Does this fragment carry the box's trailing (bottom) decoration?
    pub fn has_trailing_edge(&self, cloned: bool) -> bool {
        cloned || matches!(self, SplitMarker::Whole | SplitMarker::Last)
    }
}

#[derive(Debug, Clone)]
pub enum FragmentKind {
    Block,
    /// One per-line piece of an inline box.
    Inline,
    Line,
    Text { text: String },
    Replaced,
    Column,
    MarginBox(MarginBoxPosition),
}

/// A positioned piece of output.  Coordinates are absolute on the page;
/// `rect` is the border box.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub kind: FragmentKind,
    pub style: Arc<Style>,
    pub rect: Rect,
    /// Baseline offset from `rect.y`, for lines and inline-level pieces.
    pub baseline: Option<f64>,
    pub children: Vec<Fragment>,
    pub split: SplitMarker,
    pub id: Option<String>,
}

impl Fragment {
    pub fn new(kind: FragmentKind, style: Arc<Style>, rect: Rect) -> Self {
        Self {
            kind,
            style,
            rect,
            baseline: None,
            children: Vec::new(),
            split: SplitMarker::Whole,
            id: None,
        }
    }

    /// Shift this fragment and its whole subtree.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.rect.x += dx;
        self.rect.y += dy;
        for child in &mut self.children {
            child.translate(dx, dy);
        }
    }

    /// Plain text carried by this subtree, in fragment order.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let FragmentKind::Text { text } = &self.kind {
            out.push_str(text);
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }
}

// ── Floats ──────────────────────────────────────────────────────

/// Floats placed in the current fragmentainer.  Lines and blocks query the
/// available inline band at a given vertical range; `clear` queries the
/// lowest float bottom per side.
#[derive(Debug, Clone, Default)]
pub struct FloatContext {
    left: Vec<Rect>,
    right: Vec<Rect>,
}

impl FloatContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.left.clear();
        self.right.clear();
    }

    /// Available inline range inside `[x0, x1]` for the band
    /// `[y, y + height)`.
    pub fn band(&self, y: f64, height: f64, x0: f64, x1: f64) -> (f64, f64) {
        let mut left = x0;
        let mut right = x1;
        for r in &self.left {
            if r.intersects_band(y, y + height.max(1e-6)) {
                left = left.max(r.right());
            }
        }
        for r in &self.right {
            if r.intersects_band(y, y + height.max(1e-6)) {
                right = right.min(r.x);
            }
        }
        (left, right.max(left))
    }

    /// Lowest bottom edge of floats on the given side(s); `y` when none.
    pub fn clearance(&self, clear: crate::style::Clear, y: f64) -> f64 {
        use crate::style::Clear;
        let mut out = y;
        if matches!(clear, Clear::Left | Clear::Both) {
            for r in &self.left {
                out = out.max(r.bottom());
            }
        }
        if matches!(clear, Clear::Right | Clear::Both) {
            for r in &self.right {
                out = out.max(r.bottom());
            }
        }
        out
    }

    /// Place a float of `size` no higher than `y`, inside `[x0, x1]`.
    /// Drops below existing floats when the band is too narrow.
    pub fn place(&mut self, size: Size, side: Float, mut y: f64, x0: f64, x1: f64) -> Rect {
        loop {
            let (left, right) = self.band(y, size.height, x0, x1);
            if right - left >= size.width - 1e-6 || (left, right) == (x0, x1) {
                let x = match side {
                    Float::Right => right - size.width,
                    _ => left,
                };
                let rect = Rect::new(x, y, size.width, size.height);
                match side {
                    Float::Right => self.right.push(rect),
                    _ => self.left.push(rect),
                }
                return rect;
            }
            // Drop to the next float bottom that changes the band.
            let mut next = f64::INFINITY;
            for r in self.left.iter().chain(self.right.iter()) {
                if r.bottom() > y {
                    next = next.min(r.bottom());
                }
            }
            if !next.is_finite() {
                let x = if side == Float::Right {
                    x1 - size.width
                } else {
                    x0
                };
                let rect = Rect::new(x, y, size.width, size.height);
                match side {
                    Float::Right => self.right.push(rect),
                    _ => self.left.push(rect),
                }
                return rect;
            }
            y = next;
        }
    }
}

// ── Layout context ──────────────────────────────────────────────

/// The document-order state restored when laid content is taken back.
#[derive(Debug, Clone)]
pub struct DocStateSnapshot {
    counters: CounterContext,
    strings: StringSets,
    running: RunningRegistry,
    anchors: AnchorIndex,
}

/// An absolutely positioned box waiting for its containing block to finish.
#[derive(Debug, Clone)]
pub struct PendingAbsolute {
    pub node: BoxNode,
    /// Static position: where the box would have been in flow.
    pub static_x: f64,
    pub static_y: f64,
}

/// Everything a layout call can reach besides its own arguments.  One
/// context exists per pagination call; nothing here is global.
pub struct LayoutContext<'a> {
    pub measure: &'a dyn TextMeasure,
    pub counters: CounterContext,
    pub strings: StringSets,
    pub running: RunningRegistry,
    pub anchors: AnchorIndex,
    pub floats: FloatContext,
    /// Fragments of floats placed but not yet adopted by a flow.
    pub float_fragments: Vec<Fragment>,
    /// Stack of collectors; each positioned container pushes one and
    /// resolves it when its own geometry is final.
    pub abs_collectors: Vec<Vec<PendingAbsolute>>,
    pub current_page: usize,
    /// Name of the page currently being filled.
    pub current_page_name: Option<String>,
    /// True until the first in-flow content lands in this fragmentainer.
    pub at_fragmentainer_top: bool,
    /// Set on continuation pages: was the break that opened this page
    /// forced?  Drives the leading-margin policy.
    pub continuation_forced: Option<bool>,
    /// Inside a multicolumn flow: column-class breaks force, page-class
    /// margins policies defer.
    pub in_column: bool,
    /// True while measuring content heights; document state (counters,
    /// strings, anchors, running elements) must not advance.
    pub measuring: bool,
}

impl<'a> LayoutContext<'a> {
    pub fn new(measure: &'a dyn TextMeasure) -> Self {
        Self {
            measure,
            counters: CounterContext::new(),
            strings: StringSets::new(),
            running: RunningRegistry::new(),
            anchors: AnchorIndex::new(),
            floats: FloatContext::new(),
            float_fragments: Vec::new(),
            abs_collectors: Vec::new(),
            current_page: 0,
            current_page_name: None,
            at_fragmentainer_top: true,
            continuation_forced: None,
            in_column: false,
            measuring: false,
        }
    }

    /// Apply a box's document-order side effects (counters, string sets,
    /// anchors) exactly once: on its first fragment, never while
    /// measuring.
    pub fn note_box_start(&mut self, node: &BoxNode, x: f64, y: f64) {
        if self.measuring {
            return;
        }
        self.counters.apply(&node.style);
        for (name, items) in &node.style.string_set {
            let value = crate::page::evaluate_string_items(self, items);
            self.strings.assign(name, value);
        }
        if let Some(id) = &node.id {
            self.anchors.record(
                id,
                crate::counters::Anchor {
                    page: self.current_page,
                    x,
                    y,
                    counters: self.counters.snapshot(),
                    text: node.text_content(),
                },
            );
        }
    }

    /// Capture the document-order state (counters, strings, running
    /// elements, anchors).  Taken at break candidates so a backtracked
    /// child does not apply its side effects twice.
    pub fn snapshot_doc_state(&self) -> DocStateSnapshot {
        DocStateSnapshot {
            counters: self.counters.clone(),
            strings: self.strings.clone(),
            running: self.running.clone(),
            anchors: self.anchors.clone(),
        }
    }

    pub fn restore_doc_state(&mut self, snapshot: DocStateSnapshot) {
        self.counters = snapshot.counters;
        self.strings = snapshot.strings;
        self.running = snapshot.running;
        self.anchors = snapshot.anchors;
    }

    /// Run `f` in measuring mode with isolated float state, restoring
    /// everything afterwards.
    pub fn measured<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let was_measuring = self.measuring;
        let floats = std::mem::take(&mut self.floats);
        let float_fragments = std::mem::take(&mut self.float_fragments);
        let at_top = self.at_fragmentainer_top;
        self.measuring = true;
        let out = f(self);
        self.measuring = was_measuring;
        self.floats = floats;
        self.float_fragments = float_fragments;
        self.at_fragmentainer_top = at_top;
        out
    }
}

// ── Intrinsic sizing ────────────────────────────────────────────

/// Max-content inline size: the width the box would take with unlimited
/// space (no wrapping at optional break points).
pub fn max_content_width(ctx: &LayoutContext, node: &BoxNode) -> f64 {
    intrinsic_width(ctx, node, false)
}

/// Min-content inline size: the width of the widest unbreakable piece.
pub fn min_content_width(ctx: &LayoutContext, node: &BoxNode) -> f64 {
    intrinsic_width(ctx, node, true)
}

fn intrinsic_width(ctx: &LayoutContext, node: &BoxNode, min: bool) -> f64 {
    let style = &node.style;
    if let Some(w) = style.width.resolve(0.0) {
        return w + style.padding.horizontal() + style.border_width.horizontal();
    }
    let content = match &node.kind {
        BoxKind::Text(text) => text_intrinsic_width(ctx, style, text, min),
        BoxKind::Replaced(size) => {
            ctx.measure
                .replaced_size(style, *size, 0.0)
                .width
        }
        BoxKind::LineBreak => 0.0,
        BoxKind::Container => {
            let inline_children = node.children.iter().all(|c| c.is_inline_level());
            if inline_children && !node.children.is_empty() {
                if min {
                    node.children
                        .iter()
                        .map(|c| intrinsic_width(ctx, c, true))
                        .fold(0.0, f64::max)
                } else {
                    node.children
                        .iter()
                        .map(|c| intrinsic_width(ctx, c, false))
                        .sum()
                }
            } else {
                node.children
                    .iter()
                    .filter(|c| !c.style.out_of_flow() || c.style.float != Float::None)
                    .map(|c| {
                        intrinsic_width(ctx, c, min)
                            + c.style.margin.resolve(0.0).horizontal()
                    })
                    .fold(0.0, f64::max)
            }
        }
    };
    style.clamp_width(content, 0.0) + style.padding.horizontal() + style.border_width.horizontal()
}

fn text_intrinsic_width(ctx: &LayoutContext, style: &Style, text: &str, min: bool) -> f64 {
    let collapsed = collapse_for_measure(text, style.white_space);
    if collapsed.is_empty() {
        return 0.0;
    }
    let run = ctx.measure.measure(style, &collapsed);
    if !min {
        // Widest segment between mandatory breaks.
        let mut widest: f64 = 0.0;
        let mut current = 0.0;
        for (i, ch) in collapsed.chars().enumerate() {
            if ch == '\n' {
                widest = widest.max(current);
                current = 0.0;
            } else {
                current += run.advances[i];
            }
        }
        return widest.max(current);
    }
    // Widest word: split at spaces (and newlines).
    let mut widest: f64 = 0.0;
    let mut current = 0.0;
    for (i, ch) in collapsed.chars().enumerate() {
        if ch == ' ' || ch == '\n' {
            widest = widest.max(current);
            current = 0.0;
        } else {
            current += run.advances[i];
        }
    }
    widest.max(current)
}

/// White-space handling good enough for intrinsic measurement: collapse
/// runs of spaces, keep newlines only when the mode preserves them.
fn collapse_for_measure(text: &str, ws: WhiteSpace) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_space = true;
    for ch in text.chars() {
        if ws.preserves_newlines() && (ch == '\n' || ch == '\r') {
            out.push('\n');
            prev_space = true;
            continue;
        }
        let is_space = ch.is_whitespace();
        if is_space && ws.collapses() {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}
