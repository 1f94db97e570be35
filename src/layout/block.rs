//! # Block and Inline Flow Layout
//!
//! Lays out block-level boxes top to bottom inside a containing block:
//! margin collapsing, float placement, clearance, relative offsets,
//! absolute/fixed resolution, and the hand-off to the line breaker for
//! inline content.  Every "does it still fit" decision is delegated to the
//! fragmentation controller, and what does not fit comes back to the
//! caller as a continuation token.

use std::sync::Arc;

use crate::geometry::{Edges, Rect, Size};
use crate::layout::fragment::{split_lines, BreakTracker, LineSplit, NextBreak, ResumeAt};
use crate::layout::{
    max_content_width, BoxKind, BoxNode, Fragment, FragmentKind, LayoutContext, PendingAbsolute,
    SplitMarker,
};
use crate::style::{BreakBetween, Display, Float, Position, Style};
use crate::text;

/// The space a box is being laid into.
#[derive(Debug, Clone, Copy)]
pub struct FlowArea {
    /// Content-box left edge of the containing block.
    pub x: f64,
    /// Current flow position (margins still pending).
    pub y: f64,
    /// Available inline size.
    pub width: f64,
    /// Content top of the current fragmentainer.
    pub top: f64,
    /// Absolute block-axis limit of the current fragmentainer.
    pub bottom: f64,
}

impl FlowArea {
    pub fn with_y(self, y: f64) -> Self {
        Self { y, ..self }
    }
}

/// Outcome of laying a block-level box into a [`FlowArea`].
#[derive(Debug)]
pub struct FlowResult {
    /// The fragment placed in this fragmentainer; `None` means nothing fit
    /// and the whole box moves to the next one.
    pub fragment: Option<Fragment>,
    /// Where to pick up in the next fragmentainer.
    pub resume: Option<ResumeAt>,
    /// The break class that ended this fragmentainer, and any page name
    /// the following content asks for.
    pub next: NextBreak,
}

impl FlowResult {
    fn done(fragment: Fragment) -> Self {
        Self {
            fragment: Some(fragment),
            resume: None,
            next: NextBreak::default(),
        }
    }

    fn moved() -> Self {
        Self {
            fragment: None,
            resume: Some(ResumeAt::new(0)),
            next: NextBreak::default(),
        }
    }
}

/// Collapse adjoining margins: largest positive plus smallest negative.
pub fn collapse(margins: &[f64]) -> f64 {
    let pos = margins
        .iter()
        .copied()
        .filter(|m| *m > 0.0)
        .fold(0.0, f64::max);
    let neg = margins
        .iter()
        .copied()
        .filter(|m| *m < 0.0)
        .fold(0.0, f64::min);
    pos + neg
}

/// Resolve the pending margins into a concrete flow position, applying the
/// leading-margin policy at the top of continuation fragmentainers.
fn resolve_position(
    ctx: &mut LayoutContext,
    style: &Style,
    y: f64,
    adjoining: &mut Vec<f64>,
) -> f64 {
    let collapsed = collapse(adjoining);
    adjoining.clear();
    if ctx.at_fragmentainer_top {
        if let Some(forced) = ctx.continuation_forced {
            if !crate::layout::fragment::keep_leading_margin(style.margin_break, forced) {
                return y;
            }
        }
    }
    y + collapsed
}

/// Lay out one block-level box.  `adjoining` carries the margins collected
/// from preceding content that collapse with this box's top margin.
pub fn layout_block_level(
    ctx: &mut LayoutContext,
    node: &BoxNode,
    area: FlowArea,
    resume: Option<&ResumeAt>,
    page_is_empty: bool,
    adjoining: &mut Vec<f64>,
) -> FlowResult {
    if node.style.is_multicol() && matches!(node.kind, BoxKind::Container) {
        return super::columns::layout_multicol(ctx, node, area, resume, page_is_empty, adjoining);
    }
    if node.style.display == Display::Flex {
        return super::flex::layout_flex(ctx, node, area, resume, page_is_empty, adjoining);
    }
    match &node.kind {
        BoxKind::Replaced(intrinsic) => {
            layout_replaced_block(ctx, node, *intrinsic, area, page_is_empty, adjoining)
        }
        _ => layout_block_container(ctx, node, area, resume, page_is_empty, adjoining),
    }
}

/// Used content-box width and the margins of a block-level box, honoring
/// `auto` margins when the width is definite.
fn used_widths(style: &Style, area_width: f64) -> (f64, Edges) {
    let mut margin = style.margin.resolve(area_width);
    let edges_h = style.padding.horizontal() + style.border_width.horizontal();
    let content_width = match style.width.resolve(area_width) {
        Some(w) => style.clamp_width(w, area_width),
        None => style.clamp_width(
            (area_width - margin.horizontal() - edges_h).max(0.0),
            area_width,
        ),
    };
    if style.width.resolve(area_width).is_some() {
        let free = area_width - content_width - edges_h;
        let l_auto = style.margin.left.is_auto();
        let r_auto = style.margin.right.is_auto();
        if l_auto && r_auto {
            margin.left = (free / 2.0).max(0.0);
            margin.right = (free / 2.0).max(0.0);
        } else if l_auto {
            margin.left = (free - margin.right).max(0.0);
        } else if r_auto {
            margin.right = (free - margin.left).max(0.0);
        }
    }
    (content_width, margin)
}

fn layout_replaced_block(
    ctx: &mut LayoutContext,
    node: &BoxNode,
    intrinsic: Size,
    area: FlowArea,
    page_is_empty: bool,
    adjoining: &mut Vec<f64>,
) -> FlowResult {
    let style = &node.style;
    let size = ctx.measure.replaced_size(style, intrinsic, area.width);
    let (_, margin) = used_widths(style, area.width);

    let entry = adjoining.clone();
    adjoining.push(margin.top);
    let border_y = resolve_position(ctx, style, area.y, adjoining);
    let outer_h = size.height + style.padding.vertical() + style.border_width.vertical();

    if border_y + outer_h > area.bottom + 1e-6 && !page_is_empty {
        *adjoining = entry;
        return FlowResult::moved();
    }

    ctx.note_box_start(node, area.x + margin.left, border_y);
    ctx.at_fragmentainer_top = false;

    let mut fragment = Fragment::new(
        FragmentKind::Replaced,
        style.clone(),
        Rect::new(
            area.x + margin.left,
            border_y,
            size.width + style.padding.horizontal() + style.border_width.horizontal(),
            outer_h,
        ),
    );
    fragment.id = node.id.clone();
    apply_relative_offset(style, &mut fragment);
    adjoining.push(margin.bottom);
    FlowResult::done(fragment)
}

fn apply_relative_offset(style: &Style, fragment: &mut Fragment) {
    if !matches!(style.position, Position::Relative) {
        return;
    }
    let dx = style.left.unwrap_or_else(|| -style.right.unwrap_or(0.0));
    let dy = style.top.unwrap_or_else(|| -style.bottom.unwrap_or(0.0));
    if dx != 0.0 || dy != 0.0 {
        fragment.translate(dx, dy);
    }
}

/// Everything a container learns from laying out its content.
enum InnerResult {
    /// The content refuses to start here; the whole box moves on.
    Moved,
    Flow {
        children: Vec<Fragment>,
        content_bottom: f64,
        resume: Option<ResumeAt>,
        next: NextBreak,
        first_child_top: Option<f64>,
    },
}

fn layout_block_container(
    ctx: &mut LayoutContext,
    node: &BoxNode,
    area: FlowArea,
    resume: Option<&ResumeAt>,
    page_is_empty: bool,
    adjoining: &mut Vec<f64>,
) -> FlowResult {
    let style = node.style.clone();
    let (content_width, margin) = used_widths(&style, area.width);
    let first_fragment = resume.is_none();
    let cloned_edges = style.box_decoration_break == crate::style::DecorationBreak::Clone;
    let adjoining_entry = adjoining.clone();

    // `break-inside: avoid` moves the whole box when it would split and
    // the fragmentainer already has content.  Avoidance stays best-effort:
    // an empty fragmentainer lays the box out regardless.
    if first_fragment && style.break_inside.avoids(ctx.in_column) && !page_is_empty {
        let total = measure_box_height(ctx, node, area.width);
        let projected = area.y + collapse(adjoining) + total;
        if projected > area.bottom + 1e-6 {
            return FlowResult::moved();
        }
    }

    // A box with a definite height that no longer fits moves whole when a
    // fresh fragmentainer could hold it; otherwise it stays and its
    // children fragment (or it overflows).
    if first_fragment && !page_is_empty {
        if let Some(h) = style.height.resolve(0.0) {
            let edges_v = style.padding.vertical() + style.border_width.vertical();
            let mut pending = adjoining.clone();
            pending.push(margin.top);
            let projected = area.y + collapse(&pending) + h + edges_v;
            let fits_fresh = h + edges_v <= (area.bottom - area.top) + 1e-6;
            if projected > area.bottom + 1e-6 && fits_fresh {
                return FlowResult::moved();
            }
        }
    }

    let doc_state = if ctx.measuring {
        None
    } else {
        Some(ctx.snapshot_doc_state())
    };

    if first_fragment {
        adjoining.push(margin.top);
    }

    let edge_top = if first_fragment || cloned_edges {
        style.padding.top + style.border_width.top
    } else {
        0.0
    };
    let edge_bottom = style.padding.bottom + style.border_width.bottom;

    let fixed_height = style.height.resolve(0.0);
    let has_extent = fixed_height.map(|h| h > 0.0).unwrap_or(false)
        || style.min_height.resolve(0.0).map(|h| h > 0.0).unwrap_or(false);
    let new_context = style.establishes_context();
    let inline_mode = is_inline_container(node);

    // Clearance: moving past floats also commits the pending margins.
    let clearance_floor = ctx.floats.clearance(style.clear, f64::NEG_INFINITY);
    let needs_clearance =
        style.clear != crate::style::Clear::None && clearance_floor > area.y + collapse(adjoining);

    // Boxes with a top edge, their own extent, a new formatting context,
    // clearance, or inline content commit the collapsed margins now;
    // transparent block containers collapse through.
    let resolves_now = edge_top > 0.0
        || has_extent
        || new_context
        || inline_mode
        || needs_clearance
        || matches!(node.kind, BoxKind::Text(_));

    let positioned = !matches!(style.position, Position::Static);
    if positioned {
        ctx.abs_collectors.push(Vec::new());
    }

    let mut border_y = if resolves_now {
        let y = resolve_position(ctx, &style, area.y, adjoining);
        if needs_clearance {
            y.max(clearance_floor)
        } else {
            y
        }
    } else {
        area.y + collapse(adjoining)
    };

    let content_x = area.x + margin.left + style.border_width.left + style.padding.left;
    let content_top = border_y + edge_top;

    // The first committed position consumes the fragmentainer's top; the
    // leading-margin policy applies only once.
    if resolves_now {
        ctx.at_fragmentainer_top = false;
    }
    if first_fragment {
        ctx.note_box_start(node, area.x + margin.left, border_y);
    }

    // Isolate floats inside an independent formatting context.
    let saved_floats = if new_context {
        Some(std::mem::take(&mut ctx.floats))
    } else {
        None
    };

    let inner_area = FlowArea {
        x: content_x,
        y: content_top,
        width: content_width,
        top: area.top,
        bottom: (area.bottom - if cloned_edges { edge_bottom } else { 0.0 }).max(area.top),
    };
    let inner = if inline_mode {
        layout_inline_content(ctx, node, &style, inner_area, resume, page_is_empty)
    } else {
        layout_block_children(ctx, node, inner_area, resume, page_is_empty, adjoining)
    };

    if let Some(saved) = saved_floats {
        ctx.floats = saved;
    }

    let (mut children, mut content_bottom, inner_resume, next, first_child_top) = match inner {
        InnerResult::Moved => {
            if positioned {
                ctx.abs_collectors.pop();
            }
            if let Some(snapshot) = doc_state {
                ctx.restore_doc_state(snapshot);
            }
            *adjoining = adjoining_entry;
            return FlowResult::moved();
        }
        InnerResult::Flow {
            children,
            content_bottom,
            resume,
            next,
            first_child_top,
        } => (children, content_bottom, resume, next, first_child_top),
    };

    // A transparent container's border edge coincides with its first
    // child's: the collapsed margins sit above both.
    if !resolves_now {
        if let Some(first_top) = first_child_top {
            border_y = first_top;
        }
    }
    let content_top = if resolves_now { content_top } else { border_y };

    let continues = inner_resume.is_some();
    let bottom_edge_applies = edge_bottom > 0.0 || fixed_height.is_some();
    if bottom_edge_applies && !continues {
        // Trailing child margins stay inside the box.
        content_bottom += collapse(adjoining).max(0.0);
        adjoining.clear();
    }

    let content_height_auto = (content_bottom - content_top).max(0.0);
    let content_height = match fixed_height {
        Some(h) if !continues => style.clamp_height(h, 0.0),
        Some(h) => style
            .clamp_height(h, 0.0)
            .min((area.bottom - content_top).max(content_height_auto)),
        None => {
            let mut v = style.clamp_height(content_height_auto, 0.0);
            if !continues {
                if let Some(min) = style.min_height.resolve(0.0) {
                    v = v.max(min);
                }
            }
            v
        }
    };

    let include_bottom_edge = !continues || cloned_edges;
    let border_height =
        edge_top + content_height + if include_bottom_edge { edge_bottom } else { 0.0 };
    let border_width_box =
        content_width + style.padding.horizontal() + style.border_width.horizontal();

    let mut fragment = Fragment::new(
        FragmentKind::Block,
        style.clone(),
        Rect::new(area.x + margin.left, border_y, border_width_box, border_height),
    );
    fragment.children = children.drain(..).collect();
    fragment.id = node.id.clone();
    fragment.split = match (first_fragment, continues) {
        (true, false) => SplitMarker::Whole,
        (true, true) => SplitMarker::First,
        (false, true) => SplitMarker::Middle,
        (false, false) => SplitMarker::Last,
    };

    // Resolve absolutely positioned descendants against this box.
    if positioned {
        if let Some(pending) = ctx.abs_collectors.pop() {
            let containing = fragment.rect;
            for abs in pending {
                if let Some(frag) = layout_absolute(ctx, &abs, containing) {
                    fragment.children.push(frag);
                }
            }
        }
    }

    apply_relative_offset(&style, &mut fragment);

    if continues {
        // The margin below the break point is dropped with the break.
        return FlowResult {
            fragment: Some(fragment),
            resume: inner_resume,
            next,
        };
    }

    adjoining.push(margin.bottom);
    FlowResult::done(fragment)
}

/// The break class in effect before a box: its own `break-before` combined
/// with the one propagated up from its first in-flow child.
pub(crate) fn effective_break_before(node: &BoxNode) -> BreakBetween {
    let mut value = node.style.break_before;
    if matches!(node.kind, BoxKind::Container)
        && !node.style.establishes_context()
        && !node.style.is_multicol()
    {
        if let Some(first) = node.children.iter().find(|c| !c.style.out_of_flow()) {
            if !first.is_inline_level() {
                value = BreakBetween::combine(effective_break_before(first), value);
            }
        }
    }
    value
}

/// The break class in effect after a box, including its last in-flow
/// child's propagated `break-after`.
pub(crate) fn effective_break_after(node: &BoxNode) -> BreakBetween {
    let mut value = node.style.break_after;
    if matches!(node.kind, BoxKind::Container)
        && !node.style.establishes_context()
        && !node.style.is_multicol()
    {
        if let Some(last) = node.children.iter().rev().find(|c| !c.style.out_of_flow()) {
            if !last.is_inline_level() {
                value = BreakBetween::combine(value, effective_break_after(last));
            }
        }
    }
    value
}

fn is_inline_container(node: &BoxNode) -> bool {
    if matches!(node.kind, BoxKind::Text(_)) {
        return true;
    }
    let mut any_inline = false;
    for child in &node.children {
        if child.style.out_of_flow() {
            continue;
        }
        if child.is_inline_level() {
            any_inline = true;
        } else {
            return false;
        }
    }
    any_inline
}

/// Lay out the inline content of a paragraph container, splitting at line
/// boundaries under the orphans/widows constraints.
fn layout_inline_content(
    ctx: &mut LayoutContext,
    node: &BoxNode,
    style: &Arc<Style>,
    area: FlowArea,
    resume: Option<&ResumeAt>,
    page_is_empty: bool,
) -> InnerResult {
    let mut children: Vec<Fragment> = Vec::new();

    // Out-of-flow children first: floats shrink the line bands, absolutes
    // wait for their containing block, running elements register.
    if resume.is_none() {
        for child in &node.children {
            if child.style.float != Float::None {
                place_float(ctx, child, &area);
            } else if matches!(child.style.position, Position::Absolute | Position::Fixed) {
                queue_absolute(ctx, child, area.x, area.y);
            } else if let Position::Running(name) = &child.style.position {
                if !ctx.measuring {
                    ctx.running.assign(name, child.clone());
                }
            }
        }
        children.append(&mut ctx.float_fragments);
    }

    let single_text;
    let inline_children: &[BoxNode] = if matches!(node.kind, BoxKind::Text(_)) {
        single_text = [node.clone()];
        &single_text
    } else {
        &node.children
    };

    let effects = resume.is_none();
    let content = text::collect_inline(
        ctx,
        style,
        inline_children,
        area.x,
        area.y,
        area.width,
        effects,
    );
    if content.is_empty() {
        return InnerResult::Flow {
            children,
            content_bottom: area.y,
            resume: None,
            next: NextBreak::default(),
            first_child_top: Some(area.y),
        };
    }

    let resume_tuple = resume.map(|r| (r.index, r.inner.as_ref().map(|i| i.index).unwrap_or(0)));
    let lines =
        text::layout_paragraph(ctx, style, &content, area.x, area.width, area.y, resume_tuple);

    let heights: Vec<f64> = lines.iter().map(|l| l.height).collect();
    let remaining = area.bottom - area.y;
    let split = split_lines(
        &heights,
        remaining,
        style.orphans,
        style.widows,
        style.break_inside.avoids(ctx.in_column),
        page_is_empty,
    );

    let take = match split {
        LineSplit::All => lines.len(),
        LineSplit::Take(k) => k,
        LineSplit::MoveAll => return InnerResult::Moved,
    };

    if take > 0 {
        ctx.at_fragmentainer_top = false;
    }
    let mut bottom = area.y;
    for line in &lines[..take] {
        bottom = bottom.max(line.fragment.rect.bottom());
        children.push(line.fragment.clone());
    }
    let resume_out = if take < lines.len() {
        let (item, ch) = lines[take].start;
        Some(ResumeAt::nested(item, ResumeAt::new(ch)))
    } else {
        None
    };

    InnerResult::Flow {
        children,
        content_bottom: bottom,
        resume: resume_out,
        next: NextBreak::default(),
        first_child_top: Some(area.y),
    }
}

fn queue_absolute(ctx: &mut LayoutContext, node: &BoxNode, static_x: f64, static_y: f64) {
    if ctx.measuring {
        return;
    }
    let pending = PendingAbsolute {
        node: node.clone(),
        static_x,
        static_y,
    };
    if let Some(collector) = ctx.abs_collectors.last_mut() {
        collector.push(pending);
    }
}

/// Place one float and lay out its content at the final position.  The
/// finished fragment lands in `ctx.float_fragments` for the nearest flow
/// to adopt.
fn place_float(ctx: &mut LayoutContext, node: &BoxNode, area: &FlowArea) {
    let style = &node.style;
    let margin = style.margin.resolve(area.width);
    let width = match style.width.resolve(area.width) {
        Some(w) => style.clamp_width(w, area.width),
        None => {
            // Shrink-to-fit.
            let max = ctx.measured(|c| max_content_width(c, node));
            style.clamp_width(max.min(area.width), area.width)
        }
    };
    let height = measure_box_height_at(ctx, node, width);

    let outer = Size::new(
        width + style.padding.horizontal() + style.border_width.horizontal() + margin.horizontal(),
        height + margin.vertical(),
    );
    let rect = ctx
        .floats
        .place(outer, style.float, area.y, area.x, area.x + area.width);

    if ctx.measuring {
        return;
    }
    let result = layout_block_level(
        ctx,
        node,
        FlowArea {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            top: rect.y,
            bottom: f64::INFINITY,
        },
        None,
        true,
        &mut Vec::new(),
    );
    if let Some(frag) = result.fragment {
        ctx.float_fragments.push(frag);
    }
}

/// Height of a box laid out at the given content width, margins excluded.
fn measure_box_height_at(ctx: &mut LayoutContext, node: &BoxNode, width: f64) -> f64 {
    ctx.measured(|c| {
        let result = layout_block_level(
            c,
            node,
            FlowArea {
                x: 0.0,
                y: 0.0,
                width: width
                    + node.style.padding.horizontal()
                    + node.style.border_width.horizontal()
                    + node.style.margin.resolve(0.0).horizontal(),
                top: 0.0,
                bottom: f64::INFINITY,
            },
            None,
            true,
            &mut Vec::new(),
        );
        result.fragment.map(|f| f.rect.height).unwrap_or(0.0)
    })
}

/// Margin-box height of a box at the given available width.
pub fn measure_box_height(ctx: &mut LayoutContext, node: &BoxNode, area_width: f64) -> f64 {
    let margin = node.style.margin.resolve(area_width);
    let (content_width, _) = used_widths(&node.style, area_width);
    measure_box_height_at(ctx, node, content_width) + margin.vertical()
}

/// Border-box height of a box laid out at a given content width.
pub(crate) fn border_height_at(ctx: &mut LayoutContext, node: &BoxNode, content_width: f64) -> f64 {
    measure_box_height_at(ctx, node, content_width)
}

/// Used content width and margins of a container (shared with flex and
/// multicolumn layout).
pub(crate) fn container_widths(style: &Style, area_width: f64) -> (f64, Edges) {
    used_widths(style, area_width)
}

/// Commit pending margins to a concrete position (shared entry point for
/// the other formatting contexts).
pub(crate) fn commit_position(
    ctx: &mut LayoutContext,
    style: &Style,
    y: f64,
    adjoining: &mut Vec<f64>,
) -> f64 {
    resolve_position(ctx, style, y, adjoining)
}

/// Queue an absolutely positioned box for the nearest containing block.
pub(crate) fn queue_absolute_for(ctx: &mut LayoutContext, node: &BoxNode, x: f64, y: f64) {
    queue_absolute(ctx, node, x, y);
}

fn layout_block_children(
    ctx: &mut LayoutContext,
    node: &BoxNode,
    area: FlowArea,
    resume: Option<&ResumeAt>,
    page_is_empty: bool,
    adjoining: &mut Vec<f64>,
) -> InnerResult {
    let mut children: Vec<Fragment> = Vec::new();
    let mut flow_y = area.y;
    let mut first_child_top: Option<f64> = None;
    let mut tracker = BreakTracker::new();
    let mut prev_break_after = BreakBetween::Auto;
    let mut placed_any = false;
    // State snapshots at each break candidate, for avoid-driven backtracks.
    type Snapshot = (usize, usize, f64, Vec<f64>, Option<crate::layout::DocStateSnapshot>);
    let mut snapshots: Vec<Snapshot> = Vec::new();

    let start = resume.map(|r| r.index).unwrap_or(0);
    let mut inner_resume = resume.and_then(|r| r.inner.as_deref());

    let mut i = start;
    while i < node.children.len() {
        let child = &node.children[i];

        // Out-of-flow children do not join the flow.
        if let Position::Running(name) = &child.style.position {
            if !ctx.measuring && inner_resume.is_none() {
                ctx.running.assign(name, child.clone());
            }
            i += 1;
            continue;
        }
        if matches!(child.style.position, Position::Absolute | Position::Fixed) {
            queue_absolute(ctx, child, area.x, flow_y + collapse(adjoining));
            i += 1;
            continue;
        }
        if child.style.float != Float::None {
            place_float(
                ctx,
                child,
                &FlowArea {
                    y: flow_y + collapse(adjoining),
                    ..area
                },
            );
            children.append(&mut ctx.float_fragments);
            i += 1;
            continue;
        }

        // The boundary between the previous sibling and this child.
        let fragmentainer_has_content = placed_any || !page_is_empty;
        if inner_resume.is_none() && i > start {
            let boundary = BreakBetween::combine(prev_break_after, effective_break_before(child));
            if boundary.forces(ctx.in_column) && fragmentainer_has_content {
                return InnerResult::Flow {
                    children,
                    content_bottom: flow_y,
                    resume: Some(ResumeAt::new(i)),
                    next: NextBreak {
                        value: boundary,
                        page_name: child.style.page.clone(),
                    },
                    first_child_top,
                };
            }
            // A sibling asking for a different named page forces a page
            // boundary exactly like `break-before: page`.
            if !ctx.in_column
                && child.style.page.is_some()
                && child.style.page != ctx.current_page_name
                && fragmentainer_has_content
            {
                return InnerResult::Flow {
                    children,
                    content_bottom: flow_y,
                    resume: Some(ResumeAt::new(i)),
                    next: NextBreak {
                        value: BreakBetween::Page,
                        page_name: child.style.page.clone(),
                    },
                    first_child_top,
                };
            }
            tracker.record(i, boundary.avoids(ctx.in_column));
            let doc = if ctx.measuring {
                None
            } else {
                Some(ctx.snapshot_doc_state())
            };
            snapshots.push((i, children.len(), flow_y, adjoining.clone(), doc));
        }

        let child_page_empty = page_is_empty && !placed_any;
        let result = layout_block_level(
            ctx,
            child,
            area.with_y(flow_y),
            inner_resume,
            child_page_empty,
            adjoining,
        );
        inner_resume = None;

        match result.fragment {
            Some(fragment) => {
                if first_child_top.is_none() && fragment.rect.height > 0.0 {
                    first_child_top = Some(fragment.rect.y);
                }
                flow_y = fragment.rect.bottom().max(flow_y);
                if fragment.rect.height > 0.0 || !fragment.children.is_empty() {
                    placed_any = true;
                }
                children.push(fragment);
                if let Some(nested) = result.resume {
                    return InnerResult::Flow {
                        children,
                        content_bottom: flow_y,
                        resume: Some(ResumeAt::nested(i, nested)),
                        next: result.next,
                        first_child_top,
                    };
                }
                prev_break_after = effective_break_after(child);
                i += 1;
            }
            None => {
                // The child wants the next fragmentainer.  Back up to the
                // latest boundary where breaking is legal; when every
                // boundary objects, the earliest possible cut still beats
                // overflowing the fragmentainer.
                let target = tracker.last_allowed(i).or_else(|| {
                    let any = tracker.last_any(i);
                    if any.is_some() {
                        log::debug!(
                            "every boundary before child {i} avoids breaking; forcing one"
                        );
                    }
                    any
                });
                match target {
                    Some(j) => {
                        if let Some(pos) = snapshots.iter().rposition(|(b, _, _, _, _)| *b == j) {
                            let (_, keep, y, adj, doc) = snapshots.swap_remove(pos);
                            children.truncate(keep);
                            flow_y = y;
                            *adjoining = adj;
                            if let Some(doc) = doc {
                                ctx.restore_doc_state(doc);
                            }
                        }
                        return InnerResult::Flow {
                            children,
                            content_bottom: flow_y,
                            resume: Some(ResumeAt::new(j)),
                            next: NextBreak::default(),
                            first_child_top,
                        };
                    }
                    None if fragmentainer_has_content => {
                        return InnerResult::Moved;
                    }
                    None => {
                        // Nothing on the fragmentainer and the child still
                        // refuses: force it in, overflowing if need be, to
                        // guarantee forward progress.
                        let forced =
                            layout_block_level(ctx, child, area.with_y(flow_y), None, true, adjoining);
                        if let Some(fragment) = forced.fragment {
                            if first_child_top.is_none() {
                                first_child_top = Some(fragment.rect.y);
                            }
                            flow_y = fragment.rect.bottom().max(flow_y);
                            placed_any = true;
                            children.push(fragment);
                            if let Some(nested) = forced.resume {
                                return InnerResult::Flow {
                                    children,
                                    content_bottom: flow_y,
                                    resume: Some(ResumeAt::nested(i, nested)),
                                    next: forced.next,
                                    first_child_top,
                                };
                            }
                            prev_break_after = effective_break_after(child);
                        } else {
                            log::warn!("block child placed nothing under forced progress");
                        }
                        i += 1;
                    }
                }
            }
        }
    }

    InnerResult::Flow {
        children,
        content_bottom: flow_y,
        resume: None,
        next: NextBreak::default(),
        first_child_top,
    }
}

/// Lay out an atomic inline (inline-block) at its shrink-to-fit width.
/// The result is positioned at (0, 0); the line breaker moves it.
pub fn layout_atomic_inline(ctx: &mut LayoutContext, node: &BoxNode, avail: f64) -> Fragment {
    let style = &node.style;
    let margin = style.margin.resolve(avail);
    let width = match style.width.resolve(avail) {
        Some(w) => style.clamp_width(w, avail),
        None => {
            let max = ctx.measured(|c| max_content_width(c, node));
            style.clamp_width(max.min(avail), avail)
        }
    };
    let result = layout_block_level(
        ctx,
        node,
        FlowArea {
            x: 0.0,
            y: 0.0,
            width: width
                + style.padding.horizontal()
                + style.border_width.horizontal()
                + margin.horizontal(),
            top: 0.0,
            bottom: f64::INFINITY,
        },
        None,
        true,
        &mut Vec::new(),
    );
    result.fragment.unwrap_or_else(|| {
        Fragment::new(
            FragmentKind::Block,
            node.style.clone(),
            Rect::new(0.0, 0.0, width, 0.0),
        )
    })
}

/// Resolve one absolutely positioned box against its containing block.
pub fn layout_absolute(
    ctx: &mut LayoutContext,
    pending: &PendingAbsolute,
    containing: Rect,
) -> Option<Fragment> {
    let node = &pending.node;
    let style = &node.style;
    let margin = style.margin.resolve(containing.width);

    let width = match style.width.resolve(containing.width) {
        Some(w) => style.clamp_width(w, containing.width),
        None => match (style.left, style.right) {
            // Opposing offsets stretch the box between them.
            (Some(l), Some(r)) => style.clamp_width(
                (containing.width
                    - l
                    - r
                    - margin.horizontal()
                    - style.padding.horizontal()
                    - style.border_width.horizontal())
                .max(0.0),
                containing.width,
            ),
            _ => {
                let max = ctx.measured(|c| max_content_width(c, node));
                style.clamp_width(max.min(containing.width), containing.width)
            }
        },
    };

    let height = match style.height.resolve(containing.height) {
        Some(h) => style.clamp_height(h, containing.height),
        None => measure_box_height_at(ctx, node, width),
    };
    let outer_w = width + style.padding.horizontal() + style.border_width.horizontal();
    let outer_h = height + style.padding.vertical() + style.border_width.vertical();

    // Desired border-box corner; the inner layout re-applies the margins,
    // so the area origin backs them out.
    let border_x = match (style.left, style.right) {
        (Some(l), _) => containing.x + l + margin.left,
        (None, Some(r)) => containing.x + containing.width - r - outer_w - margin.right,
        (None, None) => pending.static_x + margin.left,
    };
    let border_y = match (style.top, style.bottom) {
        (Some(t), _) => containing.y + t + margin.top,
        (None, Some(b)) => containing.y + containing.height - b - outer_h - margin.bottom,
        (None, None) => pending.static_y + margin.top,
    };

    let result = layout_block_level(
        ctx,
        node,
        FlowArea {
            x: border_x - margin.left,
            y: border_y - margin.top,
            width: outer_w + margin.horizontal(),
            top: border_y - margin.top,
            bottom: f64::INFINITY,
        },
        None,
        true,
        &mut Vec::new(),
    );
    result.fragment.map(|mut frag| {
        frag.rect.width = outer_w;
        frag.rect.height = frag.rect.height.max(outer_h);
        frag
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::CharGrid;
    use crate::style::{Dimension, MarginEdges};

    fn block(style: Style, children: Vec<BoxNode>) -> BoxNode {
        BoxNode {
            kind: BoxKind::Container,
            style: Arc::new(style),
            children,
            id: None,
        }
    }

    fn text_block(content: &str, font_size: f64) -> BoxNode {
        block(
            Style {
                font_size,
                ..Default::default()
            },
            vec![BoxNode {
                kind: BoxKind::Text(content.to_string()),
                style: Arc::new(Style {
                    font_size,
                    ..Default::default()
                }),
                children: Vec::new(),
                id: None,
            }],
        )
    }

    fn layout_into(
        node: &BoxNode,
        width: f64,
        bottom: f64,
    ) -> (FlowResult, crate::counters::CounterContext) {
        let grid = CharGrid::default();
        let mut ctx = LayoutContext::new(&grid);
        ctx.abs_collectors.push(Vec::new());
        let result = layout_block_level(
            &mut ctx,
            node,
            FlowArea {
                x: 0.0,
                y: 0.0,
                width,
                top: 0.0,
                bottom,
            },
            None,
            true,
            &mut Vec::new(),
        );
        (result, ctx.counters)
    }

    #[test]
    fn test_collapse_rules() {
        assert_eq!(collapse(&[10.0, 20.0]), 20.0);
        assert_eq!(collapse(&[10.0, -5.0]), 5.0);
        assert_eq!(collapse(&[-10.0, -5.0]), -10.0);
        assert_eq!(collapse(&[]), 0.0);
    }

    #[test]
    fn test_sibling_margins_collapse() {
        let child = |m: f64| {
            block(
                Style {
                    margin: MarginEdges::uniform(m),
                    height: Dimension::Pt(10.0),
                    ..Default::default()
                },
                vec![],
            )
        };
        let parent = block(Style::default(), vec![child(10.0), child(20.0)]);
        let (result, _) = layout_into(&parent, 100.0, 1000.0);
        let frag = result.fragment.unwrap();
        let a = &frag.children[0];
        let b = &frag.children[1];
        // Gap between the two is max(10, 20) = 20, not 30.
        assert!((b.rect.y - a.rect.bottom() - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_negative_margins_collapse_by_sign() {
        let a = block(
            Style {
                margin: MarginEdges {
                    bottom: Dimension::Pt(20.0),
                    ..Default::default()
                },
                height: Dimension::Pt(10.0),
                ..Default::default()
            },
            vec![],
        );
        let b = block(
            Style {
                margin: MarginEdges {
                    top: Dimension::Pt(-5.0),
                    ..Default::default()
                },
                height: Dimension::Pt(10.0),
                ..Default::default()
            },
            vec![],
        );
        let parent = block(Style::default(), vec![a, b]);
        let (result, _) = layout_into(&parent, 100.0, 1000.0);
        let frag = result.fragment.unwrap();
        // 20 + (-5) = 15 between them.
        assert!(
            (frag.children[1].rect.y - frag.children[0].rect.bottom() - 15.0).abs() < 1e-6
        );
    }

    #[test]
    fn test_padding_suppresses_parent_child_collapse() {
        let inner = block(
            Style {
                margin: MarginEdges::uniform(15.0),
                height: Dimension::Pt(10.0),
                ..Default::default()
            },
            vec![],
        );
        let outer = block(
            Style {
                padding: Edges::uniform(5.0),
                ..Default::default()
            },
            vec![inner],
        );
        let (result, _) = layout_into(&outer, 100.0, 1000.0);
        let frag = result.fragment.unwrap();
        assert!((frag.rect.y - 0.0).abs() < 1e-6);
        // The child's top margin stays inside the padded parent.
        assert!((frag.children[0].rect.y - 20.0).abs() < 1e-6);
        // Auto height runs to the child's bottom margin edge plus padding.
        assert!((frag.rect.height - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_parent_child_margins_collapse_through() {
        let inner = block(
            Style {
                margin: MarginEdges {
                    top: Dimension::Pt(30.0),
                    ..Default::default()
                },
                height: Dimension::Pt(10.0),
                ..Default::default()
            },
            vec![],
        );
        let outer = block(
            Style {
                margin: MarginEdges {
                    top: Dimension::Pt(10.0),
                    ..Default::default()
                },
                ..Default::default()
            },
            vec![inner],
        );
        let root = block(Style::default(), vec![outer]);
        let (result, _) = layout_into(&root, 100.0, 1000.0);
        let frag = result.fragment.unwrap();
        // One collapsed margin of 30 positions both parent and child.
        assert!((frag.children[0].children[0].rect.y - 30.0).abs() < 1e-6);
        assert!((frag.children[0].rect.y - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_fixed_height_and_width() {
        let node = block(
            Style {
                width: Dimension::Pt(50.0),
                height: Dimension::Pt(30.0),
                ..Default::default()
            },
            vec![],
        );
        let (result, _) = layout_into(&node, 200.0, 1000.0);
        let frag = result.fragment.unwrap();
        assert_eq!(frag.rect.width, 50.0);
        assert_eq!(frag.rect.height, 30.0);
    }

    #[test]
    fn test_auto_margins_center_fixed_width() {
        let node = block(
            Style {
                width: Dimension::Pt(50.0),
                height: Dimension::Pt(10.0),
                margin: MarginEdges {
                    left: Dimension::Auto,
                    right: Dimension::Auto,
                    ..Default::default()
                },
                ..Default::default()
            },
            vec![],
        );
        let (result, _) = layout_into(&node, 200.0, 1000.0);
        let frag = result.fragment.unwrap();
        assert!((frag.rect.x - 75.0).abs() < 1e-6);
    }

    #[test]
    fn test_text_fills_lines_and_splits() {
        // 6 words of 2 chars at 10pt in a 20pt-wide, 35pt-tall area:
        // 6 lines of 10pt; 3 fit and the widow minimum holds.
        let node = text_block("aa bb cc dd ee ff", 10.0);
        let (result, _) = layout_into(&node, 20.0, 35.0);
        let frag = result.fragment.unwrap();
        assert_eq!(frag.children.len(), 3);
        assert!(result.resume.is_some());
        assert_eq!(frag.split, SplitMarker::First);
    }

    #[test]
    fn test_widows_pull_lines_back() {
        // 4 lines, 3 would fit, widows 2 leaves only 2 on the first piece.
        let node = text_block("aa bb cc dd", 10.0);
        let (result, _) = layout_into(&node, 20.0, 35.0);
        let frag = result.fragment.unwrap();
        assert_eq!(frag.children.len(), 2);
    }

    #[test]
    fn test_replaced_block_moves_when_not_fitting() {
        let grid = CharGrid::default();
        let mut ctx = LayoutContext::new(&grid);
        let replaced = BoxNode {
            kind: BoxKind::Replaced(Size::new(40.0, 50.0)),
            style: Arc::new(Style::default()),
            children: Vec::new(),
            id: None,
        };
        let result = layout_block_level(
            &mut ctx,
            &replaced,
            FlowArea {
                x: 0.0,
                y: 0.0,
                width: 100.0,
                top: 0.0,
                bottom: 30.0,
            },
            None,
            false,
            &mut Vec::new(),
        );
        assert!(result.fragment.is_none());
    }

    #[test]
    fn test_forced_break_between_children() {
        let first = block(
            Style {
                height: Dimension::Pt(10.0),
                break_after: BreakBetween::Page,
                ..Default::default()
            },
            vec![],
        );
        let second = block(
            Style {
                height: Dimension::Pt(10.0),
                ..Default::default()
            },
            vec![],
        );
        let parent = block(Style::default(), vec![first, second]);
        let (result, _) = layout_into(&parent, 100.0, 1000.0);
        let frag = result.fragment.unwrap();
        assert_eq!(frag.children.len(), 1);
        let resume = result.resume.unwrap();
        assert_eq!(resume.index, 1);
        assert!(resume.inner.is_none());
        assert_eq!(result.next.value, BreakBetween::Page);
    }

    #[test]
    fn test_break_inside_avoid_moves_whole_box() {
        let tall = block(
            Style {
                height: Dimension::Pt(60.0),
                break_inside: crate::style::BreakInside::Avoid,
                ..Default::default()
            },
            vec![],
        );
        let spacer = block(
            Style {
                height: Dimension::Pt(20.0),
                ..Default::default()
            },
            vec![],
        );
        let parent = block(Style::default(), vec![spacer, tall]);
        let (result, _) = layout_into(&parent, 100.0, 70.0);
        let frag = result.fragment.unwrap();
        // Only the spacer stays; the avoid box moves entirely.
        assert_eq!(frag.children.len(), 1);
        assert_eq!(result.resume.unwrap().index, 1);
    }

    #[test]
    fn test_avoid_is_overridden_on_empty_fragmentainer() {
        let tall = block(
            Style {
                break_inside: crate::style::BreakInside::Avoid,
                ..Default::default()
            },
            vec![text_block("aa bb cc dd ee ff gg hh", 10.0)],
        );
        let (result, _) = layout_into(&tall, 20.0, 40.0);
        // It cannot fit, but the fragmentainer is empty: it must split.
        let frag = result.fragment.unwrap();
        assert!(!frag.children.is_empty());
        assert!(result.resume.is_some());
    }

    #[test]
    fn test_relative_offset_applies() {
        let child = block(
            Style {
                height: Dimension::Pt(10.0),
                position: Position::Relative,
                left: Some(7.0),
                top: Some(3.0),
                ..Default::default()
            },
            vec![],
        );
        let parent = block(Style::default(), vec![child]);
        let (result, _) = layout_into(&parent, 100.0, 1000.0);
        let frag = result.fragment.unwrap();
        assert!((frag.children[0].rect.x - 7.0).abs() < 1e-6);
        assert!((frag.children[0].rect.y - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_absolute_positioned_against_relative_ancestor() {
        let abs = block(
            Style {
                position: Position::Absolute,
                top: Some(5.0),
                left: Some(5.0),
                width: Dimension::Pt(10.0),
                height: Dimension::Pt(10.0),
                ..Default::default()
            },
            vec![],
        );
        let parent = block(
            Style {
                position: Position::Relative,
                height: Dimension::Pt(50.0),
                ..Default::default()
            },
            vec![abs],
        );
        let (result, _) = layout_into(&parent, 100.0, 1000.0);
        let frag = result.fragment.unwrap();
        let abs_frag = frag
            .children
            .iter()
            .find(|c| matches!(c.style.position, Position::Absolute))
            .expect("absolute child resolved");
        assert!((abs_frag.rect.x - 5.0).abs() < 1e-6);
        assert!((abs_frag.rect.y - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_float_shortens_lines() {
        let float = block(
            Style {
                float: Float::Left,
                width: Dimension::Pt(20.0),
                height: Dimension::Pt(10.0),
                ..Default::default()
            },
            vec![],
        );
        let style = Style {
            font_size: 10.0,
            ..Default::default()
        };
        let text = BoxNode {
            kind: BoxKind::Text("aaa bb".to_string()),
            style: Arc::new(style.clone()),
            children: Vec::new(),
            id: None,
        };
        let para = block(style, vec![float, text]);
        let (result, _) = layout_into(&para, 50.0, 1000.0);
        let frag = result.fragment.unwrap();
        let line = frag
            .children
            .iter()
            .find(|c| matches!(c.kind, FragmentKind::Line))
            .unwrap();
        // The first line starts after the float.
        assert!((line.rect.x - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_clear_moves_below_float() {
        let float = block(
            Style {
                float: Float::Left,
                width: Dimension::Pt(20.0),
                height: Dimension::Pt(30.0),
                ..Default::default()
            },
            vec![],
        );
        let cleared = block(
            Style {
                clear: crate::style::Clear::Left,
                height: Dimension::Pt(10.0),
                ..Default::default()
            },
            vec![],
        );
        let parent = block(Style::default(), vec![float, cleared]);
        let (result, _) = layout_into(&parent, 100.0, 1000.0);
        let frag = result.fragment.unwrap();
        let cleared_frag = frag
            .children
            .iter()
            .find(|c| c.rect.height == 10.0)
            .unwrap();
        assert!((cleared_frag.rect.y - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_counters_applied_once_per_box() {
        let node = block(
            Style {
                counter_increment: vec![("section".into(), 1)],
                height: Dimension::Pt(5.0),
                ..Default::default()
            },
            vec![],
        );
        let parent = block(Style::default(), vec![node]);
        let (_, counters) = layout_into(&parent, 100.0, 1000.0);
        assert_eq!(counters.value("section"), 1);
    }
}
