//! # Page Sequencer
//!
//! Drives the outer pagination loop: select the `@page` rule set for the
//! next page, lay the document's remainder into its content area, carry
//! the continuation token forward, and repeat until nothing is left.
//! Margin boxes are assembled afterwards from per-page state captured as
//! each page closed, so `counter(pages)` needs no relayout, only the one
//! deferred substitution once the total is known.

use std::sync::Arc;

use crate::geometry::{Edges, Rect, Size};
use crate::layout::block::{layout_absolute, layout_block_level, FlowArea};
use crate::layout::fragment::{needs_parity_blank, page_side, NextBreak, PageSide, ResumeAt};
use crate::layout::{
    build_box_tree, BoxKind, BoxNode, Fragment, FragmentKind, LayoutContext, PendingAbsolute,
};
use crate::measure::TextMeasure;
use crate::model::{
    Document, MarginBoxPosition, MarginBoxRule, PagePseudo, PageRule,
};
use crate::style::{ContentItem, CounterStyleKind, Position, Style, TextAlign};

/// One finished page: absolute geometry for the whole fragment tree.
#[derive(Debug, Clone)]
pub struct Page {
    pub index: usize,
    pub size: Size,
    /// The content area (inside the page margins).
    pub content_box: Rect,
    pub name: Option<String>,
    /// Inserted for break parity; carries no flow content.
    pub blank: bool,
    pub root: Option<Fragment>,
    pub margin_boxes: Vec<Fragment>,
    pub anchors: Vec<PageAnchor>,
}

/// Where an identified element landed on this page.
#[derive(Debug, Clone)]
pub struct PageAnchor {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

/// Geometry and margin boxes a page selector resolved to.
#[derive(Debug, Clone)]
struct SelectedPage {
    size: Size,
    margin: Edges,
    margin_boxes: Vec<MarginBoxRule>,
}

/// Which page the selector machinery is looking at.
#[derive(Debug, Clone, Copy)]
struct PageFacts<'a> {
    index: usize,
    group_index: usize,
    name: Option<&'a str>,
    side: PageSide,
    blank: bool,
}

fn selector_matches(rule: &PageRule, facts: &PageFacts) -> Option<u32> {
    let sel = &rule.selector;
    let mut specificity = 0;
    if let Some(name) = &sel.name {
        if facts.name != Some(name.as_str()) {
            return None;
        }
        specificity += 16;
    }
    if let Some(pseudo) = &sel.pseudo {
        match pseudo {
            PagePseudo::First => {
                if facts.index != 0 {
                    return None;
                }
                specificity += 4;
            }
            PagePseudo::Blank => {
                if !facts.blank {
                    return None;
                }
                specificity += 2;
            }
            PagePseudo::Left => {
                if facts.side != PageSide::Left {
                    return None;
                }
                specificity += 1;
            }
            PagePseudo::Right => {
                if facts.side != PageSide::Right {
                    return None;
                }
                specificity += 1;
            }
            PagePseudo::Nth { a, b, of_name } => {
                let n = if *of_name {
                    facts.group_index
                } else {
                    facts.index
                } as i32
                    + 1;
                let matches = if *a == 0 {
                    n == *b
                } else {
                    let diff = n - *b;
                    diff % *a == 0 && diff / *a >= 0
                };
                if !matches {
                    return None;
                }
                specificity += 8;
            }
        }
    }
    Some(specificity)
}

/// Cascade the matching `@page` rules for one page, lowest specificity
/// first so later rules override.
fn select_page(document: &Document, facts: PageFacts) -> SelectedPage {
    let (dw, dh) = document.default_page.size.dimensions();
    let mut selected = SelectedPage {
        size: Size::new(dw, dh),
        margin: document.default_page.margin,
        margin_boxes: Vec::new(),
    };

    let mut matching: Vec<(u32, usize)> = document
        .page_rules
        .iter()
        .enumerate()
        .filter_map(|(i, rule)| selector_matches(rule, &facts).map(|s| (s, i)))
        .collect();
    matching.sort_by_key(|(s, i)| (*s, *i));

    for (_, i) in matching {
        let rule = &document.page_rules[i];
        if let Some(size) = rule.size {
            selected.size = size;
        }
        if let Some(margin) = rule.margin {
            selected.margin = margin;
        }
        for mb in &rule.margin_boxes {
            selected.margin_boxes.retain(|x| x.position != mb.position);
            selected.margin_boxes.push(mb.clone());
        }
    }
    selected
}

/// Evaluate a `string-set` content list to its string value.
pub fn evaluate_string_items(ctx: &LayoutContext, items: &[ContentItem]) -> String {
    let mut out = String::new();
    for item in items {
        match item {
            ContentItem::Text { text } => out.push_str(text),
            ContentItem::Counter { name, style } => {
                out.push_str(&ctx.counters.format(name, *style));
            }
            ContentItem::Counters {
                name,
                separator,
                style,
            } => {
                out.push_str(&ctx.counters.format_all(name, separator, *style));
            }
            ContentItem::String { name, select } => {
                out.push_str(&ctx.strings.select(name, *select));
            }
            other => {
                log::debug!("unsupported item in string-set value: {other:?}");
            }
        }
    }
    out
}

/// Margin-box content, evaluated at page close except for the parts that
/// need the whole document: the page total and target references, which
/// may point forward to pages not yet produced.
#[derive(Debug, Clone)]
enum ThunkPiece {
    Text(String),
    /// `counter(pages)` with its display style.
    Pages(CounterStyleKind),
    TargetCounter {
        target: String,
        name: String,
        style: CounterStyleKind,
    },
    TargetText {
        target: String,
    },
    Element(BoxNode),
}

/// A thunk piece after the deferred substitutions.
#[derive(Debug, Clone)]
enum ResolvedPiece {
    Text(String),
    Element(BoxNode),
}

/// Resolve the deferred pieces against the finished document.
fn resolve_pieces(
    ctx: &LayoutContext,
    pieces: &[ThunkPiece],
    total_pages: usize,
) -> Vec<ResolvedPiece> {
    let mut out: Vec<ResolvedPiece> = Vec::new();
    let push_text = |out: &mut Vec<ResolvedPiece>, s: String| {
        if s.is_empty() {
            return;
        }
        if let Some(ResolvedPiece::Text(prev)) = out.last_mut() {
            prev.push_str(&s);
        } else {
            out.push(ResolvedPiece::Text(s));
        }
    };
    for piece in pieces {
        match piece {
            ThunkPiece::Text(text) => push_text(&mut out, text.clone()),
            ThunkPiece::Pages(style) => push_text(&mut out, style.format(total_pages as i32)),
            ThunkPiece::TargetCounter {
                target,
                name,
                style,
            } => match ctx.anchors.get(target) {
                Some(anchor) => {
                    if name == "page" {
                        push_text(&mut out, style.format(anchor.page as i32 + 1));
                    } else {
                        let value = anchor
                            .counters
                            .get(name)
                            .and_then(|s| s.last())
                            .copied()
                            .unwrap_or(0);
                        push_text(&mut out, style.format(value));
                    }
                }
                None => {
                    log::debug!("target-counter({target:?}): no such anchor; producing nothing");
                }
            },
            ThunkPiece::TargetText { target } => match ctx.anchors.get(target) {
                Some(anchor) => push_text(&mut out, anchor.text.clone()),
                None => {
                    log::debug!("target-text({target:?}): no such anchor; producing nothing");
                }
            },
            ThunkPiece::Element(node) => out.push(ResolvedPiece::Element(node.clone())),
        }
    }
    out
}

#[derive(Debug, Clone)]
struct MarginThunk {
    rule: MarginBoxRule,
    pieces: Vec<ThunkPiece>,
}

/// Evaluate margin-box content against the page-close state.
fn evaluate_margin_content(ctx: &LayoutContext, items: &[ContentItem]) -> Vec<ThunkPiece> {
    let mut pieces = Vec::new();
    let push_text = |pieces: &mut Vec<ThunkPiece>, s: String| {
        if s.is_empty() {
            return;
        }
        if let Some(ThunkPiece::Text(prev)) = pieces.last_mut() {
            prev.push_str(&s);
        } else {
            pieces.push(ThunkPiece::Text(s));
        }
    };
    for item in items {
        match item {
            ContentItem::Text { text } => push_text(&mut pieces, text.clone()),
            ContentItem::Counter { name, style } => {
                if name == "pages" {
                    pieces.push(ThunkPiece::Pages(*style));
                } else {
                    push_text(&mut pieces, ctx.counters.format(name, *style));
                }
            }
            ContentItem::Counters {
                name,
                separator,
                style,
            } => push_text(&mut pieces, ctx.counters.format_all(name, separator, *style)),
            ContentItem::String { name, select } => {
                push_text(&mut pieces, ctx.strings.select(name, *select));
            }
            ContentItem::Element { name, select } => match ctx.running.select(name, *select) {
                Some(node) => pieces.push(ThunkPiece::Element(reflow_running(&node))),
                None => {
                    log::debug!("running element {name:?} has no value on this page");
                }
            },
            ContentItem::TargetCounter {
                target,
                name,
                style,
            } => pieces.push(ThunkPiece::TargetCounter {
                target: target.clone(),
                name: name.clone(),
                style: *style,
            }),
            ContentItem::TargetText { target } => pieces.push(ThunkPiece::TargetText {
                target: target.clone(),
            }),
        }
    }
    pieces
}

/// A running element re-enters flow inside a margin box.
fn reflow_running(node: &BoxNode) -> BoxNode {
    let mut clone = node.clone();
    clone.style = Arc::new(Style {
        position: Position::Static,
        ..(*clone.style).clone()
    });
    clone
}

// ── Margin box geometry ─────────────────────────────────────────

/// Content size limits for a strip box, measured from its built content.
struct StripSpec {
    definite: Option<f64>,
    preferred: f64,
    min: f64,
}

/// Distribute one margin strip among up to three boxes (start, center,
/// end).  A definite size on a box is exact; the center box is centered in
/// the strip; indefinite boxes share what remains in proportion to their
/// preferred sizes, clamped to the strip.
fn distribute_strip(total: f64, specs: [Option<StripSpec>; 3]) -> [Option<(f64, f64)>; 3] {
    let mut out = [None, None, None];
    let center = &specs[1];
    if let Some(c) = center {
        let cw = c.definite.unwrap_or_else(|| c.preferred.min(total)).min(total);
        let c_off = (total - cw) / 2.0;
        out[1] = Some((c_off, cw));
        if let Some(s) = &specs[0] {
            let avail = c_off;
            let w = s.definite.unwrap_or_else(|| avail.max(s.min)).min(avail.max(0.0));
            out[0] = Some((0.0, w));
        }
        if let Some(e) = &specs[2] {
            let avail = total - (c_off + cw);
            let w = e.definite.unwrap_or_else(|| avail.max(e.min)).min(avail.max(0.0));
            out[2] = Some((total - w, w));
        }
        return out;
    }

    match (&specs[0], &specs[2]) {
        (Some(s), Some(e)) => {
            let (sw, ew) = match (s.definite, e.definite) {
                (Some(a), Some(b)) => (a, b),
                (Some(a), None) => (a, (total - a).max(e.min)),
                (None, Some(b)) => ((total - b).max(s.min), b),
                (None, None) => {
                    let pref = s.preferred + e.preferred;
                    if pref > 0.0 {
                        let sw = (total * s.preferred / pref).max(s.min);
                        (sw, (total - sw).max(e.min))
                    } else {
                        (total / 2.0, total / 2.0)
                    }
                }
            };
            out[0] = Some((0.0, sw.min(total)));
            out[2] = Some((total - ew.min(total), ew.min(total)));
        }
        (Some(s), None) => {
            let w = s.definite.unwrap_or(total).min(total);
            out[0] = Some((0.0, w));
        }
        (None, Some(e)) => {
            let w = e.definite.unwrap_or(total).min(total);
            out[2] = Some((total - w, w));
        }
        (None, None) => {}
    }
    out
}

/// Default inline alignment for a margin box position.
fn positional_align(position: MarginBoxPosition) -> TextAlign {
    use MarginBoxPosition::*;
    match position {
        TopLeft | BottomLeft => TextAlign::Left,
        TopRight | BottomRight => TextAlign::Right,
        _ => TextAlign::Center,
    }
}

/// Build the content box tree for one margin box from resolved pieces.
fn margin_box_content(rule: &MarginBoxRule, pieces: &[ResolvedPiece]) -> BoxNode {
    let align = if rule.style.text_align == TextAlign::Start {
        positional_align(rule.position)
    } else {
        rule.style.text_align
    };
    let container_style = Arc::new(Style {
        text_align: align,
        position: Position::Static,
        ..(*rule.style).clone()
    });

    let mut children = Vec::new();
    for piece in pieces {
        match piece {
            ResolvedPiece::Text(text) => children.push(BoxNode {
                kind: BoxKind::Text(text.clone()),
                style: container_style.clone(),
                children: Vec::new(),
                id: None,
            }),
            ResolvedPiece::Element(node) => children.push(node.clone()),
        }
    }
    BoxNode {
        kind: BoxKind::Container,
        style: container_style,
        children,
        id: None,
    }
}

/// Lay one margin box into its rect, centering the content block-axis.
fn lay_margin_box(
    ctx: &mut LayoutContext,
    rule: &MarginBoxRule,
    pieces: &[ResolvedPiece],
    rect: Rect,
) -> Fragment {
    let content = margin_box_content(rule, pieces);
    ctx.abs_collectors.push(Vec::new());
    let result = ctx.measured(|c| {
        layout_block_level(
            c,
            &content,
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
        )
    });
    ctx.abs_collectors.pop();

    let mut fragment = Fragment::new(
        FragmentKind::MarginBox(rule.position),
        rule.style.clone(),
        rect,
    );
    if let Some(mut inner) = result.fragment {
        let dy = ((rect.height - inner.rect.height) / 2.0).max(0.0);
        inner.translate(0.0, dy);
        fragment.children.push(inner);
    }
    fragment
}

/// Rects of the four corner boxes.
fn corner_rect(position: MarginBoxPosition, size: Size, margin: Edges) -> Option<Rect> {
    use MarginBoxPosition::*;
    match position {
        TopLeftCorner => Some(Rect::new(0.0, 0.0, margin.left, margin.top)),
        TopRightCorner => Some(Rect::new(
            size.width - margin.right,
            0.0,
            margin.right,
            margin.top,
        )),
        BottomLeftCorner => Some(Rect::new(
            0.0,
            size.height - margin.bottom,
            margin.left,
            margin.bottom,
        )),
        BottomRightCorner => Some(Rect::new(
            size.width - margin.right,
            size.height - margin.bottom,
            margin.right,
            margin.bottom,
        )),
        _ => None,
    }
}

/// Assemble every margin box of one page from its thunks.
fn build_margin_boxes(
    ctx: &mut LayoutContext,
    thunks: &[MarginThunk],
    size: Size,
    margin: Edges,
    total_pages: usize,
) -> Vec<Fragment> {
    let mut out = Vec::new();
    let resolved: Vec<Vec<ResolvedPiece>> = thunks
        .iter()
        .map(|t| resolve_pieces(ctx, &t.pieces, total_pages))
        .collect();

    // Corners are fixed geometry.
    for (thunk, pieces) in thunks.iter().zip(resolved.iter()) {
        if let Some(rect) = corner_rect(thunk.rule.position, size, margin) {
            out.push(lay_margin_box(ctx, &thunk.rule, pieces, rect));
        }
    }

    // The four variable strips.
    use MarginBoxPosition::*;
    let strips: [([MarginBoxPosition; 3], bool); 4] = [
        ([TopLeft, TopCenter, TopRight], true),
        ([BottomLeft, BottomCenter, BottomRight], true),
        ([LeftTop, LeftMiddle, LeftBottom], false),
        ([RightTop, RightMiddle, RightBottom], false),
    ];
    for (positions, horizontal) in strips {
        let total = if horizontal {
            size.width - margin.horizontal()
        } else {
            size.height - margin.vertical()
        };
        let specs: [Option<StripSpec>; 3] = positions.map(|pos| {
            thunks
                .iter()
                .position(|t| t.rule.position == pos)
                .map(|ti| {
                    let content = margin_box_content(&thunks[ti].rule, &resolved[ti]);
                    let axis_size = if horizontal {
                        thunks[ti].rule.width
                    } else {
                        thunks[ti].rule.height
                    };
                    StripSpec {
                        definite: axis_size,
                        preferred: if horizontal {
                            ctx.measured(|c| crate::layout::max_content_width(c, &content))
                        } else {
                            total
                        },
                        min: if horizontal {
                            ctx.measured(|c| crate::layout::min_content_width(c, &content))
                        } else {
                            0.0
                        },
                    }
                })
        });
        let placed = distribute_strip(total.max(0.0), specs);
        for (slot, pos) in placed.iter().zip(positions.iter()) {
            let Some((offset, extent)) = slot else { continue };
            let ti = thunks
                .iter()
                .position(|t| t.rule.position == *pos)
                .unwrap();
            let rect = match pos {
                TopLeft | TopCenter | TopRight => {
                    Rect::new(margin.left + offset, 0.0, *extent, margin.top)
                }
                BottomLeft | BottomCenter | BottomRight => Rect::new(
                    margin.left + offset,
                    size.height - margin.bottom,
                    *extent,
                    margin.bottom,
                ),
                LeftTop | LeftMiddle | LeftBottom => {
                    Rect::new(0.0, margin.top + offset, margin.left, *extent)
                }
                RightTop | RightMiddle | RightBottom => Rect::new(
                    size.width - margin.right,
                    margin.top + offset,
                    margin.right,
                    *extent,
                ),
                _ => continue,
            };
            if rect.width > 0.0 && rect.height > 0.0 {
                out.push(lay_margin_box(ctx, &thunks[ti].rule, &resolved[ti], rect));
            }
        }
    }
    out
}

// ── The sequencing loop ─────────────────────────────────────────

/// The page name the first page should use: the name requested by the
/// first in-flow content.
fn initial_page_name(node: &BoxNode) -> Option<String> {
    if node.style.page.is_some() {
        return node.style.page.clone();
    }
    node.children
        .iter()
        .find(|c| !c.style.out_of_flow())
        .and_then(initial_page_name)
}

struct PageBuild {
    size: Size,
    margin: Edges,
    name: Option<String>,
    blank: bool,
    root: Option<Fragment>,
    thunks: Vec<MarginThunk>,
}

/// Lay a document out into pages.
pub fn paginate(document: &Document, measure: &dyn TextMeasure) -> Vec<Page> {
    let (root, fixed) = build_box_tree(&document.root);
    let mut ctx = LayoutContext::new(measure);
    let direction = document.root.style.direction;

    let mut builds: Vec<PageBuild> = Vec::new();
    let mut resume: Option<ResumeAt> = None;
    let mut next = NextBreak {
        value: Default::default(),
        page_name: initial_page_name(&root),
    };
    let mut started = false;
    let mut prev_name: Option<String> = None;
    let mut group_index = 0usize;

    loop {
        let index = builds.len();
        let insert_blank =
            started && needs_parity_blank(next.value, index, direction);

        let name = next.page_name.clone().or_else(|| prev_name.clone());
        if name == prev_name && started {
            group_index += 1;
        } else if started {
            group_index = 0;
        }
        let facts = PageFacts {
            index,
            group_index,
            name: name.as_deref(),
            side: page_side(index, direction),
            blank: insert_blank,
        };
        let selected = select_page(document, facts);
        let content = Rect::new(
            selected.margin.left,
            selected.margin.top,
            selected.size.width - selected.margin.horizontal(),
            selected.size.height - selected.margin.vertical(),
        );

        // Per-page state.
        ctx.current_page = index;
        ctx.current_page_name = name.clone();
        ctx.strings.open_page();
        ctx.running.open_page();
        ctx.counters.increment("page", 1);
        ctx.floats.clear();
        ctx.float_fragments.clear();
        ctx.at_fragmentainer_top = true;
        ctx.continuation_forced = if started {
            Some(next.forced())
        } else {
            None
        };

        let mut page_root = None;
        if !insert_blank {
            ctx.abs_collectors.clear();
            ctx.abs_collectors.push(Vec::new());

            let result = layout_block_level(
                &mut ctx,
                &root,
                FlowArea {
                    x: content.x,
                    y: content.y,
                    width: content.width,
                    top: content.y,
                    bottom: content.bottom(),
                },
                resume.as_ref(),
                true,
                &mut Vec::new(),
            );

            let mut fragment = result.fragment.unwrap_or_else(|| {
                Fragment::new(FragmentKind::Block, root.style.clone(), content)
            });

            // Page-level positioned boxes resolve against the content area.
            if let Some(pending) = ctx.abs_collectors.pop() {
                for abs in pending {
                    if let Some(frag) = layout_absolute(&mut ctx, &abs, content) {
                        fragment.children.push(frag);
                    }
                }
            }
            // Fixed boxes repeat on every page; their document-order side
            // effects fire only once.
            for fixed_box in &fixed {
                let pending = PendingAbsolute {
                    node: fixed_box.clone(),
                    static_x: content.x,
                    static_y: content.y,
                };
                let frag = if index == 0 {
                    layout_absolute(&mut ctx, &pending, content)
                } else {
                    ctx.measured(|c| layout_absolute(c, &pending, content))
                };
                if let Some(frag) = frag {
                    fragment.children.push(frag);
                }
            }
            page_root = Some(fragment);

            // Forward progress: a page that neither finished nor advanced
            // the token would loop forever.
            if result.resume == resume && resume.is_some() {
                log::error!("pagination made no progress; truncating output");
                resume = None;
            } else {
                resume = result.resume;
            }
            let carried_name = next.page_name.take();
            next = result.next;
            if next.page_name.is_none() {
                next.page_name = carried_name.or_else(|| name.clone());
            }
        }

        // Margin-box content is captured against the page-close state.
        let thunks: Vec<MarginThunk> = selected
            .margin_boxes
            .iter()
            .map(|rule| MarginThunk {
                rule: rule.clone(),
                pieces: evaluate_margin_content(&ctx, &rule.content),
            })
            .collect();

        builds.push(PageBuild {
            size: selected.size,
            margin: selected.margin,
            name: name.clone(),
            blank: insert_blank,
            root: page_root,
            thunks,
        });
        prev_name = name;
        started = true;

        if !insert_blank && resume.is_none() {
            break;
        }
    }

    // Second pass: total page count is now known; build the margin boxes
    // and attach per-page anchors.
    let total = builds.len();
    let mut anchors_by_page: Vec<Vec<PageAnchor>> = vec![Vec::new(); total];
    for (id, anchor) in ctx.anchors.iter() {
        if anchor.page < total {
            anchors_by_page[anchor.page].push(PageAnchor {
                id: id.clone(),
                x: anchor.x,
                y: anchor.y,
            });
        }
    }
    for list in &mut anchors_by_page {
        list.sort_by(|a, b| a.id.cmp(&b.id));
    }

    builds
        .into_iter()
        .enumerate()
        .map(|(index, build)| {
            let margin_boxes =
                build_margin_boxes(&mut ctx, &build.thunks, build.size, build.margin, total);
            Page {
                index,
                size: build.size,
                content_box: Rect::new(
                    build.margin.left,
                    build.margin.top,
                    build.size.width - build.margin.horizontal(),
                    build.size.height - build.margin.vertical(),
                ),
                name: build.name,
                blank: build.blank,
                root: build.root,
                margin_boxes,
                anchors: std::mem::take(&mut anchors_by_page[index]),
            }
        })
        .collect()
}
