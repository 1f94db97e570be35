//! # Flex Layout
//!
//! The flexbox algorithm: basis resolution, line partitioning under
//! `flex-wrap`, iterative grow/shrink distribution with min/max freezing,
//! main-axis justification (after auto margins claim their share), and
//! cross-axis alignment with stretch.
//!
//! Row containers fragment at line granularity: a flex line that no longer
//! fits moves to the next fragmentainer whole.  Column containers fragment
//! like block flow: an item too tall for the remaining space splits
//! through the same controller as any block child.

use crate::geometry::{Edges, Rect};
use crate::layout::block::{layout_block_level, measure_box_height, FlowArea, FlowResult};
use crate::layout::fragment::{NextBreak, ResumeAt};
use crate::layout::{
    max_content_width, min_content_width, BoxNode, Fragment, FragmentKind, LayoutContext,
    SplitMarker,
};
use crate::style::{
    AlignContent, AlignItems, Direction, FlexWrap, JustifyContent, Position, Style,
};

/// Distribute positive free space among items by their grow factors,
/// clamping to max sizes and redistributing until stable.
pub fn distribute_grow(sizes: &mut [f64], grow: &[f64], max: &[f64], mut free: f64) {
    let mut frozen = vec![false; sizes.len()];
    loop {
        let total: f64 = (0..sizes.len())
            .filter(|&i| !frozen[i])
            .map(|i| grow[i])
            .sum();
        if total <= 0.0 || free <= 1e-9 {
            return;
        }
        let share = free / total;
        let mut used = 0.0;
        let mut clamped = false;
        for i in 0..sizes.len() {
            if frozen[i] || grow[i] <= 0.0 {
                continue;
            }
            let want = sizes[i] + share * grow[i];
            if want >= max[i] {
                used += max[i] - sizes[i];
                sizes[i] = max[i];
                frozen[i] = true;
                clamped = true;
            } else {
                used += share * grow[i];
                sizes[i] = want;
            }
        }
        free -= used;
        if !clamped {
            return;
        }
    }
}

/// Shrink items to absorb `overflow` (positive), weighting by
/// `shrink × base` and clamping to min sizes.
pub fn distribute_shrink(sizes: &mut [f64], shrink: &[f64], min: &[f64], mut overflow: f64) {
    let bases: Vec<f64> = sizes.to_vec();
    let mut frozen = vec![false; sizes.len()];
    while overflow > 1e-9 {
        let weight_total: f64 = (0..sizes.len())
            .filter(|&i| !frozen[i])
            .map(|i| shrink[i] * bases[i])
            .sum();
        if weight_total <= 0.0 {
            return;
        }
        let mut absorbed = 0.0;
        let mut clamped = false;
        for i in 0..sizes.len() {
            if frozen[i] {
                continue;
            }
            let weight = shrink[i] * bases[i];
            if weight <= 0.0 {
                continue;
            }
            let cut = overflow * weight / weight_total;
            let want = sizes[i] - cut;
            if want <= min[i] {
                absorbed += sizes[i] - min[i];
                sizes[i] = min[i];
                frozen[i] = true;
                clamped = true;
            } else {
                absorbed += cut;
                sizes[i] = want;
            }
        }
        overflow -= absorbed;
        if !clamped {
            return;
        }
    }
}

/// Main-axis leading offset and inter-item spacing for `justify-content`.
/// Negative free space packs everything to the start.
pub fn justify_offsets(
    justify: JustifyContent,
    direction: Direction,
    n: usize,
    free: f64,
) -> (f64, f64) {
    if n == 0 {
        return (0.0, 0.0);
    }
    let free = free.max(0.0);
    match justify {
        JustifyContent::FlexStart | JustifyContent::Start | JustifyContent::Stretch => (0.0, 0.0),
        JustifyContent::FlexEnd | JustifyContent::End => (free, 0.0),
        JustifyContent::Left => match direction {
            Direction::Ltr => (0.0, 0.0),
            Direction::Rtl => (free, 0.0),
        },
        JustifyContent::Right => match direction {
            Direction::Ltr => (free, 0.0),
            Direction::Rtl => (0.0, 0.0),
        },
        JustifyContent::Center => (free / 2.0, 0.0),
        JustifyContent::SpaceBetween => {
            if n <= 1 {
                (0.0, 0.0)
            } else {
                (0.0, free / (n - 1) as f64)
            }
        }
        JustifyContent::SpaceAround => {
            let unit = free / n as f64;
            (unit / 2.0, unit)
        }
        JustifyContent::SpaceEvenly => {
            let unit = free / (n + 1) as f64;
            (unit, unit)
        }
    }
}

struct FlexItem {
    /// Original child index (the resume token namespace).
    index: usize,
    margin: Edges,
    /// Border-box main size before flexing.
    base: f64,
    min: f64,
    max: f64,
    grow: f64,
    shrink: f64,
    /// Resolved border-box main size.
    main: f64,
    auto_margin_main: u32,
    auto_margin_cross: bool,
}

pub fn layout_flex(
    ctx: &mut LayoutContext,
    node: &BoxNode,
    area: FlowArea,
    resume: Option<&ResumeAt>,
    page_is_empty: bool,
    adjoining: &mut Vec<f64>,
) -> FlowResult {
    let style = node.style.clone();
    if style.flex_direction.is_row() {
        layout_flex_row(ctx, node, &style, area, resume, page_is_empty, adjoining)
    } else {
        layout_flex_column(ctx, node, &style, area, resume, page_is_empty, adjoining)
    }
}

/// Common container prologue: margins, position, edges, out-of-flow kids.
struct Opened {
    margin: Edges,
    content_width: f64,
    border_y: f64,
    content_x: f64,
    content_top: f64,
    edge_top: f64,
    edge_bottom: f64,
    adjoining_entry: Vec<f64>,
}

fn open_container(
    ctx: &mut LayoutContext,
    node: &BoxNode,
    style: &Style,
    area: &FlowArea,
    first_fragment: bool,
    adjoining: &mut Vec<f64>,
) -> Opened {
    let (content_width, margin) = super::block::container_widths(style, area.width);
    let adjoining_entry = adjoining.clone();
    if first_fragment {
        adjoining.push(margin.top);
    }
    let edge_top = if first_fragment {
        style.padding.top + style.border_width.top
    } else {
        0.0
    };
    let edge_bottom = style.padding.bottom + style.border_width.bottom;
    let border_y = super::block::commit_position(ctx, style, area.y, adjoining);
    ctx.at_fragmentainer_top = false;
    let content_x = area.x + margin.left + style.border_width.left + style.padding.left;
    let content_top = border_y + edge_top;
    if first_fragment {
        ctx.note_box_start(node, area.x + margin.left, border_y);
    }

    for child in &node.children {
        if matches!(child.style.position, Position::Absolute | Position::Fixed) {
            super::block::queue_absolute_for(ctx, child, content_x, content_top);
        } else if let Position::Running(name) = &child.style.position {
            if !ctx.measuring && first_fragment {
                ctx.running.assign(name, child.clone());
            }
        }
    }

    Opened {
        margin,
        content_width,
        border_y,
        content_x,
        content_top,
        edge_top,
        edge_bottom,
        adjoining_entry,
    }
}

/// Flow children participating in flex layout, in main-axis order.
fn flex_children(node: &BoxNode, reverse: bool) -> Vec<(usize, &BoxNode)> {
    let mut out: Vec<(usize, &BoxNode)> = node
        .children
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.style.out_of_flow())
        .collect();
    if reverse {
        out.reverse();
    }
    out
}

fn item_main_edges(style: &Style, row: bool) -> f64 {
    if row {
        style.padding.horizontal() + style.border_width.horizontal()
    } else {
        style.padding.vertical() + style.border_width.vertical()
    }
}

/// Build a flex item, resolving its base, min and max main sizes
/// (border-box).
fn build_item(
    ctx: &mut LayoutContext,
    index: usize,
    child: &BoxNode,
    row: bool,
    container_main: f64,
    avail_width: f64,
) -> FlexItem {
    let style = &child.style;
    let margin = style.margin.resolve(avail_width);
    let edges = item_main_edges(style, row);

    let specified = if row {
        style.width.resolve(container_main)
    } else {
        style.height.resolve(container_main)
    };
    let base_content = match style.flex_basis.resolve(container_main) {
        Some(b) => b,
        None => match specified {
            Some(v) => v,
            None => {
                if row {
                    ctx.measured(|c| max_content_width(c, child)) - edges
                } else {
                    measure_box_height(ctx, child, avail_width) - margin.vertical() - edges
                }
            }
        },
    };

    // The main-size floor defaults to the content-based minimum.
    let min_prop = if row {
        style.min_width.resolve(container_main)
    } else {
        style.min_height.resolve(container_main)
    };
    let content_floor = if row {
        ctx.measured(|c| min_content_width(c, child)) - edges
    } else {
        0.0
    };
    let min = min_prop.unwrap_or(0.0).max(content_floor).max(0.0) + edges;
    let max = if row {
        style.max_width.resolve(container_main)
    } else {
        style.max_height.resolve(container_main)
    }
    .map(|m| m + edges)
    .unwrap_or(f64::INFINITY);

    let auto_margin_main = if row {
        style.margin.left.is_auto() as u32 + style.margin.right.is_auto() as u32
    } else {
        style.margin.top.is_auto() as u32 + style.margin.bottom.is_auto() as u32
    };
    let auto_margin_cross = if row {
        style.margin.top.is_auto() || style.margin.bottom.is_auto()
    } else {
        style.margin.left.is_auto() || style.margin.right.is_auto()
    };

    // `flex: none` semantics arrive as grow 0 / shrink 0 from upstream.
    let base = (base_content.max(0.0) + edges).clamp(min, max.max(min));
    FlexItem {
        index,
        margin,
        base,
        min,
        max,
        grow: style.flex_grow,
        shrink: style.flex_shrink,
        main: base,
        auto_margin_main,
        auto_margin_cross,
    }
}

fn margins_main(item: &FlexItem, row: bool) -> f64 {
    if row {
        item.margin.horizontal()
    } else {
        item.margin.vertical()
    }
}

/// Partition items into wrap lines; every line holds at least one item.
fn partition_lines(
    items: &[FlexItem],
    row: bool,
    gap: f64,
    avail: f64,
    wrap: bool,
) -> Vec<(usize, usize)> {
    if items.is_empty() {
        return Vec::new();
    }
    if !wrap {
        return vec![(0, items.len())];
    }
    let mut lines = Vec::new();
    let mut start = 0;
    let mut used = 0.0;
    for (i, item) in items.iter().enumerate() {
        let outer = item.base + margins_main(item, row);
        let needed = if i == start { outer } else { gap + outer };
        if i > start && used + needed > avail + 1e-6 {
            lines.push((start, i));
            start = i;
            used = outer;
        } else {
            used += needed;
        }
    }
    lines.push((start, items.len()));
    lines
}

/// Resolve grow/shrink for one line against the available main size.
fn resolve_line(items: &mut [FlexItem], row: bool, gap: f64, avail: f64) {
    let gaps = gap * items.len().saturating_sub(1) as f64;
    let outer: f64 = items.iter().map(|i| i.base + margins_main(i, row)).sum();
    let free = avail - outer - gaps;

    let mut sizes: Vec<f64> = items.iter().map(|i| i.base).collect();
    if free > 0.0 {
        let grow: Vec<f64> = items.iter().map(|i| i.grow).collect();
        let max: Vec<f64> = items.iter().map(|i| i.max).collect();
        distribute_grow(&mut sizes, &grow, &max, free);
    } else if free < 0.0 {
        let shrink: Vec<f64> = items.iter().map(|i| i.shrink).collect();
        let min: Vec<f64> = items.iter().map(|i| i.min).collect();
        distribute_shrink(&mut sizes, &shrink, &min, -free);
    }
    for (item, size) in items.iter_mut().zip(sizes) {
        item.main = size;
    }
}

/// Lay out an item's content at its final position.  The area is the
/// item's margin box; the child applies its own margins inside it.
fn lay_item(
    ctx: &mut LayoutContext,
    child: &BoxNode,
    margin_x: f64,
    margin_y: f64,
    margin_width: f64,
) -> Fragment {
    let result = layout_block_level(
        ctx,
        child,
        FlowArea {
            x: margin_x,
            y: margin_y,
            width: margin_width,
            top: margin_y,
            bottom: f64::INFINITY,
        },
        None,
        true,
        &mut Vec::new(),
    );
    result.fragment.unwrap_or_else(|| {
        Fragment::new(
            FragmentKind::Block,
            child.style.clone(),
            Rect::new(margin_x, margin_y, margin_width, 0.0),
        )
    })
}

#[allow(clippy::too_many_arguments)]
fn layout_flex_row(
    ctx: &mut LayoutContext,
    node: &BoxNode,
    style: &Style,
    area: FlowArea,
    resume: Option<&ResumeAt>,
    page_is_empty: bool,
    adjoining: &mut Vec<f64>,
) -> FlowResult {
    let first_fragment = resume.is_none();
    let opened = open_container(ctx, node, style, &area, first_fragment, adjoining);
    let content_width = opened.content_width;
    let content_x = opened.content_x;
    let content_top = opened.content_top;

    let reverse = style.flex_direction.is_reverse();
    let flow_all = flex_children(node, reverse);
    let skip_to = resume.map(|r| r.index);
    let flow: Vec<(usize, &BoxNode)> = match skip_to {
        Some(target) => flow_all
            .into_iter()
            .skip_while(|(idx, _)| *idx != target)
            .collect(),
        None => flow_all,
    };

    let mut items: Vec<FlexItem> = flow
        .iter()
        .map(|(idx, child)| build_item(ctx, *idx, child, true, content_width, content_width))
        .collect();

    let gap = style.column_gap;
    let cross_gap = style.row_gap;
    let wrap = !matches!(style.flex_wrap, FlexWrap::NoWrap);
    let ranges = partition_lines(&items, true, gap, content_width, wrap);

    // Resolve main sizes and measure cross extents per line.
    let mut line_cross: Vec<f64> = Vec::with_capacity(ranges.len());
    let mut item_cross: Vec<f64> = vec![0.0; items.len()];
    for &(start, end) in &ranges {
        resolve_line(&mut items[start..end], true, gap, content_width);
        let mut cross: f64 = 0.0;
        for i in start..end {
            let child = flow[i].1;
            let content_w = (items[i].main - item_main_edges(&child.style, true)).max(0.0);
            let h = match child.style.height.resolve(0.0) {
                Some(h) => h + child.style.padding.vertical() + child.style.border_width.vertical(),
                None => super::block::border_height_at(ctx, child, content_w),
            };
            item_cross[i] = h;
            cross = cross.max(h + items[i].margin.vertical());
        }
        line_cross.push(cross);
    }

    let mut line_order: Vec<usize> = (0..ranges.len()).collect();
    if matches!(style.flex_wrap, FlexWrap::WrapReverse) {
        line_order.reverse();
    }

    // Cross-axis distribution across lines.
    let definite_cross = style.height.resolve(0.0);
    let total_cross: f64 = line_cross.iter().sum::<f64>()
        + cross_gap * ranges.len().saturating_sub(1) as f64;
    let (cross_lead, cross_space, stretch_extra) = match definite_cross {
        Some(h) if !ranges.is_empty() => {
            let free = h - total_cross;
            match style.align_content {
                AlignContent::Stretch if free > 0.0 => (0.0, 0.0, free / ranges.len() as f64),
                AlignContent::FlexStart | AlignContent::Stretch => (0.0, 0.0, 0.0),
                AlignContent::FlexEnd => (free.max(0.0), 0.0, 0.0),
                AlignContent::Center => (free.max(0.0) / 2.0, 0.0, 0.0),
                AlignContent::SpaceBetween => {
                    if ranges.len() > 1 {
                        (0.0, free.max(0.0) / (ranges.len() - 1) as f64, 0.0)
                    } else {
                        (0.0, 0.0, 0.0)
                    }
                }
                AlignContent::SpaceAround => {
                    let unit = free.max(0.0) / ranges.len() as f64;
                    (unit / 2.0, unit, 0.0)
                }
                AlignContent::SpaceEvenly => {
                    let unit = free.max(0.0) / (ranges.len() + 1) as f64;
                    (unit, unit, 0.0)
                }
            }
        }
        _ => (0.0, 0.0, 0.0),
    };

    // Place lines, fragmenting between them when space runs out.
    let mut children: Vec<Fragment> = Vec::new();
    let mut y = content_top + cross_lead;
    let mut resume_out: Option<ResumeAt> = None;
    let mirror = matches!(style.direction, Direction::Rtl) != reverse;

    for (placed, &li) in line_order.iter().enumerate() {
        let (start, end) = ranges[li];
        let cross = line_cross[li] + stretch_extra;
        if placed > 0 {
            y += cross_gap + cross_space;
        }
        let fragmentainer_has_content = !page_is_empty || !children.is_empty();
        if y + cross > area.bottom + 1e-6 && fragmentainer_has_content {
            resume_out = Some(ResumeAt::new(items[start].index));
            break;
        }

        let line_items = &items[start..end];
        let outer_total: f64 = line_items
            .iter()
            .map(|i| i.main + i.margin.horizontal())
            .sum();
        let gaps_total = gap * (end - start).saturating_sub(1) as f64;
        let mut free = content_width - outer_total - gaps_total;
        // Auto margins claim free space before justification runs.
        let auto_margins: u32 = line_items.iter().map(|i| i.auto_margin_main).sum();
        let auto_share = if auto_margins > 0 && free > 0.0 {
            let share = free / auto_margins as f64;
            free = 0.0;
            share
        } else {
            0.0
        };
        let (lead, spacing) =
            justify_offsets(style.justify_content, style.direction, end - start, free);

        let mut main_pos = lead;
        for i in start..end {
            let child = flow[i].1;
            let cstyle = &child.style;
            let item = &items[i];
            let ml = if cstyle.margin.left.is_auto() {
                auto_share
            } else {
                item.margin.left
            };
            let mr = if cstyle.margin.right.is_auto() {
                auto_share
            } else {
                item.margin.right
            };

            let align = cstyle.align_self.unwrap_or(style.align_items);
            let stretches =
                matches!(align, AlignItems::Stretch) && cstyle.height.is_auto() && !item.auto_margin_cross;
            let cross_size = if stretches {
                (cross - item.margin.vertical()).max(0.0)
            } else {
                item_cross[i]
            };
            let cross_offset = if item.auto_margin_cross {
                (cross - cross_size - item.margin.vertical()).max(0.0) / 2.0 + item.margin.top
            } else {
                match align {
                    AlignItems::FlexEnd => cross - cross_size - item.margin.bottom,
                    AlignItems::Center => {
                        (cross - cross_size - item.margin.vertical()) / 2.0 + item.margin.top
                    }
                    _ => item.margin.top,
                }
            };

            main_pos += ml;
            let item_x = if mirror {
                content_x + content_width - main_pos - item.main
            } else {
                content_x + main_pos
            };
            let item_y = y + cross_offset;

            let mut frag = lay_item(
                ctx,
                child,
                item_x - item.margin.left,
                item_y - item.margin.top,
                item.main + item.margin.horizontal(),
            );
            frag.rect.x = item_x;
            frag.rect.width = item.main;
            frag.rect.height = frag.rect.height.max(cross_size);
            children.push(frag);

            main_pos += item.main + mr + gap + spacing;
        }
        y += cross;
    }

    finish_container(
        node,
        style,
        &area,
        &opened,
        y,
        children,
        resume_out,
        NextBreak::default(),
        first_fragment,
        adjoining,
    )
}

#[allow(clippy::too_many_arguments)]
fn layout_flex_column(
    ctx: &mut LayoutContext,
    node: &BoxNode,
    style: &Style,
    area: FlowArea,
    resume: Option<&ResumeAt>,
    page_is_empty: bool,
    adjoining: &mut Vec<f64>,
) -> FlowResult {
    let first_fragment = resume.is_none();
    let doc_state = if ctx.measuring {
        None
    } else {
        Some(ctx.snapshot_doc_state())
    };
    let opened = open_container(ctx, node, style, &area, first_fragment, adjoining);
    let content_width = opened.content_width;
    let content_x = opened.content_x;
    let content_top = opened.content_top;

    let reverse = style.flex_direction.is_reverse();
    let flow = flex_children(node, reverse);
    let definite_main = style.height.resolve(0.0);
    let gap = style.row_gap;

    let mut items: Vec<FlexItem> = flow
        .iter()
        .map(|(idx, child)| {
            build_item(
                ctx,
                *idx,
                child,
                false,
                definite_main.unwrap_or(0.0),
                content_width,
            )
        })
        .collect();

    // Grow/shrink only against a definite main size.
    if let Some(main) = definite_main {
        resolve_line(&mut items, false, gap, main);
    }

    let (lead, spacing) = match definite_main {
        Some(main) => {
            let outer: f64 = items.iter().map(|i| i.main + i.margin.vertical()).sum();
            let gaps = gap * items.len().saturating_sub(1) as f64;
            justify_offsets(
                style.justify_content,
                Direction::Ltr,
                items.len(),
                main - outer - gaps,
            )
        }
        None => (0.0, 0.0),
    };

    // Stack items down the page, fragmenting through the controller.
    let mut children: Vec<Fragment> = Vec::new();
    let mut y = content_top + lead;
    let mut resume_out: Option<ResumeAt> = None;
    let mut next = NextBreak::default();
    let start_idx = resume.map(|r| r.index);
    let mut inner = resume.and_then(|r| r.inner.as_deref());
    let mut started = resume.is_none();

    for (pos, (idx, child)) in flow.iter().enumerate() {
        if !started {
            if Some(*idx) == start_idx {
                started = true;
            } else {
                continue;
            }
        }
        let item = &items[pos];
        if !children.is_empty() {
            y += gap + spacing;
        }
        let child_page_empty = page_is_empty && children.is_empty();

        let align = child.style.align_self.unwrap_or(style.align_items);
        let stretches = matches!(align, AlignItems::Stretch)
            && child.style.width.is_auto()
            && !item.auto_margin_cross;
        let cross_size = if stretches {
            (content_width - item.margin.horizontal()).max(0.0)
        } else {
            let w = child.style.width.resolve(content_width).unwrap_or_else(|| {
                let max = ctx.measured(|c| max_content_width(c, child));
                max.min(content_width) - item_main_edges(&child.style, true)
            });
            w + child.style.padding.horizontal() + child.style.border_width.horizontal()
        };
        let x_off = if item.auto_margin_cross {
            (content_width - cross_size).max(0.0) / 2.0
        } else {
            match align {
                AlignItems::FlexEnd => content_width - cross_size - item.margin.right,
                AlignItems::Center => (content_width - cross_size) / 2.0,
                _ => 0.0,
            }
        };

        let result = layout_block_level(
            ctx,
            child,
            FlowArea {
                x: content_x + x_off,
                y,
                width: cross_size + item.margin.horizontal(),
                top: area.top,
                bottom: area.bottom,
            },
            inner,
            child_page_empty,
            &mut Vec::new(),
        );
        inner = None;

        match result.fragment {
            Some(mut frag) => {
                let natural = frag.rect.height;
                if result.resume.is_none() && definite_main.is_some() && item.main > natural {
                    frag.rect.height = item.main;
                }
                y = frag.rect.bottom().max(y) + item.margin.bottom;
                children.push(frag);
                if let Some(nested) = result.resume {
                    resume_out = Some(ResumeAt::nested(*idx, nested));
                    next = result.next;
                    break;
                }
            }
            None => {
                if children.is_empty() && first_fragment {
                    // Nothing placed at all: the container itself moves.
                    if let Some(doc) = doc_state {
                        ctx.restore_doc_state(doc);
                    }
                    *adjoining = opened.adjoining_entry.clone();
                    return FlowResult {
                        fragment: None,
                        resume: Some(ResumeAt::new(0)),
                        next: NextBreak::default(),
                    };
                }
                resume_out = Some(ResumeAt::new(*idx));
                break;
            }
        }
    }

    finish_container(
        node, style, &area, &opened, y, children, resume_out, next, first_fragment, adjoining,
    )
}

/// Shared tail: build the container fragment and settle trailing margins.
#[allow(clippy::too_many_arguments)]
fn finish_container(
    node: &BoxNode,
    style: &Style,
    area: &FlowArea,
    opened: &Opened,
    content_bottom: f64,
    children: Vec<Fragment>,
    resume_out: Option<ResumeAt>,
    next: NextBreak,
    first_fragment: bool,
    adjoining: &mut Vec<f64>,
) -> FlowResult {
    let continues = resume_out.is_some();
    let auto = (content_bottom - opened.content_top).max(0.0);
    let content_height = match style.height.resolve(0.0) {
        Some(h) if !continues => style.clamp_height(h, 0.0),
        Some(h) => style
            .clamp_height(h, 0.0)
            .min((area.bottom - opened.content_top).max(auto)),
        None => style.clamp_height(auto, 0.0),
    };
    let border_height =
        opened.edge_top + content_height + if continues { 0.0 } else { opened.edge_bottom };
    let width =
        opened.content_width + style.padding.horizontal() + style.border_width.horizontal();

    let mut fragment = Fragment::new(
        FragmentKind::Block,
        node.style.clone(),
        Rect::new(
            area.x + opened.margin.left,
            opened.border_y,
            width,
            border_height,
        ),
    );
    fragment.children = children;
    fragment.id = node.id.clone();
    fragment.split = match (first_fragment, continues) {
        (true, false) => SplitMarker::Whole,
        (true, true) => SplitMarker::First,
        (false, true) => SplitMarker::Middle,
        (false, false) => SplitMarker::Last,
    };

    if continues {
        return FlowResult {
            fragment: Some(fragment),
            resume: resume_out,
            next,
        };
    }
    adjoining.push(opened.margin.bottom);
    FlowResult {
        fragment: Some(fragment),
        resume: None,
        next: NextBreak::default(),
    }
}
