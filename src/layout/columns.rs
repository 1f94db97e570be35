//! # Multicolumn Layout
//!
//! Splits a block's content into side-by-side column boxes of equal width,
//! filling left to right through the same fragmentation controller that
//! drives pages.  Balanced groups search for the smallest column height
//! that still holds everything; `column-span: all` boxes interrupt the
//! flow, closing the preceding column group and opening a new one after.
//!
//! Page-level forced breaks outrank column grouping: when one fires inside
//! a column, the multicolumn box stops at that point and continues on the
//! next page.

use std::sync::Arc;

use crate::geometry::Rect;
use crate::layout::block::{layout_block_level, FlowArea, FlowResult};
use crate::layout::fragment::{NextBreak, ResumeAt};
use crate::layout::{BoxKind, BoxNode, Fragment, FragmentKind, LayoutContext, SplitMarker};
use crate::style::{ColumnFill, ColumnSpan, Direction, Position, Style};

/// Column count and used column width for the available inline size.
pub fn column_geometry(style: &Style, available: f64) -> (usize, f64) {
    let gap = style.column_gap;
    match (style.column_width, style.column_count) {
        (None, Some(count)) => {
            let count = count.max(1) as usize;
            let width = ((available - (count as f64 - 1.0) * gap) / count as f64).max(0.0);
            (count, width)
        }
        (Some(w), None) => {
            let count = (((available + gap) / (w + gap)).floor() as usize).max(1);
            let width = (available + gap) / count as f64 - gap;
            (count, width)
        }
        (Some(w), Some(count)) => {
            let fit = (((available + gap) / (w + gap)).floor() as usize).max(1);
            let count = (count.max(1) as usize).min(fit);
            let width = (available + gap) / count as f64 - gap;
            (count, width)
        }
        (None, None) => (1, available),
    }
}

/// The style of the anonymous box holding one column's share of content.
fn column_box_style(parent: &Style, width: f64) -> Arc<Style> {
    Arc::new(Style {
        display: crate::style::Display::Block,
        position: Position::Static,
        width: crate::style::Dimension::Pt(width),
        height: crate::style::Dimension::Auto,
        min_height: crate::style::Dimension::Pt(0.0),
        margin: Default::default(),
        padding: Default::default(),
        border_width: Default::default(),
        column_count: None,
        column_width: None,
        break_before: Default::default(),
        break_after: Default::default(),
        break_inside: Default::default(),
        counter_reset: Vec::new(),
        counter_increment: Vec::new(),
        counter_set: Vec::new(),
        string_set: Vec::new(),
        page: parent.page.clone(),
        ..parent.clone()
    })
}

/// One segment of the child list: a run of column content or a spanner.
enum Segment {
    Columns(Vec<usize>),
    Spanner(usize),
}

fn segment_children(node: &BoxNode) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut run: Vec<usize> = Vec::new();
    for (i, child) in node.children.iter().enumerate() {
        if child.style.column_span == ColumnSpan::All && !child.style.out_of_flow() {
            if !run.is_empty() {
                segments.push(Segment::Columns(std::mem::take(&mut run)));
            }
            segments.push(Segment::Spanner(i));
        } else {
            run.push(i);
        }
    }
    if !run.is_empty() {
        segments.push(Segment::Columns(run));
    }
    segments
}

/// Result of filling up to `count` columns at one height.
struct FillOutcome {
    columns: Vec<Fragment>,
    consumed: Vec<f64>,
    /// Resume within the column-box child list, if content is left over.
    resume: Option<ResumeAt>,
    next: NextBreak,
}

/// Fill columns left to right at the given height limit.
#[allow(clippy::too_many_arguments)]
fn fill_columns(
    ctx: &mut LayoutContext,
    column_box: &BoxNode,
    count: usize,
    width: f64,
    gap: f64,
    origin_x: f64,
    content_width: f64,
    y: f64,
    height: f64,
    rtl: bool,
    resume: Option<&ResumeAt>,
) -> FillOutcome {
    let mut columns = Vec::new();
    let mut consumed = Vec::new();
    let mut cursor: Option<ResumeAt> = resume.cloned();
    let mut next = NextBreak::default();

    for i in 0..count {
        let x = if rtl {
            origin_x + content_width - (i as f64 + 1.0) * width - i as f64 * gap
        } else {
            origin_x + i as f64 * (width + gap)
        };
        let result = layout_block_level(
            ctx,
            column_box,
            FlowArea {
                x,
                y,
                width,
                top: y,
                bottom: y + height,
            },
            cursor.as_ref(),
            true,
            &mut Vec::new(),
        );
        let fragment = match result.fragment {
            Some(mut frag) => {
                frag.kind = FragmentKind::Column;
                frag
            }
            None => Fragment::new(
                FragmentKind::Column,
                column_box.style.clone(),
                Rect::new(x, y, width, 0.0),
            ),
        };
        consumed.push(fragment.rect.height);
        columns.push(fragment);
        cursor = result.resume;
        next = result.next;

        match cursor {
            None => break,
            Some(_) => {
                // A page-class forced break wins over continuing in the
                // next column.
                if next.value.forces(false) {
                    break;
                }
            }
        }
    }

    FillOutcome {
        columns,
        consumed,
        resume: cursor,
        next,
    }
}

pub fn layout_multicol(
    ctx: &mut LayoutContext,
    node: &BoxNode,
    area: FlowArea,
    resume: Option<&ResumeAt>,
    page_is_empty: bool,
    adjoining: &mut Vec<f64>,
) -> FlowResult {
    let style = node.style.clone();
    let (content_width, margin) = super::block::container_widths(&style, area.width);
    let first_fragment = resume.is_none();
    let adjoining_entry = adjoining.clone();
    let doc_state = if ctx.measuring {
        None
    } else {
        Some(ctx.snapshot_doc_state())
    };

    if first_fragment {
        adjoining.push(margin.top);
    }
    let edge_top = if first_fragment {
        style.padding.top + style.border_width.top
    } else {
        0.0
    };
    let edge_bottom = style.padding.bottom + style.border_width.bottom;
    let border_y = super::block::commit_position(ctx, &style, area.y, adjoining);
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

    let (count, col_width) = column_geometry(&style, content_width);
    let gap = style.column_gap;
    let rtl = matches!(style.direction, Direction::Rtl);
    let fixed_height = style.height.resolve(0.0);

    let was_in_column = ctx.in_column;
    ctx.in_column = true;

    let segments = segment_children(node);
    let mut children: Vec<Fragment> = Vec::new();
    let mut y = content_top;
    let mut resume_out: Option<ResumeAt> = None;
    let mut next = NextBreak::default();
    let start_index = resume.map(|r| r.index).unwrap_or(0);
    let mut inner = resume.and_then(|r| r.inner.as_deref().cloned());

    for segment in &segments {
        match segment {
            Segment::Spanner(idx) => {
                if resume.is_some() && *idx < start_index {
                    continue;
                }
                let spanner_resume = if resume.is_some() && *idx == start_index {
                    inner.take()
                } else {
                    None
                };
                ctx.in_column = false;
                let result = layout_block_level(
                    ctx,
                    &node.children[*idx],
                    FlowArea {
                        x: content_x,
                        y,
                        width: content_width,
                        top: area.top,
                        bottom: area.bottom,
                    },
                    spanner_resume.as_ref(),
                    page_is_empty && children.is_empty(),
                    &mut Vec::new(),
                );
                ctx.in_column = true;
                match result.fragment {
                    Some(frag) => {
                        y = frag.rect.bottom();
                        children.push(frag);
                        if let Some(nested) = result.resume {
                            resume_out = Some(ResumeAt::nested(*idx, nested));
                            next = result.next;
                            break;
                        }
                    }
                    None => {
                        if children.is_empty() && first_fragment {
                            ctx.in_column = was_in_column;
                            if let Some(doc) = doc_state {
                                ctx.restore_doc_state(doc);
                            }
                            *adjoining = adjoining_entry;
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
            Segment::Columns(indices) => {
                if resume.is_some() && *indices.last().unwrap() < start_index {
                    continue;
                }
                // A resume landing inside this run maps to the anonymous
                // column box's local child index.
                let local_resume = if resume.is_some() {
                    indices
                        .iter()
                        .position(|&i| i == start_index)
                        .map(|li| ResumeAt {
                            index: li,
                            inner: inner.take().map(Box::new),
                        })
                } else {
                    None
                };

                let column_children: Vec<BoxNode> = indices
                    .iter()
                    .map(|&i| node.children[i].clone())
                    .collect();
                let column_box = BoxNode {
                    kind: BoxKind::Container,
                    style: column_box_style(&style, col_width),
                    children: column_children,
                    id: None,
                };

                let max_height = match fixed_height {
                    Some(h) => (content_top + h - y).min(area.bottom - y),
                    None => area.bottom - y,
                }
                .max(0.0);

                // Probe the full available height first; balance only when
                // everything fits.
                let probe = ctx.measured(|c| {
                    fill_columns(
                        c,
                        &column_box,
                        count,
                        col_width,
                        gap,
                        content_x,
                        content_width,
                        y,
                        max_height,
                        rtl,
                        local_resume.as_ref(),
                    )
                });

                let balance =
                    matches!(style.column_fill, ColumnFill::Balance) || fixed_height.is_some();
                let height = if balance && probe.resume.is_none() {
                    balanced_height(
                        ctx,
                        &column_box,
                        count,
                        col_width,
                        gap,
                        content_x,
                        content_width,
                        y,
                        max_height,
                        rtl,
                        local_resume.as_ref(),
                        &probe.consumed,
                    )
                } else {
                    max_height
                };

                let outcome = fill_columns(
                    ctx,
                    &column_box,
                    count,
                    col_width,
                    gap,
                    content_x,
                    content_width,
                    y,
                    height,
                    rtl,
                    local_resume.as_ref(),
                );

                let tallest = outcome
                    .consumed
                    .iter()
                    .copied()
                    .fold(0.0, f64::max);
                for mut column in outcome.columns {
                    column.rect.height = tallest;
                    children.push(column);
                }
                y += tallest;

                if let Some(col_resume) = outcome.resume {
                    // Map the column-box index back into our child list.
                    let child_idx = indices[col_resume.index.min(indices.len() - 1)];
                    resume_out = Some(ResumeAt {
                        index: child_idx,
                        inner: col_resume.inner,
                    });
                    next = outcome.next;
                    break;
                }
            }
        }
    }

    ctx.in_column = was_in_column;
    ctx.at_fragmentainer_top = false;

    let continues = resume_out.is_some();
    let auto_height = (y - content_top).max(0.0);
    let content_height = match fixed_height {
        Some(h) if !continues => style.clamp_height(h, 0.0),
        Some(h) => style
            .clamp_height(h, 0.0)
            .min((area.bottom - content_top).max(auto_height)),
        None => style.clamp_height(auto_height, 0.0),
    };
    let border_height =
        edge_top + content_height + if continues { 0.0 } else { edge_bottom };

    let mut fragment = Fragment::new(
        FragmentKind::Block,
        node.style.clone(),
        Rect::new(
            area.x + margin.left,
            border_y,
            content_width + style.padding.horizontal() + style.border_width.horizontal(),
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
    adjoining.push(margin.bottom);
    FlowResult {
        fragment: Some(fragment),
        resume: None,
        next: NextBreak::default(),
    }
}

/// Search for the smallest column height that still fits the content in
/// the available column count.  The predicate is monotone in the height,
/// so the search brackets the minimum and converges quickly; content
/// quantized into lines snaps to the same break positions either way.
#[allow(clippy::too_many_arguments)]
fn balanced_height(
    ctx: &mut LayoutContext,
    column_box: &BoxNode,
    count: usize,
    width: f64,
    gap: f64,
    origin_x: f64,
    content_width: f64,
    y: f64,
    max_height: f64,
    rtl: bool,
    resume: Option<&ResumeAt>,
    consumed_at_max: &[f64],
) -> f64 {
    let total: f64 = consumed_at_max.iter().sum();
    let mut lo = (total / count as f64).max(0.0);
    let mut hi = max_height;
    if lo >= hi {
        return hi;
    }

    let fits = |ctx: &mut LayoutContext, h: f64| -> bool {
        let outcome = ctx.measured(|c| {
            fill_columns(
                c,
                column_box,
                count,
                width,
                gap,
                origin_x,
                content_width,
                y,
                h,
                rtl,
                resume,
            )
        });
        outcome.resume.is_none()
    };

    if fits(ctx, lo) {
        return lo;
    }
    for _ in 0..24 {
        if hi - lo <= 0.01 {
            break;
        }
        let mid = (lo + hi) / 2.0;
        if fits(ctx, mid) {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    hi
}
