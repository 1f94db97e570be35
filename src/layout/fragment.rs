//! # Fragmentation Controller
//!
//! The shared decision point for "does this content fit in the remaining
//! block-axis space, and if not, where do we cut".  Block flow, flex and
//! multicolumn layout all route their break decisions through here so that
//! page and column boundaries obey one set of rules.
//!
//! Decisions are communicated upward as values, never by mutating parent
//! state: a layout call returns the completed fragment together with a
//! [`ResumeAt`] token describing where the next fragmentainer should pick
//! up.  The controller itself is stateless.

use crate::style::{BreakBetween, Direction, MarginBreak};

/// A continuation token: the path to the first child (or line) that did not
/// make it into the current fragmentainer.
///
/// `index` is the child index inside the box being resumed; for a box whose
/// content is lines, it is the line's starting item index and `inner`
/// carries the character offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeAt {
    pub index: usize,
    pub inner: Option<Box<ResumeAt>>,
}

impl ResumeAt {
    pub fn new(index: usize) -> Self {
        Self { index, inner: None }
    }

    pub fn nested(index: usize, inner: ResumeAt) -> Self {
        Self {
            index,
            inner: Some(Box::new(inner)),
        }
    }
}

/// What the next fragmentainer must look like, carried alongside a resume
/// token: the break class that caused the cut and the page name requested
/// by the content that comes next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NextBreak {
    pub value: BreakBetween,
    pub page_name: Option<String>,
}

impl NextBreak {
    pub fn forced(&self) -> bool {
        self.value.forces(false) || self.value.forces(true)
    }
}

/// How many of a block's lines stay before a cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSplit {
    All,
    /// Keep this many lines, resume with the rest.
    Take(usize),
    /// Move every line to the next fragmentainer.
    MoveAll,
}

/// Decide where to cut a sequence of lines, honoring orphans and widows.
///
/// `heights` are the line extents in flow order, `remaining` the available
/// block-axis space.  `avoid_inside` reflects `break-inside: avoid*` on the
/// box.  When `must_progress` is set (the fragmentainer is empty), the
/// controller forces at least one line rather than loop forever: avoidance
/// is a hint, not a guarantee.
pub fn split_lines(
    heights: &[f64],
    remaining: f64,
    orphans: u32,
    widows: u32,
    avoid_inside: bool,
    must_progress: bool,
) -> LineSplit {
    let total = heights.len();
    if total == 0 {
        return LineSplit::All;
    }

    // Greedy fit.
    let mut fitted = 0;
    let mut used = 0.0;
    for &h in heights {
        if used + h > remaining + 1e-6 {
            break;
        }
        used += h;
        fitted += 1;
    }

    if fitted == total {
        return LineSplit::All;
    }

    if must_progress && fitted == 0 {
        // Even one line overflows; place it anyway to guarantee progress.
        return LineSplit::Take(1);
    }

    if avoid_inside && !must_progress {
        return LineSplit::MoveAll;
    }

    let orphans = orphans.max(1) as usize;
    let widows = widows.max(1) as usize;

    if total < orphans + widows {
        // The block cannot be split legally at all: move it whole.
        return if must_progress {
            LineSplit::Take(fitted.max(1))
        } else {
            LineSplit::MoveAll
        };
    }

    let mut take = fitted;
    // Leave at least `widows` lines for the next fragmentainer.
    if total - take < widows {
        take = total - widows;
    }
    if take < orphans {
        return if must_progress {
            LineSplit::Take(fitted.max(1))
        } else {
            LineSplit::MoveAll
        };
    }
    LineSplit::Take(take)
}

/// A break boundary between two sibling boxes, remembered by the child loop
/// so an `avoid` further down can back up to the last legal cut.
#[derive(Debug, Clone, Copy)]
pub struct BreakCandidate {
    /// Child index the next fragmentainer would resume at.
    pub index: usize,
    /// Whether any break-avoidance property forbids cutting here.
    pub avoid: bool,
}

/// Track candidates while walking a child sequence, and answer "where is
/// the latest legal cut at or before this boundary".
#[derive(Debug, Default)]
pub struct BreakTracker {
    candidates: Vec<BreakCandidate>,
}

impl BreakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, index: usize, avoid: bool) {
        self.candidates.push(BreakCandidate { index, avoid });
    }

    /// Latest candidate at or before `index` that is not avoided.
    pub fn last_allowed(&self, index: usize) -> Option<usize> {
        self.candidates
            .iter()
            .rev()
            .find(|c| c.index <= index && !c.avoid)
            .map(|c| c.index)
    }

    /// Latest candidate at or before `index`, avoided or not: the
    /// best-effort fallback when every boundary asks to be avoided.
    pub fn last_any(&self, index: usize) -> Option<usize> {
        self.candidates
            .iter()
            .rev()
            .find(|c| c.index <= index)
            .map(|c| c.index)
    }
}

/// Is the margin at a fragmentainer-leading edge kept?
///
/// Margins that land at the top of a continuation fragmentainer are
/// normally discarded; `margin-break: keep` always keeps them, and the
/// `auto` initial value keeps them only after a forced break.
pub fn keep_leading_margin(policy: MarginBreak, break_was_forced: bool) -> bool {
    match policy {
        MarginBreak::Keep => true,
        MarginBreak::Discard => false,
        MarginBreak::Auto => break_was_forced,
    }
}

/// Which side of the spread a page index falls on (0-based; the first page
/// of a document is a right page in left-to-right documents).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSide {
    Left,
    Right,
}

pub fn page_side(index: usize, direction: Direction) -> PageSide {
    let right_first = matches!(direction, Direction::Ltr);
    let even = index % 2 == 0;
    if even == right_first {
        PageSide::Right
    } else {
        PageSide::Left
    }
}

/// Does a forced break with parity need a blank page inserted before the
/// content resumes?  `next_index` is the index the next content page would
/// get without insertion.
pub fn needs_parity_blank(value: BreakBetween, next_index: usize, direction: Direction) -> bool {
    let side = page_side(next_index, direction);
    match value {
        BreakBetween::Left => side != PageSide::Left,
        BreakBetween::Right => side != PageSide::Right,
        // Recto is the "front" side: right in LTR, left in RTL.
        BreakBetween::Recto => {
            let recto = match direction {
                Direction::Ltr => PageSide::Right,
                Direction::Rtl => PageSide::Left,
            };
            side != recto
        }
        BreakBetween::Verso => {
            let verso = match direction {
                Direction::Ltr => PageSide::Left,
                Direction::Rtl => PageSide::Right,
            };
            side != verso
        }
        _ => false,
    }
}
